// THEORY:
// The synthetic backend is a complete `MediaBackend` that never touches
// hardware. Its camera renders a bright square sliding across a dark
// background, so every adapter (the motion detector included) has something
// to chew on. Its writer and preview only count what they receive.
//
// It serves two purposes: dry-running a config on a machine without a camera
// (`--synthetic` on the command line), and giving tests a deterministic,
// observable set of devices. All observations go to a shared `DeviceStats`
// that outlives the devices themselves.

use crate::devices::{Camera, Frame, KeySignal, MediaBackend, PreviewOverlay, PreviewSurface, VideoSink};
use crate::errors::{BenchError, BenchResult};
use image::Rgb;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const SQUARE_SIZE: u32 = 24;
const SQUARE_STEP: u32 = 8;

/// Which camera reads succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPattern {
    Always,
    /// Every n-th read fails (1-based).
    FailEvery(u32),
    Never,
}

/// Everything the synthetic devices observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStats {
    pub cameras_opened: u32,
    pub cameras_released: u32,
    pub reads: u32,
    pub failed_reads: u32,
    pub writers_opened: u32,
    pub writers_released: u32,
    pub writer_paths: Vec<PathBuf>,
    pub frames_written: u32,
    pub previews_opened: u32,
    pub previews_closed: u32,
    pub frames_shown: u32,
    pub overlays: Vec<PreviewOverlay>,
}

type SharedStats = Rc<RefCell<DeviceStats>>;
type SharedKeys = Rc<RefCell<VecDeque<KeySignal>>>;

pub struct SyntheticBackend {
    width: u32,
    height: u32,
    pattern: ReadPattern,
    camera_available: bool,
    writer_available: bool,
    keys: SharedKeys,
    stats: SharedStats,
}

impl SyntheticBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(SQUARE_SIZE),
            height: height.max(SQUARE_SIZE),
            pattern: ReadPattern::Always,
            camera_available: true,
            writer_available: true,
            keys: Rc::new(RefCell::new(VecDeque::new())),
            stats: Rc::new(RefCell::new(DeviceStats::default())),
        }
    }

    pub fn with_read_pattern(mut self, pattern: ReadPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Makes `open_camera` fail, as an unplugged device would.
    pub fn without_camera(mut self) -> Self {
        self.camera_available = false;
        self
    }

    pub fn without_writer(mut self) -> Self {
        self.writer_available = false;
        self
    }

    /// Queues keys returned by successive preview `show` calls, across all
    /// preview surfaces. Once drained every call answers `Idle`.
    pub fn with_keys(self, keys: impl IntoIterator<Item = KeySignal>) -> Self {
        self.keys.borrow_mut().extend(keys);
        self
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats.borrow().clone()
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(320, 240)
    }
}

struct SyntheticCamera {
    width: u32,
    height: u32,
    pattern: ReadPattern,
    tick: u32,
    released: bool,
    stats: SharedStats,
}

impl SyntheticCamera {
    fn render(&self) -> Frame {
        let mut frame = Frame::from_pixel(self.width, self.height, Rgb([16, 16, 16]));
        let travel = self.width - SQUARE_SIZE;
        let x0 = if travel == 0 { 0 } else { (self.tick * SQUARE_STEP) % travel };
        let y0 = (self.height - SQUARE_SIZE) / 2;
        for y in y0..y0 + SQUARE_SIZE {
            for x in x0..x0 + SQUARE_SIZE {
                frame.put_pixel(x, y, Rgb([235, 235, 235]));
            }
        }
        frame
    }
}

impl Camera for SyntheticCamera {
    fn read(&mut self) -> BenchResult<Option<Frame>> {
        if self.released {
            return Err(BenchError::Device("camera already released".to_string()));
        }
        let mut stats = self.stats.borrow_mut();
        stats.reads += 1;
        let fails = match self.pattern {
            ReadPattern::Always => false,
            ReadPattern::Never => true,
            ReadPattern::FailEvery(n) => n > 0 && stats.reads % n == 0,
        };
        if fails {
            stats.failed_reads += 1;
            return Ok(None);
        }
        drop(stats);
        self.tick += 1;
        Ok(Some(self.render()))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.borrow_mut().cameras_released += 1;
        }
    }
}

struct CountingSink {
    released: bool,
    stats: SharedStats,
}

impl VideoSink for CountingSink {
    fn write(&mut self, _frame: &Frame) -> BenchResult<()> {
        self.stats.borrow_mut().frames_written += 1;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.borrow_mut().writers_released += 1;
        }
    }
}

struct ScriptedPreview {
    closed: bool,
    keys: SharedKeys,
    stats: SharedStats,
}

impl PreviewSurface for ScriptedPreview {
    fn show(&mut self, _frame: &Frame, overlay: &PreviewOverlay) -> BenchResult<KeySignal> {
        let mut stats = self.stats.borrow_mut();
        stats.frames_shown += 1;
        stats.overlays.push(overlay.clone());
        Ok(self.keys.borrow_mut().pop_front().unwrap_or(KeySignal::Idle))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.borrow_mut().previews_closed += 1;
        }
    }
}

impl MediaBackend for SyntheticBackend {
    fn open_camera(&mut self, index: i32) -> BenchResult<Box<dyn Camera>> {
        if !self.camera_available {
            return Err(BenchError::Device(format!("unable to open webcam index {index}")));
        }
        self.stats.borrow_mut().cameras_opened += 1;
        Ok(Box::new(SyntheticCamera {
            width: self.width,
            height: self.height,
            pattern: self.pattern,
            tick: 0,
            released: false,
            stats: self.stats.clone(),
        }))
    }

    fn open_video_writer(
        &mut self,
        path: &Path,
        _fps: f64,
        _width: u32,
        _height: u32,
    ) -> BenchResult<Box<dyn VideoSink>> {
        if !self.writer_available {
            return Err(BenchError::Device(format!(
                "unable to open video writer for {}",
                path.display()
            )));
        }
        let mut stats = self.stats.borrow_mut();
        stats.writers_opened += 1;
        stats.writer_paths.push(path.to_path_buf());
        Ok(Box::new(CountingSink {
            released: false,
            stats: self.stats.clone(),
        }))
    }

    fn open_preview(&mut self, _title: &str) -> BenchResult<Box<dyn PreviewSurface>> {
        self.stats.borrow_mut().previews_opened += 1;
        Ok(Box::new(ScriptedPreview {
            closed: false,
            keys: self.keys.clone(),
            stats: self.stats.clone(),
        }))
    }
}
