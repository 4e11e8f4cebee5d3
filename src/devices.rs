// THEORY:
// The `devices` module draws the line between the harness and the outside
// world. The executor never talks to a capture library directly; it asks a
// `MediaBackend` for a camera, a video writer and a preview surface, and gets
// back trait objects it owns for the duration of one run.
//
// Ownership is scoped: each device is wrapped in a lease whose `Drop` releases
// it. Whatever way the run loop ends (limit reached, operator stop, device
// error), the camera, the writer and the preview window are released before
// control goes back to the caller.

use crate::core_modules::task_result::Detection;
use crate::errors::{BenchError, BenchResult};
use std::path::Path;
use tracing::{debug, warn};

/// A captured frame, RGB8, origin top-left.
pub type Frame = image::RgbImage;

/// Operator input observed on a preview surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySignal {
    /// No relevant key was pressed.
    Idle,
    /// SPACE: start the pending condition.
    Start,
    /// ESC: cancel.
    Cancel,
    /// `q`: stop the current run.
    Quit,
}

/// What to draw on top of a frame before showing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewOverlay {
    pub lines: Vec<String>,
    pub detections: Vec<Detection>,
}

pub trait Camera {
    /// Reads the next frame. `Ok(None)` is a transient failed read.
    fn read(&mut self) -> BenchResult<Option<Frame>>;
    /// Releases the device. Must tolerate being called on a released camera.
    fn release(&mut self);
}

pub trait VideoSink {
    fn write(&mut self, frame: &Frame) -> BenchResult<()>;
    /// Flushes and closes the file.
    fn release(&mut self);
}

pub trait PreviewSurface {
    /// Shows one annotated frame and polls the keyboard once.
    fn show(&mut self, frame: &Frame, overlay: &PreviewOverlay) -> BenchResult<KeySignal>;
    fn close(&mut self);
}

/// Factory for every device a run may need.
pub trait MediaBackend {
    fn open_camera(&mut self, index: i32) -> BenchResult<Box<dyn Camera>>;
    fn open_video_writer(
        &mut self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> BenchResult<Box<dyn VideoSink>>;
    fn open_preview(&mut self, title: &str) -> BenchResult<Box<dyn PreviewSurface>>;
}

/// Tries each capture API in order and returns the first device that opens.
///
/// `open` answers `Ok(None)` when an API is unavailable or the device didn't
/// open with it; errors are logged and treated the same way.
pub fn open_with_fallback<A, T, F>(index: i32, apis: &[A], mut open: F) -> BenchResult<T>
where
    A: std::fmt::Debug,
    F: FnMut(&A) -> BenchResult<Option<T>>,
{
    for api in apis {
        match open(api) {
            Ok(Some(device)) => {
                debug!(index, ?api, "camera opened");
                return Ok(device);
            }
            Ok(None) => debug!(index, ?api, "camera backend did not open"),
            Err(e) => warn!(index, ?api, error = %e, "camera backend failed"),
        }
    }
    Err(BenchError::Device(format!("unable to open webcam index {index}")))
}

/// Exclusive ownership of an open camera for one run.
pub struct CameraLease {
    camera: Box<dyn Camera>,
}

impl CameraLease {
    pub fn new(camera: Box<dyn Camera>) -> Self {
        Self { camera }
    }

    pub fn read(&mut self) -> BenchResult<Option<Frame>> {
        self.camera.read()
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.camera.release();
    }
}

pub struct VideoLease {
    sink: Box<dyn VideoSink>,
}

impl VideoLease {
    pub fn new(sink: Box<dyn VideoSink>) -> Self {
        Self { sink }
    }

    pub fn write(&mut self, frame: &Frame) -> BenchResult<()> {
        self.sink.write(frame)
    }
}

impl Drop for VideoLease {
    fn drop(&mut self) {
        self.sink.release();
    }
}

pub struct PreviewLease {
    surface: Box<dyn PreviewSurface>,
}

impl PreviewLease {
    pub fn new(surface: Box<dyn PreviewSurface>) -> Self {
        Self { surface }
    }

    pub fn show(&mut self, frame: &Frame, overlay: &PreviewOverlay) -> BenchResult<KeySignal> {
        self.surface.show(frame, overlay)
    }
}

impl Drop for PreviewLease {
    fn drop(&mut self) {
        self.surface.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingCamera {
        releases: Rc<Cell<u32>>,
    }

    impl Camera for CountingCamera {
        fn read(&mut self) -> BenchResult<Option<Frame>> {
            Ok(Some(Frame::new(2, 2)))
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    #[test]
    fn lease_releases_camera_on_drop() {
        let releases = Rc::new(Cell::new(0));
        {
            let mut lease = CameraLease::new(Box::new(CountingCamera {
                releases: releases.clone(),
            }));
            assert!(lease.read().unwrap().is_some());
            assert_eq!(releases.get(), 0);
        }
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn fallback_uses_the_first_api_that_opens() {
        let mut tried = Vec::new();
        let opened = open_with_fallback(0, &["dshow", "any"], |api| {
            tried.push(*api);
            Ok(if *api == "any" { Some(42) } else { None })
        })
        .unwrap();
        assert_eq!(opened, 42);
        assert_eq!(tried, vec!["dshow", "any"]);
    }

    #[test]
    fn fallback_skips_erroring_apis() {
        let opened = open_with_fallback(3, &[1, 2], |api| {
            if *api == 1 {
                Err(BenchError::Device("backend missing".into()))
            } else {
                Ok(Some("cam"))
            }
        })
        .unwrap();
        assert_eq!(opened, "cam");
    }

    #[test]
    fn fallback_exhausted_is_a_device_error() {
        let err = open_with_fallback::<_, (), _>(5, &["a", "b"], |_| Ok(None)).unwrap_err();
        match err {
            BenchError::Device(message) => assert!(message.contains("index 5")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
