// THEORY:
// The OpenCV backend is the only place that talks to a real camera, a real video
// file and a real window. It implements the `devices` traits on top of the
// `videoio` and `highgui` modules and converts between OpenCV's BGR `Mat` and
// the harness' RGB `Frame`.
//
// It also hosts the Haar cascade detector used by the `opencv` adapters, since
// that detector needs the same `Mat` plumbing.

use crate::core_modules::task_result::Detection;
use crate::devices::{
    Camera, Frame, KeySignal, MediaBackend, PreviewOverlay, PreviewSurface, VideoSink,
    open_with_fallback,
};
use crate::errors::{BenchError, BenchResult};
use opencv::{
    core::{self, Mat, Point, Rect, Scalar, Size, Vector},
    highgui, imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::Path;
use tracing::{info, warn};

const FACE_CASCADE: &str = "haarcascades/haarcascade_frontalface_default.xml";
const BODY_CASCADE: &str = "haarcascades/haarcascade_fullbody.xml";
/// Directory checked before OpenCV's own search paths.
const CASCADE_DIR_ENV: &str = "VISION_BENCH_HAARCASCADES";

const KEY_SPACE: i32 = 32;
const KEY_ESC: i32 = 27;

fn device_error(e: opencv::Error) -> BenchError {
    BenchError::Device(e.to_string())
}

fn frame_to_bgr(frame: &Frame) -> opencv::Result<Mat> {
    let (width, height) = frame.dimensions();
    let mut rgb = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        core::CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(frame.as_raw());
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

fn bgr_to_frame(mat: &Mat) -> opencv::Result<Option<Frame>> {
    if mat.empty() {
        return Ok(None);
    }
    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let bytes = rgb.data_bytes()?.to_vec();
    Ok(Frame::from_raw(rgb.cols() as u32, rgb.rows() as u32, bytes))
}

/// Capture APIs to try, platform-preferred first.
fn capture_apis() -> Vec<i32> {
    let mut apis = Vec::with_capacity(2);
    if cfg!(target_os = "windows") {
        apis.push(videoio::CAP_DSHOW);
    } else if cfg!(target_os = "linux") {
        apis.push(videoio::CAP_V4L2);
    } else if cfg!(target_os = "macos") {
        apis.push(videoio::CAP_AVFOUNDATION);
    }
    apis.push(videoio::CAP_ANY);
    apis
}

pub struct OpenCvCamera {
    capture: Option<VideoCapture>,
    buffer: Mat,
}

impl OpenCvCamera {
    pub fn open(index: i32) -> BenchResult<Self> {
        let capture = open_with_fallback(index, &capture_apis(), |api| {
            let mut capture = VideoCapture::new(index, *api).map_err(device_error)?;
            if capture.is_opened().map_err(device_error)? {
                Ok(Some(capture))
            } else {
                let _ = capture.release();
                Ok(None)
            }
        })?;
        Ok(Self {
            capture: Some(capture),
            buffer: Mat::default(),
        })
    }
}

impl Camera for OpenCvCamera {
    fn read(&mut self) -> BenchResult<Option<Frame>> {
        let Some(capture) = self.capture.as_mut() else {
            return Err(BenchError::Device("camera not opened".to_string()));
        };
        if !capture.read(&mut self.buffer).map_err(device_error)? {
            return Ok(None);
        }
        bgr_to_frame(&self.buffer).map_err(device_error)
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                warn!(error = %e, "failed to release camera");
            }
        }
    }
}

pub struct OpenCvVideoSink {
    writer: Option<VideoWriter>,
}

impl OpenCvVideoSink {
    pub fn open(path: &Path, fps: f64, width: u32, height: u32) -> BenchResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').map_err(device_error)?;
        let mut writer = VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            fps,
            Size::new(width as i32, height as i32),
            true,
        )
        .map_err(device_error)?;
        if !writer.is_opened().map_err(device_error)? {
            let _ = writer.release();
            return Err(BenchError::Device(format!(
                "unable to open video writer for {}",
                path.display()
            )));
        }
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl VideoSink for OpenCvVideoSink {
    fn write(&mut self, frame: &Frame) -> BenchResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(BenchError::Device("video writer already released".to_string()));
        };
        let bgr = frame_to_bgr(frame).map_err(device_error)?;
        writer.write(&bgr).map_err(device_error)
    }

    fn release(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.release() {
                warn!(error = %e, "failed to release video writer");
            }
        }
    }
}

pub struct HighGuiPreview {
    title: String,
    open: bool,
}

impl HighGuiPreview {
    fn draw(mat: &mut Mat, overlay: &PreviewOverlay) -> opencv::Result<()> {
        let box_color = Scalar::new(30.0, 200.0, 30.0, 0.0);
        let text_color = Scalar::new(255.0, 255.0, 255.0, 0.0);

        for det in &overlay.detections {
            let [x, y, w, h] = det.bbox.map(|v| v as i32);
            imgproc::rectangle(mat, Rect::new(x, y, w, h), box_color, 2, imgproc::LINE_8, 0)?;
            imgproc::put_text(
                mat,
                &det.caption(),
                Point::new(x, (y - 8).max(20)),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                box_color,
                2,
                imgproc::LINE_8,
                false,
            )?;
        }

        for (i, line) in overlay.lines.iter().enumerate() {
            imgproc::put_text(
                mat,
                line,
                Point::new(10, 25 + 25 * i as i32),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.6,
                text_color,
                2,
                imgproc::LINE_8,
                false,
            )?;
        }
        Ok(())
    }
}

impl PreviewSurface for HighGuiPreview {
    fn show(&mut self, frame: &Frame, overlay: &PreviewOverlay) -> BenchResult<KeySignal> {
        let mut mat = frame_to_bgr(frame).map_err(device_error)?;
        Self::draw(&mut mat, overlay).map_err(device_error)?;
        highgui::imshow(&self.title, &mat).map_err(device_error)?;
        self.open = true;

        let key = highgui::wait_key(1).map_err(device_error)? & 0xFF;
        Ok(match key {
            KEY_SPACE => KeySignal::Start,
            KEY_ESC => KeySignal::Cancel,
            k if k == 'q' as i32 => KeySignal::Quit,
            _ => KeySignal::Idle,
        })
    }

    fn close(&mut self) {
        if self.open {
            let _ = highgui::destroy_window(&self.title);
            self.open = false;
        }
    }
}

/// Real devices through OpenCV.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvBackend;

impl MediaBackend for OpenCvBackend {
    fn open_camera(&mut self, index: i32) -> BenchResult<Box<dyn Camera>> {
        Ok(Box::new(OpenCvCamera::open(index)?))
    }

    fn open_video_writer(
        &mut self,
        path: &Path,
        fps: f64,
        width: u32,
        height: u32,
    ) -> BenchResult<Box<dyn VideoSink>> {
        Ok(Box::new(OpenCvVideoSink::open(path, fps, width, height)?))
    }

    fn open_preview(&mut self, title: &str) -> BenchResult<Box<dyn PreviewSurface>> {
        Ok(Box::new(HighGuiPreview {
            title: title.to_string(),
            open: false,
        }))
    }
}

fn load_cascade(relative: &str) -> opencv::Result<Option<CascadeClassifier>> {
    let override_path = std::env::var(CASCADE_DIR_ENV).ok().map(|dir| {
        let file = Path::new(relative).file_name().unwrap_or_default();
        Path::new(&dir).join(file).to_string_lossy().into_owned()
    });
    let path = match override_path {
        Some(path) => path,
        None => core::find_file(relative, false, true)?,
    };
    if path.is_empty() {
        return Ok(None);
    }
    let classifier = CascadeClassifier::new(&path)?;
    if classifier.empty()? {
        return Ok(None);
    }
    info!(path = %path, "loaded Haar cascade");
    Ok(Some(classifier))
}

fn collect_rects(
    classifier: &mut CascadeClassifier,
    gray: &Mat,
    scale_factor: f64,
    min_neighbors: i32,
    label: &str,
    out: &mut Vec<Detection>,
) -> opencv::Result<()> {
    let mut rects = Vector::<Rect>::new();
    classifier.detect_multi_scale(
        gray,
        &mut rects,
        scale_factor,
        min_neighbors,
        0,
        Size::default(),
        Size::default(),
    )?;
    for r in rects.iter() {
        out.push(Detection::new(
            label,
            None,
            [r.x, r.y, r.width, r.height].map(|v| v.max(0) as u32),
        ));
    }
    Ok(())
}

/// Frontal-face cascade plus, optionally, the full-body cascade.
pub struct HaarCascades {
    face: CascadeClassifier,
    body: Option<CascadeClassifier>,
}

impl HaarCascades {
    pub fn load(with_body: bool) -> opencv::Result<Option<Self>> {
        let Some(face) = load_cascade(FACE_CASCADE)? else {
            return Ok(None);
        };
        let body = if with_body {
            match load_cascade(BODY_CASCADE)? {
                Some(body) => Some(body),
                None => return Ok(None),
            }
        } else {
            None
        };
        Ok(Some(Self { face, body }))
    }

    pub fn detect(&mut self, frame: &Frame) -> opencv::Result<Vec<Detection>> {
        let bgr = frame_to_bgr(frame)?;
        let mut gray = Mat::default();
        imgproc::cvt_color(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let mut detections = Vec::new();
        collect_rects(&mut self.face, &gray, 1.1, 5, "face", &mut detections)?;
        if let Some(body) = self.body.as_mut() {
            collect_rects(body, &gray, 1.05, 3, "person", &mut detections)?;
        }
        Ok(detections)
    }
}

/// Cascades loaded on first use and kept for the adapter's lifetime.
#[derive(Default)]
pub enum LazyCascades {
    #[default]
    Unloaded,
    Ready(HaarCascades),
    Unavailable,
}

impl LazyCascades {
    pub fn get(&mut self, with_body: bool) -> Option<&mut HaarCascades> {
        if matches!(self, LazyCascades::Unloaded) {
            *self = match HaarCascades::load(with_body) {
                Ok(Some(cascades)) => LazyCascades::Ready(cascades),
                Ok(None) => LazyCascades::Unavailable,
                Err(e) => {
                    warn!(error = %e, "failed to load Haar cascades");
                    LazyCascades::Unavailable
                }
            };
        }
        match self {
            LazyCascades::Ready(cascades) => Some(cascades),
            _ => None,
        }
    }
}
