use crate::core_modules::blob_detector::{self, BlobThresholds, MotionBlob};
use crate::core_modules::motion_grid::MotionGrid;
use crate::core_modules::registry::{Library, TaskAdapter, TaskKind};
use crate::core_modules::task_result::{Detection, TaskOutputs, TaskResult};
use crate::devices::Frame;

#[cfg(feature = "opencv")]
use crate::opencv_backend::LazyCascades;

const MOTION_CHUNK_SIZE: u32 = 16;
/// Average heat (luminance levels) that maps to a confidence of 1.0.
const MOTION_HEAT_SATURATION: f64 = 64.0;

/// Face detection with the frontal-face Haar cascade.
#[derive(Default)]
pub struct FaceCascadeAdapter {
    #[cfg(feature = "opencv")]
    cascades: LazyCascades,
}

impl FaceCascadeAdapter {
    pub fn boxed() -> Box<dyn TaskAdapter> {
        Box::new(Self::default())
    }
}

impl TaskAdapter for FaceCascadeAdapter {
    fn task(&self) -> TaskKind {
        TaskKind::HumanCues
    }

    fn library(&self) -> Library {
        Library::Opencv
    }

    #[cfg(feature = "opencv")]
    fn process(&mut self, frame: &Frame) -> anyhow::Result<TaskResult> {
        let Some(cascades) = self.cascades.get(false) else {
            return Ok(TaskResult::failure(
                TaskKind::HumanCues,
                Library::Opencv,
                super::CASCADES_MISSING,
            ));
        };
        let faces = cascades.detect(frame)?;
        Ok(TaskResult::success(
            TaskKind::HumanCues,
            Library::Opencv,
            TaskOutputs::with_faces(faces),
        ))
    }

    #[cfg(not(feature = "opencv"))]
    fn process(&mut self, _frame: &Frame) -> anyhow::Result<TaskResult> {
        Ok(TaskResult::failure(
            self.task(),
            self.library(),
            super::OPENCV_MISSING,
        ))
    }
}

/// Coarse pose / gesture cues. Placeholder: reports neither.
pub struct PoseGestureAdapter;

impl PoseGestureAdapter {
    pub fn boxed() -> Box<dyn TaskAdapter> {
        Box::new(Self)
    }
}

impl TaskAdapter for PoseGestureAdapter {
    fn task(&self) -> TaskKind {
        TaskKind::HumanCues
    }

    fn library(&self) -> Library {
        Library::Mediapipe
    }

    fn process(&mut self, _frame: &Frame) -> anyhow::Result<TaskResult> {
        Ok(TaskResult::success(
            self.task(),
            self.library(),
            TaskOutputs::default(),
        ))
    }
}

/// Frame-differencing motion detector. Every region that changed since the
/// previous frame becomes a `motion` detection.
pub struct MotionAdapter {
    grid: MotionGrid,
    thresholds: BlobThresholds,
}

impl MotionAdapter {
    pub fn new(chunk_size: u32, thresholds: BlobThresholds) -> Self {
        Self {
            grid: MotionGrid::new(chunk_size),
            thresholds,
        }
    }

    pub fn boxed() -> Box<dyn TaskAdapter> {
        Box::new(Self::new(MOTION_CHUNK_SIZE, BlobThresholds::default()))
    }

    fn to_detection(&self, blob: &MotionBlob, frame: &Frame) -> Detection {
        let chunk = self.grid.chunk_size();
        let (top_left, bottom_right) = blob.bounding_box;
        let x = top_left.x * chunk;
        let y = top_left.y * chunk;
        let width = ((bottom_right.x + 1) * chunk).min(frame.width()) - x;
        let height = ((bottom_right.y + 1) * chunk).min(frame.height()) - y;
        let confidence = (blob.average_heat / MOTION_HEAT_SATURATION).min(1.0);
        Detection::new("motion", Some(confidence), [x, y, width, height])
    }
}

impl TaskAdapter for MotionAdapter {
    fn task(&self) -> TaskKind {
        TaskKind::HumanCues
    }

    fn library(&self) -> Library {
        Library::Motion
    }

    fn process(&mut self, frame: &Frame) -> anyhow::Result<TaskResult> {
        let heat = self.grid.process_frame(frame);
        let (grid_width, grid_height) = self.grid.grid_dims();
        let detections = blob_detector::find_blobs(&heat, grid_width, grid_height, self.thresholds)
            .iter()
            .map(|blob| self.to_detection(blob, frame))
            .collect();
        Ok(TaskResult::success(
            self.task(),
            self.library(),
            TaskOutputs::with_detections(detections),
        ))
    }
}
