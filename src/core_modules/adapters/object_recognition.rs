use crate::core_modules::registry::{Library, TaskAdapter, TaskKind};
use crate::core_modules::task_result::TaskResult;
use crate::devices::Frame;

#[cfg(feature = "opencv")]
use crate::core_modules::task_result::TaskOutputs;
#[cfg(feature = "opencv")]
use crate::opencv_backend::LazyCascades;

/// Classical Haar cascades: frontal faces are labeled `face`, full bodies
/// `person`. Cascades load on the first frame and stay loaded for the run.
#[derive(Default)]
pub struct HaarCascadeAdapter {
    #[cfg(feature = "opencv")]
    cascades: LazyCascades,
}

impl HaarCascadeAdapter {
    pub fn boxed() -> Box<dyn TaskAdapter> {
        Box::new(Self::default())
    }
}

impl TaskAdapter for HaarCascadeAdapter {
    fn task(&self) -> TaskKind {
        TaskKind::ObjectRecognition
    }

    fn library(&self) -> Library {
        Library::Opencv
    }

    #[cfg(feature = "opencv")]
    fn process(&mut self, frame: &Frame) -> anyhow::Result<TaskResult> {
        let Some(cascades) = self.cascades.get(true) else {
            return Ok(TaskResult::failure(
                TaskKind::ObjectRecognition,
                Library::Opencv,
                super::CASCADES_MISSING,
            ));
        };
        let detections = cascades.detect(frame)?;
        Ok(TaskResult::success(
            TaskKind::ObjectRecognition,
            Library::Opencv,
            TaskOutputs::with_detections(detections),
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

/// There is no MediaPipe runtime for Rust; every frame reports it as missing.
pub struct MediapipeAdapter;

impl MediapipeAdapter {
    pub fn boxed() -> Box<dyn TaskAdapter> {
        Box::new(Self)
    }
}

impl TaskAdapter for MediapipeAdapter {
    fn task(&self) -> TaskKind {
        TaskKind::ObjectRecognition
    }

    fn library(&self) -> Library {
        Library::Mediapipe
    }

    fn process(&mut self, _frame: &Frame) -> anyhow::Result<TaskResult> {
        Ok(TaskResult::failure(
            self.task(),
            self.library(),
            "mediapipe is not available in this build; no MediaPipe runtime is linked.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mediapipe_reports_missing_backend_as_failed_result() {
        let mut adapter = MediapipeAdapter;
        let result = adapter.process(&Frame::new(4, 4)).unwrap();
        assert!(!result.ok());
        assert!(result.error().unwrap().contains("mediapipe"));
        assert!(result.outputs().is_empty());
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn haar_without_opencv_is_a_failed_result() {
        let mut adapter = HaarCascadeAdapter::default();
        let result = adapter.process(&Frame::new(4, 4)).unwrap();
        assert!(!result.ok());
        assert!(result.error().unwrap().contains("OpenCV"));
    }
}
