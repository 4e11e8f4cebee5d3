// THEORY:
// Every adapter, whatever the task and whatever the library behind it, answers
// a frame with the same `TaskResult` shape. This is what lets the executor count
// failures and tally detections without knowing anything about OCR engines or
// cascade classifiers.
//
// The invariant `ok == false  <=>  error is set and outputs are empty` is
// enforced by construction: fields are private and the only way to build a
// result is through `success` or `failure`.

use crate::core_modules::registry::{Library, TaskKind};
use serde::{Deserialize, Serialize};

/// One labeled, localized finding within a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// In `[0, 1]` when the backend reports a score.
    pub confidence: Option<f64>,
    /// `[x, y, width, height]` in image pixels, origin top-left.
    pub bbox: [u32; 4],
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: Option<f64>, bbox: [u32; 4]) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
            bbox,
        }
    }

    /// Caption used when drawing the detection on a preview frame.
    pub fn caption(&self) -> String {
        match self.confidence {
            Some(conf) => format!("{} {:.2}", self.label, conf),
            None => self.label.clone(),
        }
    }
}

/// Task-specific payload of a successful result. Only the keys a task
/// produces are present once serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<Detection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces: Option<Vec<Detection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gesture: Option<String>,
}

impl TaskOutputs {
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections: Some(detections),
            ..Default::default()
        }
    }

    pub fn with_faces(faces: Vec<Detection>) -> Self {
        Self {
            faces: Some(faces),
            ..Default::default()
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Standardized per-frame output returned by every task adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    task: TaskKind,
    library: Library,
    ok: bool,
    outputs: TaskOutputs,
    error: Option<String>,
}

impl TaskResult {
    pub fn success(task: TaskKind, library: Library, outputs: TaskOutputs) -> Self {
        Self {
            task,
            library,
            ok: true,
            outputs,
            error: None,
        }
    }

    pub fn failure(task: TaskKind, library: Library, error: impl Into<String>) -> Self {
        Self {
            task,
            library,
            ok: false,
            outputs: TaskOutputs::default(),
            error: Some(error.into()),
        }
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn library(&self) -> Library {
        self.library
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn outputs(&self) -> &TaskOutputs {
        &self.outputs
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Detections that count towards the run's detection summary.
    /// Only the `detections` key is tallied; failures have none.
    pub fn detections(&self) -> &[Detection] {
        if !self.ok {
            return &[];
        }
        self.outputs.detections.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_has_error_and_no_outputs() {
        let result = TaskResult::failure(TaskKind::Ocr, Library::Tesseract, "boom");
        assert!(!result.ok());
        assert_eq!(result.error(), Some("boom"));
        assert!(result.outputs().is_empty());
        assert!(result.detections().is_empty());
    }

    #[test]
    fn success_has_no_error() {
        let result = TaskResult::success(
            TaskKind::Ocr,
            Library::Tesseract,
            TaskOutputs::with_text("hi"),
        );
        assert!(result.ok());
        assert_eq!(result.error(), None);
        assert_eq!(result.outputs().text.as_deref(), Some("hi"));
    }

    #[test]
    fn serializes_with_the_standard_keys() {
        let result = TaskResult::success(
            TaskKind::ObjectRecognition,
            Library::Opencv,
            TaskOutputs::with_detections(vec![Detection::new("face", None, [1, 2, 3, 4])]),
        );
        let value = serde_json::to_value(&result).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        for key in ["task", "library", "ok", "outputs", "error"] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(value["task"], "object_recognition");
        assert_eq!(value["library"], "opencv");
        assert_eq!(value["outputs"]["detections"][0]["bbox"][2], 3);
        assert!(value["outputs"].get("text").is_none());
    }

    #[test]
    fn confidence_is_clamped_and_captioned() {
        let det = Detection::new("person", Some(1.7), [0, 0, 1, 1]);
        assert_eq!(det.confidence, Some(1.0));
        assert_eq!(det.caption(), "person 1.00");
        assert_eq!(Detection::new("face", None, [0, 0, 1, 1]).caption(), "face");
    }
}
