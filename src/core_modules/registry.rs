// THEORY:
// The registry is a static table from a (task, library) pair to the factory
// of the adapter that implements it. It is consulted once, when a run starts,
// so a misconfigured pair fails before the camera is ever opened.
//
// Adapters are objects, not free functions: each one owns whatever detector
// state it initialises lazily on its first frame, and that state lives exactly
// as long as the run that resolved it.

use crate::core_modules::adapters::{human_cues, object_recognition, ocr};
use crate::core_modules::task_result::TaskResult;
use crate::devices::Frame;
use crate::errors::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A category of per-frame analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    HumanCues,
    ObjectRecognition,
    Ocr,
}

/// A concrete implementation backend for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Library {
    Easyocr,
    Mediapipe,
    Motion,
    Opencv,
    Tesseract,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::HumanCues => "human_cues",
            TaskKind::ObjectRecognition => "object_recognition",
            TaskKind::Ocr => "ocr",
        }
    }
}

impl Library {
    pub fn as_str(self) -> &'static str {
        match self {
            Library::Easyocr => "easyocr",
            Library::Mediapipe => "mediapipe",
            Library::Motion => "motion",
            Library::Opencv => "opencv",
            Library::Tesseract => "tesseract",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "human_cues" => Ok(TaskKind::HumanCues),
            "object_recognition" => Ok(TaskKind::ObjectRecognition),
            "ocr" => Ok(TaskKind::Ocr),
            other => Err(BenchError::Config(format!("unknown task '{other}'"))),
        }
    }
}

impl FromStr for Library {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "easyocr" => Ok(Library::Easyocr),
            "mediapipe" => Ok(Library::Mediapipe),
            "motion" => Ok(Library::Motion),
            "opencv" => Ok(Library::Opencv),
            "tesseract" => Ok(Library::Tesseract),
            other => Err(BenchError::Config(format!("unknown library '{other}'"))),
        }
    }
}

/// One (task, library) implementation.
///
/// `process` must always answer with a `TaskResult`; a missing backend is an
/// `ok = false` result, not an error. `Err` is reserved for unexpected
/// failures, which the executor turns into a failed result for that frame.
/// Adapters are not required to be thread-safe.
pub trait TaskAdapter {
    fn task(&self) -> TaskKind;
    fn library(&self) -> Library;
    fn process(&mut self, frame: &Frame) -> anyhow::Result<TaskResult>;
}

pub type AdapterFactory = fn() -> Box<dyn TaskAdapter>;

const REGISTRY: &[(TaskKind, Library, AdapterFactory)] = &[
    (TaskKind::HumanCues, Library::Mediapipe, human_cues::PoseGestureAdapter::boxed),
    (TaskKind::HumanCues, Library::Motion, human_cues::MotionAdapter::boxed),
    (TaskKind::HumanCues, Library::Opencv, human_cues::FaceCascadeAdapter::boxed),
    (TaskKind::ObjectRecognition, Library::Mediapipe, object_recognition::MediapipeAdapter::boxed),
    (TaskKind::ObjectRecognition, Library::Opencv, object_recognition::HaarCascadeAdapter::boxed),
    (TaskKind::Ocr, Library::Easyocr, ocr::EasyOcrAdapter::boxed),
    (TaskKind::Ocr, Library::Tesseract, ocr::TesseractAdapter::boxed),
];

fn lookup(task: &str, library: &str) -> Option<AdapterFactory> {
    let task = task.parse::<TaskKind>().ok()?;
    let library = library.parse::<Library>().ok()?;
    REGISTRY
        .iter()
        .find(|(t, l, _)| *t == task && *l == library)
        .map(|(_, _, factory)| *factory)
}

pub fn is_supported(task: &str, library: &str) -> bool {
    lookup(task, library).is_some()
}

/// All supported pairs as `task/library`, sorted.
pub fn supported_pairs() -> Vec<String> {
    REGISTRY
        .iter()
        .map(|(task, library, _)| format!("{task}/{library}"))
        .collect()
}

/// Builds the adapter for a pair, or a configuration error listing every
/// supported pair.
pub fn resolve(task: &str, library: &str) -> BenchResult<Box<dyn TaskAdapter>> {
    match lookup(task, library) {
        Some(factory) => Ok(factory()),
        None => Err(BenchError::Config(format!(
            "unsupported task/library: {task}/{library}. Supported: {}",
            supported_pairs().join(", ")
        ))),
    }
}
