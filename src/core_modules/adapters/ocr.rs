use crate::core_modules::registry::{Library, TaskAdapter, TaskKind};
use crate::core_modules::task_result::{TaskOutputs, TaskResult};
use crate::devices::Frame;

// Both OCR engines are placeholders for now: they accept every frame and
// report empty text, which keeps the OCR rows of a comparison matrix runnable.

pub struct TesseractAdapter;

impl TesseractAdapter {
    pub fn boxed() -> Box<dyn TaskAdapter> {
        Box::new(Self)
    }
}

impl TaskAdapter for TesseractAdapter {
    fn task(&self) -> TaskKind {
        TaskKind::Ocr
    }

    fn library(&self) -> Library {
        Library::Tesseract
    }

    fn process(&mut self, _frame: &Frame) -> anyhow::Result<TaskResult> {
        Ok(TaskResult::success(
            self.task(),
            self.library(),
            TaskOutputs::with_text(""),
        ))
    }
}

pub struct EasyOcrAdapter;

impl EasyOcrAdapter {
    pub fn boxed() -> Box<dyn TaskAdapter> {
        Box::new(Self)
    }
}

impl TaskAdapter for EasyOcrAdapter {
    fn task(&self) -> TaskKind {
        TaskKind::Ocr
    }

    fn library(&self) -> Library {
        Library::Easyocr
    }

    fn process(&mut self, _frame: &Frame) -> anyhow::Result<TaskResult> {
        Ok(TaskResult::success(
            self.task(),
            self.library(),
            TaskOutputs::with_text(""),
        ))
    }
}
