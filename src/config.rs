// THEORY:
// The `config` module is the single source of truth for how a run or a
// comparison session is parameterised. The on-disk format is TOML, but nothing
// past `BenchConfig::from_path` ever looks at the file again: the executor and
// the orchestrator only see these typed sections.
//
// Every section and every field is optional. Missing values fall back to the
// same defaults the harness has always used, so a config file only has to
// spell out what an experiment actually changes.
//
// `BenchConfig` is `Clone` on purpose: a comparison session builds the config
// of each run by cloning the base and overlaying the experiment, which keeps
// one run from ever leaking state into the next.

use crate::errors::{BenchError, BenchResult};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_FRAMES: u32 = 120;
pub const DEFAULT_MAX_CONSECUTIVE_READ_FAILURES: u32 = 30;
pub const DEFAULT_CONDITION: &str = "default";

/// The full configuration of a run or a comparison session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub camera: CameraSection,
    pub run: RunSection,
    pub task: TaskSection,
    pub experiment: ExperimentSection,
    pub comparison: ComparisonSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    /// Numeric device index handed to the capture backend.
    pub index: i32,
}

/// Limits and artifact switches for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Number of frames dispatched to the task before the run stops.
    pub max_frames: u32,
    /// Optional wall-clock bound in seconds, polled once per loop iteration.
    pub max_seconds: Option<f64>,
    pub record_video: bool,
    pub video_dir: PathBuf,
    pub show_preview: bool,
    pub log_dir: PathBuf,
    /// Consecutive failed camera reads tolerated before the run is aborted.
    /// `0` disables the check and leaves only the frame/time limits.
    pub max_consecutive_read_failures: u32,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            max_seconds: None,
            record_video: false,
            video_dir: PathBuf::from("data/captures"),
            show_preview: false,
            log_dir: PathBuf::from("data/logs"),
            max_consecutive_read_failures: DEFAULT_MAX_CONSECUTIVE_READ_FAILURES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSection {
    pub name: Option<String>,
    pub library: Option<String>,
    pub libraries: Vec<String>,
}

impl TaskSection {
    /// The configured task name. A run cannot start without one.
    pub fn task_name(&self) -> BenchResult<String> {
        non_blank(self.name.as_deref())
            .map(str::to_string)
            .ok_or_else(|| BenchError::Config("task config must define 'task.name'".to_string()))
    }
}

/// Resolves the single library a run should use.
///
/// An explicit `library` wins over the `libraries` list; otherwise the first
/// list entry is taken.
pub fn select_library(task: &TaskSection) -> BenchResult<String> {
    if let Some(explicit) = non_blank(task.library.as_deref()) {
        return Ok(explicit.to_string());
    }
    if let Some(first) = task.libraries.iter().find_map(|l| non_blank(Some(l))) {
        return Ok(first.to_string());
    }
    Err(BenchError::Config(
        "task config must define 'library' or a non-empty 'libraries'".to_string(),
    ))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSection {
    pub condition: String,
    pub repeat: u32,
}

impl Default for ExperimentSection {
    fn default() -> Self {
        Self {
            condition: DEFAULT_CONDITION.to_string(),
            repeat: 1,
        }
    }
}

/// Declarative description of a comparison matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonSection {
    pub tasks: Vec<String>,
    /// Per-task allow-list of libraries. Takes precedence over `tasks` and `libraries`.
    pub task_libraries: TaskLibraries,
    pub libraries: Vec<String>,
    pub conditions: Vec<String>,
    pub repeats: u32,
    pub interactive_conditions: bool,
    pub condition_preview: bool,
    pub pause_after_run: bool,
    pub summary_dir: PathBuf,

    // --- Per-run overrides applied on top of the base `run` section ---
    pub max_frames: Option<u32>,
    pub max_seconds: Option<f64>,
    pub record_video: Option<bool>,
    pub video_dir: Option<PathBuf>,
    pub show_preview: Option<bool>,
}

impl Default for ComparisonSection {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            task_libraries: TaskLibraries::default(),
            libraries: Vec::new(),
            conditions: vec![DEFAULT_CONDITION.to_string()],
            repeats: 1,
            interactive_conditions: true,
            condition_preview: true,
            pause_after_run: true,
            summary_dir: PathBuf::from("results/summaries"),
            max_frames: None,
            max_seconds: None,
            record_video: None,
            video_dir: None,
            show_preview: None,
        }
    }
}

impl ComparisonSection {
    /// Conditions to iterate, never empty.
    pub fn effective_conditions(&self) -> Vec<String> {
        if self.conditions.is_empty() {
            vec![DEFAULT_CONDITION.to_string()]
        } else {
            self.conditions.clone()
        }
    }

    /// Overlays the comparison-level overrides onto a run section.
    pub fn apply_run_overrides(&self, run: &mut RunSection) {
        if let Some(max_frames) = self.max_frames {
            run.max_frames = max_frames;
        }
        if let Some(max_seconds) = self.max_seconds {
            run.max_seconds = Some(max_seconds);
        }
        if let Some(record_video) = self.record_video {
            run.record_video = record_video;
        }
        if let Some(video_dir) = &self.video_dir {
            run.video_dir = video_dir.clone();
        }
        if let Some(show_preview) = self.show_preview {
            run.show_preview = show_preview;
        }
    }
}

/// An insertion-ordered `task -> [library]` mapping.
///
/// Matrix expansion walks tasks in the order they were written, so this can't
/// be a hash map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskLibraries(Vec<(String, Vec<String>)>);

impl TaskLibraries {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(task, _)| task.as_str())
    }

    pub fn libraries_for(&self, task: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(t, _)| t == task)
            .map(|(_, libs)| libs.as_slice())
    }
}

impl Serialize for TaskLibraries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (task, libs) in &self.0 {
            map.serialize_entry(task, libs)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TaskLibraries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = TaskLibraries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table mapping task names to library lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((task, libs)) = access.next_entry::<String, Vec<String>>()? {
                    entries.push((task, libs));
                }
                Ok(TaskLibraries(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

impl BenchConfig {
    pub fn from_path(path: &Path) -> BenchResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!("unable to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> BenchResult<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = BenchConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.camera.index, 0);
        assert_eq!(cfg.run.max_frames, 120);
        assert_eq!(cfg.run.max_seconds, None);
        assert_eq!(cfg.run.video_dir, PathBuf::from("data/captures"));
        assert_eq!(cfg.experiment.condition, "default");
        assert_eq!(cfg.experiment.repeat, 1);
        assert_eq!(cfg.comparison.conditions, vec!["default".to_string()]);
        assert!(cfg.comparison.interactive_conditions);
        assert!(cfg.comparison.pause_after_run);
    }

    #[test]
    fn parses_a_full_comparison_file() {
        let raw = r#"
            [camera]
            index = 1

            [run]
            max_frames = 30
            max_seconds = 12.5
            record_video = true

            [task]
            name = "ocr"
            libraries = ["tesseract"]

            [comparison]
            conditions = ["bright", "dim"]
            repeats = 3
            pause_after_run = false
            max_frames = 10

            [comparison.task_libraries]
            ocr = ["tesseract", "easyocr"]
            object_recognition = ["opencv"]
        "#;
        let cfg = BenchConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.camera.index, 1);
        assert_eq!(cfg.run.max_seconds, Some(12.5));
        assert!(cfg.run.record_video);
        assert_eq!(cfg.comparison.repeats, 3);
        assert_eq!(cfg.comparison.max_frames, Some(10));
        assert!(!cfg.comparison.pause_after_run);

        let tasks: Vec<&str> = cfg.comparison.task_libraries.tasks().collect();
        assert_eq!(tasks, vec!["ocr", "object_recognition"]);
        assert_eq!(
            cfg.comparison.task_libraries.libraries_for("ocr").unwrap(),
            &["tesseract".to_string(), "easyocr".to_string()]
        );
    }

    #[test]
    fn shipped_configs_parse() {
        let single = BenchConfig::from_toml_str(include_str!("../configs/single_run.toml")).unwrap();
        assert_eq!(single.task.task_name().unwrap(), "object_recognition");
        assert_eq!(select_library(&single.task).unwrap(), "opencv");

        let comparison = BenchConfig::from_toml_str(include_str!("../configs/comparison.toml")).unwrap();
        assert_eq!(comparison.comparison.task_libraries.tasks().count(), 3);
        assert_eq!(comparison.comparison.effective_conditions().len(), 3);
    }

    #[test]
    fn task_libraries_keep_written_order() {
        let raw = r#"
            [comparison.task_libraries]
            zeta = ["a"]
            alpha = ["b"]
            mid = ["c"]
        "#;
        let cfg = BenchConfig::from_toml_str(raw).unwrap();
        let tasks: Vec<&str> = cfg.comparison.task_libraries.tasks().collect();
        assert_eq!(tasks, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn select_library_prefers_explicit_library() {
        let task = TaskSection {
            library: Some("mediapipe".into()),
            libraries: vec!["opencv".into()],
            ..Default::default()
        };
        assert_eq!(select_library(&task).unwrap(), "mediapipe");
    }

    #[test]
    fn select_library_falls_back_to_first_list_entry() {
        let task = TaskSection {
            libraries: vec!["easyocr".into(), "tesseract".into()],
            ..Default::default()
        };
        assert_eq!(select_library(&task).unwrap(), "easyocr");
    }

    #[test]
    fn select_library_without_any_library_is_a_config_error() {
        let err = select_library(&TaskSection::default()).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));

        let blank = TaskSection {
            library: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(select_library(&blank), Err(BenchError::Config(_))));
    }

    #[test]
    fn missing_task_name_is_a_config_error() {
        assert!(matches!(
            TaskSection::default().task_name(),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn empty_conditions_fall_back_to_default() {
        let comparison = ComparisonSection {
            conditions: Vec::new(),
            ..Default::default()
        };
        assert_eq!(comparison.effective_conditions(), vec!["default".to_string()]);
    }

    #[test]
    fn overrides_only_touch_configured_fields() {
        let comparison = ComparisonSection {
            max_frames: Some(7),
            show_preview: Some(true),
            ..Default::default()
        };
        let mut run = RunSection::default();
        comparison.apply_run_overrides(&mut run);
        assert_eq!(run.max_frames, 7);
        assert!(run.show_preview);
        assert!(!run.record_video);
        assert_eq!(run.max_seconds, None);
    }
}
