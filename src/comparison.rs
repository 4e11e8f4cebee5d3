// THEORY:
// A comparison session turns one declarative `[comparison]` block into an
// ordered series of single runs and one summary artifact. It works in three
// phases:
//
// 1.  **Expansion**: the matrix is walked condition-major
//     (condition -> task -> library -> repeat). Pairs the registry doesn't know
//     are dropped with a warning, so a config can list more than the current
//     build supports. An empty matrix is the only configuration error, and it
//     is raised before any device is touched.
// 2.  **Execution**: before the first run of every new condition the session
//     blocks on the operator (a live setup preview or a text prompt) so the
//     scene can be changed. Each run gets its own deep copy of the base config
//     with the experiment overlaid. After each run the operator may be asked
//     for a verdict.
// 3.  **Aggregation**: whatever way the session ends (completed, cancelled at a
//     gate, quit at review, or a device error), the summary of the runs that
//     did complete is written exactly once.

use crate::config::{BenchConfig, ComparisonSection, TaskSection};
use crate::core_modules::metrics::MetricsSummary;
use crate::core_modules::registry;
use crate::devices::{CameraLease, KeySignal, MediaBackend, PreviewLease, PreviewOverlay};
use crate::errors::{BenchError, BenchResult};
use crate::operator::{self, Prompt, RunReview};
use crate::pipeline::{
    Artifacts, ExecutionSummary, ExperimentSpec, RunMetricsSection, RunPipeline, TimingSummary,
};
use crate::run_log;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

const SETUP_PREVIEW_TITLE: &str = "Condition Setup Preview";

/// How a comparison session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    Completed,
    CancelledAtGate,
    QuitAtReview,
    /// A run or a setup preview failed; later runs were not attempted.
    DeviceError,
}

/// One completed run as it appears in the comparison summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub task: String,
    pub library: String,
    pub condition: String,
    pub repeat: u32,
    pub log_path: Option<PathBuf>,
    pub summary: MetricsSummary,
    pub timing: TimingSummary,
    pub metrics: RunMetricsSection,
    pub artifacts: Artifacts,
    pub execution: ExecutionSummary,
    pub review: RunReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    /// Where the session's config came from, as given on the command line.
    pub source_config: String,
    pub generated_at: String,
    pub count: usize,
    pub ended: SessionEnd,
    pub runs: Vec<ComparisonEntry>,
}

#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub summary: ComparisonSummary,
    pub summary_path: PathBuf,
}

/// Expands the matrix into one `ExperimentSpec` per run, in execution order.
///
/// `task_libraries`, when present, names both the tasks and their libraries.
/// Otherwise every task in `tasks` is crossed with every entry of `libraries`.
pub fn expand_matrix(comparison: &ComparisonSection) -> Vec<ExperimentSpec> {
    let tasks: Vec<(&str, &[String])> = if comparison.task_libraries.is_empty() {
        comparison
            .tasks
            .iter()
            .map(|task| (task.as_str(), comparison.libraries.as_slice()))
            .collect()
    } else {
        comparison
            .task_libraries
            .tasks()
            .map(|task| {
                let libraries = comparison.task_libraries.libraries_for(task).unwrap_or_default();
                (task, libraries)
            })
            .collect()
    };

    let mut experiments = Vec::new();
    for condition in comparison.effective_conditions() {
        for &(task, libraries) in &tasks {
            for library in libraries {
                if !registry::is_supported(task, library) {
                    warn!("Skipping unsupported pair: {task}/{library}");
                    continue;
                }
                for repeat in 1..=comparison.repeats {
                    experiments.push(ExperimentSpec {
                        task: task.to_string(),
                        library: library.clone(),
                        condition: condition.clone(),
                        repeat,
                    });
                }
            }
        }
    }
    experiments
}

/// A fresh config for one run: the base, with the experiment and the
/// comparison-level run overrides laid on top. `base` is left untouched.
pub fn build_run_config(base: &BenchConfig, spec: &ExperimentSpec) -> BenchConfig {
    let mut cfg = base.clone();
    cfg.task = TaskSection {
        name: Some(spec.task.clone()),
        library: Some(spec.library.clone()),
        libraries: vec![spec.library.clone()],
    };
    base.comparison.apply_run_overrides(&mut cfg.run);
    cfg.experiment.condition = spec.condition.clone();
    cfg.experiment.repeat = spec.repeat;
    cfg
}

/// Live preview of the camera until the operator starts (SPACE) or cancels
/// (ESC or `q`) the condition.
fn preview_condition(
    backend: &mut dyn MediaBackend,
    config: &BenchConfig,
    condition: &str,
) -> BenchResult<bool> {
    let camera_index = config.camera.index;
    let max_failures = config.run.max_consecutive_read_failures;
    let mut camera = CameraLease::new(backend.open_camera(camera_index)?);
    let mut preview = PreviewLease::new(backend.open_preview(SETUP_PREVIEW_TITLE)?);
    let overlay = PreviewOverlay {
        lines: vec![
            format!("Setup condition: {condition}"),
            "SPACE=start, ESC=cancel".to_string(),
        ],
        detections: Vec::new(),
    };

    let mut consecutive_failures = 0u32;
    loop {
        let Some(frame) = camera.read()? else {
            consecutive_failures += 1;
            if max_failures > 0 && consecutive_failures >= max_failures {
                return Err(BenchError::Device(format!(
                    "webcam index {camera_index} returned no frames during condition setup"
                )));
            }
            continue;
        };
        consecutive_failures = 0;
        match preview.show(&frame, &overlay)? {
            KeySignal::Start => return Ok(true),
            KeySignal::Cancel | KeySignal::Quit => return Ok(false),
            KeySignal::Idle => {}
        }
    }
}

/// Blocks until the operator is ready for `condition`. `false` cancels the
/// rest of the session.
fn wait_for_condition(
    backend: &mut dyn MediaBackend,
    prompt: &mut dyn Prompt,
    config: &BenchConfig,
    condition: &str,
) -> BenchResult<bool> {
    if !config.comparison.interactive_conditions {
        return Ok(true);
    }
    prompt.say("");
    prompt.say(&format!("[SETUP] Condition: {condition}"));
    prompt.say("[SETUP] Set the scene now (lighting, motion, background, distance).");

    if config.comparison.condition_preview {
        prompt.say("[SETUP] Opening preview. Press SPACE to start this condition, ESC to cancel.");
        return preview_condition(backend, config, condition);
    }
    operator::confirm_condition(prompt)
}

fn drive_session(
    config: &BenchConfig,
    experiments: &[ExperimentSpec],
    backend: &mut dyn MediaBackend,
    prompt: &mut dyn Prompt,
    runs: &mut Vec<ComparisonEntry>,
) -> BenchResult<SessionEnd> {
    let total = experiments.len();
    let mut active_condition: Option<&str> = None;

    for (idx, spec) in experiments.iter().enumerate() {
        if active_condition != Some(spec.condition.as_str()) {
            if !wait_for_condition(backend, prompt, config, &spec.condition)? {
                info!("Comparison cancelled during condition setup.");
                return Ok(SessionEnd::CancelledAtGate);
            }
            active_condition = Some(spec.condition.as_str());
        }

        info!(
            "({}/{total}) task={}, library={}, condition={}, repeat={}",
            idx + 1,
            spec.task,
            spec.library,
            spec.condition,
            spec.repeat
        );

        let outcome = RunPipeline::new(build_run_config(config, spec))?.run(backend, true)?;
        let review = if config.comparison.pause_after_run {
            operator::review_run(prompt)?
        } else {
            RunReview::default()
        };
        let quit = review.wants_quit();

        let payload = outcome.payload;
        runs.push(ComparisonEntry {
            task: spec.task.clone(),
            library: spec.library.clone(),
            condition: spec.condition.clone(),
            repeat: spec.repeat,
            log_path: outcome.log_path,
            summary: payload.summary,
            timing: payload.timing,
            metrics: payload.metrics,
            artifacts: payload.artifacts,
            execution: payload.execution,
            review,
        });

        if quit {
            info!("Comparison stopped by user during run review.");
            return Ok(SessionEnd::QuitAtReview);
        }
    }
    Ok(SessionEnd::Completed)
}

/// Runs the whole comparison described by `config.comparison` and writes its
/// summary under `comparison.summary_dir`.
///
/// If a run fails, the summary of the runs completed so far is still written
/// before the error is returned.
pub fn run_comparison(
    config: &BenchConfig,
    source_config: &str,
    backend: &mut dyn MediaBackend,
    prompt: &mut dyn Prompt,
) -> BenchResult<ComparisonOutcome> {
    let experiments = expand_matrix(&config.comparison);
    if experiments.is_empty() {
        return Err(BenchError::Config(
            "no valid comparison experiments generated from config".to_string(),
        ));
    }
    info!("Running {} comparison experiments...", experiments.len());

    let mut runs = Vec::new();
    let driven = drive_session(config, &experiments, backend, prompt, &mut runs);
    let ended = match &driven {
        Ok(end) => *end,
        Err(e) => {
            warn!(error = %e, "comparison session aborted");
            SessionEnd::DeviceError
        }
    };

    let generated_at = run_log::session_timestamp(Local::now());
    let summary = ComparisonSummary {
        source_config: source_config.to_string(),
        generated_at: generated_at.clone(),
        count: runs.len(),
        ended,
        runs,
    };
    let written = run_log::write_comparison_summary(&summary, &config.comparison.summary_dir, &generated_at);

    match (driven, written) {
        (Ok(_), Ok(summary_path)) => {
            info!("Comparison complete. Summary: {}", summary_path.display());
            Ok(ComparisonOutcome {
                summary,
                summary_path,
            })
        }
        (Ok(_), Err(write_error)) => Err(write_error),
        (Err(run_error), Ok(summary_path)) => {
            info!("Partial comparison summary: {}", summary_path.display());
            Err(run_error)
        }
        (Err(run_error), Err(write_error)) => {
            warn!(error = %write_error, "failed to write comparison summary");
            Err(run_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskLibraries;
    use crate::operator::{ScriptedPrompt, Verdict};
    use crate::synthetic::SyntheticBackend;
    use std::collections::HashSet;
    use std::path::Path;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn session_config(root: &Path, conditions: &[&str], repeats: u32) -> BenchConfig {
        let mut cfg = BenchConfig::default();
        cfg.run.log_dir = root.join("logs");
        cfg.comparison.summary_dir = root.join("summaries");
        cfg.comparison.tasks = strings(&["ocr"]);
        cfg.comparison.libraries = strings(&["tesseract"]);
        cfg.comparison.conditions = strings(conditions);
        cfg.comparison.repeats = repeats;
        cfg.comparison.max_frames = Some(3);
        cfg.comparison.interactive_conditions = false;
        cfg.comparison.pause_after_run = false;
        cfg
    }

    fn summary_files(root: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(root.join("summaries"))
            .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
            .unwrap_or_default()
    }

    #[test]
    fn task_libraries_matrix_is_condition_major_and_filtered() {
        let comparison = ComparisonSection {
            task_libraries: TaskLibraries::new(vec![
                ("ocr".into(), strings(&["tesseract", "bogus", "easyocr"])),
                ("object_recognition".into(), strings(&["opencv"])),
            ]),
            conditions: strings(&["bright", "dim"]),
            repeats: 2,
            ..Default::default()
        };
        let matrix = expand_matrix(&comparison);
        // 2 conditions x (2 + 1 supported libraries) x 2 repeats
        assert_eq!(matrix.len(), 12);
        assert!(matrix.iter().all(|s| s.library != "bogus"));

        let distinct: HashSet<_> = matrix.iter().collect();
        assert_eq!(distinct.len(), matrix.len());

        assert!(matrix[..6].iter().all(|s| s.condition == "bright"));
        assert!(matrix[6..].iter().all(|s| s.condition == "dim"));
        let first: Vec<(&str, &str, u32)> = matrix[..6]
            .iter()
            .map(|s| (s.task.as_str(), s.library.as_str(), s.repeat))
            .collect();
        assert_eq!(
            first,
            vec![
                ("ocr", "tesseract", 1),
                ("ocr", "tesseract", 2),
                ("ocr", "easyocr", 1),
                ("ocr", "easyocr", 2),
                ("object_recognition", "opencv", 1),
                ("object_recognition", "opencv", 2),
            ]
        );
    }

    #[test]
    fn flat_matrix_crosses_tasks_with_libraries() {
        let comparison = ComparisonSection {
            tasks: strings(&["ocr", "human_cues"]),
            libraries: strings(&["tesseract", "motion"]),
            ..Default::default()
        };
        let matrix = expand_matrix(&comparison);
        let pairs: Vec<(&str, &str)> = matrix
            .iter()
            .map(|s| (s.task.as_str(), s.library.as_str()))
            .collect();
        assert_eq!(pairs, vec![("ocr", "tesseract"), ("human_cues", "motion")]);
        assert!(matrix.iter().all(|s| s.condition == "default" && s.repeat == 1));
    }

    #[test]
    fn zero_repeats_yields_an_empty_matrix() {
        let comparison = ComparisonSection {
            tasks: strings(&["ocr"]),
            libraries: strings(&["tesseract"]),
            repeats: 0,
            ..Default::default()
        };
        assert!(expand_matrix(&comparison).is_empty());
    }

    #[test]
    fn run_config_is_a_fresh_overlay() {
        let mut base = BenchConfig::default();
        base.task.name = Some("object_recognition".into());
        base.comparison.max_frames = Some(9);
        base.comparison.record_video = Some(true);
        let spec = ExperimentSpec {
            task: "ocr".into(),
            library: "easyocr".into(),
            condition: "dim".into(),
            repeat: 3,
        };

        let cfg = build_run_config(&base, &spec);
        assert_eq!(cfg.task.name.as_deref(), Some("ocr"));
        assert_eq!(cfg.task.library.as_deref(), Some("easyocr"));
        assert_eq!(cfg.task.libraries, strings(&["easyocr"]));
        assert_eq!(cfg.run.max_frames, 9);
        assert!(cfg.run.record_video);
        assert_eq!(cfg.experiment.condition, "dim");
        assert_eq!(cfg.experiment.repeat, 3);

        assert_eq!(base.task.name.as_deref(), Some("object_recognition"));
        assert_eq!(base.run.max_frames, 120);
    }

    #[test]
    fn empty_matrix_fails_before_any_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = session_config(dir.path(), &["a"], 1);
        cfg.comparison.libraries = strings(&["bogus"]);
        let mut backend = SyntheticBackend::default();
        let err = run_comparison(&cfg, "cfg.toml", &mut backend, &mut ScriptedPrompt::default()).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
        assert_eq!(backend.stats().cameras_opened, 0);
        assert!(summary_files(dir.path()).is_empty());
    }

    #[test]
    fn full_session_runs_every_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = session_config(dir.path(), &["bright", "dim"], 2);
        let mut backend = SyntheticBackend::default();
        let outcome = run_comparison(&cfg, "cfg.toml", &mut backend, &mut ScriptedPrompt::default()).unwrap();

        let summary = &outcome.summary;
        assert_eq!(summary.count, 4);
        assert_eq!(summary.ended, SessionEnd::Completed);
        assert_eq!(summary.source_config, "cfg.toml");
        for entry in &summary.runs {
            assert_eq!(entry.execution.processed_frames, 3);
            assert!(entry.log_path.as_ref().unwrap().exists());
            assert_eq!(entry.review, RunReview::default());
        }
        let stats = backend.stats();
        assert_eq!(stats.cameras_opened, 4);
        assert_eq!(stats.cameras_released, 4);
        assert_eq!(summary_files(dir.path()), vec![outcome.summary_path]);
    }

    #[test]
    fn cancel_at_a_gate_keeps_completed_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = session_config(dir.path(), &["bright", "dim"], 1);
        cfg.comparison.interactive_conditions = true;
        cfg.comparison.condition_preview = false;
        let mut prompt = ScriptedPrompt::new(["", "q"]);
        let outcome = run_comparison(&cfg, "cfg.toml", &mut SyntheticBackend::default(), &mut prompt).unwrap();

        assert_eq!(outcome.summary.ended, SessionEnd::CancelledAtGate);
        assert_eq!(outcome.summary.count, 1);
        assert_eq!(outcome.summary.runs[0].condition, "bright");
        assert_eq!(prompt.asked().len(), 2);
    }

    #[test]
    fn gate_is_asked_once_per_condition() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = session_config(dir.path(), &["bright"], 3);
        cfg.comparison.interactive_conditions = true;
        cfg.comparison.condition_preview = false;
        let mut prompt = ScriptedPrompt::new([""]);
        let outcome = run_comparison(&cfg, "cfg.toml", &mut SyntheticBackend::default(), &mut prompt).unwrap();
        assert_eq!(outcome.summary.count, 3);
        assert_eq!(prompt.asked().len(), 1);
    }

    #[test]
    fn quit_at_review_records_the_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = session_config(dir.path(), &["bright"], 3);
        cfg.comparison.pause_after_run = true;
        let mut prompt = ScriptedPrompt::new(["c", "looks fine", "q"]);
        let outcome = run_comparison(&cfg, "cfg.toml", &mut SyntheticBackend::default(), &mut prompt).unwrap();

        let summary = &outcome.summary;
        assert_eq!(summary.ended, SessionEnd::QuitAtReview);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.runs[0].review.verdict, Some(Verdict::Correct));
        assert_eq!(summary.runs[0].review.notes.as_deref(), Some("looks fine"));
        assert_eq!(summary.runs[1].review.verdict, Some(Verdict::Quit));
    }

    #[test]
    fn device_error_still_writes_the_summary() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = session_config(dir.path(), &["bright"], 2);
        let mut backend = SyntheticBackend::default().without_camera();
        let err = run_comparison(&cfg, "cfg.toml", &mut backend, &mut ScriptedPrompt::default()).unwrap_err();
        assert!(matches!(err, BenchError::Device(_)));

        let files = summary_files(dir.path());
        assert_eq!(files.len(), 1);
        let written: ComparisonSummary =
            serde_json::from_str(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
        assert_eq!(written.ended, SessionEnd::DeviceError);
        assert_eq!(written.count, 0);
    }

    #[test]
    fn preview_gate_waits_for_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = session_config(dir.path(), &["bright"], 1);
        cfg.comparison.interactive_conditions = true;
        cfg.comparison.condition_preview = true;
        let mut backend = SyntheticBackend::default().with_keys([KeySignal::Idle, KeySignal::Idle, KeySignal::Start]);
        let outcome = run_comparison(&cfg, "cfg.toml", &mut backend, &mut ScriptedPrompt::default()).unwrap();
        assert_eq!(outcome.summary.count, 1);

        let stats = backend.stats();
        // One camera for the setup preview, one for the run.
        assert_eq!(stats.cameras_opened, 2);
        assert_eq!(stats.cameras_released, 2);
        assert_eq!(stats.previews_closed, 1);
        assert_eq!(stats.frames_shown, 3);
        assert_eq!(stats.overlays[0].lines[0], "Setup condition: bright");
        assert_eq!(stats.overlays[0].lines[1], "SPACE=start, ESC=cancel");
    }

    #[test]
    fn preview_gate_escape_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = session_config(dir.path(), &["bright"], 1);
        cfg.comparison.interactive_conditions = true;
        let mut backend = SyntheticBackend::default().with_keys([KeySignal::Cancel]);
        let outcome = run_comparison(&cfg, "cfg.toml", &mut backend, &mut ScriptedPrompt::default()).unwrap();
        assert_eq!(outcome.summary.ended, SessionEnd::CancelledAtGate);
        assert_eq!(outcome.summary.count, 0);
        assert_eq!(backend.stats().cameras_released, 1);
    }
}
