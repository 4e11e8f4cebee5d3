// THEORY:
// The `pipeline` module is the top-level API for a single run: one task, one
// library, one condition, one repeat, against live camera frames. It owns the
// whole life of that run:
//
//   OPENING  -> the camera is acquired (a failure aborts the run).
//   RUNNING  -> frames are read, dispatched to the adapter, tallied, and
//               optionally recorded and previewed, until the frame budget,
//               the wall-clock limit or the operator ends the loop.
//   STOPPING -> the video writer is flushed and released.
//   CLOSED   -> the camera and the preview are released.
//
// STOPPING and CLOSED are not steps the loop has to remember to take: the
// devices live in leases that release on drop, so they run on every exit path,
// including an early return with a device error.
//
// Everything that can be wrong with the configuration (unknown task/library
// pair, missing task name) is checked in `RunPipeline::new`, before any device
// is touched.

use crate::config::{BenchConfig, select_library};
use crate::core_modules::metrics::{MetricsSummary, RunMetrics};
use crate::core_modules::registry::{self, TaskAdapter};
use crate::core_modules::task_result::{Detection, TaskResult};
use crate::devices::{CameraLease, KeySignal, MediaBackend, PreviewLease, PreviewOverlay, VideoLease};
use crate::errors::{BenchError, BenchResult};
use crate::run_log;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Nominal frame rate of recorded videos, independent of the capture rate.
pub const VIDEO_FPS: f64 = 20.0;
const PREVIEW_TITLE: &str = "Run Preview";

/// Identity of one run inside a comparison matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub task: String,
    pub library: String,
    pub condition: String,
    pub repeat: u32,
}

/// Why the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FrameLimit,
    TimeLimit,
    OperatorStop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub task: String,
    pub library: String,
    /// Frames whose result came back `ok`.
    pub processed_frames: u64,
    /// `read_failures + task_failures`.
    pub failed_frames: u64,
    pub read_failures: u64,
    pub task_failures: u64,
    pub stop_reason: StopReason,
    pub last_result: Option<TaskResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLimit {
    pub max_frames: u32,
    pub max_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    /// Time spent opening the camera.
    pub open_ms: f64,
    pub run_limit: RunLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub frames_with_detection: u64,
    /// `frames_with_detection / max(frame_count, 1)`.
    pub detection_rate: f64,
    pub label_counts: BTreeMap<String, u64>,
    pub avg_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetricsSection {
    pub detection_summary: DetectionSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub video_path: Option<PathBuf>,
}

/// The full structured result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPayload {
    pub config: BenchConfig,
    pub experiment: ExperimentSpec,
    pub execution: ExecutionSummary,
    pub timing: TimingSummary,
    pub metrics: RunMetricsSection,
    pub artifacts: Artifacts,
    pub summary: MetricsSummary,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub payload: RunPayload,
    /// Set when the payload was written to disk.
    pub log_path: Option<PathBuf>,
}

/// Running detection tallies for one run.
#[derive(Debug, Default)]
struct DetectionTally {
    frames_with_detection: u64,
    label_counts: BTreeMap<String, u64>,
    confidences: Vec<f64>,
}

impl DetectionTally {
    fn record(&mut self, detections: &[Detection]) {
        if detections.is_empty() {
            return;
        }
        self.frames_with_detection += 1;
        for det in detections {
            *self.label_counts.entry(det.label.clone()).or_default() += 1;
            if let Some(conf) = det.confidence {
                self.confidences.push(conf);
            }
        }
    }

    fn summarize(self, frame_count: u64) -> DetectionSummary {
        let avg_confidence = if self.confidences.is_empty() {
            None
        } else {
            Some(self.confidences.iter().sum::<f64>() / self.confidences.len() as f64)
        };
        DetectionSummary {
            frames_with_detection: self.frames_with_detection,
            detection_rate: self.frames_with_detection as f64 / frame_count.max(1) as f64,
            label_counts: self.label_counts,
            avg_confidence,
        }
    }
}

/// A validated, ready-to-run single run.
pub struct RunPipeline {
    config: BenchConfig,
    spec: ExperimentSpec,
    adapter: Box<dyn TaskAdapter>,
}

impl RunPipeline {
    /// Validates the configuration and resolves the adapter. No device is
    /// touched here.
    pub fn new(config: BenchConfig) -> BenchResult<Self> {
        let task = config.task.task_name()?;
        let library = select_library(&config.task)?;
        if config.experiment.repeat == 0 {
            return Err(BenchError::Config("experiment.repeat must be at least 1".to_string()));
        }
        let adapter = registry::resolve(&task, &library)?;
        let spec = ExperimentSpec {
            task,
            library,
            condition: config.experiment.condition.clone(),
            repeat: config.experiment.repeat,
        };
        Ok(Self { config, spec, adapter })
    }

    pub fn spec(&self) -> &ExperimentSpec {
        &self.spec
    }

    /// Executes the run. When `write_log` is set the payload is written
    /// exactly once, after every device has been released.
    pub fn run(mut self, backend: &mut dyn MediaBackend, write_log: bool) -> BenchResult<RunOutcome> {
        let run_cfg = self.config.run.clone();
        let spec = self.spec.clone();

        // --- OPENING ---
        let camera_index = self.config.camera.index;
        info!("Opening webcam index {camera_index}...");
        let open_started = Instant::now();
        let mut camera = CameraLease::new(backend.open_camera(camera_index)?);
        let open_ms = open_started.elapsed().as_secs_f64() * 1000.0;
        info!("Webcam opened in {open_ms:.1} ms");

        let mut preview = if run_cfg.show_preview {
            Some(PreviewLease::new(backend.open_preview(PREVIEW_TITLE)?))
        } else {
            None
        };
        let mut writer: Option<VideoLease> = None;
        let mut video_path: Option<PathBuf> = None;

        // --- RUNNING ---
        let mut metrics = RunMetrics::new();
        let capture_started = Instant::now();
        let mut tally = DetectionTally::default();
        let mut dispatched: u64 = 0;
        let mut processed: u64 = 0;
        let mut read_failures: u64 = 0;
        let mut task_failures: u64 = 0;
        let mut consecutive_read_failures: u32 = 0;
        let mut last_result: Option<TaskResult> = None;

        let stop_reason = loop {
            if dispatched >= u64::from(run_cfg.max_frames) {
                break StopReason::FrameLimit;
            }
            if let Some(max_seconds) = run_cfg.max_seconds {
                if capture_started.elapsed().as_secs_f64() >= max_seconds {
                    break StopReason::TimeLimit;
                }
            }

            let frame = match camera.read() {
                Ok(Some(frame)) => {
                    consecutive_read_failures = 0;
                    frame
                }
                outcome => {
                    if let Err(e) = outcome {
                        debug!(error = %e, "frame read failed");
                    }
                    read_failures += 1;
                    consecutive_read_failures += 1;
                    let limit = run_cfg.max_consecutive_read_failures;
                    if limit > 0 && consecutive_read_failures >= limit {
                        return Err(BenchError::Device(format!(
                            "webcam index {camera_index} opened but returned no frames for {limit} consecutive reads"
                        )));
                    }
                    continue;
                }
            };

            if run_cfg.record_video && writer.is_none() {
                let stem = run_log::artifact_stem(
                    &spec.task,
                    &spec.library,
                    &spec.condition,
                    spec.repeat,
                    &run_log::run_timestamp(Local::now()),
                );
                let path = run_cfg.video_dir.join(format!("{stem}.mp4"));
                let (width, height) = frame.dimensions();
                writer = Some(VideoLease::new(
                    backend.open_video_writer(&path, VIDEO_FPS, width, height)?,
                ));
                info!(path = %path.display(), "recording video");
                video_path = Some(path);
            }

            dispatched += 1;
            let started = Instant::now();
            let result = match self.adapter.process(&frame) {
                Ok(result) => result,
                Err(e) => TaskResult::failure(self.adapter.task(), self.adapter.library(), format!("{e:#}")),
            };
            metrics.record_frame(started.elapsed().as_secs_f64() * 1000.0);

            if result.ok() {
                processed += 1;
            } else {
                task_failures += 1;
                debug!(frame = dispatched, error = ?result.error(), "task failed on frame");
            }
            tally.record(result.detections());
            let result = last_result.insert(result);

            if let Some(writer) = writer.as_mut() {
                writer.write(&frame)?;
            }

            if let Some(preview) = preview.as_mut() {
                let overlay = PreviewOverlay {
                    lines: vec![
                        format!("{}/{} | {} | r{}", spec.task, spec.library, spec.condition, spec.repeat),
                        format!("frame {dispatched} | q=stop"),
                    ],
                    detections: result.detections().to_vec(),
                };
                if matches!(preview.show(&frame, &overlay)?, KeySignal::Quit | KeySignal::Cancel) {
                    info!("Preview quit requested; ending run early.");
                    break StopReason::OperatorStop;
                }
            }
        };

        // --- STOPPING / CLOSED ---
        drop(writer);
        drop(camera);
        drop(preview);

        let summary = metrics.summary();
        let payload = RunPayload {
            config: self.config,
            experiment: spec.clone(),
            execution: ExecutionSummary {
                task: spec.task.clone(),
                library: spec.library.clone(),
                processed_frames: processed,
                failed_frames: read_failures + task_failures,
                read_failures,
                task_failures,
                stop_reason,
                last_result,
            },
            timing: TimingSummary {
                open_ms,
                run_limit: RunLimit {
                    max_frames: run_cfg.max_frames,
                    max_seconds: run_cfg.max_seconds,
                },
            },
            metrics: RunMetricsSection {
                detection_summary: tally.summarize(summary.frame_count),
            },
            artifacts: Artifacts { video_path },
            summary,
        };

        let log_path = if write_log {
            let stem = run_log::artifact_stem(
                &spec.task,
                &spec.library,
                &spec.condition,
                spec.repeat,
                &run_log::run_timestamp(Local::now()),
            );
            let path = run_log::write_run_log(&payload, &run_cfg.log_dir, &stem)?;
            info!(
                "Run complete. task={}, library={}, log={}",
                spec.task,
                spec.library,
                path.display()
            );
            Some(path)
        } else {
            None
        };

        Ok(RunOutcome { payload, log_path })
    }
}

/// Validates `config`, then executes one run against `backend`.
pub fn run_task(
    config: &BenchConfig,
    backend: &mut dyn MediaBackend,
    write_log: bool,
) -> BenchResult<RunOutcome> {
    RunPipeline::new(config.clone())?.run(backend, write_log)
}
