use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vision_bench::comparison;
use vision_bench::config::BenchConfig;
use vision_bench::devices::MediaBackend;
use vision_bench::operator::ConsolePrompt;
use vision_bench::pipeline;
use vision_bench::run_log;
use vision_bench::synthetic::SyntheticBackend;

/// Run and compare computer-vision tasks across libraries against a live camera.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Use the built-in synthetic camera instead of a real device.
    #[arg(long, global = true, default_value_t = false)]
    synthetic: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a single run and write its log.
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Execute the comparison matrix of a config and write its summary.
    Compare {
        #[arg(long)]
        config: PathBuf,
    },
    /// Live preview of one adapter until `q` is pressed. Nothing is logged.
    Demo {
        #[arg(long, default_value_t = 0)]
        camera: i32,
        #[arg(long, default_value = "human_cues")]
        task: String,
        #[arg(long, default_value = "opencv")]
        library: String,
        /// Optional frame cap; unbounded by default.
        #[arg(long)]
        max_frames: Option<u32>,
    },
    /// Collect every run log into one JSON array.
    Export {
        #[arg(long, default_value = "data/logs")]
        logs_dir: PathBuf,
        #[arg(long, default_value = "results/summaries/summary.json")]
        out: PathBuf,
    },
}

fn media_backend(synthetic: bool) -> Result<Box<dyn MediaBackend>> {
    if synthetic {
        return Ok(Box::new(SyntheticBackend::default()));
    }
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(vision_bench::opencv_backend::OpenCvBackend))
    }
    #[cfg(not(feature = "opencv"))]
    {
        anyhow::bail!(
            "this build has no camera support; rebuild with `--features opencv` or pass `--synthetic`"
        )
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config } => {
            let cfg = BenchConfig::from_path(&config)?;
            let mut backend = media_backend(cli.synthetic)?;
            let outcome = pipeline::run_task(&cfg, backend.as_mut(), true)
                .with_context(|| format!("run failed for config {}", config.display()))?;
            let execution = &outcome.payload.execution;
            info!(
                processed = execution.processed_frames,
                failed = execution.failed_frames,
                fps = outcome.payload.summary.fps,
                "run finished"
            );
        }
        Command::Compare { config } => {
            let cfg = BenchConfig::from_path(&config)?;
            let mut backend = media_backend(cli.synthetic)?;
            let source = config.display().to_string();
            comparison::run_comparison(&cfg, &source, backend.as_mut(), &mut ConsolePrompt)
                .with_context(|| format!("comparison failed for config {source}"))?;
        }
        Command::Demo {
            camera,
            task,
            library,
            max_frames,
        } => {
            let mut cfg = BenchConfig::default();
            cfg.camera.index = camera;
            cfg.task.name = Some(task);
            cfg.task.library = Some(library);
            cfg.run.max_frames = max_frames.unwrap_or(u32::MAX);
            cfg.run.show_preview = true;
            let mut backend = media_backend(cli.synthetic)?;
            info!("Press 'q' in the demo window to quit.");
            pipeline::run_task(&cfg, backend.as_mut(), false)?;
        }
        Command::Export { logs_dir, out } => {
            let count = run_log::export_run_logs(&logs_dir, &out)?;
            info!("Exported {count} run logs to {}", out.display());
        }
    }
    Ok(())
}
