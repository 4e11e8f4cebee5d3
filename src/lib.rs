// THEORY:
// This file is the main entry point for the `vision_bench` library crate.
// The binary in `main.rs` is a thin command-line shell over it.
//
// The public surface has two levels:
//   - `pipeline::run_task` executes one run (one task, one library, one
//     condition, one repeat) against a camera and produces a `RunPayload`.
//   - `comparison::run_comparison` expands a comparison matrix into many runs,
//     gates them on the operator, and aggregates everything into one summary.
//
// Both take a `devices::MediaBackend`, so the same code drives a real camera
// (`opencv_backend`, behind the `opencv` feature) or the deterministic
// `synthetic` backend.

pub mod comparison;
pub mod config;
pub mod core_modules;
pub mod devices;
pub mod errors;
#[cfg(feature = "opencv")]
pub mod opencv_backend;
pub mod operator;
pub mod pipeline;
pub mod run_log;
pub mod synthetic;
