// THEORY:
// `core_modules` holds everything that runs once per frame: the adapters and
// the registry that hands them out, the uniform result record they return,
// the metrics accumulator that times them, and the pure-Rust motion detector
// (grid + blob detector) behind the `motion` library.

pub mod adapters;
pub mod blob_detector;
pub mod metrics;
pub mod motion_grid;
pub mod registry;
pub mod task_result;
