//! One adapter per (task, library) pair. See `registry` for the table that
//! maps pairs to these types.

pub mod human_cues;
pub mod object_recognition;
pub mod ocr;

#[cfg(not(feature = "opencv"))]
pub(crate) const OPENCV_MISSING: &str =
    "OpenCV support is not compiled in; rebuild with `--features opencv` to run this adapter.";

#[cfg(feature = "opencv")]
pub(crate) const CASCADES_MISSING: &str = "OpenCV Haar cascades failed to load.";
