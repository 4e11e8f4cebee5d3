use thiserror::Error;

/// Failures that abort a run or a comparison session.
///
/// Per-frame problems (a failed read, an adapter error) never surface here;
/// they are counted by the executor and recorded in the run payload.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Bad or missing configuration. Raised before any camera is touched.
    #[error("configuration error: {0}")]
    Config(String),
    /// A camera, video writer or preview surface could not be used.
    #[error("device error: {0}")]
    Device(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;
