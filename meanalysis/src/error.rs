//! Error types for pipeline construction and the host binary.

use thiserror::Error;

/// Fatal errors. Per-event problems never surface here; stages record them on the
/// event and in the counters instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Core table or registry error
    #[error(transparent)]
    Core(#[from] mecore::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Worker pool could not be built
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Inconsistent configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
