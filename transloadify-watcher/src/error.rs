use std::path::PathBuf;

use thiserror::Error;

use transloadify_client::ClientError;

/// Runtime watcher failures. Reported as events; never fatal.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("converting {path} failed: {source}")]
    Assembly {
        path: PathBuf,
        #[source]
        source: ClientError,
    },

    #[error("result '{name}' of step '{step}' has no download URL")]
    MissingResultUrl { step: String, name: String },

    #[error("upload limiter closed")]
    LimiterClosed,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WatchError {
    WatchError::Io {
        path: path.into(),
        source,
    }
}
