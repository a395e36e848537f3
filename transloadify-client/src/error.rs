//! Client error types.

use std::path::PathBuf;

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Non-success HTTP status from the service or a result host.
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service rejected or aborted the assembly.
    #[error("assembly {id} failed: {reason}")]
    AssemblyFailed { id: String, reason: String },

    #[error("assembly response is missing `{0}`")]
    MissingField(&'static str),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ClientError {
    ClientError::Io {
        path: path.into(),
        source,
    }
}
