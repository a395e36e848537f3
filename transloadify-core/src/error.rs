//! Error types for transloadify-core.

use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration errors. Every variant is fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No TRANSLOADIT_KEY defined. Visit https://transloadit.com/accounts/credentials")]
    MissingKey,

    #[error("No TRANSLOADIT_SECRET defined. Visit https://transloadit.com/accounts/credentials")]
    MissingSecret,

    #[error("No input directory defined")]
    MissingInput,

    #[error("No output directory defined")]
    MissingOutput,

    #[error("No template id or template file defined")]
    MissingTemplate,

    /// The template file could not be read.
    #[error("failed to read template file {path}: {source}")]
    TemplateFileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template file is not valid JSON.
    #[error("failed to parse template file {path}: {source}")]
    TemplateFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The template file parsed, but is not an object of steps.
    #[error("template file {path} must contain a JSON object of steps")]
    TemplateFileShape { path: PathBuf },

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
}
