//! Transloadify core library: watch options, template sources and validation.
//!
//! Public API surface:
//! - [`types`]: credentials, step lists, template sources, watch options
//! - [`error`]: [`ConfigError`]
//! - [`config`]: unvalidated [`RawConfig`] → validated [`Config`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{load_steps, Config, RawConfig};
pub use error::ConfigError;
pub use types::{
    Credentials, Steps, TemplateSource, WatchOptions, DEFAULT_CONCURRENCY, DEFAULT_DEBOUNCE_WINDOW,
};
