//! Startup gate: turns flag/env values into validated [`Config`].
//!
//! Required values are checked in a fixed order (key, secret, input,
//! output, template source) so the first missing one is the one reported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{
    Credentials, Steps, TemplateSource, WatchOptions, DEFAULT_CONCURRENCY, DEFAULT_DEBOUNCE_WINDOW,
};

/// Unvalidated settings as gathered from flags and environment.
#[derive(Debug, Clone)]
pub struct RawConfig {
    pub key: Option<String>,
    pub secret: Option<String>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub template_id: Option<String>,
    pub template_file: Option<PathBuf>,
    pub watch: bool,
    pub preserve: bool,
    pub skip_initial_scan: bool,
    pub recursive: bool,
    pub skip_stale: bool,
    pub notify_url: Option<String>,
    pub fields: BTreeMap<String, String>,
    pub concurrency: usize,
    pub debounce: Duration,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            key: None,
            secret: None,
            input: Some(PathBuf::from(".")),
            output: None,
            template_id: None,
            template_file: None,
            watch: false,
            preserve: true,
            skip_initial_scan: false,
            recursive: false,
            skip_stale: false,
            notify_url: None,
            fields: BTreeMap::new(),
            concurrency: DEFAULT_CONCURRENCY,
            debounce: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

/// Validated configuration handed to the client and watcher factories.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub options: WatchOptions,
}

impl RawConfig {
    /// Validate presence of every required value and resolve the template
    /// source.
    ///
    /// When both a template id and a template file are given, the id wins
    /// and the file is not read.
    pub fn validate(self) -> Result<Config, ConfigError> {
        let key = non_empty(self.key).ok_or(ConfigError::MissingKey)?;
        let secret = non_empty(self.secret).ok_or(ConfigError::MissingSecret)?;
        let input = non_empty_path(self.input).ok_or(ConfigError::MissingInput)?;
        let output = non_empty_path(self.output).ok_or(ConfigError::MissingOutput)?;
        let template_id = non_empty(self.template_id);
        let template_file = non_empty_path(self.template_file);

        let template = match (template_id, template_file) {
            (None, None) => return Err(ConfigError::MissingTemplate),
            (Some(id), Some(path)) => {
                tracing::warn!(
                    template = %id,
                    template_file = %path.display(),
                    "both template id and template file given; using the template id",
                );
                TemplateSource::TemplateId(id)
            }
            (Some(id), None) => TemplateSource::TemplateId(id),
            (None, Some(path)) => {
                let steps = load_steps(&path)?;
                TemplateSource::Steps { path, steps }
            }
        };

        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        Ok(Config {
            credentials: Credentials { key, secret },
            options: WatchOptions {
                input,
                output,
                watch: self.watch,
                template,
                preserve: self.preserve,
                skip_initial_scan: self.skip_initial_scan,
                recursive: self.recursive,
                skip_stale: self.skip_stale,
                notify_url: non_empty(self.notify_url),
                fields: self.fields,
                concurrency: self.concurrency,
                debounce: self.debounce,
            },
        })
    }
}

/// Read and parse a local template file into a step list.
pub fn load_steps(path: &Path) -> Result<Steps, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::TemplateFileIo {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| ConfigError::TemplateFileParse {
            path: path.to_path_buf(),
            source,
        })?;
    Steps::from_value(value).ok_or_else(|| ConfigError::TemplateFileShape {
        path: path.to_path_buf(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().to_string_lossy().trim().is_empty())
}
