//! Domain types shared by the watcher, the service client and the CLI.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Assemblies allowed in flight at once unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Quiet period a changed file must observe before it is submitted.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Auth key/secret pair for the processing service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A locally defined processing pipeline: step name → step definition.
///
/// The step bodies are opaque to this crate and are forwarded to the service
/// untouched, in file order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Steps(pub Map<String, Value>);

impl Steps {
    /// Interpret a parsed template document as a step list.
    ///
    /// Accepts a bare `{ "<step>": {..} }` object as well as the wrapped
    /// `{ "steps": {..} }` form. Returns `None` for anything that is not an
    /// object.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        if map.len() == 1 && matches!(map.get("steps"), Some(Value::Object(_))) {
            if let Some(Value::Object(inner)) = map.remove("steps") {
                return Some(Self(inner));
            }
        }
        Some(Self(map))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// TemplateSource
// ---------------------------------------------------------------------------

/// Where the processing pipeline for each assembly comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    /// A server-stored template, referenced by id.
    TemplateId(String),
    /// Steps read from a local template file.
    Steps { path: PathBuf, steps: Steps },
}

impl TemplateSource {
    pub fn template_id(&self) -> Option<&str> {
        match self {
            TemplateSource::TemplateId(id) => Some(id),
            TemplateSource::Steps { .. } => None,
        }
    }

    pub fn steps(&self) -> Option<&Steps> {
        match self {
            TemplateSource::TemplateId(_) => None,
            TemplateSource::Steps { steps, .. } => Some(steps),
        }
    }

    pub fn template_file(&self) -> Option<&Path> {
        match self {
            TemplateSource::TemplateId(_) => None,
            TemplateSource::Steps { path, .. } => Some(path),
        }
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::TemplateId(id) => write!(f, "template {id}"),
            TemplateSource::Steps { path, steps } => {
                write!(f, "template file {} ({} steps)", path.display(), steps.len())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WatchOptions
// ---------------------------------------------------------------------------

/// Immutable watcher configuration, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Keep running and react to new or changed files after the first pass.
    pub watch: bool,
    pub template: TemplateSource,
    /// Move the original into the output directory instead of deleting it.
    pub preserve: bool,
    /// Do not process files already present in the input directory.
    pub skip_initial_scan: bool,
    /// Also scan and watch subdirectories. Results mirror the input layout.
    pub recursive: bool,
    /// Leave a file alone when the output directory already holds results
    /// for it that are newer than the file itself.
    pub skip_stale: bool,
    pub notify_url: Option<String>,
    /// Extra assembly fields forwarded verbatim.
    pub fields: BTreeMap<String, String>,
    pub concurrency: usize,
    pub debounce: Duration,
}

impl WatchOptions {
    /// Options with defaults for everything except the required values.
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        template: TemplateSource,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            watch: false,
            template,
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
