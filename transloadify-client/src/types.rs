//! Request and response payloads.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use transloadify_core::{Steps, TemplateSource, WatchOptions};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Assembly parameters minus the `auth` block, which the client adds when
/// signing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Steps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl AssemblyRequest {
    pub fn from_options(options: &WatchOptions) -> Self {
        let (template_id, steps) = match &options.template {
            TemplateSource::TemplateId(id) => (Some(id.clone()), None),
            TemplateSource::Steps { steps, .. } => (None, Some(steps.clone())),
        };
        Self {
            template_id,
            steps,
            notify_url: options.notify_url.clone(),
            fields: options.fields.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AuthParams {
    pub key: String,
    pub expires: String,
}

/// The full `params` document that gets signed.
#[derive(Debug, Serialize)]
pub(crate) struct SignedParams<'a> {
    pub auth: AuthParams,
    #[serde(flatten)]
    pub request: &'a AssemblyRequest,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// One uploaded or produced file, as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub basename: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ssl_url: Option<String>,
}

impl FileInfo {
    /// Prefer the TLS URL when the service provides one.
    pub fn download_url(&self) -> Option<&str> {
        self.ssl_url.as_deref().or(self.url.as_deref())
    }
}

/// Assembly status document. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyInfo {
    #[serde(default)]
    pub ok: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub assembly_id: Option<String>,
    #[serde(default)]
    pub assembly_url: Option<String>,
    #[serde(default)]
    pub assembly_ssl_url: Option<String>,
    #[serde(default)]
    pub uploads: Vec<FileInfo>,
    #[serde(default)]
    pub results: IndexMap<String, Vec<FileInfo>>,
}

/// Coarse interpretation of the `ok` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyStatus {
    Uploading,
    Executing,
    Completed,
    Canceled,
    Aborted,
    Other(String),
    Unknown,
}

impl AssemblyStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssemblyStatus::Completed | AssemblyStatus::Canceled | AssemblyStatus::Aborted
        )
    }
}

impl fmt::Display for AssemblyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyStatus::Uploading => write!(f, "ASSEMBLY_UPLOADING"),
            AssemblyStatus::Executing => write!(f, "ASSEMBLY_EXECUTING"),
            AssemblyStatus::Completed => write!(f, "ASSEMBLY_COMPLETED"),
            AssemblyStatus::Canceled => write!(f, "ASSEMBLY_CANCELED"),
            AssemblyStatus::Aborted => write!(f, "REQUEST_ABORTED"),
            AssemblyStatus::Other(s) => write!(f, "{s}"),
            AssemblyStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl AssemblyInfo {
    pub fn status(&self) -> AssemblyStatus {
        match self.ok.as_deref() {
            Some("ASSEMBLY_UPLOADING") => AssemblyStatus::Uploading,
            Some("ASSEMBLY_EXECUTING") => AssemblyStatus::Executing,
            Some("ASSEMBLY_COMPLETED") => AssemblyStatus::Completed,
            Some("ASSEMBLY_CANCELED") => AssemblyStatus::Canceled,
            Some("REQUEST_ABORTED") => AssemblyStatus::Aborted,
            Some(other) => AssemblyStatus::Other(other.to_string()),
            None => AssemblyStatus::Unknown,
        }
    }

    /// A failure description when the service reported an error or the
    /// assembly ended in a non-completed terminal state.
    pub fn failure(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(match &self.message {
                Some(message) => format!("{error}: {message}"),
                None => error.clone(),
            });
        }
        let status = self.status();
        if status.is_terminal() && status != AssemblyStatus::Completed {
            return Some(format!("assembly ended with status {status}"));
        }
        None
    }

    /// Assembly id, or `"<unknown>"` when the service did not send one.
    pub fn id(&self) -> &str {
        self.assembly_id.as_deref().unwrap_or("<unknown>")
    }

    /// Polling URL, preferring TLS.
    pub fn status_url(&self) -> Option<&str> {
        self.assembly_ssl_url
            .as_deref()
            .or(self.assembly_url.as_deref())
    }

    /// Every result file in `(step, index, file)` order.
    pub fn result_files(&self) -> impl Iterator<Item = (&str, usize, &FileInfo)> {
        self.results.iter().flat_map(|(step, files)| {
            files
                .iter()
                .enumerate()
                .map(move |(index, file)| (step.as_str(), index, file))
        })
    }
}
