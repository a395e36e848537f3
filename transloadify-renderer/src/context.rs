//! Template context for the Upstart job.

use serde::Serialize;

use transloadify_core::Credentials;

/// Service name used for the job description and its log fifo.
pub const UNIXNAME: &str = "transloadify";

/// Everything the Upstart template substitutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonVars {
    pub unixname: String,
    /// User the daemon runs as.
    pub username: String,
    /// Full command line, already escaped for a double-quoted `bash -c`.
    pub cmd: String,
    pub path: String,
    /// Cargo home of the installing user, exported as `CARGO_HOME`.
    pub module_path: String,
    pub key: String,
    pub secret: String,
}

impl DaemonVars {
    /// Fill the environment-derived fields from `USER`, `PATH` and
    /// `CARGO_HOME`. Unset variables render as empty strings.
    pub fn from_env(cmd: impl Into<String>, credentials: &Credentials) -> Self {
        Self::with_env(cmd, credentials, |name| std::env::var(name).ok())
    }

    /// Like [`DaemonVars::from_env`] with a caller-supplied lookup.
    pub fn with_env<F>(cmd: impl Into<String>, credentials: &Credentials, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            unixname: UNIXNAME.to_string(),
            username: lookup("USER").unwrap_or_default(),
            cmd: cmd.into(),
            path: lookup("PATH").unwrap_or_default(),
            module_path: lookup("CARGO_HOME").unwrap_or_default(),
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
        }
    }
}
