//! # transloadify-renderer
//!
//! Renders an Upstart job definition that runs transloadify as a watching
//! daemon with the current invocation's settings.
//!
//! ```rust,no_run
//! use transloadify_core::{Credentials, TemplateSource, WatchOptions};
//! use transloadify_renderer::{reconstruct_command, DaemonVars, UpstartRenderer};
//!
//! let options = WatchOptions::new("in", "out", TemplateSource::TemplateId("abc".into()));
//! let cmd = reconstruct_command("/usr/local/bin/transloadify", &options);
//! let vars = DaemonVars::from_env(cmd, &Credentials::new("key", "secret"));
//! if let Ok(renderer) = UpstartRenderer::new() {
//!     if let Ok(script) = renderer.render(&vars) {
//!         print!("{script}");
//!     }
//! }
//! ```

pub mod command;
pub mod context;
pub mod engine;
pub mod error;

pub use command::reconstruct_command;
pub use context::{DaemonVars, UNIXNAME};
pub use engine::UpstartRenderer;
pub use error::RenderError;
