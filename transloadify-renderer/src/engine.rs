//! Tera rendering of the Upstart job.

use tera::{Context, Tera};

use crate::context::DaemonVars;
use crate::error::RenderError;

const UPSTART_TEMPLATE: &str = "upstart.conf";

/// Renders the embedded Upstart template. Create once and reuse.
pub struct UpstartRenderer {
    tera: Tera,
}

impl UpstartRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(UPSTART_TEMPLATE, include_str!("templates/upstart.conf.tera"))?;
        Ok(Self { tera })
    }

    /// Render the job text. Output depends only on `vars`.
    pub fn render(&self, vars: &DaemonVars) -> Result<String, RenderError> {
        let ctx = Context::from_serialize(vars)?;
        Ok(self.tera.render(UPSTART_TEMPLATE, &ctx)?)
    }
}
