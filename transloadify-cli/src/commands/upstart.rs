//! `transloadify --upstart`: print an Upstart job for the current settings.

use anyhow::{Context, Result};

use transloadify_core::Config;
use transloadify_renderer::{reconstruct_command, DaemonVars, UpstartRenderer};

pub fn run(config: &Config) -> Result<()> {
    print!("{}", script(config, &program_name())?);
    Ok(())
}

/// Render the job text for `config` launched as `program`.
pub fn script(config: &Config, program: &str) -> Result<String> {
    let cmd = reconstruct_command(program, &config.options);
    let vars = DaemonVars::from_env(cmd, &config.credentials);
    let renderer = UpstartRenderer::new().context("failed to load Upstart template")?;
    renderer
        .render(&vars)
        .context("failed to render Upstart script")
}

fn program_name() -> String {
    std::env::args_os()
        .next()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transloadify".to_string())
}
