//! Transloadify: watch a directory and convert every file through Transloadit.
//!
//! # Usage
//!
//! ```text
//! transloadify --input <dir> --output <dir> --template <id> [--watch] [--preserve=false]
//! transloadify --input <dir> --output <dir> --template-file <steps.json>
//! transloadify ... --upstart            # print an Upstart job and exit
//! ```
//!
//! `--key` and `--secret` fall back to `TRANSLOADIT_KEY` / `TRANSLOADIT_SECRET`.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

use transloadify_client::{Client, ClientConfig, DEFAULT_ENDPOINT};
use transloadify_core::{RawConfig, DEFAULT_CONCURRENCY};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "transloadify",
    version,
    about = "Convert every file in a directory with Transloadit, optionally watching for new ones",
    long_about = None,
)]
struct Cli {
    /// Auth key.
    #[arg(long, env = "TRANSLOADIT_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Auth secret.
    #[arg(long, env = "TRANSLOADIT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Input directory.
    #[arg(long, default_value = ".")]
    input: PathBuf,

    /// Output directory.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Template's id to create assemblies with.
    #[arg(long = "template")]
    template_id: Option<String>,

    /// Path to local file containing template JSON.
    #[arg(long)]
    template_file: Option<PathBuf>,

    /// Watch input directory for changes.
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    watch: bool,

    /// Move input file as original into output directory.
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    preserve: bool,

    /// Also convert and watch files in subdirectories.
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    recursive: bool,

    /// Skip files whose results in the output directory are newer.
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    skip_stale: bool,

    /// Show an Upstart script for the specified config and exit.
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    upstart: bool,

    /// URL Transloadit notifies when an assembly completes.
    #[arg(long)]
    notify_url: Option<String>,

    /// Extra assembly field as name=value. Repeatable.
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,

    /// API endpoint.
    #[arg(long, env = "TRANSLOADIT_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Maximum number of files converted at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Delay between assembly status polls, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,
}

impl Cli {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            key: self.key.clone(),
            secret: self.secret.clone(),
            input: Some(self.input.clone()),
            output: self.output.clone(),
            template_id: self.template_id.clone(),
            template_file: self.template_file.clone(),
            watch: self.watch,
            preserve: self.preserve,
            skip_initial_scan: self.upstart,
            recursive: self.recursive,
            skip_stale: self.skip_stale,
            notify_url: self.notify_url.clone(),
            fields: self.fields.iter().cloned().collect(),
            concurrency: self.concurrency,
            ..RawConfig::default()
        }
    }
}

fn parse_field(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = cli.raw_config().validate()?;

    let mut client_config = ClientConfig::new(config.credentials.clone());
    client_config.endpoint = cli.endpoint.clone();
    client_config.poll_interval = Duration::from_millis(cli.poll_interval_ms);
    let client = Client::new(client_config).context("failed to create Transloadit client")?;

    if cli.upstart {
        return commands::upstart::run(&config);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(commands::watch::run(config, client))
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the Upstart script.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
