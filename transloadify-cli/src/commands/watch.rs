//! Default mode: convert the input directory and report progress.

use std::sync::Arc;

use anyhow::Result;

use transloadify_client::Client;
use transloadify_core::{Config, TemplateSource, WatchOptions};
use transloadify_watcher::{EventStream, WatchEvent, Watcher};

pub async fn run(config: Config, client: Client) -> Result<()> {
    announce(&config.options);

    let (handle, events) = Watcher::start(config.options, Arc::new(client));
    drive(events, || handle.shutdown(), report).await;

    Ok(())
}

/// Hand every event to `sink` in arrival order until the stream ends. The
/// first Ctrl-C calls `shutdown`; running conversions still report.
async fn drive<S, F>(mut events: EventStream, shutdown: S, mut sink: F)
where
    S: FnOnce(),
    F: FnMut(&WatchEvent),
{
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut shutdown = Some(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => sink(&event),
                None => break,
            },
            signal = &mut ctrl_c, if shutdown.is_some() => {
                if let Err(err) = signal {
                    tracing::warn!(error = %err, "cannot listen for Ctrl-C");
                    shutdown = None;
                    continue;
                }
                tracing::info!("interrupted, waiting for running conversions to finish");
                if let Some(stop) = shutdown.take() {
                    stop();
                }
            }
        }
    }
}

fn announce(options: &WatchOptions) {
    tracing::info!(
        "Converting all files in '{}' and putting the result into '{}'.",
        options.input.display(),
        options.output.display()
    );
    if options.watch {
        tracing::info!("Watching directory '{}' for changes...", options.input.display());
    }
    match &options.template {
        TemplateSource::TemplateId(id) => tracing::info!("Using template with id '{id}'."),
        TemplateSource::Steps { path, steps } => tracing::info!(
            "Using template file '{}' (read {} steps).",
            path.display(),
            steps.len()
        ),
    }
}

/// One log line per event.
pub fn describe(event: &WatchEvent) -> String {
    match event {
        WatchEvent::Change(path) => {
            format!("Detected change for '{}'. Starting conversion...", path.display())
        }
        WatchEvent::Done(info) => {
            let name = info
                .uploads
                .first()
                .map(|upload| upload.name.as_str())
                .unwrap_or_else(|| info.id());
            format!("Successfully converted '{name}'.")
        }
        WatchEvent::Error(err) => format!("error: {err}"),
    }
}

fn report(event: &WatchEvent) {
    let line = describe(event);
    match event {
        WatchEvent::Error(_) => tracing::error!("{line}"),
        _ => tracing::info!("{line}"),
    }
}
