use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use transloadify_client::AssemblyService;
use transloadify_core::WatchOptions;

use crate::debounce::Debouncer;
use crate::error::{io_err, WatchError};
use crate::event::{channel, EventSender, EventStream, WatchEvent};
use crate::job::{process_file, JobContext};

/// How often debounced paths are checked for release.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Watcher factory.
pub struct Watcher;

/// Control handle for a running watcher.
///
/// Dropping it does not stop the watcher; only [`WatcherHandle::shutdown`]
/// does.
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    shutdown: broadcast::Sender<()>,
}

impl WatcherHandle {
    /// Stop reacting to filesystem changes. Jobs already running finish and
    /// the event stream then ends.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

impl Watcher {
    /// Start processing `options.input` in the background.
    ///
    /// Must be called from within a tokio runtime. Without `options.watch`
    /// the returned stream ends once the existing files are handled.
    pub fn start<S>(options: WatchOptions, service: Arc<S>) -> (WatcherHandle, EventStream)
    where
        S: AssemblyService + 'static,
    {
        let (events, stream) = channel();
        let (shutdown, _) = broadcast::channel(4);
        let shutdown_rx = shutdown.subscribe();

        tokio::spawn(run(options, service, events, shutdown_rx));

        (WatcherHandle { shutdown }, stream)
    }
}

/// Canonical input and output directories.
#[derive(Debug, Clone)]
struct Dirs {
    input: PathBuf,
    output: PathBuf,
}

impl Dirs {
    /// Output directory to leave out of scans and notifications, when it
    /// lives inside the input tree.
    fn nested_output(&self) -> Option<&Path> {
        (self.output != self.input && self.output.starts_with(&self.input))
            .then_some(self.output.as_path())
    }

    /// Whether a notified `path` is a candidate for conversion.
    fn accepts(&self, path: &Path, recursive: bool) -> bool {
        if self.nested_output().is_some_and(|out| path.starts_with(out)) {
            return false;
        }
        if recursive {
            path != self.input && path.starts_with(&self.input)
        } else {
            path.parent() == Some(self.input.as_path())
        }
    }
}

/// A registered notify watcher and its event feed.
struct Notifications {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

async fn run<S: AssemblyService + 'static>(
    options: WatchOptions,
    service: Arc<S>,
    events: EventSender,
    shutdown_rx: broadcast::Receiver<()>,
) {
    let dirs = match prepare_dirs(&options) {
        Ok(dirs) => dirs,
        Err(err) => {
            tracing::error!(error = %err, "cannot start watcher");
            events.emit(WatchEvent::Error(err));
            return;
        }
    };
    let ctx = Arc::new(JobContext::new(options, dirs.input.clone(), service, events));

    // Subscribe before scanning so files created during the scan are seen.
    let notifications = if ctx.options.watch {
        match subscribe(&dirs.input, ctx.options.recursive) {
            Ok(notifications) => Some(notifications),
            Err(err) => {
                tracing::error!(error = %err, "cannot watch input directory");
                ctx.emit(WatchEvent::Error(err));
                None
            }
        }
    } else {
        None
    };

    let mut jobs = JoinSet::new();

    if !ctx.options.skip_initial_scan {
        match scan_input(&dirs.input, ctx.options.recursive, dirs.nested_output()) {
            Ok(files) => {
                tracing::debug!(count = files.len(), "processing existing files");
                for path in files {
                    spawn_job(&ctx, &mut jobs, path);
                }
            }
            Err(err) => ctx.emit(WatchEvent::Error(err)),
        }
    }

    if let Some(notifications) = notifications {
        watch_loop(&ctx, &mut jobs, &dirs, notifications, shutdown_rx).await;
    }

    while let Some(joined) = jobs.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "conversion task panicked");
        }
    }
}

fn subscribe(input: &Path, recursive: bool) -> Result<Notifications, WatchError> {
    let (event_tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(input, mode)?;
    tracing::info!(path = %input.display(), recursive, "watching for changes");
    Ok(Notifications {
        _watcher: watcher,
        rx,
    })
}

async fn watch_loop<S: AssemblyService + 'static>(
    ctx: &Arc<JobContext<S>>,
    jobs: &mut JoinSet<()>,
    dirs: &Dirs,
    mut notifications: Notifications,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let recursive = ctx.options.recursive;
    let mut debounce = Debouncer::new(ctx.options.debounce);
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut shutdown_open = true;

    loop {
        tokio::select! {
            signal = shutdown_rx.recv(), if shutdown_open => match signal {
                Ok(()) | Err(RecvError::Lagged(_)) => break,
                // Every handle is gone; nobody can ask us to stop any more.
                Err(RecvError::Closed) => shutdown_open = false,
            },
            event = notifications.rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        ctx.emit(WatchEvent::Error(err.into()));
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                let now = Instant::now();
                for path in event.paths {
                    if dirs.accepts(&path, recursive) {
                        debounce.mark(&path, now);
                    }
                }
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                for path in debounce.take_ready(now) {
                    if path.is_file() && !spawn_job(ctx, jobs, path.clone()) {
                        // Still converting the previous version; retry later.
                        debounce.mark(&path, now);
                    }
                }
            }
            Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "conversion task panicked");
                }
            }
        }
    }
}

/// Spawn a job for `path` unless one is already running. Returns whether a
/// job was spawned.
fn spawn_job<S: AssemblyService + 'static>(
    ctx: &Arc<JobContext<S>>,
    jobs: &mut JoinSet<()>,
    path: PathBuf,
) -> bool {
    if !ctx.claim(&path) {
        tracing::debug!(file = %path.display(), "already converting, deferring");
        return false;
    }
    jobs.spawn(process_file(ctx.clone(), path));
    true
}

/// Ensure the output directory exists and resolve both directories to the
/// form notify reports paths in.
fn prepare_dirs(options: &WatchOptions) -> Result<Dirs, WatchError> {
    if !options.output.exists() {
        fs::create_dir_all(&options.output).map_err(|e| io_err(&options.output, e))?;
    }
    let input = fs::canonicalize(&options.input).map_err(|e| io_err(&options.input, e))?;
    let output = fs::canonicalize(&options.output).map_err(|e| io_err(&options.output, e))?;
    Ok(Dirs { input, output })
}

/// Regular files inside `dir`, sorted. Subdirectories are descended into
/// when `recursive`, except `skip`.
fn scan_input(
    dir: &Path,
    recursive: bool,
    skip: Option<&Path>,
) -> Result<Vec<PathBuf>, WatchError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).map_err(|e| io_err(&current, e))? {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let path = entry.path();
            let ty = entry.file_type().map_err(|e| io_err(&path, e))?;
            if ty.is_file() {
                files.push(path);
            } else if ty.is_dir() && recursive && skip != Some(path.as_path()) {
                pending.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
