//! Per-file conversion: upload → wait → download results → handle original.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::sync::Semaphore;

use transloadify_client::{AssemblyInfo, AssemblyRequest, AssemblyService, ClientError};
use transloadify_core::WatchOptions;

use crate::error::{io_err, WatchError};
use crate::event::{EventSender, WatchEvent};

/// Shared state for every job spawned by one watcher.
pub(crate) struct JobContext<S> {
    pub options: WatchOptions,
    /// Canonical input directory; file paths are relative to it.
    pub input_root: PathBuf,
    pub service: Arc<S>,
    pub events: EventSender,
    permits: Semaphore,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl<S: AssemblyService> JobContext<S> {
    pub fn new(
        options: WatchOptions,
        input_root: PathBuf,
        service: Arc<S>,
        events: EventSender,
    ) -> Self {
        let permits = Semaphore::new(options.concurrency.max(1));
        Self {
            options,
            input_root,
            service,
            events,
            permits,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Mark `path` as in flight. Returns `false` if a job for it is already
    /// running.
    pub fn claim(&self, path: &Path) -> bool {
        match self.in_flight.lock() {
            Ok(mut set) => set.insert(path.to_path_buf()),
            Err(poisoned) => poisoned.into_inner().insert(path.to_path_buf()),
        }
    }

    fn release(&self, path: &Path) {
        match self.in_flight.lock() {
            Ok(mut set) => set.remove(path),
            Err(poisoned) => poisoned.into_inner().remove(path),
        };
    }

    pub fn emit(&self, event: WatchEvent) {
        self.events.emit(event);
    }

    /// Where results for `path` go: the output directory, plus the file's
    /// subdirectory below the input directory.
    pub fn output_dir_for(&self, path: &Path) -> PathBuf {
        path.parent()
            .and_then(|parent| parent.strip_prefix(&self.input_root).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(|rel| self.options.output.join(rel))
            .unwrap_or_else(|| self.options.output.clone())
    }
}

/// Run one claimed file through the whole pipeline and report the outcome.
pub(crate) async fn process_file<S: AssemblyService>(ctx: Arc<JobContext<S>>, path: PathBuf) {
    if ctx.options.skip_stale && results_are_newer(&ctx.output_dir_for(&path), &path).await {
        tracing::info!(file = %path.display(), "results are newer than the file, skipping");
        ctx.release(&path);
        return;
    }

    ctx.emit(WatchEvent::Change(path.clone()));

    match convert(&ctx, &path).await {
        Ok(info) => {
            tracing::debug!(file = %path.display(), assembly = info.id(), "conversion finished");
            ctx.emit(WatchEvent::Done(info));
        }
        Err(err) => {
            tracing::debug!(file = %path.display(), error = %err, "conversion failed");
            ctx.emit(WatchEvent::Error(err));
        }
    }

    ctx.release(&path);
}

async fn convert<S: AssemblyService>(
    ctx: &JobContext<S>,
    path: &Path,
) -> Result<AssemblyInfo, WatchError> {
    let _permit = ctx
        .permits
        .acquire()
        .await
        .map_err(|_| WatchError::LimiterClosed)?;

    let assembly_err = |source: ClientError| WatchError::Assembly {
        path: path.to_path_buf(),
        source,
    };

    let uploaded = fingerprint(path).await?;
    let request = AssemblyRequest::from_options(&ctx.options);
    let created = ctx
        .service
        .create_assembly(&request, path)
        .await
        .map_err(assembly_err)?;
    let info = ctx
        .service
        .wait_for_assembly(created)
        .await
        .map_err(assembly_err)?;

    let out_dir = ctx.output_dir_for(path);
    if !out_dir.exists() {
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| io_err(&out_dir, e))?;
    }

    for (step, index, file) in info.result_files() {
        let url = file
            .download_url()
            .ok_or_else(|| WatchError::MissingResultUrl {
                step: step.to_string(),
                name: file.name.clone(),
            })?;
        let dest = out_dir.join(result_file_name(step, index, &file.name));
        let bytes = ctx
            .service
            .download(url, &dest)
            .await
            .map_err(assembly_err)?;
        tracing::debug!(dest = %dest.display(), bytes, "downloaded result");
    }

    if fingerprint(path).await? != uploaded {
        // Rewritten mid-conversion; the watcher picks it up again.
        tracing::info!(file = %path.display(), "file changed during conversion, keeping it");
        return Ok(info);
    }
    handle_original(&ctx.options, &out_dir, path).await?;
    Ok(info)
}

type Fingerprint = (u64, Option<SystemTime>);

async fn fingerprint(path: &Path) -> Result<Fingerprint, WatchError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| io_err(path, e))?;
    Ok((meta.len(), meta.modified().ok()))
}

/// Move the original into `out_dir`, or delete it.
async fn handle_original(
    options: &WatchOptions,
    out_dir: &Path,
    path: &Path,
) -> Result<(), WatchError> {
    if !options.preserve {
        return tokio::fs::remove_file(path)
            .await
            .map_err(|e| io_err(path, e));
    }

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dest = out_dir.join(original_file_name(&name));
    match tokio::fs::rename(path, &dest).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(io_err(path, err)),
        // Input and output may live on different filesystems.
        Err(_) => {
            tokio::fs::copy(path, &dest)
                .await
                .map_err(|e| io_err(&dest, e))?;
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| io_err(path, e))
        }
    }
}

/// True when `out_dir` holds a result or preserved original of `path` that
/// was modified after `path` itself.
async fn results_are_newer(out_dir: &Path, path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return false;
    };
    let Ok(input_mtime) = tokio::fs::metadata(path).await.and_then(|m| m.modified()) else {
        return false;
    };
    let Ok(mut entries) = tokio::fs::read_dir(out_dir).await else {
        return false;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let candidate = entry.file_name().to_string_lossy().into_owned();
        if !is_output_of(&candidate, &name) {
            continue;
        }
        let newer = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .map(|mtime| mtime > input_mtime)
            .unwrap_or(false);
        if newer {
            return true;
        }
    }
    false
}

/// Whether output file `candidate` was produced from an input named
/// `input_name`: its preserved original, or a `<step>_<index>_<name>`
/// result sharing the input's stem.
pub(crate) fn is_output_of(candidate: &str, input_name: &str) -> bool {
    if candidate.starts_with(ORIGINAL_PREFIX) {
        return candidate == original_file_name(input_name);
    }
    let stem = file_stem(input_name);
    let parts: Vec<&str> = candidate.split('_').collect();
    (1..parts.len().saturating_sub(1)).any(|i| {
        let index = parts[i];
        !index.is_empty()
            && index.bytes().all(|b| b.is_ascii_digit())
            && file_stem(&parts[i + 1..].join("_")) == stem
    })
}

fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Output name of result `index` of `step`: `<step>_<index>_<name>`.
pub fn result_file_name(step: &str, index: usize, name: &str) -> String {
    format!("{step}_{index}_{name}")
}

const ORIGINAL_PREFIX: &str = "-original_0_";

/// Output name of a preserved original: `-original_0_<name>`.
pub fn original_file_name(name: &str) -> String {
    format!("{ORIGINAL_PREFIX}{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_names_are_step_index_name() {
        assert_eq!(result_file_name("encode", 0, "clip.mp4"), "encode_0_clip.mp4");
        assert_eq!(result_file_name("thumbs", 3, "clip.jpg"), "thumbs_3_clip.jpg");
    }

    #[test]
    fn outputs_are_matched_by_stem() {
        assert!(is_output_of("-original_0_clip.mov", "clip.mov"));
        assert!(is_output_of("encode_0_clip.mp4", "clip.mov"));
        assert!(is_output_of("hls_video_12_clip.m3u8", "clip.mov"));
        assert!(is_output_of("thumbs_3_my_clip.jpg", "my_clip.mov"));
        assert!(!is_output_of("encode_0_other.mp4", "clip.mov"));
        assert!(!is_output_of("-original_0_clip.mp4", "clip.mov"));
        assert!(!is_output_of("clip.mp4", "clip.mov"));
        assert!(!is_output_of("encode_x_clip.mp4", "clip.mov"));
    }

    #[test]
    fn preserved_originals_sort_first() {
        let original = original_file_name("clip.mov");
        assert_eq!(original, "-original_0_clip.mov");
        assert!(original < result_file_name("encode", 0, "clip.mp4"));
    }
}
