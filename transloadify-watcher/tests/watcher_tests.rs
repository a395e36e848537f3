//! End-to-end watcher behaviour against an in-memory assembly service.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use transloadify_client::{
    AssemblyInfo, AssemblyRequest, AssemblyService, ClientError, ClientResult, FileInfo,
};
use transloadify_core::{Steps, TemplateSource, WatchOptions};
use transloadify_watcher::{EventStream, WatchError, WatchEvent, Watcher};

// ---------------------------------------------------------------------------
// Fake service
// ---------------------------------------------------------------------------

/// `(request, uploaded file name, uploaded bytes)`
type Recorded = (AssemblyRequest, String, Vec<u8>);

#[derive(Default)]
struct FakeService {
    fail_create: bool,
    /// When set, each wait blocks until a permit is added.
    gate: Option<Arc<Semaphore>>,
    requests: Mutex<Vec<Recorded>>,
}

impl FakeService {
    fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl AssemblyService for FakeService {
    async fn create_assembly(
        &self,
        request: &AssemblyRequest,
        file: &Path,
    ) -> ClientResult<AssemblyInfo> {
        let name = file.file_name().unwrap().to_string_lossy().into_owned();
        let body = std::fs::read(file).expect("read upload");
        self.requests
            .lock()
            .expect("lock")
            .push((request.clone(), name.clone(), body));
        if self.fail_create {
            return Err(ClientError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(AssemblyInfo {
            ok: Some("ASSEMBLY_UPLOADING".to_string()),
            assembly_id: Some(format!("asm-{name}")),
            assembly_ssl_url: Some(format!("https://fake/assemblies/asm-{name}")),
            uploads: vec![FileInfo {
                name,
                ..FileInfo::default()
            }],
            ..AssemblyInfo::default()
        })
    }

    async fn wait_for_assembly(&self, mut info: AssemblyInfo) -> ClientResult<AssemblyInfo> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate").forget();
        }
        let upload = info.uploads[0].name.clone();
        let stem = upload.split('.').next().unwrap_or_default().to_string();
        info.ok = Some("ASSEMBLY_COMPLETED".to_string());
        info.results = IndexMap::from([
            (
                "encode".to_string(),
                vec![FileInfo {
                    name: format!("{stem}.mp4"),
                    ssl_url: Some(format!("https://fake/results/{stem}.mp4")),
                    ..FileInfo::default()
                }],
            ),
            (
                "thumbs".to_string(),
                vec![
                    FileInfo {
                        name: format!("{stem}-1.jpg"),
                        url: Some(format!("http://fake/results/{stem}-1.jpg")),
                        ..FileInfo::default()
                    },
                    FileInfo {
                        name: format!("{stem}-2.jpg"),
                        url: Some(format!("http://fake/results/{stem}-2.jpg")),
                        ..FileInfo::default()
                    },
                ],
            ),
        ]);
        Ok(info)
    }

    async fn download(&self, url: &str, dest: &Path) -> ClientResult<u64> {
        let body = format!("downloaded from {url}");
        std::fs::write(dest, &body).map_err(|source| ClientError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(body.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Dirs {
    _root: TempDir,
    input: PathBuf,
    output: PathBuf,
}

fn dirs() -> Dirs {
    let root = TempDir::new().expect("tempdir");
    let input = root.path().join("in");
    let output = root.path().join("out");
    std::fs::create_dir_all(&input).expect("mkdir in");
    Dirs {
        input,
        output,
        _root: root,
    }
}

fn options(dirs: &Dirs) -> WatchOptions {
    WatchOptions::new(
        &dirs.input,
        &dirs.output,
        TemplateSource::TemplateId("abc123".to_string()),
    )
}

async fn collect(mut events: EventStream) -> Vec<WatchEvent> {
    let mut out = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = events.recv().await {
            out.push(event);
        }
    })
    .await;
    assert!(drained.is_ok(), "event stream did not end");
    out
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Single pass (no watch)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn existing_file_yields_change_then_done_then_end() {
    let dirs = dirs();
    std::fs::write(dirs.input.join("clip.mov"), b"movie").expect("write");
    let service = Arc::new(FakeService::default());

    let (_handle, events) = Watcher::start(options(&dirs), service.clone());
    let events = collect(events).await;

    assert_eq!(events.len(), 2, "got: {events:?}");
    match &events[0] {
        WatchEvent::Change(path) => assert!(path.ends_with("clip.mov")),
        other => panic!("expected change, got {other:?}"),
    }
    match &events[1] {
        WatchEvent::Done(info) => assert_eq!(info.uploads[0].name, "clip.mov"),
        other => panic!("expected done, got {other:?}"),
    }

    assert_eq!(
        listing(&dirs.output),
        vec![
            "-original_0_clip.mov",
            "encode_0_clip.mp4",
            "thumbs_0_clip-1.jpg",
            "thumbs_1_clip-2.jpg",
        ]
    );
    assert!(listing(&dirs.input).is_empty(), "original must be moved");
    assert_eq!(
        std::fs::read(dirs.output.join("-original_0_clip.mov")).expect("read"),
        b"movie"
    );
    assert_eq!(
        std::fs::read_to_string(dirs.output.join("encode_0_clip.mp4")).expect("read"),
        "downloaded from https://fake/results/clip.mp4"
    );
}

#[tokio::test]
async fn without_preserve_the_original_is_deleted() {
    let dirs = dirs();
    std::fs::write(dirs.input.join("clip.mov"), b"movie").expect("write");
    let mut options = options(&dirs);
    options.preserve = false;

    let (_handle, events) = Watcher::start(options, Arc::new(FakeService::default()));
    let events = collect(events).await;

    assert!(matches!(events.last(), Some(WatchEvent::Done(_))));
    assert!(listing(&dirs.input).is_empty());
    assert!(!listing(&dirs.output)
        .iter()
        .any(|name| name.starts_with("-original_0_")));
}

#[tokio::test]
async fn service_failure_is_reported_and_original_kept() {
    let dirs = dirs();
    std::fs::write(dirs.input.join("clip.mov"), b"movie").expect("write");

    let (_handle, events) = Watcher::start(options(&dirs), Arc::new(FakeService::failing()));
    let events = collect(events).await;

    assert_eq!(events.len(), 2, "got: {events:?}");
    assert!(matches!(events[0], WatchEvent::Change(_)));
    match &events[1] {
        WatchEvent::Error(WatchError::Assembly { path, source }) => {
            assert!(path.ends_with("clip.mov"));
            assert!(source.to_string().contains("503"));
        }
        other => panic!("expected assembly error, got {other:?}"),
    }
    assert_eq!(listing(&dirs.input), vec!["clip.mov"]);
}

#[tokio::test]
async fn every_file_gets_its_own_change_and_outcome() {
    let dirs = dirs();
    for name in ["a.mov", "b.mov", "c.mov", "d.mov", "e.mov"] {
        std::fs::write(dirs.input.join(name), name).expect("write");
    }
    let mut options = options(&dirs);
    options.concurrency = 2;

    let (_handle, events) = Watcher::start(options, Arc::new(FakeService::default()));
    let events = collect(events).await;

    let changes = events
        .iter()
        .filter(|e| matches!(e, WatchEvent::Change(_)))
        .count();
    let done: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            WatchEvent::Done(info) => Some(info.uploads[0].name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(changes, 5);
    assert_eq!(done.len(), 5);

    // Per file, the change precedes the outcome.
    for name in ["a.mov", "b.mov", "c.mov", "d.mov", "e.mov"] {
        let change_at = events
            .iter()
            .position(|e| matches!(e, WatchEvent::Change(p) if p.ends_with(name)))
            .expect("change");
        let done_at = events
            .iter()
            .position(|e| matches!(e, WatchEvent::Done(info) if info.uploads[0].name == name))
            .expect("done");
        assert!(change_at < done_at, "{name}: change must precede done");
    }
}

#[tokio::test]
async fn template_file_steps_are_sent_instead_of_template_id() {
    let dirs = dirs();
    std::fs::write(dirs.input.join("clip.mov"), b"movie").expect("write");
    let steps = Steps::from_value(serde_json::json!({ "encode": { "robot": "/video/encode" } }))
        .expect("steps");
    let mut options = options(&dirs);
    options.template = TemplateSource::Steps {
        path: PathBuf::from("/tmp/steps.json"),
        steps: steps.clone(),
    };
    let service = Arc::new(FakeService::default());

    let (_handle, events) = Watcher::start(options, service.clone());
    collect(events).await;

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0.steps.as_ref(), Some(&steps));
    assert!(requests[0].0.template_id.is_none());
    assert_eq!(requests[0].1, "clip.mov");
}

#[tokio::test]
async fn skip_initial_scan_leaves_existing_files_alone() {
    let dirs = dirs();
    std::fs::write(dirs.input.join("clip.mov"), b"movie").expect("write");
    let mut options = options(&dirs);
    options.skip_initial_scan = true;
    let service = Arc::new(FakeService::default());

    let (_handle, events) = Watcher::start(options, service.clone());
    let events = collect(events).await;

    assert!(events.is_empty(), "got: {events:?}");
    assert!(service.requests().is_empty());
    assert_eq!(listing(&dirs.input), vec!["clip.mov"]);
}

#[tokio::test]
async fn missing_input_directory_reports_error_and_ends() {
    let dirs = dirs();
    let mut options = options(&dirs);
    options.input = dirs.input.join("does-not-exist");

    let (_handle, events) = Watcher::start(options, Arc::new(FakeService::default()));
    let events = collect(events).await;

    assert_eq!(events.len(), 1, "got: {events:?}");
    assert!(matches!(events[0], WatchEvent::Error(WatchError::Io { .. })));
}

// ---------------------------------------------------------------------------
// Watch mode
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_mode_picks_up_new_files_until_shutdown() {
    let dirs = dirs();
    let mut options = options(&dirs);
    options.watch = true;
    options.debounce = Duration::from_millis(100);
    let service = Arc::new(FakeService::default());

    let (handle, mut events) = Watcher::start(options, service.clone());

    // Give the notify backend a moment to register the directory.
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(dirs.input.join("late.mov"), b"late").expect("write");

    let mut seen = Vec::new();
    let outcome = tokio::time::timeout(Duration::from_secs(15), async {
        while let Some(event) = events.recv().await {
            let finished = matches!(event, WatchEvent::Done(_) | WatchEvent::Error(_));
            seen.push(event);
            if finished {
                break;
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "no outcome for new file; saw {seen:?}");
    assert!(matches!(seen.first(), Some(WatchEvent::Change(p)) if p.ends_with("late.mov")));
    assert!(matches!(seen.last(), Some(WatchEvent::Done(_))), "saw {seen:?}");
    assert!(dirs.output.join("-original_0_late.mov").exists());

    handle.shutdown();
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok(), "stream must end after shutdown");
    assert_eq!(service.requests().len(), 1, "file must be converted once");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_handle_keeps_watching() {
    let dirs = dirs();
    let mut options = options(&dirs);
    options.watch = true;
    options.debounce = Duration::from_millis(100);

    let (_, mut events) = Watcher::start(options, Arc::new(FakeService::default()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(dirs.input.join("late.mov"), b"late").expect("write");

    let first = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("watcher went quiet");
    assert!(
        matches!(&first, Some(WatchEvent::Change(p)) if p.ends_with("late.mov")),
        "got {first:?}"
    );
    let second = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no outcome");
    assert!(matches!(second, Some(WatchEvent::Done(_))), "got {second:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_rewritten_during_conversion_is_converted_again() {
    let dirs = dirs();
    let path = dirs.input.join("clip.mov");
    std::fs::write(&path, b"first").expect("write");
    let mut options = options(&dirs);
    options.watch = true;
    options.debounce = Duration::from_millis(100);
    let gate = Arc::new(Semaphore::new(0));
    let service = Arc::new(FakeService::gated(gate.clone()));

    let (handle, mut events) = Watcher::start(options, service.clone());

    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while service.requests().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "first upload never started");

    std::fs::write(&path, b"second version").expect("rewrite");
    // Long enough for several ticks to see the change while the first job
    // is still blocked.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(service.requests().len(), 1, "same path must not run twice at once");

    gate.add_permits(10);

    let mut done = 0;
    let mut seen = Vec::new();
    let finished = tokio::time::timeout(Duration::from_secs(15), async {
        while let Some(event) = events.recv().await {
            if matches!(event, WatchEvent::Done(_)) {
                done += 1;
            }
            seen.push(event);
            if done == 2 {
                break;
            }
        }
    })
    .await;
    assert!(finished.is_ok(), "expected two conversions, saw {seen:?}");

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].2, b"first");
    assert_eq!(requests[1].2, b"second version");
    assert!(!path.exists());
    assert_eq!(
        std::fs::read(dirs.output.join("-original_0_clip.mov")).expect("read"),
        b"second version"
    );

    handle.shutdown();
}

#[tokio::test]
async fn recursive_mode_mirrors_subdirectories() {
    let dirs = dirs();
    std::fs::write(dirs.input.join("top.mov"), b"top").expect("write");
    std::fs::create_dir_all(dirs.input.join("day1")).expect("mkdir");
    std::fs::write(dirs.input.join("day1").join("nested.mov"), b"nested").expect("write");
    let mut options = options(&dirs);
    options.recursive = true;

    let (_handle, events) = Watcher::start(options, Arc::new(FakeService::default()));
    let events = collect(events).await;

    let done = events
        .iter()
        .filter(|e| matches!(e, WatchEvent::Done(_)))
        .count();
    assert_eq!(done, 2, "got: {events:?}");
    assert!(dirs.output.join("encode_0_top.mp4").is_file());
    assert!(dirs.output.join("day1").join("encode_0_nested.mp4").is_file());
    assert!(dirs.output.join("day1").join("-original_0_nested.mov").is_file());
    assert!(!dirs.input.join("day1").join("nested.mov").exists());
}

#[tokio::test]
async fn subdirectories_are_ignored_without_recursive() {
    let dirs = dirs();
    std::fs::create_dir_all(dirs.input.join("day1")).expect("mkdir");
    std::fs::write(dirs.input.join("day1").join("nested.mov"), b"nested").expect("write");

    let (_handle, events) = Watcher::start(options(&dirs), Arc::new(FakeService::default()));
    let events = collect(events).await;

    assert!(events.is_empty(), "got: {events:?}");
    assert!(dirs.input.join("day1").join("nested.mov").exists());
}

#[tokio::test]
async fn skip_stale_leaves_files_with_newer_results_alone() {
    let dirs = dirs();
    std::fs::write(dirs.input.join("clip.mov"), b"movie").expect("write");
    std::thread::sleep(Duration::from_millis(50));
    std::fs::create_dir_all(&dirs.output).expect("mkdir out");
    std::fs::write(dirs.output.join("encode_0_clip.mp4"), b"old result").expect("write");
    let mut options = options(&dirs);
    options.skip_stale = true;
    let service = Arc::new(FakeService::default());

    let (_handle, events) = Watcher::start(options, service.clone());
    let events = collect(events).await;

    assert!(events.is_empty(), "got: {events:?}");
    assert!(service.requests().is_empty());
    assert!(dirs.input.join("clip.mov").exists());
}

#[tokio::test]
async fn skip_stale_converts_files_newer_than_their_results() {
    let dirs = dirs();
    std::fs::create_dir_all(&dirs.output).expect("mkdir out");
    std::fs::write(dirs.output.join("encode_0_clip.mp4"), b"old result").expect("write");
    std::fs::write(dirs.output.join("encode_0_other.mp4"), b"unrelated").expect("write");
    std::thread::sleep(Duration::from_millis(50));
    std::fs::write(dirs.input.join("clip.mov"), b"movie").expect("write");
    let mut options = options(&dirs);
    options.skip_stale = true;
    let service = Arc::new(FakeService::default());

    let (_handle, events) = Watcher::start(options, service.clone());
    let events = collect(events).await;

    assert!(matches!(events.last(), Some(WatchEvent::Done(_))), "got: {events:?}");
    assert_eq!(service.requests().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn existing_files_in_watch_mode_are_converted_once() {
    let dirs = dirs();
    std::fs::write(dirs.input.join("clip.mov"), b"movie").expect("write");
    let mut options = options(&dirs);
    options.watch = true;
    options.debounce = Duration::from_millis(100);
    let service = Arc::new(FakeService::default());

    let (handle, mut events) = Watcher::start(options, service.clone());
    let first_done = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = events.recv().await {
            if matches!(event, WatchEvent::Done(_)) {
                break;
            }
        }
    })
    .await;
    assert!(first_done.is_ok(), "existing file was not converted");

    // Give any trailing notifications a couple of ticks to settle.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.shutdown();
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok());
    assert_eq!(service.requests().len(), 1);
}
