//! The watcher's single tagged event stream.

use std::path::PathBuf;

use tokio::sync::mpsc;

use transloadify_client::AssemblyInfo;

use crate::error::WatchError;

/// Progress reported by the watcher.
///
/// For any one file the order is `Change` followed by exactly one of
/// `Done` or `Error`. Events of different files interleave freely.
#[derive(Debug)]
pub enum WatchEvent {
    /// A file was picked up and its conversion is starting.
    Change(PathBuf),
    /// A conversion finished and its results were downloaded.
    Done(AssemblyInfo),
    /// Something went wrong; the watcher keeps running.
    Error(WatchError),
}

/// Create a connected sender/stream pair.
pub fn channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventStream { rx })
}

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl EventSender {
    /// Send an event. Events sent after the stream is dropped are discarded.
    pub fn emit(&self, event: WatchEvent) {
        let _ = self.tx.send(event);
    }
}

/// Receiving half. Yields `None` once every sender is gone, which is the
/// watcher's completion signal.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}
