//! Quiet-period debouncing for file change events.
//!
//! A path is released once no event has been seen for it for the whole
//! window; every new event restarts its timer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct Debouncer {
    pending: HashMap<PathBuf, Instant>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Record an event for `path` seen at `now`.
    pub fn mark(&mut self, path: &Path, now: Instant) {
        self.pending.insert(path.to_path_buf(), now);
    }

    /// Remove and return every path that has been quiet for the window,
    /// sorted for stable processing order.
    pub fn take_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let window = self.window;
        let mut ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, seen_at)| now.duration_since(**seen_at) > window)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.pending.remove(path);
        }
        ready.sort();
        ready
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
