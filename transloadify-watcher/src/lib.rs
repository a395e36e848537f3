//! Directory watcher: scans and watches an input directory, submits each
//! file as an assembly, and reports progress on a single event stream.

pub mod debounce;
mod error;
pub mod event;
mod job;
mod runtime;

pub use error::WatchError;
pub use event::{channel, EventSender, EventStream, WatchEvent};
pub use job::{original_file_name, result_file_name};
pub use runtime::{Watcher, WatcherHandle, TICK_INTERVAL};
