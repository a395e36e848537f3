//! # transloadify-client
//!
//! Minimal Transloadit API client: signed assembly creation with a single
//! file upload, status polling until completion, and result download.
//!
//! The watcher talks to the service only through [`AssemblyService`], so it
//! can be driven by a fake in tests.

pub mod client;
pub mod error;
pub mod signature;
pub mod types;

pub use client::{Client, ClientConfig, DEFAULT_ENDPOINT};
pub use error::{ClientError, ClientResult};
pub use types::{AssemblyInfo, AssemblyRequest, AssemblyStatus, FileInfo};

use std::path::Path;

use async_trait::async_trait;

/// The operations the watcher needs from the processing service.
#[async_trait]
pub trait AssemblyService: Send + Sync {
    /// Create an assembly for `request` and upload `file` as its only input.
    async fn create_assembly(
        &self,
        request: &AssemblyRequest,
        file: &Path,
    ) -> ClientResult<AssemblyInfo>;

    /// Wait until the assembly reaches a terminal state.
    ///
    /// Returns the final status on completion, an error on failure or
    /// cancellation.
    async fn wait_for_assembly(&self, info: AssemblyInfo) -> ClientResult<AssemblyInfo>;

    /// Download `url` to `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> ClientResult<u64>;
}
