//! Transloadit HTTP client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use transloadify_core::Credentials;

use crate::error::{io_err, ClientError, ClientResult};
use crate::signature;
use crate::types::{AssemblyInfo, AssemblyRequest, AuthParams, SignedParams};
use crate::AssemblyService;

pub const DEFAULT_ENDPOINT: &str = "https://api2.transloadit.com";

/// Configuration for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    /// Base URL of the service, without a trailing slash.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Delay between status polls while waiting for an assembly.
    pub poll_interval: Duration,
    /// Lifetime of each request signature.
    pub signature_ttl: Duration,
}

impl ClientConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            signature_ttl: Duration::from_secs(3600),
        }
    }
}

/// Client for the Transloadit assembly API.
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    /// Create a new client. Fails on empty credentials or a malformed
    /// endpoint.
    pub fn new(mut config: ClientConfig) -> ClientResult<Self> {
        if config.credentials.key.trim().is_empty() {
            return Err(ClientError::Config("auth key is empty".to_string()));
        }
        if config.credentials.secret.trim().is_empty() {
            return Err(ClientError::Config("auth secret is empty".to_string()));
        }
        let endpoint = config.endpoint.trim().trim_end_matches('/').to_string();
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(ClientError::Config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                config.endpoint
            )));
        }
        config.endpoint = endpoint;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Network)?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Serialize and sign `request`, returning `(params, signature)`.
    pub fn signed_params(&self, request: &AssemblyRequest) -> ClientResult<(String, String)> {
        let params = SignedParams {
            auth: AuthParams {
                key: self.config.credentials.key.clone(),
                expires: signature::expires_at(Utc::now(), self.config.signature_ttl),
            },
            request,
        };
        let params = serde_json::to_string(&params)?;
        let signature = signature::sign(&self.config.credentials.secret, &params)?;
        Ok((params, signature))
    }

    /// Fetch the current status of an assembly.
    pub async fn get_assembly(&self, url: &str) -> ClientResult<AssemblyInfo> {
        let response = self.http.get(url).send().await?;
        parse_response(response).await
    }
}

#[async_trait]
impl AssemblyService for Client {
    async fn create_assembly(
        &self,
        request: &AssemblyRequest,
        file: &Path,
    ) -> ClientResult<AssemblyInfo> {
        let (params, signature) = self.signed_params(request)?;

        let handle = tokio::fs::File::open(file)
            .await
            .map_err(|e| io_err(file, e))?;
        let length = handle
            .metadata()
            .await
            .map_err(|e| io_err(file, e))?
            .len();
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let part = Part::stream_with_length(handle, length).file_name(file_name);

        let form = Form::new()
            .text("params", params)
            .text("signature", signature)
            .part("file", part);

        let url = format!("{}/assemblies", self.config.endpoint);
        debug!(url = %url, file = %file.display(), bytes = length, "creating assembly");

        let response = self.http.post(&url).multipart(form).send().await?;
        let info = parse_response(response).await?;
        if let Some(reason) = info.failure() {
            return Err(ClientError::AssemblyFailed {
                id: info.id().to_string(),
                reason,
            });
        }
        Ok(info)
    }

    async fn wait_for_assembly(&self, mut info: AssemblyInfo) -> ClientResult<AssemblyInfo> {
        let url = info
            .status_url()
            .ok_or(ClientError::MissingField("assembly_ssl_url"))?
            .to_string();

        loop {
            if let Some(reason) = info.failure() {
                return Err(ClientError::AssemblyFailed {
                    id: info.id().to_string(),
                    reason,
                });
            }
            if info.status().is_terminal() {
                return Ok(info);
            }
            debug!(assembly = info.id(), status = %info.status(), "waiting for assembly");
            tokio::time::sleep(self.config.poll_interval).await;
            info = self.get_assembly(&url).await?;
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> ClientResult<u64> {
        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Stream into `<dest>.part`, then rename so readers never see a
        // truncated result.
        let partial = PathBuf::from(format!("{}.part", dest.display()));
        let mut out = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| io_err(&partial, e))?;
        let mut written = 0u64;
        let streamed: ClientResult<()> = async {
            while let Some(chunk) = response.chunk().await? {
                out.write_all(&chunk)
                    .await
                    .map_err(|e| io_err(&partial, e))?;
                written += chunk.len() as u64;
            }
            out.flush().await.map_err(|e| io_err(&partial, e))?;
            Ok(())
        }
        .await;

        if let Err(err) = streamed {
            drop(out);
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                warn!(path = %partial.display(), error = %cleanup, "failed to remove partial download");
            }
            return Err(err);
        }
        drop(out);

        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| io_err(dest, e))?;
        Ok(written)
    }
}

async fn parse_response(response: reqwest::Response) -> ClientResult<AssemblyInfo> {
    let status = response.status();
    let body = response.text().await?;
    match serde_json::from_str::<AssemblyInfo>(&body) {
        // The service reports assembly errors as JSON with a 4xx/5xx status;
        // keep the structured error when there is one.
        Ok(info) if status.is_success() || info.error.is_some() => Ok(info),
        Ok(_) => Err(ClientError::Status {
            status: status.as_u16(),
            body,
        }),
        Err(_) if !status.is_success() => Err(ClientError::Status {
            status: status.as_u16(),
            body,
        }),
        Err(err) => Err(ClientError::Json(err)),
    }
}
