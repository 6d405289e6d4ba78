// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Grafana resource client.
//!
//! Per-kind operations against Grafana's REST API: list, fetch, create, and
//! delete. Every operation is a single attempt. Retrying is left to the
//! caller, i.e., the reconciliation engine in [`keeper`](crate::keeper).
//!
//! Grafana answers every successful call with status 200. Any other status
//! is reported as [`ClientError::UpstreamStatus`].

use crate::{
    checksum::PayloadError,
    resource::{ResourceKey, ResourceKind, ResourceSummary},
};

use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client, Method, RequestBuilder, StatusCode, Url,
};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Layer of indirection for Grafana object access.
#[allow(async_fn_in_trait)]
pub trait ResourceClient {
    /// List every object of target kind in listing order.
    async fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceSummary>>;

    /// Fetch full payload of one object.
    async fn fetch_payload(&self, kind: ResourceKind, key: &ResourceKey) -> Result<Vec<u8>>;

    /// Create new object from payload.
    ///
    /// Grafana assigns fresh identity fields to the new object, so the
    /// payload should be sanitized beforehand.
    async fn create_from_payload(&self, kind: ResourceKind, payload: &[u8]) -> Result<()>;

    /// Delete one object.
    async fn delete_by_key(&self, kind: ResourceKind, key: &ResourceKey) -> Result<()>;

    /// Create new object from work directory file.
    ///
    /// File content is posted verbatim. Files in the work directory were
    /// sanitized when they were saved.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Filesystem`] if file cannot be read.
    async fn create_from_file(&self, kind: ResourceKind, path: &Path) -> Result<()> {
        let payload = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Filesystem {
                source,
                path: path.to_path_buf(),
            })?;
        self.create_from_payload(kind, &payload).await
    }
}

/// Resource client over Grafana's HTTP API.
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    base: String,
    username: Option<String>,
    password: Option<String>,
    http: Client,
}

impl GrafanaClient {
    /// Construct new Grafana client.
    ///
    /// Userinfo of the base URL is stripped from the URL itself and sent as
    /// HTTP basic authentication with every request instead.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Transport`] if HTTP client cannot be built.
    pub fn new(mut base: Url) -> Result<Self> {
        let username = Some(base.username().to_string()).filter(|name| !name.is_empty());
        let password = base.password().map(ToString::to_string);
        // INVARIANT: Clearing userinfo only fails for URLs without a host,
        // which configuration already rejects.
        let _ = base.set_username("");
        let _ = base.set_password(None);

        // INVARIANT: Endpoints are appended to base, so it must end with '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base: base.to_string(),
            username,
            password,
            http: Client::builder().build()?,
        })
    }

    /// Base URL that endpoints are resolved against, without credentials.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base, endpoint);
        debug!("{method} {url}");
        let builder = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>> {
        let response = builder.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::UpstreamStatus {
                code: status.as_u16(),
                message: status.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl ResourceClient for GrafanaClient {
    #[instrument(skip(self), level = "debug")]
    async fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceSummary>> {
        let listing = self
            .send(self.request(Method::GET, kind.list_endpoint()))
            .await?;
        Ok(kind.parse_listing(listing)?)
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_payload(&self, kind: ResourceKind, key: &ResourceKey) -> Result<Vec<u8>> {
        self.send(self.request(Method::GET, &kind.item_endpoint(key)))
            .await
    }

    #[instrument(skip(self, payload), level = "debug")]
    async fn create_from_payload(&self, kind: ResourceKind, payload: &[u8]) -> Result<()> {
        let builder = self
            .request(Method::POST, kind.create_endpoint())
            .body(payload.to_vec());
        self.send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_by_key(&self, kind: ResourceKind, key: &ResourceKey) -> Result<()> {
        self.send(self.request(Method::DELETE, &kind.item_endpoint(key)))
            .await?;
        Ok(())
    }
}

fn status_hint(code: &u16) -> &'static str {
    match *code {
        401 => "[Invalid credentials] ",
        409 => "[Creating duplicate object] ",
        _ => "",
    }
}

/// Resource client error types.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network or connection failure.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Grafana answered with a status other than 200.
    #[error(
        "{}status code returned from grafana api (got: {code}, expected: 200, msg: {message})",
        status_hint(.code)
    )]
    UpstreamStatus { code: u16, message: String },

    /// Grafana answered with a payload of unexpected shape.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Work directory file cannot be read.
    #[error("failed to read {path:?}: {source}")]
    Filesystem {
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = ClientError> = std::result::Result<T, E>;
