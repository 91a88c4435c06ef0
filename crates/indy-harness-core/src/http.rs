//! HTTP collaborator used by every workflow.
//!
//! # Design
//! - One `reqwest` client per run; connections are never pooled so a slow
//!   peer cannot pin a worker (`Connection: close`).
//! - Calls report `(body, status, success)` instead of failing; transport and
//!   authentication problems are logged and reported as status `0`.
//! - Request timeouts belong here, not to the orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONNECTION, HeaderMap, HeaderValue};
use reqwest::{Body, Client};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::error::{HarnessError, HarnessResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Status reported when no response was received.
pub const STATUS_UNKNOWN: u16 = 0;

/// HTTP verbs used against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Method {
    const fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Head => reqwest::Method::HEAD,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request payload. Files are streamed from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// In-memory text such as a JSON document.
    Text(String),
    /// File content streamed from the given path.
    File(PathBuf),
}

/// Description of a single request.
#[derive(Debug, Clone)]
pub struct RequestSpec<'a> {
    /// Absolute request URL.
    pub url: &'a str,
    /// Verb.
    pub method: Method,
    /// Whether the response body should be read.
    pub want_body: bool,
    /// Optional payload.
    pub body: Option<RequestBody>,
    /// Extra headers.
    pub headers: Vec<(&'static str, String)>,
}

impl<'a> RequestSpec<'a> {
    /// Request without body or extra headers.
    #[must_use]
    pub const fn new(url: &'a str, method: Method) -> Self {
        Self {
            url,
            method,
            want_body: false,
            body: None,
            headers: Vec::new(),
        }
    }

    /// Read the response body.
    #[must_use]
    pub const fn with_response_body(mut self) -> Self {
        self.want_body = true;
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Response body, empty unless requested.
    pub body: String,
    /// Status code, or [`STATUS_UNKNOWN`].
    pub status: u16,
    /// `false` for any status >= 400 or transport failure.
    pub success: bool,
}

impl HttpResponse {
    const fn failed() -> Self {
        Self {
            body: String::new(),
            status: STATUS_UNKNOWN,
            success: false,
        }
    }
}

/// Shared HTTP client with optional bearer-token authentication.
#[derive(Clone)]
pub struct IndyClient {
    client: Client,
    auth: Option<Arc<dyn Authenticator>>,
}

impl IndyClient {
    /// Build a client with the given timeout and authenticator.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Transport`] when the TLS backend cannot be initialised.
    pub fn new(timeout: Duration, auth: Option<Arc<dyn Authenticator>>) -> HarnessResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .default_headers(headers)
            .build()
            .map_err(|source| HarnessError::Transport {
                url: String::new(),
                source,
            })?;
        Ok(Self { client, auth })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(client: Client, auth: Option<Arc<dyn Authenticator>>) -> Self {
        Self { client, auth }
    }

    /// Underlying `reqwest` client.
    #[must_use]
    pub const fn inner(&self) -> &Client {
        &self.client
    }

    /// Perform a request, folding transport and auth errors into a failed response.
    pub async fn request(&self, spec: RequestSpec<'_>) -> HttpResponse {
        let url = spec.url.to_string();
        let method = spec.method;
        match self.send(spec).await {
            Ok(response) => {
                if !response.success {
                    warn!(?method, url = %url, status = response.status, "request not successful");
                }
                response
            }
            Err(err) => {
                warn!(?method, url = %url, error = %err.detail(), "request failed");
                HttpResponse::failed()
            }
        }
    }

    /// Perform a request, reporting transport and auth errors.
    ///
    /// # Errors
    ///
    /// Returns an error when the token cannot be obtained, the upload file cannot
    /// be opened, or no response is received.
    pub async fn send(&self, spec: RequestSpec<'_>) -> HarnessResult<HttpResponse> {
        let response = self.dispatch(&spec).await?;
        let status = response.status().as_u16();
        let success = status < 400;
        let body = if spec.want_body {
            response
                .text()
                .await
                .map_err(|source| HarnessError::Transport {
                    url: spec.url.to_string(),
                    source,
                })?
        } else {
            String::new()
        };
        debug!(method = ?spec.method, url = spec.url, status, "request completed");
        Ok(HttpResponse {
            body,
            status,
            success,
        })
    }

    async fn dispatch(&self, spec: &RequestSpec<'_>) -> HarnessResult<reqwest::Response> {
        let mut builder = self
            .client
            .request(spec.method.as_reqwest(), spec.url);
        for (name, value) in &spec.headers {
            builder = builder.header(*name, value);
        }
        if let Some(auth) = &self.auth {
            builder = builder.header(AUTHORIZATION, auth.authorization(&self.client).await?);
        }
        builder = match &spec.body {
            Some(RequestBody::Text(text)) => builder.body(text.clone()),
            Some(RequestBody::File(path)) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|source| HarnessError::io("open upload", path, source))?;
                builder.body(Body::from(file))
            }
            None => builder,
        };
        builder
            .send()
            .await
            .map_err(|source| HarnessError::Transport {
                url: spec.url.to_string(),
                source,
            })
    }

    /// `GET` returning the body.
    pub async fn get(&self, url: &str) -> HttpResponse {
        self.request(RequestSpec::new(url, Method::Get).with_response_body())
            .await
    }

    /// `PUT` of a text document.
    pub async fn put_text(&self, url: &str, body: impl Into<String>) -> HttpResponse {
        self.request(RequestSpec::new(url, Method::Put).with_body(RequestBody::Text(body.into())))
            .await
    }

    /// `POST` of a text document returning the body.
    pub async fn post_text(&self, url: &str, body: impl Into<String>) -> HttpResponse {
        self.request(
            RequestSpec::new(url, Method::Post)
                .with_response_body()
                .with_body(RequestBody::Text(body.into())),
        )
        .await
    }

    /// `POST` without payload.
    pub async fn post_empty(&self, url: &str) -> HttpResponse {
        self.request(RequestSpec::new(url, Method::Post)).await
    }

    /// `DELETE`.
    pub async fn delete(&self, url: &str) -> HttpResponse {
        self.request(RequestSpec::new(url, Method::Delete)).await
    }

    /// `true` when a `HEAD` request succeeds.
    pub async fn exists(&self, url: &str) -> bool {
        self.request(RequestSpec::new(url, Method::Head))
            .await
            .success
    }

    /// `GET` and decode a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, failure status or malformed JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> HarnessResult<T> {
        let response = self
            .send(RequestSpec::new(url, Method::Get).with_response_body())
            .await?;
        if !response.success {
            return Err(HarnessError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        serde_json::from_str(&response.body).map_err(|source| HarnessError::Json {
            origin: url.to_string(),
            source,
        })
    }

    /// Stream `url` into `dest`, creating parent directories. Returns `true`
    /// only when a success status was received and the file was written.
    pub async fn download(&self, url: &str, dest: &Path) -> bool {
        let started = Instant::now();
        match self.try_download(url, dest).await {
            Ok(Some(bytes)) => {
                info!(
                    url,
                    bytes,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "downloaded"
                );
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(url, dest = %dest.display(), error = %err.detail(), "download failed");
                false
            }
        }
    }

    async fn try_download(&self, url: &str, dest: &Path) -> HarnessResult<Option<u64>> {
        let response = self.dispatch(&RequestSpec::new(url, Method::Get)).await?;
        let status = response.status().as_u16();
        if status >= 400 {
            warn!(url, status, "cannot download file because of error response");
            return Ok(None);
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| HarnessError::io("create download dir", parent, source))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| HarnessError::io("create download file", dest, source))?;
        let mut written = 0_u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| HarnessError::Transport {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|source| HarnessError::io("write download file", dest, source))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|source| HarnessError::io("flush download file", dest, source))?;
        Ok(Some(written))
    }

    /// Stream a local file to `url` with `PUT`.
    pub async fn upload(&self, url: &str, file: &Path) -> bool {
        let started = Instant::now();
        let spec = RequestSpec::new(url, Method::Put)
            .with_body(RequestBody::File(file.to_path_buf()));
        let response = self.request(spec).await;
        if response.success {
            info!(
                url,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "uploaded"
            );
        }
        response.success
    }
}
