//! reqwest-backed [`HttpClient`] for vuload scenarios
//!
//! One [`ReqwestClient`] is shared by every virtual user; it owns a single
//! connection pool. Transport failures (connect, timeout, body read) come
//! back as responses with status `0` so the scenario's backoff can retry
//! them.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use vuload_core::{HttpClient, HttpConfig, HttpRequest, HttpResponse, Method};

/// Errors raised while building the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Options for [`ReqwestClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whole-request timeout, body included.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Idle connections kept per host. `None` leaves the reqwest default.
    pub max_idle_per_host: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("vuload/{}", env!("CARGO_PKG_VERSION")),
            max_idle_per_host: None,
        }
    }
}

impl From<&HttpConfig> for ClientOptions {
    fn from(config: &HttpConfig) -> Self {
        let timeout = config.timeout();
        Self {
            timeout,
            connect_timeout: timeout.min(Duration::from_secs(10)),
            ..Self::default()
        }
    }
}

/// [`HttpClient`] on top of a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(options.user_agent);
        if let Some(idle) = options.max_idle_per_host {
            builder = builder.pool_max_idle_per_host(idle);
        }

        tracing::debug!(timeout_ms = options.timeout.as_millis() as u64, "HTTP client ready");
        Ok(Self {
            inner: builder.build()?,
        })
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self, ClientError> {
        Self::new(ClientOptions::from(config))
    }

    /// Wrap an already configured reqwest client.
    pub fn with_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    async fn try_send(&self, request: HttpRequest) -> Result<(u16, bytes::Bytes), reqwest::Error> {
        let mut builder = self.inner.request(method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> HttpResponse {
        let method = request.method;
        let url = request.url.clone();
        let started = Instant::now();

        match self.try_send(request).await {
            Ok((status, body)) => HttpResponse::new(status, body, started.elapsed()),
            Err(e) => {
                let reason = describe(&e);
                if e.is_builder() {
                    // Retrying cannot fix a malformed URL or header.
                    tracing::warn!(%method, %url, error = %e, "{reason}, check the target URL");
                } else {
                    tracing::debug!(%method, %url, error = %e, "{reason}");
                }
                HttpResponse::transport_failure(format!("{reason}: {e}"), started.elapsed())
            }
        }
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn describe(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "connection failed"
    } else if e.is_builder() {
        "invalid request"
    } else if e.is_body() || e.is_decode() {
        "failed to read response body"
    } else {
        "request failed"
    }
}
