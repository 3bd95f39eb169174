//! HTTP boundary between scenarios and the system under test
//!
//! The core never talks to the network itself. Scenarios issue
//! [`HttpRequest`]s through an [`HttpClient`] implementation supplied by the
//! caller (`vuload-http` ships one on top of reqwest). A transport failure is
//! not an error here: it is a response with status `0`, which the backoff
//! executor treats as transient.

use crate::backoff::Transient;
use crate::error::ParseError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to issue one request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// JSON body plus the matching content type.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_vec(body)?;
        self.body = Some(Bytes::from(encoded));
        Ok(self.header("Content-Type", "application/json"))
    }
}

/// What came back, or status `0` when nothing did.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status, or `0` for a transport failure.
    pub status: u16,
    pub body: Bytes,
    /// Time from sending the request to receiving the full body.
    pub duration: Duration,
    /// Transport error description when `status == 0`.
    pub error: Option<String>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>, duration: Duration) -> Self {
        Self {
            status,
            body: body.into(),
            duration,
            error: None,
        }
    }

    /// A request that never produced a response.
    pub fn transport_failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: 0,
            body: Bytes::new(),
            duration,
            error: Some(error.into()),
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Counted as failed by `http_req_failed`: transport failure or `>= 400`.
    pub fn is_failed(&self) -> bool {
        self.status == 0 || self.status >= 400
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<Value, ParseError> {
        if self.body.is_empty() {
            return Err(ParseError::InvalidJson("empty body".to_string()));
        }
        serde_json::from_slice(&self.body).map_err(|e| ParseError::InvalidJson(e.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Transient for HttpResponse {
    fn is_transient(&self) -> bool {
        self.is_transport_failure()
    }
}

/// The HTTP action primitive scenarios are built on.
///
/// Implementations must not fail: transport errors are reported as a
/// response with status `0`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> HttpResponse;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    async fn send(&self, request: HttpRequest) -> HttpResponse {
        (**self).send(request).await
    }
}
