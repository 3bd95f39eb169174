//! In-process fake of an HTTP API for scenario tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vuload_core::{HttpClient, HttpRequest, HttpResponse, Method};

/// Canned reply for one route.
#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub latency: Duration,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value, latency_ms: u64) -> Self {
        Self {
            status,
            body: body.to_string(),
            latency: Duration::from_millis(latency_ms),
        }
    }
}

/// Routes `(method, path)` to canned replies. Unknown routes answer 404.
/// Every reply sleeps for its latency, so paused-time tests advance.
#[derive(Default)]
pub struct FakeApi {
    routes: Mutex<HashMap<(Method, String), Reply>>,
    transport_failures: Mutex<HashMap<(Method, String), usize>>,
    calls: AtomicUsize,
    log: Mutex<Vec<(Method, String)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, method: Method, path: &str, reply: Reply) -> Self {
        self.routes.lock().insert((method, path.to_string()), reply);
        self
    }

    /// The next `count` calls to the route fail at the transport level.
    pub fn fail_transport(self, method: Method, path: &str, count: usize) -> Self {
        self.transport_failures
            .lock()
            .insert((method, path.to_string()), count);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, method: Method, path: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }
}

fn path_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    match without_scheme.find('/') {
        Some(index) => without_scheme[index..].to_string(),
        None => "/".to_string(),
    }
}

#[async_trait]
impl HttpClient for FakeApi {
    async fn send(&self, request: HttpRequest) -> HttpResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (request.method, path_of(&request.url));
        self.log.lock().push(key.clone());

        let transport_failure = {
            let mut failures = self.transport_failures.lock();
            match failures.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if transport_failure {
            tokio::time::sleep(Duration::from_millis(5)).await;
            return HttpResponse::transport_failure("connection reset by peer", Duration::from_millis(5));
        }

        let reply = self.routes.lock().get(&key).cloned();
        match reply {
            Some(reply) => {
                tokio::time::sleep(reply.latency).await;
                HttpResponse::new(reply.status, reply.body, reply.latency)
            }
            None => {
                tokio::time::sleep(Duration::from_millis(1)).await;
                HttpResponse::new(404, "{}", Duration::from_millis(1))
            }
        }
    }
}
