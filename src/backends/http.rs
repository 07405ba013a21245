//! Client for a remote counter service.
//!
//! The service exposes three routes:
//!
//! | Route | Success | Meaning |
//! |-------|---------|---------|
//! | `POST /reset` | `200` | counter set to 0 |
//! | `POST /inc` | `200` | one increment durably applied |
//! | `GET /count` | `200`, `{"count": n}` | current value |
//!
//! Any other status, and any transport error, is a failed call. Which
//! concurrency-control method the increments use is decided by the server.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::backends::{BackendConfig, CounterBackend};
use crate::error::{CounterError, Result};

/// Body of `GET /count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    /// Current counter value.
    pub count: i64,
}

/// Counter handle backed by a remote service.
pub struct HttpCounter {
    client: Client,
    base_url: String,
    closed: AtomicBool,
}

impl fmt::Debug for HttpCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCounter")
            .field("base_url", &self.base_url)
            .field("closed", &self.closed)
            .finish()
    }
}

impl HttpCounter {
    /// Connects to the service at `base_url` (e.g. `http://localhost:8080`).
    ///
    /// Probes `GET /count` once and fails with [`CounterError::Connection`]
    /// if the service does not answer.
    pub fn connect(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build()?;
        let counter = Self {
            client,
            base_url,
            closed: AtomicBool::new(false),
        };
        let count = counter.count().map_err(|err| {
            CounterError::Connection(format!("cannot reach {}: {err}", counter.base_url))
        })?;
        tracing::info!(url = %counter.base_url, count, "connected to counter service");
        Ok(counter)
    }

    /// Connects to `http://{host}:{port}` from `config`.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::connect(
            format!("http://{}:{}", config.host, config.port),
            config.request_timeout,
        )
    }

    /// Base URL of the service.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn count(&self) -> Result<i64> {
        let response = self.client.get(self.url("/count")).send()?;
        if response.status() != StatusCode::OK {
            return Err(CounterError::Status(response.status().as_u16()));
        }
        let body: CountResponse = response
            .json()
            .map_err(|err| CounterError::Malformed(err.to_string()))?;
        Ok(body.count)
    }

    fn post(&self, path: &str) -> Result<()> {
        let response = self.client.post(self.url(path)).send()?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(CounterError::Status(status.as_u16())),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl CounterBackend for HttpCounter {
    fn name(&self) -> String {
        "http".to_string()
    }

    fn reset(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.post("/reset") {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(url = %self.base_url, error = %err, "failed to reset remote counter");
                false
            }
        }
    }

    fn read(&self) -> i64 {
        if self.is_closed() {
            return 0;
        }
        self.count().unwrap_or_else(|err| {
            tracing::warn!(url = %self.base_url, error = %err, "failed to read remote counter");
            0
        })
    }

    fn increment(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.post("/inc") {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(url = %self.base_url, error = %err, "remote increment failed");
                false
            }
        }
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(url = %self.base_url, "remote counter closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn count_body(count: i64) -> String {
        serde_json::to_string(&CountResponse { count }).unwrap()
    }

    #[test]
    fn test_connect_probes_count() {
        let mut server = mockito::Server::new();
        let probe = server
            .mock("GET", "/count")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(count_body(3))
            .expect(2)
            .create();

        let counter = HttpCounter::connect(server.url(), TIMEOUT).unwrap();
        assert_eq!(counter.read(), 3);
        probe.assert();
    }

    #[test]
    fn test_connect_fails_on_unreachable() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/count").with_status(500).create();

        let err = HttpCounter::connect(server.url(), TIMEOUT).unwrap_err();
        assert!(matches!(err, CounterError::Connection(_)));
    }

    #[test]
    fn test_increment_and_reset_status() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/count")
            .with_status(200)
            .with_body(count_body(0))
            .create();
        let inc = server.mock("POST", "/inc").with_status(200).expect(2).create();
        server.mock("POST", "/reset").with_status(500).create();

        let counter = HttpCounter::connect(format!("{}/", server.url()), TIMEOUT).unwrap();
        assert!(counter.increment());
        assert!(counter.increment());
        assert!(!counter.reset());
        inc.assert();
    }

    #[test]
    fn test_failed_increment_status() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/count")
            .with_status(200)
            .with_body(count_body(0))
            .create();
        server.mock("POST", "/inc").with_status(503).create();

        let counter = HttpCounter::connect(server.url(), TIMEOUT).unwrap();
        assert!(!counter.increment());
    }

    #[test]
    fn test_malformed_count_reads_zero() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/count")
            .with_status(200)
            .with_body(count_body(1))
            .expect(1)
            .create();
        let counter = HttpCounter::connect(server.url(), TIMEOUT).unwrap();

        server.reset();
        server
            .mock("GET", "/count")
            .with_status(200)
            .with_body("{\"total\": 1}")
            .create();
        assert_eq!(counter.read(), 0);
    }

    #[test]
    fn test_closed_counter_does_not_call_out() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/count")
            .with_status(200)
            .with_body(count_body(0))
            .create();
        let inc = server.mock("POST", "/inc").expect(0).create();

        let counter = HttpCounter::connect(server.url(), TIMEOUT).unwrap();
        counter.shutdown();
        counter.shutdown();
        assert!(!counter.increment());
        assert_eq!(counter.read(), 0);
        inc.assert();
    }
}
