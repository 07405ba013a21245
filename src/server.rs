//! HTTP counter service.
//!
//! Exposes any [`CounterBackend`] over the remote-counter wire surface, so
//! an [`HttpCounter`](crate::backends::HttpCounter) on another host can
//! drive it:
//!
//! | Route | Success | Failure |
//! |-------|---------|---------|
//! | `POST /reset` | `200 {"status":"ok"}` | `500` |
//! | `POST /inc` | `200 {"status":"ok"}` | `503` |
//! | `GET /count` | `200 {"count": n}` | never |
//!
//! Backend calls block (locks, file I/O, simulated latency), so each one runs
//! on tokio's blocking pool instead of an async worker.

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::backends::{CountResponse, CounterBackend};

/// Counter shared by every request handler.
pub type SharedCounter = Arc<dyn CounterBackend>;

/// Body of the `POST` routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `ok` or `error`.
    pub status: String,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    fn error() -> Self {
        Self {
            status: "error".to_string(),
        }
    }
}

/// Routes of the counter service.
pub fn router(counter: SharedCounter) -> Router {
    Router::new()
        .route("/reset", post(reset))
        .route("/inc", post(increment))
        .route("/count", get(count))
        .with_state(counter)
}

/// Serves `counter` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, counter: SharedCounter, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, backend = %counter.name(), "counter service listening");
    }
    axum::serve(listener, router(counter))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Runs a blocking backend call on the blocking pool.
async fn blocking<T, F>(counter: SharedCounter, call: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn CounterBackend) -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(counter.as_ref())).await {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!(error = %err, "counter call panicked");
            None
        }
    }
}

async fn reset(State(counter): State<SharedCounter>) -> (StatusCode, Json<StatusResponse>) {
    match blocking(counter, |counter| counter.reset()).await {
        Some(true) => (StatusCode::OK, Json(StatusResponse::ok())),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusResponse::error()),
        ),
    }
}

async fn increment(State(counter): State<SharedCounter>) -> (StatusCode, Json<StatusResponse>) {
    match blocking(counter, |counter| counter.increment()).await {
        Some(true) => (StatusCode::OK, Json(StatusResponse::ok())),
        _ => (StatusCode::SERVICE_UNAVAILABLE, Json(StatusResponse::error())),
    }
}

async fn count(State(counter): State<SharedCounter>) -> Json<CountResponse> {
    let count = blocking(counter, |counter| counter.read()).await.unwrap_or(0);
    Json(CountResponse { count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{self, BackendConfig, Method};

    fn counter() -> SharedCounter {
        let config = BackendConfig::default().with_method(Method::Pessimistic);
        Arc::from(backends::setup(&config).unwrap())
    }

    #[tokio::test]
    async fn test_increment_and_count() {
        let counter = counter();
        for _ in 0..3 {
            let (status, Json(body)) = increment(State(Arc::clone(&counter))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, StatusResponse::ok());
        }
        let Json(body) = count(State(Arc::clone(&counter))).await;
        assert_eq!(body.count, 3);

        let (status, _) = reset(State(Arc::clone(&counter))).await;
        assert_eq!(status, StatusCode::OK);
        let Json(body) = count(State(counter)).await;
        assert_eq!(body.count, 0);
    }

    #[tokio::test]
    async fn test_closed_counter_statuses() {
        let counter = counter();
        counter.shutdown();

        let (status, Json(body)) = increment(State(Arc::clone(&counter))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "error");

        let (status, _) = reset(State(counter)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
