//! Counter service binary.
//!
//! Serves one store-backed counter over HTTP (`POST /reset`, `POST /inc`,
//! `GET /count`) until interrupted with Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser};
use racecount::backends::{self, BackendConfig, CounterType, Method};
use racecount::logging;
use racecount::server::{self, SharedCounter};
use tokio::net::TcpListener;

/// The arguments for the counter service.
#[derive(Parser, Debug)]
#[command(author, version, about = "Serve a shared counter over HTTP", long_about = None)]
pub struct Cli {
    /// Server arguments.
    #[command(flatten)]
    pub server: ServerArgs,
    /// Counter arguments.
    #[command(flatten)]
    pub counter: CounterArgs,
    /// General arguments.
    #[command(flatten)]
    pub general: GeneralArgs,
}

/// Server related arguments.
#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Host.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port to run on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
}

/// Counter related arguments.
#[derive(Args, Debug)]
pub struct CounterArgs {
    /// Store backing the counter.
    #[arg(long, value_enum, env = "STORAGE_METHOD", default_value = "memory")]
    pub storage: CounterType,
    /// Directory of the file store.
    #[arg(long, env = "STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,
    /// Concurrency-control method applied to increments.
    #[arg(long, value_enum, default_value = "pessimistic")]
    pub method: Method,
    /// Counter key.
    #[arg(long, default_value = BackendConfig::DEFAULT_KEY)]
    pub key: String,
    /// Retry transient contention with exponential backoff.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    pub do_retries: bool,
    /// Give up on a held key lock after this many milliseconds.
    #[arg(long)]
    pub lock_timeout_ms: Option<u64>,
    /// Simulated latency of every memory-store call, in microseconds.
    #[arg(long)]
    pub store_latency_us: Option<u64>,
}

/// General arguments.
#[derive(Args, Debug)]
pub struct GeneralArgs {
    /// Whether to use pretty log printing.
    #[arg(long, default_value = "false")]
    pub pretty_logs: bool,
    /// Log directives.
    #[arg(long, default_value = logging::DEFAULT_DIRECTIVES)]
    pub log_directives: String,
}

impl CounterArgs {
    fn backend_config(&self) -> BackendConfig {
        let mut config = BackendConfig::new(self.storage)
            .with_method(self.method)
            .with_key(self.key.clone())
            .with_retries(self.do_retries)
            .with_lock_timeout(self.lock_timeout_ms.map(Duration::from_millis))
            .with_store_latency(self.store_latency_us.map(Duration::from_micros));
        if let Some(path) = &self.storage_path {
            config = config.with_storage_path(path);
        }
        config
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() {
    let Cli {
        server: ServerArgs { host, port },
        counter,
        general: GeneralArgs {
            pretty_logs,
            log_directives,
        },
    } = Cli::parse();

    logging::setup_logging(&log_directives, pretty_logs);

    if counter.storage == CounterType::Http {
        tracing::error!("the counter service needs a local store, not http");
        return;
    }

    let backend: SharedCounter = match backends::setup(&counter.backend_config()) {
        Ok(backend) => Arc::from(backend),
        Err(err) => {
            tracing::error!(error = %err, "failed to set up the counter");
            return;
        }
    };

    let addr = format!("{host}:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "failed to bind");
            backend.shutdown();
            return;
        }
    };

    if let Err(err) = server::serve(listener, Arc::clone(&backend), shutdown_signal()).await {
        tracing::error!(error = %err, "counter service failed");
    }
    backend.shutdown();
}
