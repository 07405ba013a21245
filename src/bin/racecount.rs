//! Benchmark driver: runs a concurrent increment workload against one or
//! more counter backends and prints what happened to the counter.
//!
//! Run with:
//! ```bash
//! racecount --counter-type memory --n-clients 10 --n-calls-per-client 1000 \
//!     --method no-lock,pessimistic,optimistic,serializable,atomic --do-retries
//! ```
//!
//! The exit code is always 0. Failed runs show up in the report.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use racecount::backends::{self, BackendConfig, CounterType, Method};
use racecount::logging;
use racecount::report::{Aggregator, JsonRenderer, RunReport, TableRenderer, TableStyle};
use racecount::retry::RetryPolicy;
use racecount::workload::{Runner, Workload};

/// Output format of the report.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Plain text summary
    Text,
    /// ASCII table
    Table,
    /// JSON document
    Json,
}

/// Table style selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum StyleChoice {
    Ascii,
    #[default]
    Rounded,
    Sharp,
    Modern,
    Markdown,
    Blank,
}

impl From<StyleChoice> for TableStyle {
    fn from(choice: StyleChoice) -> Self {
        match choice {
            StyleChoice::Ascii => TableStyle::Ascii,
            StyleChoice::Rounded => TableStyle::Rounded,
            StyleChoice::Sharp => TableStyle::Sharp,
            StyleChoice::Modern => TableStyle::Modern,
            StyleChoice::Markdown => TableStyle::Markdown,
            StyleChoice::Blank => TableStyle::Blank,
        }
    }
}

/// Measures throughput and lost updates of shared-counter increment
/// strategies.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Where the counter lives
    #[arg(long, value_enum)]
    counter_type: CounterType,

    /// Number of concurrent clients
    #[arg(long)]
    n_clients: usize,

    /// Number of calls each client makes
    #[arg(long)]
    n_calls_per_client: u64,

    /// Host of the remote counter service
    #[arg(long, env = "COUNTER_HOST", default_value = "localhost")]
    counter_host: String,

    /// Port of the remote counter service
    #[arg(long, env = "COUNTER_PORT", default_value_t = 8080)]
    counter_port: u16,

    /// Concurrency-control methods to run, comma separated
    #[arg(long, value_enum, value_delimiter = ',', default_value = "no-lock")]
    method: Vec<Method>,

    /// Retry transient contention with exponential backoff
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    do_retries: bool,

    /// Attempts per increment when retries are enabled
    #[arg(long, default_value_t = RetryPolicy::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Compare-and-swap attempts per optimistic round
    #[arg(long, default_value_t = BackendConfig::DEFAULT_MAX_CAS_ATTEMPTS)]
    max_cas_attempts: u32,

    /// Counter key
    #[arg(long, default_value = BackendConfig::DEFAULT_KEY)]
    key: String,

    /// Directory of the file store
    #[arg(long, env = "STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    /// Give up on a held key lock after this many milliseconds
    #[arg(long)]
    lock_timeout_ms: Option<u64>,

    /// Simulated latency of every memory-store call, in microseconds
    #[arg(long)]
    store_latency_us: Option<u64>,

    /// Timeout of a single remote request, in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Table style (for the table format)
    #[arg(short, long, value_enum, default_value = "rounded")]
    style: StyleChoice,

    /// Include the per-worker breakdown (for the table format)
    #[arg(long)]
    show_workers: bool,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,

    /// Human readable logs instead of JSON lines
    #[arg(long)]
    pretty_logs: bool,

    /// Log directives, overridden by RUST_LOG
    #[arg(long, default_value = logging::DEFAULT_DIRECTIVES)]
    log_directives: String,
}

impl Args {
    fn workload(&self) -> Workload {
        Workload::new(self.n_clients, self.n_calls_per_client)
    }

    fn methods(&self) -> Vec<Method> {
        let mut methods = Vec::new();
        for method in &self.method {
            if !methods.contains(method) {
                methods.push(*method);
            }
        }
        // The remote service picks its own method.
        if self.counter_type == CounterType::Http {
            methods.truncate(1);
        }
        methods
    }

    fn backend_config(&self, method: Method) -> BackendConfig {
        let retry = if self.do_retries {
            RetryPolicy::new().with_max_attempts(self.max_attempts)
        } else {
            RetryPolicy::disabled()
        };
        let mut config = BackendConfig::new(self.counter_type)
            .with_method(method)
            .with_key(self.key.clone())
            .with_retry_policy(retry)
            .with_max_cas_attempts(self.max_cas_attempts)
            .with_lock_timeout(self.lock_timeout_ms.map(Duration::from_millis))
            .with_store_latency(self.store_latency_us.map(Duration::from_micros))
            .with_host(self.counter_host.clone())
            .with_port(self.counter_port)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs));
        if let Some(path) = &self.storage_path {
            config = config.with_storage_path(path);
        }
        config
    }
}

fn label(config: &BackendConfig) -> String {
    match config.counter_type {
        CounterType::Http => CounterType::Http.to_string(),
        counter_type => format!("{counter_type}/{}", config.method),
    }
}

/// Runs one workload; never fails, an aborted run yields an aborted report.
fn run_one(config: &BackendConfig, workload: Workload) -> RunReport {
    let aggregator = Aggregator::new(label(config), workload);

    let counter = match backends::setup(config) {
        Ok(counter) => counter,
        Err(err) => {
            tracing::error!(error = %err, "backend setup failed");
            return aggregator.aborted(err.to_string());
        }
    };

    let report = match Runner::new(counter.as_ref(), workload).run() {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(error = %err, "run aborted");
            aggregator.aborted(err.to_string())
        }
    };
    counter.shutdown();
    report
}

fn print_reports(args: &Args, reports: &[RunReport]) {
    match args.format {
        OutputFormat::Text => {
            for report in reports {
                println!("{report}");
            }
        }
        OutputFormat::Table => {
            let renderer = TableRenderer::new()
                .with_style(args.style.into())
                .with_workers(args.show_workers);
            match reports {
                [report] => println!("{}", renderer.render(report)),
                _ => println!("{}", renderer.render_comparison(reports)),
            }
        }
        OutputFormat::Json => {
            let renderer = JsonRenderer::new().pretty(args.pretty);
            let json = match reports {
                [report] => renderer.render(report),
                _ => renderer.render_all(reports),
            };
            match json {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::error!(error = %err, "failed to encode report"),
            }
        }
    }
}

fn main() {
    let args = Args::parse();
    logging::setup_logging(&args.log_directives, args.pretty_logs);

    let workload = args.workload();
    tracing::info!(
        counter_type = %args.counter_type,
        n_clients = workload.n_workers,
        n_calls_per_client = workload.calls_per_worker,
        do_retries = args.do_retries,
        "starting performance test"
    );

    let reports: Vec<RunReport> = args
        .methods()
        .into_iter()
        .map(|method| run_one(&args.backend_config(method), workload))
        .collect();

    print_reports(&args, &reports);
}
