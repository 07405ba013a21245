//! Logging setup for the binaries, on top of `tracing_subscriber`.
//!
//! Events go to stderr so the report on stdout stays machine readable.
//! `RUST_LOG`, when set, overrides the directives passed on the command
//! line.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter directives.
pub const DEFAULT_DIRECTIVES: &str = "info,racecount=info";

/// Sets up logging in either JSON or pretty format.
///
/// # Arguments
///
/// - `directives` - `EnvFilter` directives used when `RUST_LOG` is unset
/// - `pretty` - human readable output instead of JSON lines
pub fn setup_logging(directives: &str, pretty: bool) {
    match pretty {
        true => setup_logging_pretty(directives),
        false => setup_logging_json(directives),
    }
}

fn filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

fn setup_logging_json(directives: &str) {
    let main_layer = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_current_span(false)
        .with_span_list(true)
        .with_line_number(true)
        .with_file(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter(directives))
        .with(main_layer)
        .init()
}

fn setup_logging_pretty(directives: &str) {
    let main_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter(directives))
        .with(main_layer)
        .init()
}
