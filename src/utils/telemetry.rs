//! Telemetry and structured logging setup.
//!
//! Log lines from the session carry the group code in brackets so several
//! observers streaming to one server can be told apart. Verbosity comes from
//! RUST_LOG.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Filter used when RUST_LOG is not set.
const DEFAULT_FILTER: &str = "info,spectra_bridge=debug";

/// Initializes compact, human readable logging.
///
/// Example RUST_LOG values:
/// - `info` - All info and above
/// - `spectra_bridge=debug` - Debug for the bridge, default for others
/// - `spectra_bridge=trace,tokio_tungstenite=warn` - Trace for us, quiet socket layer
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_level(true)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initializes JSON logging, for runs whose output is collected.
pub fn init_telemetry_json() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
        .init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
