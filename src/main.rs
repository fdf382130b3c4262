//! Spectra Bridge - Main Entry Point
//!
//! Reads provider notifications as newline-delimited JSON on stdin and
//! streams them to the ingest server for one session.

use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{info, warn};

use spectra_bridge::config::BridgeConfig;
use spectra_bridge::connectors::{IngestSession, SessionIdentity, SessionReport};
use spectra_bridge::feed::spawn_line_feed;
use spectra_bridge::presentation::LogPresenter;
use spectra_bridge::utils::{init_telemetry, init_telemetry_json};

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: No .env file found or error loading it: {}", e);
    }

    if std::env::var("SPECTRA_LOG_JSON").is_ok() {
        init_telemetry_json();
    } else {
        init_telemetry();
    }

    let config = BridgeConfig::from_env()?;
    let identity = SessionIdentity::from_env()?;

    info!("Spectra Bridge starting");
    info!("Ingest URL: {}", config.ingest_url);
    info!("Observer: {} | Group: {}", identity.observer_name, identity.group_code);

    let report = run_session(config, identity, tokio::io::stdin)?;

    if report.remote_unreachable {
        warn!("Ingest server was not reachable");
    }
    info!(
        "Session ended in state {} after round {}",
        report.state, report.round_number
    );
    Ok(())
}

/// Runs one session on a current-thread runtime and returns once it closes.
///
/// The runtime is shut down in the background so a feed read that is still
/// blocked (stdin) does not hold the process open.
fn run_session<R, I>(
    config: BridgeConfig,
    identity: SessionIdentity,
    input: I,
) -> anyhow::Result<SessionReport>
where
    R: AsyncRead + Unpin + Send + 'static,
    I: FnOnce() -> R,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let report = runtime.block_on(async move {
        let (feed_tx, feed_rx) = mpsc::channel(config.feed_capacity);
        let feed_task = spawn_line_feed(input(), feed_tx);

        let session = IngestSession::new(config, LogPresenter::new())
            .on_player_name(|name| info!("Observing as player: {}", name));
        let report = session.run(identity, feed_rx).await;

        feed_task.abort();
        report
    });

    runtime.shutdown_timeout(Duration::from_millis(100));
    Ok(report)
}
