//! Spectra Bridge
//!
//! Streams live game-state events from an observer's instrumentation feed to
//! the Spectra ingest server over a WebSocket.
//!
//! # Architecture
//!
//! - **Session connector**: one connection per session, an `auth` handshake,
//!   and an explicit state machine that gates every send
//! - **Event dispatcher**: classifies provider events by key, tracks the
//!   current round, formats payloads and forwards them through the connector
//! - **Sans-IO core**: the connector and dispatcher never touch a socket; the
//!   WebSocket driver feeds them events on a single task
//! - **Failure isolation**: a malformed event is logged and skipped, and every
//!   transport failure ends in a closed session
//!
//! # Usage
//!
//! ```no_run
//! use spectra_bridge::config::BridgeConfig;
//! use spectra_bridge::connectors::{IngestSession, SessionIdentity, Team};
//! use spectra_bridge::presentation::LogPresenter;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let identity = SessionIdentity::new("Observer", "ABC123", Team::default(), Team::default());
//!     let (_feed_tx, feed_rx) = mpsc::channel(256);
//!
//!     let session = IngestSession::new(BridgeConfig::default(), LogPresenter::new());
//!     let report = session.run(identity, feed_rx).await;
//!     println!("session ended: {:?}", report.state);
//! }
//! ```

pub mod config;
pub mod connectors;
pub mod dispatch;
pub mod events;
pub mod feed;
pub mod presentation;
pub mod utils;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use connectors::{ConnectionState, IngestSession, SessionConnector, SessionIdentity, Team};
pub use dispatch::EventDispatcher;
pub use events::{FeedBatch, OutgoingMessage, RawEvent};
