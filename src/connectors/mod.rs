//! Connectors for the Spectra ingest server.
//!
//! `session` holds the connection state machine and knows nothing about
//! sockets. `websocket` owns the real connection and drives the state machine
//! from socket events.

pub mod identity;
pub mod session;
pub mod websocket;

pub use identity::{SessionIdentity, Team};
pub use session::{
    ConnectionState, ConnectorEvent, IngestSink, InvalidTransition, SessionConnector, Transport,
    TransportError, TransportErrorKind,
};
pub use websocket::{ChannelTransport, IngestSession, Outbound, SessionReport};
