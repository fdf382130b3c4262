//! Session connector: handshake and connection health for one ingest session.
//!
//! The connector is sans-IO. A driver (see [`super::websocket`]) feeds it
//! transport lifecycle events and it answers through a [`Transport`] and a
//! [`Presenter`]. Every transition goes through [`ConnectionState::transition`]
//! and produces exactly one [`Notice`].
//!
//! # State Diagram
//!
//! ```text
//! ┌──────┐ begin ┌────────────┐ open ┌──────────────────────┐ auth=true ┌───────────────┐
//! │ Idle │──────▶│ Connecting │─────▶│ AwaitingAuthResponse │──────────▶│ Authenticated │
//! └──┬───┘       └─────┬──────┘      └──────────┬───────────┘           └───────┬───────┘
//!    │                 │ close                  │ auth=false / close            │ close / end
//!    │ end             ▼                        ▼                               ▼
//!    └────────────▶ ┌────────────────────────────────────────────────────────────────┐
//!                   │                            Closed                              │
//!                   └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `remote_unreachable` is orthogonal to the state: a refused connection sets
//! it and the close that follows reports the endpoint as unreachable.

use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::{AuthRequest, InboundMessage, OutgoingMessage, WireFrame};
use crate::presentation::{Notice, Presenter};

use super::identity::SessionIdentity;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    AwaitingAuthResponse,
    Authenticated,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingAuthResponse => "awaiting_auth_response",
            Self::Authenticated => "authenticated",
            Self::Closed => "closed",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Closed is terminal: a closed session never reopens.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Calculates the next state for an event.
    pub fn transition(self, event: ConnectorEvent) -> Result<Self, InvalidTransition> {
        use ConnectionState::*;
        use ConnectorEvent::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self,
            event,
            reason,
        };

        match (self, event) {
            (Closed, _) => Err(invalid("Session already closed")),

            (Idle, Begin) => Ok(Connecting),
            (_, Begin) => Err(invalid("Session already started")),

            (Connecting, TransportOpened) => Ok(AwaitingAuthResponse),
            (_, TransportOpened) => Err(invalid("Transport not connecting")),

            (AwaitingAuthResponse, AuthAccepted) => Ok(Authenticated),
            (AwaitingAuthResponse, AuthRejected) => Ok(Closed),
            (_, AuthAccepted | AuthRejected) => Err(invalid("No handshake pending")),

            (Idle, TransportClosed) => Err(invalid("Transport never opened")),
            (_, TransportClosed) => Ok(Closed),

            (_, EndSession) => Ok(Closed),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector-internal events that drive transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorEvent {
    Begin,
    TransportOpened,
    AuthAccepted,
    AuthRejected,
    TransportClosed,
    EndSession,
}

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid transition from {from} via {event:?}: {reason}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub event: ConnectorEvent,
    pub reason: &'static str,
}

/// Classification of transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Nothing is listening at the endpoint.
    Refused,
    Other,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Transport is gone")]
    Gone,
}

/// Outbound half of the connection, as seen by the connector.
pub trait Transport {
    /// Queues one text frame. Must not block.
    fn send_frame(&mut self, frame: String) -> Result<(), TransportError>;

    /// Tears the connection down immediately, without draining.
    fn terminate(&mut self);
}

/// Where the dispatcher delivers its output.
pub trait IngestSink {
    /// Sends a message if the session accepts it; otherwise drops it.
    fn send(&mut self, message: &OutgoingMessage);

    /// Ends the session. Safe to call on a session that is already closed.
    fn end_session(&mut self);
}

/// Owns the handshake and state of a single ingest session.
pub struct SessionConnector<T, P> {
    endpoint: String,
    identity: Option<SessionIdentity>,
    state: ConnectionState,
    remote_unreachable: bool,
    transport: T,
    presenter: P,
}

impl<T: Transport, P: Presenter> SessionConnector<T, P> {
    pub fn new(endpoint: impl Into<String>, transport: T, presenter: P) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity: None,
            state: ConnectionState::Idle,
            remote_unreachable: false,
            transport,
            presenter,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Sticky for the session once a refused connection was observed.
    pub fn is_remote_unreachable(&self) -> bool {
        self.remote_unreachable
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// For notices that are not connection transitions.
    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Starts the session with the given identity.
    ///
    /// Only the first call on an instance has any effect. The driver opens
    /// the connection to [`Self::endpoint`] afterwards and reports back
    /// through the `on_transport_*` methods.
    pub fn begin(&mut self, identity: SessionIdentity) {
        if self.identity.is_some() {
            warn!("[{}] Session already started, ignoring begin", self.tag());
            return;
        }

        info!(
            "[{}] Connecting to ingest server as {}: {}",
            identity.group_code, identity.observer_name, self.endpoint
        );
        self.identity = Some(identity);
        self.apply(ConnectorEvent::Begin);
    }

    /// The transport is open: send the handshake.
    pub fn on_transport_open(&mut self) {
        if !self.apply(ConnectorEvent::TransportOpened) {
            return;
        }

        let Some(identity) = self.identity.as_ref() else {
            error!("[{}] Transport opened without an identity", self.tag());
            return;
        };

        match serde_json::to_string(&AuthRequest::new(identity)) {
            Ok(frame) => {
                debug!("[{}] Sending auth request", self.tag());
                if let Err(e) = self.transport.send_frame(frame) {
                    warn!("[{}] Failed to send auth request: {}", self.tag(), e);
                }
            }
            Err(e) => error!("[{}] Failed to encode auth request: {}", self.tag(), e),
        }
    }

    /// An inbound text frame arrived.
    pub fn on_message(&mut self, text: &str) {
        match self.state {
            ConnectionState::AwaitingAuthResponse => self.handle_auth_response(text),
            ConnectionState::Authenticated => {
                match serde_json::from_str::<serde_json::Value>(text) {
                    Ok(json) => info!("[{}] Ingest message: {}", self.tag(), json),
                    Err(_) => info!("[{}] Ingest message (non-JSON): {}", self.tag(), text),
                }
            }
            state => debug!("[{}] Ignoring inbound message while {}", self.tag(), state),
        }
    }

    /// The transport reported an error. A close is expected to follow.
    pub fn on_transport_error(&mut self, kind: TransportErrorKind, detail: &str) {
        warn!(
            "[{}] Ingest connection error ({:?}) - is the server up? {}",
            self.tag(),
            kind,
            detail
        );
        if kind == TransportErrorKind::Refused {
            self.remote_unreachable = true;
        }
    }

    /// The transport closed, for whatever reason.
    pub fn on_transport_closed(&mut self) {
        if self.state.is_closed() {
            debug!("[{}] Transport closed after session end", self.tag());
            return;
        }
        info!("[{}] Connection to ingest server closed", self.tag());
        self.apply(ConnectorEvent::TransportClosed);
    }

    fn handle_auth_response(&mut self, text: &str) {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(InboundMessage::Auth { value: true }) => {
                info!("[{}] Authentication successful", self.tag());
                self.apply(ConnectorEvent::AuthAccepted);
            }
            Ok(InboundMessage::Auth { value: false }) => {
                warn!("[{}] Authentication rejected", self.tag());
                self.reject();
            }
            Ok(InboundMessage::Unrecognized) => {
                warn!("[{}] Expected auth response, got: {}", self.tag(), text);
                self.reject();
            }
            Err(e) => {
                warn!("[{}] Unreadable auth response ({}): {}", self.tag(), e, text);
                self.reject();
            }
        }
    }

    fn reject(&mut self) {
        if self.apply(ConnectorEvent::AuthRejected) {
            self.transport.terminate();
        }
    }

    /// Runs one transition and presents its notice. Returns false if rejected.
    fn apply(&mut self, event: ConnectorEvent) -> bool {
        let next = match self.state.transition(event) {
            Ok(next) => next,
            Err(e) => {
                debug!("[{}] {}", self.tag(), e);
                return false;
            }
        };

        debug!("[{}] {} -> {} via {:?}", self.tag(), self.state, next, event);
        self.state = next;

        let notice = self.notice_for(event);
        self.presenter.present(&notice);
        true
    }

    fn notice_for(&self, event: ConnectorEvent) -> Notice {
        match event {
            ConnectorEvent::Begin => Notice::Connecting,
            ConnectorEvent::TransportOpened => Notice::Authenticating,
            ConnectorEvent::AuthAccepted => Notice::Authenticated {
                group_code: self.tag().to_string(),
            },
            ConnectorEvent::AuthRejected => Notice::AuthRejected,
            ConnectorEvent::TransportClosed if self.remote_unreachable => Notice::Unreachable,
            ConnectorEvent::TransportClosed | ConnectorEvent::EndSession => Notice::Closed,
        }
    }

    fn tag(&self) -> &str {
        self.identity
            .as_ref()
            .map(|identity| identity.group_code.as_str())
            .unwrap_or("-")
    }
}

impl<T: Transport, P: Presenter> IngestSink for SessionConnector<T, P> {
    fn send(&mut self, message: &OutgoingMessage) {
        if !self.state.is_authenticated() {
            debug!("[{}] Dropping {} while {}", self.tag(), message.kind, self.state);
            return;
        }
        let Some(identity) = self.identity.as_ref() else {
            return;
        };

        let frame = match serde_json::to_string(&WireFrame::new(identity, message)) {
            Ok(frame) => frame,
            Err(e) => {
                error!("[{}] Failed to encode {}: {}", self.tag(), message.kind, e);
                return;
            }
        };

        if let Err(e) = self.transport.send_frame(frame) {
            warn!("[{}] Failed to send {}: {}", self.tag(), message.kind, e);
        }
    }

    fn end_session(&mut self) {
        if self.state.is_closed() {
            debug!("[{}] Session already closed", self.tag());
            return;
        }
        info!("[{}] Ending session", self.tag());
        if self.apply(ConnectorEvent::EndSession) {
            self.transport.terminate();
        }
    }
}

impl<T, P> fmt::Debug for SessionConnector<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConnector")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("remote_unreachable", &self.remote_unreachable)
            .field("has_identity", &self.identity.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::connectors::identity::Team;
    use crate::events::MessageKind;
    use serde_json::json;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingTransport {
        pub frames: Vec<String>,
        pub terminations: usize,
    }

    impl RecordingTransport {
        pub fn json_frames(&self) -> Vec<serde_json::Value> {
            self.frames
                .iter()
                .map(|frame| serde_json::from_str(frame).unwrap())
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send_frame(&mut self, frame: String) -> Result<(), TransportError> {
            self.frames.push(frame);
            Ok(())
        }

        fn terminate(&mut self) {
            self.terminations += 1;
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingPresenter {
        pub titles: Vec<String>,
        pub errors: Vec<String>,
    }

    impl Presenter for RecordingPresenter {
        fn set_title(&mut self, text: &str) {
            self.titles.push(text.to_string());
        }

        fn show_error(&mut self, _title: &str, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    pub(crate) type TestConnector = SessionConnector<RecordingTransport, RecordingPresenter>;

    pub(crate) fn identity() -> SessionIdentity {
        SessionIdentity::new(
            "Observer",
            "GRP1",
            Team::new("Left", "LFT", "https://l"),
            Team::new("Right", "RGT", "https://r"),
        )
    }

    fn connector() -> TestConnector {
        SessionConnector::new(
            "ws://localhost:5100/ingest",
            RecordingTransport::default(),
            RecordingPresenter::default(),
        )
    }

    pub(crate) fn authenticated_connector() -> TestConnector {
        let mut conn = connector();
        conn.begin(identity());
        conn.on_transport_open();
        conn.on_message(r#"{"type":"auth","value":true}"#);
        assert_eq!(conn.state(), ConnectionState::Authenticated);
        conn
    }

    #[test]
    fn test_initial_state() {
        let conn = connector();
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert!(!conn.is_remote_unreachable());
        assert!(conn.identity().is_none());
    }

    #[test]
    fn test_handshake_success() {
        let mut conn = connector();
        conn.begin(identity());
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.on_transport_open();
        assert_eq!(conn.state(), ConnectionState::AwaitingAuthResponse);

        let frames = conn.transport().json_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "auth");
        assert_eq!(frames[0]["playerName"], "Observer");
        assert_eq!(frames[0]["leftTeam"]["name"], "Left");

        conn.on_message(r#"{"type":"auth","value":true}"#);
        assert_eq!(conn.state(), ConnectionState::Authenticated);
        assert_eq!(
            conn.presenter().titles.last().unwrap(),
            "Spectra Client | Connected with Group ID: GRP1"
        );
        assert!(conn.presenter().errors.is_empty());
    }

    #[test]
    fn test_send_before_authenticated_is_dropped() {
        let mut conn = connector();
        let message = OutgoingMessage::flag(MessageKind::MatchStart);

        conn.send(&message);
        conn.begin(identity());
        conn.send(&message);
        conn.on_transport_open();
        conn.send(&message);

        // Only the handshake went out.
        assert_eq!(conn.transport().frames.len(), 1);
        assert_eq!(conn.transport().json_frames()[0]["type"], "auth");
    }

    #[test]
    fn test_send_merges_identity() {
        let mut conn = authenticated_connector();
        conn.send(&OutgoingMessage::map("Infinity"));

        let frames = conn.transport().json_frames();
        assert_eq!(
            frames[1],
            json!({
                "playerName": "Observer",
                "groupCode": "GRP1",
                "type": "map",
                "data": "Infinityy"
            })
        );
    }

    #[test]
    fn test_single_handshake_per_instance() {
        let mut conn = connector();
        conn.begin(identity());
        conn.on_transport_open();
        conn.on_transport_open();
        conn.begin(identity());

        assert_eq!(conn.transport().frames.len(), 1);
        assert_eq!(conn.state(), ConnectionState::AwaitingAuthResponse);
    }

    #[test]
    fn test_auth_rejected() {
        let mut conn = connector();
        conn.begin(identity());
        conn.on_transport_open();
        conn.on_message(r#"{"type":"auth","value":false}"#);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.transport().terminations, 1);
        assert_eq!(conn.presenter().errors, vec!["Inputted data was invalid!"]);

        // The close that follows the termination is not reported again.
        let titles_before = conn.presenter().titles.len();
        conn.on_transport_closed();
        assert_eq!(conn.presenter().titles.len(), titles_before);
        assert!(!conn.is_remote_unreachable());
    }

    #[test]
    fn test_unrecognized_auth_response_rejects() {
        let mut conn = connector();
        conn.begin(identity());
        conn.on_transport_open();
        conn.on_message(r#"{"type":"welcome"}"#);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.transport().terminations, 1);
    }

    #[test]
    fn test_refused_then_close_is_unreachable() {
        let mut conn = connector();
        conn.begin(identity());
        conn.on_transport_error(TransportErrorKind::Refused, "connection refused");
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.on_transport_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.is_remote_unreachable());
        assert_eq!(
            conn.presenter().titles.last().unwrap(),
            "Spectra Client | Connection failed, server not reachable"
        );
        assert_eq!(conn.presenter().errors, vec!["Spectra server not reachable!"]);
    }

    #[test]
    fn test_other_error_then_close_is_plain_close() {
        let mut conn = authenticated_connector();
        conn.on_transport_error(TransportErrorKind::Other, "reset by peer");
        conn.on_transport_closed();

        assert!(!conn.is_remote_unreachable());
        assert_eq!(
            conn.presenter().titles.last().unwrap(),
            "Spectra Client | Connection closed"
        );
        assert!(conn.presenter().errors.is_empty());
    }

    #[test]
    fn test_end_session_is_idempotent() {
        let mut conn = authenticated_connector();
        let titles_before = conn.presenter().titles.len();

        conn.end_session();
        conn.end_session();
        conn.on_transport_closed();

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.transport().terminations, 1);
        assert_eq!(conn.presenter().titles.len(), titles_before + 1);

        // Closed sessions drop output.
        conn.send(&OutgoingMessage::flag(MessageKind::SpikePlanted));
        assert_eq!(conn.transport().frames.len(), 1);
    }

    #[test]
    fn test_one_notice_per_transition() {
        let conn = authenticated_connector();
        // Connecting, Authenticating, Authenticated
        assert_eq!(conn.presenter().titles.len(), 3);
    }

    #[test]
    fn test_post_auth_messages_do_not_transition() {
        let mut conn = authenticated_connector();
        conn.on_message(r#"{"type":"auth","value":false}"#);
        conn.on_message("not json");
        assert_eq!(conn.state(), ConnectionState::Authenticated);
    }

    #[test]
    fn test_transition_table() {
        use ConnectionState::*;
        use ConnectorEvent::*;

        assert_eq!(Idle.transition(Begin), Ok(Connecting));
        assert_eq!(Idle.transition(EndSession), Ok(Closed));
        assert!(Idle.transition(TransportClosed).is_err());
        assert!(Connecting.transition(AuthAccepted).is_err());
        assert!(Authenticated.transition(TransportOpened).is_err());
        assert_eq!(Authenticated.transition(TransportClosed), Ok(Closed));

        let err = Closed.transition(Begin).unwrap_err();
        assert_eq!(err.reason, "Session already closed");
        assert_eq!(
            err.to_string(),
            "Invalid transition from closed via Begin: Session already closed"
        );
    }
}
