//! WebSocket driver for one ingest session.
//!
//! Key behaviour:
//! 1. One connection attempt per session, no reconnection or backoff
//! 2. All work happens on one task: socket frames, outbound frames and feed
//!    batches are handled one at a time in a single select loop
//! 3. Outbound frames are queued in send order and written before a queued
//!    termination closes the socket
//! 4. Every failure ends at a closed session, never at a panic

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::Message, Error as WsError},
};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::dispatch::{CanonicalFormatter, EventDispatcher, Formatter};
use crate::feed::{FeedGate, FeedMessage, GateOutcome};
use crate::presentation::Presenter;

use super::identity::SessionIdentity;
use super::session::{
    ConnectionState, IngestSink, SessionConnector, Transport, TransportError, TransportErrorKind,
};

/// Work queued by the connector for the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(String),
    Terminate,
}

/// [`Transport`] backed by an unbounded queue drained by the session loop.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelTransport {
    pub fn new(outbound_tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { outbound_tx }
    }
}

impl Transport for ChannelTransport {
    fn send_frame(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound_tx
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::Gone)
    }

    fn terminate(&mut self) {
        let _ = self.outbound_tx.send(Outbound::Terminate);
    }
}

/// Splits transport errors into "nobody is listening" and everything else.
pub fn classify_error(err: &WsError) -> TransportErrorKind {
    match err {
        WsError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            TransportErrorKind::Refused
        }
        _ => TransportErrorKind::Other,
    }
}

/// Final state of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub state: ConnectionState,
    pub remote_unreachable: bool,
    pub round_number: u32,
}

type Connector<P> = SessionConnector<ChannelTransport, P>;

/// A single ingest session: connector, dispatcher and feed gate on one task.
pub struct IngestSession<P, F = CanonicalFormatter> {
    config: BridgeConfig,
    dispatcher: EventDispatcher<Connector<P>, F>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    gate: FeedGate,
}

impl<P: Presenter> IngestSession<P> {
    pub fn new(config: BridgeConfig, presenter: P) -> Self {
        Self::with_formatter(config, presenter, CanonicalFormatter)
    }
}

impl<P: Presenter, F: Formatter> IngestSession<P, F> {
    pub fn with_formatter(config: BridgeConfig, presenter: P, formatter: F) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connector = SessionConnector::new(
            config.ingest_url.clone(),
            ChannelTransport::new(outbound_tx),
            presenter,
        );
        let dispatcher =
            EventDispatcher::with_formatter(connector, formatter).with_game_filter(config.game_id);

        Self {
            gate: FeedGate::new(config.game_id),
            config,
            dispatcher,
            outbound_rx,
        }
    }

    /// Registers the callback that receives the local player's name.
    pub fn on_player_name(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.dispatcher = self.dispatcher.on_player_name(callback);
        self
    }

    pub fn connector(&self) -> &Connector<P> {
        self.dispatcher.sink()
    }

    /// Runs the session until it closes.
    ///
    /// Feed messages that arrive before authentication are processed, but
    /// whatever they produce is dropped by the connector.
    pub async fn run(
        self,
        identity: SessionIdentity,
        mut feed_rx: mpsc::Receiver<FeedMessage>,
    ) -> SessionReport {
        let Self {
            config,
            mut dispatcher,
            mut outbound_rx,
            mut gate,
        } = self;

        dispatcher.sink_mut().begin(identity);

        let ws_stream = match connect_async(config.ingest_url.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                let connector = dispatcher.sink_mut();
                connector.on_transport_error(classify_error(&e), &e.to_string());
                connector.on_transport_closed();
                return report(&dispatcher);
            }
        };

        info!("WebSocket connected to {}", config.ingest_url);
        dispatcher.sink_mut().on_transport_open();

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let mut feed_open = true;

        loop {
            tokio::select! {
                // Frames and terminations queued by the connector
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(Outbound::Frame(frame)) => {
                            if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                                let connector = dispatcher.sink_mut();
                                connector.on_transport_error(classify_error(&e), &e.to_string());
                                connector.on_transport_closed();
                                break;
                            }
                        }
                        Some(Outbound::Terminate) | None => {
                            debug!("Closing WebSocket");
                            if tokio::time::timeout(config.close_timeout, ws_sink.close())
                                .await
                                .is_err()
                            {
                                warn!("WebSocket close timed out");
                            }
                            dispatcher.sink_mut().on_transport_closed();
                            break;
                        }
                    }
                }

                // Frames from the ingest server
                inbound = ws_stream.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => dispatcher.sink_mut().on_message(&text),
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "Unknown".to_string());
                            info!("WebSocket closed by server: {}", reason);
                            dispatcher.sink_mut().on_transport_closed();
                            break;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            debug!("Received binary message (ignored)");
                        }
                        Some(Ok(_)) => {
                            // Ping/pong are answered by tungstenite
                        }
                        Some(Err(e)) => {
                            let connector = dispatcher.sink_mut();
                            connector.on_transport_error(classify_error(&e), &e.to_string());
                            connector.on_transport_closed();
                            break;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            dispatcher.sink_mut().on_transport_closed();
                            break;
                        }
                    }
                }

                // Provider feed
                feed = feed_rx.recv(), if feed_open => {
                    match feed {
                        Some(message) => match gate.admit(message) {
                            GateOutcome::Dispatch(batch) => dispatcher.process_batch(&batch),
                            GateOutcome::Notify(notice) => {
                                dispatcher.sink_mut().presenter_mut().present(&notice);
                            }
                            GateOutcome::Nothing => {}
                        },
                        None => {
                            info!("Provider feed ended, ending session");
                            feed_open = false;
                            dispatcher.sink_mut().end_session();
                        }
                    }
                }
            }
        }

        report(&dispatcher)
    }
}

fn report<P: Presenter, F: Formatter>(
    dispatcher: &EventDispatcher<Connector<P>, F>,
) -> SessionReport {
    let connector = dispatcher.sink();
    SessionReport {
        state: connector.state(),
        remote_unreachable: connector.is_remote_unreachable(),
        round_number: dispatcher.round_number(),
    }
}

impl<P, F> std::fmt::Debug for IngestSession<P, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestSession")
            .field("ingest_url", &self.config.ingest_url)
            .field("game_id", &self.config.game_id)
            .field("gate_enabled", &self.gate.is_enabled())
            .finish()
    }
}
