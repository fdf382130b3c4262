//! Provider feed adapter.
//!
//! The instrumentation provider is consumed as newline-delimited JSON, one
//! [`FeedMessage`] per line. The [`FeedGate`] decides which batches reach the
//! dispatcher: nothing flows until the supported game has been detected, and
//! a provider error stops the flow until the game is detected again.

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::{Channel, FeedBatch, RawEvent};
use crate::presentation::Notice;

/// One notification from the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    #[serde(rename = "game-detected")]
    GameDetected {
        #[serde(rename = "gameId")]
        game_id: u32,
        #[serde(default)]
        name: Option<String>,
    },

    #[serde(rename = "new-info-update")]
    InfoUpdate { events: Vec<RawEvent> },

    #[serde(rename = "new-game-event")]
    GameEvent { events: Vec<RawEvent> },

    #[serde(rename = "error")]
    ProviderError { error: String },
}

/// What the session should do with a feed message.
#[derive(Debug)]
pub enum GateOutcome {
    Dispatch(FeedBatch),
    Notify(Notice),
    Nothing,
}

/// Tracks whether provider batches should be processed.
#[derive(Debug, Clone)]
pub struct FeedGate {
    game_id: u32,
    enabled: bool,
    detections: u32,
}

impl FeedGate {
    pub fn new(game_id: u32) -> Self {
        Self {
            game_id,
            enabled: false,
            detections: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn admit(&mut self, message: FeedMessage) -> GateOutcome {
        match message {
            FeedMessage::GameDetected { game_id, name } => {
                let name = name.as_deref().unwrap_or("unknown");
                if game_id != self.game_id {
                    info!("Game detected: {} - {}, not supported, ignoring", game_id, name);
                    return GateOutcome::Nothing;
                }

                info!("Game detected: {} - {}, enabling", game_id, name);
                self.enabled = true;
                self.detections += 1;
                if self.detections > 1 {
                    GateOutcome::Notify(Notice::GameRedetected)
                } else {
                    GateOutcome::Nothing
                }
            }
            FeedMessage::InfoUpdate { events } => self.batch(Channel::Info, events),
            FeedMessage::GameEvent { events } => self.batch(Channel::Game, events),
            FeedMessage::ProviderError { error } => {
                error!("Provider error: {}", error);
                self.enabled = false;
                GateOutcome::Nothing
            }
        }
    }

    fn batch(&self, channel: Channel, events: Vec<RawEvent>) -> GateOutcome {
        if self.enabled {
            GateOutcome::Dispatch(FeedBatch::new(channel, events))
        } else {
            debug!("Dropping {:?} batch, game not detected", channel);
            GateOutcome::Nothing
        }
    }
}

/// Reads feed messages line by line and forwards them until the input ends.
///
/// Lines that fail to parse are logged and skipped. Dropping the sender when
/// the input ends tells the session the feed is gone.
pub fn spawn_line_feed<R>(reader: R, feed_tx: mpsc::Sender<FeedMessage>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Feed read failed: {}", e);
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<FeedMessage>(&line) {
                Ok(message) => {
                    if feed_tx.send(message).await.is_err() {
                        debug!("Session gone, stopping feed reader");
                        break;
                    }
                }
                Err(e) => warn!("Unreadable feed line ({}): {}", e, line),
            }
        }
        info!("Feed input ended");
    })
}
