//! Event dispatcher: classify provider events and forward them to the session.
//!
//! Batches are processed in arrival order. Each event is handled on its own:
//! a decode or format failure is logged and the rest of the batch continues.
//! Two outcomes end the session: the terminal round phase on the info channel
//! and `match_end` on the game channel.

use thiserror::Error;
use tracing::{debug, error, info};

use crate::connectors::IngestSink;
use crate::events::{
    Channel, DecodeError, FeedBatch, GameEvent, GameKind, InfoEvent, MessageKind,
    OutgoingMessage, RawEvent,
};

use super::formatter::{CanonicalFormatter, FormatError, FormatRequest, Formatter};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Formatting failed: {0}")]
    Format(#[from] FormatError),
}

type PlayerNameCallback = Box<dyn FnMut(&str) + Send>;

/// Routes provider events to an [`IngestSink`].
///
/// Owns the round context: the number of the current round, as last reported
/// by a `round_number` event. It starts at zero for every dispatcher.
pub struct EventDispatcher<S, F = CanonicalFormatter> {
    sink: S,
    formatter: F,
    game_id: Option<u32>,
    round_number: u32,
    on_player_name: Option<PlayerNameCallback>,
}

impl<S: IngestSink> EventDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self::with_formatter(sink, CanonicalFormatter)
    }
}

impl<S: IngestSink, F: Formatter> EventDispatcher<S, F> {
    pub fn with_formatter(sink: S, formatter: F) -> Self {
        Self {
            sink,
            formatter,
            game_id: None,
            round_number: 0,
            on_player_name: None,
        }
    }

    /// Skips info events tagged with a different game id.
    pub fn with_game_filter(mut self, game_id: u32) -> Self {
        self.game_id = Some(game_id);
        self
    }

    /// Registers the callback that receives the local player's name.
    pub fn on_player_name(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_player_name = Some(Box::new(callback));
        self
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Processes a batch on the channel it arrived on.
    pub fn process_batch(&mut self, batch: &FeedBatch) {
        debug!(
            "Processing {} {:?} event(s) received @ {}",
            batch.events.len(),
            batch.channel,
            batch.received_at.format("%H:%M:%S%.3f")
        );
        match batch.channel {
            Channel::Info => self.process_info_batch(&batch.events),
            Channel::Game => self.process_game_batch(&batch.events),
        }
    }

    pub fn process_info_batch(&mut self, events: &[RawEvent]) {
        for raw in events {
            if let Err(e) = self.process_info(raw) {
                error!("Info update error for '{}': {}", raw.key, e);
            }
        }
    }

    pub fn process_game_batch(&mut self, events: &[RawEvent]) {
        for raw in events {
            self.process_game(raw);
        }
    }

    fn process_info(&mut self, raw: &RawEvent) -> Result<(), DispatchError> {
        if let Some(expected) = self.game_id {
            if raw.game_id != Some(expected) {
                debug!("Skipping '{}' from game {:?}", raw.key, raw.game_id);
                return Ok(());
            }
        }

        match InfoEvent::decode(raw)? {
            InfoEvent::Scoreboard(payload) => {
                if has_name(&payload) {
                    self.forward_formatted(FormatRequest::Scoreboard(&payload))?;
                }
            }
            InfoEvent::Roster { key, payload } => {
                if has_name(&payload) {
                    self.forward_formatted(FormatRequest::Roster {
                        key: &key,
                        payload: &payload,
                    })?;
                }
            }
            InfoEvent::KillFeed(payload) => {
                self.forward_formatted(FormatRequest::KillFeed(&payload))?;
            }
            InfoEvent::Observing(name) => {
                self.sink
                    .send(&OutgoingMessage::text(MessageKind::Observing, name));
            }
            InfoEvent::RoundNumber(round) => {
                debug!("Round number {} -> {}", self.round_number, round);
                self.round_number = round;
            }
            InfoEvent::RoundPhase(phase) => {
                let message = self.formatter.format(FormatRequest::RoundPhase {
                    phase: &phase,
                    round_number: self.round_number,
                })?;
                self.sink.send(&message);

                if message.as_round_info().is_some_and(|info| info.is_terminal()) {
                    info!("Match over after round {}, ending session", self.round_number);
                    self.sink.end_session();
                }
            }
            InfoEvent::MatchScore(score) => self.sink.send(&OutgoingMessage::score(score)),
            InfoEvent::GameMode(mode) => {
                self.sink
                    .send(&OutgoingMessage::text(MessageKind::GameMode, mode));
            }
            InfoEvent::Map(name) => self.sink.send(&OutgoingMessage::map(&name)),
            InfoEvent::PlayerName(name) => {
                info!("Detected player name: {}", name);
                if let Some(callback) = self.on_player_name.as_mut() {
                    callback(&name);
                }
            }
            // No health data is forwarded yet.
            InfoEvent::Health | InfoEvent::Ignored(_) => {}
            InfoEvent::Unrecognized(key) => {
                info!("Unhandled info update: {} = {}", key, raw.value);
            }
        }

        Ok(())
    }

    fn process_game(&mut self, raw: &RawEvent) {
        match GameEvent::decode(raw) {
            // The info channel's kill feed is authoritative.
            GameEvent::Occurred(GameKind::KillFeed) => {}
            GameEvent::Occurred(GameKind::MatchEnd) => {
                info!("Match ended, ending session");
                self.sink.end_session();
            }
            GameEvent::Occurred(kind) => {
                if let Some(message_kind) = flag_kind(kind) {
                    self.sink.send(&OutgoingMessage::flag(message_kind));
                }
            }
            GameEvent::Unrecognized(key) => {
                info!("Unhandled game update: {} = {}", key, raw.value);
            }
        }
    }

    fn forward_formatted(&mut self, request: FormatRequest<'_>) -> Result<(), DispatchError> {
        let message = self.formatter.format(request)?;
        self.sink.send(&message);
        Ok(())
    }
}

/// Message kind for game occurrences forwarded as a `true` flag.
fn flag_kind(kind: GameKind) -> Option<MessageKind> {
    match kind {
        GameKind::MatchStart => Some(MessageKind::MatchStart),
        GameKind::SpikePlanted => Some(MessageKind::SpikePlanted),
        GameKind::SpikeDetonated => Some(MessageKind::SpikeDetonated),
        GameKind::SpikeDefused => Some(MessageKind::SpikeDefused),
        GameKind::MatchEnd | GameKind::KillFeed => None,
    }
}

/// Snapshots without a player name are incomplete and get dropped.
fn has_name(payload: &serde_json::Value) -> bool {
    payload
        .get("name")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|name| !name.is_empty())
}

impl<S: std::fmt::Debug, F> std::fmt::Debug for EventDispatcher<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sink", &self.sink)
            .field("game_id", &self.game_id)
            .field("round_number", &self.round_number)
            .field("has_player_name_callback", &self.on_player_name.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::session::tests::authenticated_connector;
    use crate::connectors::ConnectionState;
    use crate::events::{OutgoingData, RoundInfo, Score};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct RecordingSink {
        sent: Vec<OutgoingMessage>,
        end_calls: usize,
    }

    impl IngestSink for RecordingSink {
        fn send(&mut self, message: &OutgoingMessage) {
            self.sent.push(message.clone());
        }

        fn end_session(&mut self) {
            self.end_calls += 1;
        }
    }

    fn dispatcher() -> EventDispatcher<RecordingSink> {
        EventDispatcher::new(RecordingSink::default())
    }

    fn kinds(sink: &RecordingSink) -> Vec<MessageKind> {
        sink.sent.iter().map(|m| m.kind).collect()
    }

    #[test]
    fn test_round_phase_uses_latest_round_number() {
        let mut d = dispatcher();
        d.process_info_batch(&[
            RawEvent::new("round_number", "2"),
            RawEvent::new("round_number", "3"),
            RawEvent::new("round_phase", "live"),
        ]);

        assert_eq!(d.round_number(), 3);
        assert_eq!(
            d.sink().sent,
            vec![OutgoingMessage::round_info(RoundInfo {
                round_phase: "live".to_string(),
                round_number: 3,
            })]
        );
        assert_eq!(d.sink().end_calls, 0);
    }

    #[test]
    fn test_round_number_is_not_forwarded() {
        let mut d = dispatcher();
        d.process_info_batch(&[RawEvent::new("round_number", "9")]);
        assert!(d.sink().sent.is_empty());
    }

    #[test]
    fn test_scoreboard_without_name_discarded() {
        let mut d = dispatcher();
        d.process_info_batch(&[
            RawEvent::new("scoreboard_0", r#"{"name":"","kills":3}"#),
            RawEvent::new("scoreboard_1", r#"{"kills":3}"#),
            RawEvent::new("roster_2", r#"{"name":null}"#),
        ]);
        assert!(d.sink().sent.is_empty());
    }

    #[test]
    fn test_scoreboard_and_roster_forwarded() {
        let mut d = dispatcher();
        d.process_info_batch(&[
            RawEvent::new("scoreboard_0", r#"{"name":"Alpha","kills":3}"#),
            RawEvent::new("roster_1", r#"{"name":"Bravo","teammate":true}"#),
        ]);
        assert_eq!(
            kinds(d.sink()),
            vec![MessageKind::Scoreboard, MessageKind::Roster]
        );
    }

    #[test]
    fn test_failure_in_one_event_is_isolated() {
        let mut d = dispatcher();
        d.process_info_batch(&[
            RawEvent::new("observing", "Alpha"),
            RawEvent::new("map", "Ascent"),
            RawEvent::new("kill_feed", "{broken"),
            RawEvent::new("game_mode", r#"{"mode":"bomb"}"#),
            RawEvent::new("match_score", r#"{"won":1,"lost":0}"#),
        ]);

        assert_eq!(
            kinds(d.sink()),
            vec![
                MessageKind::Observing,
                MessageKind::Map,
                MessageKind::GameMode,
                MessageKind::Score
            ]
        );
        assert_eq!(
            d.sink().sent[3].data,
            OutgoingData::Score(Score { won: 1, lost: 0 })
        );
    }

    #[test]
    fn test_map_sentinel_rewritten() {
        let mut d = dispatcher();
        d.process_info_batch(&[RawEvent::new("map", "Infinity")]);
        assert_eq!(
            d.sink().sent[0].data,
            OutgoingData::Text("Infinityy".to_string())
        );
    }

    #[test]
    fn test_ignored_and_unhandled_keys() {
        let mut d = dispatcher();
        d.process_info_batch(&[
            RawEvent::new("team", "attack"),
            RawEvent::new("match_outcome", "victory"),
            RawEvent::new("pseudo_match_id", "x"),
            RawEvent::new("player_id", "y"),
            RawEvent::new("region", "eu"),
            RawEvent::new("health", "100"),
            RawEvent::new("weapon", "vandal"),
        ]);
        assert!(d.sink().sent.is_empty());
        assert_eq!(d.sink().end_calls, 0);
    }

    #[test]
    fn test_player_name_goes_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let mut d = dispatcher().on_player_name(move |name| {
            captured.lock().unwrap().push(name.to_string());
        });

        d.process_info_batch(&[RawEvent::new("player_name", "Alpha")]);

        assert!(d.sink().sent.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["Alpha".to_string()]);
    }

    #[test]
    fn test_game_filter() {
        let mut d = dispatcher().with_game_filter(21640);
        d.process_info_batch(&[
            RawEvent::new("map", "Bind").with_game_id(5426),
            RawEvent::new("map", "Haven").with_game_id(21640),
            RawEvent::new("map", "Split"),
        ]);
        assert_eq!(d.sink().sent.len(), 1);
        assert_eq!(d.sink().sent[0].data, OutgoingData::Text("Haven".to_string()));
    }

    #[test]
    fn test_game_channel_flags() {
        let mut d = dispatcher();
        d.process_game_batch(&[
            RawEvent::new("match_start", ""),
            RawEvent::new("kill_feed", r#"{"attacker":"A"}"#),
            RawEvent::new("spike_planted", ""),
            RawEvent::new("spike_defused", ""),
            RawEvent::new("spike_detonated", ""),
            RawEvent::new("assist", ""),
        ]);

        assert_eq!(
            kinds(d.sink()),
            vec![
                MessageKind::MatchStart,
                MessageKind::SpikePlanted,
                MessageKind::SpikeDefused,
                MessageKind::SpikeDetonated
            ]
        );
        assert!(d
            .sink()
            .sent
            .iter()
            .all(|m| m.data == OutgoingData::Flag(true)));
    }

    #[test]
    fn test_terminal_phase_ends_session() {
        let mut d = dispatcher();
        d.process_info_batch(&[
            RawEvent::new("round_number", "13"),
            RawEvent::new("round_phase", "game_end"),
        ]);
        assert_eq!(d.sink().sent.len(), 1);
        assert_eq!(d.sink().end_calls, 1);
    }

    #[test]
    fn test_match_end_ends_session_without_payload() {
        let mut d = dispatcher();
        d.process_game_batch(&[RawEvent::new("match_end", "")]);
        assert!(d.sink().sent.is_empty());
        assert_eq!(d.sink().end_calls, 1);
    }

    #[test]
    fn test_second_terminal_event_is_noop_on_connector() {
        let mut d = EventDispatcher::new(authenticated_connector());
        d.process_info_batch(&[RawEvent::new("round_phase", "game_end")]);
        assert_eq!(d.sink().state(), ConnectionState::Closed);

        d.process_game_batch(&[RawEvent::new("match_end", "")]);
        d.process_info_batch(&[RawEvent::new("map", "Lotus")]);

        let connector = d.sink();
        assert_eq!(connector.transport().terminations, 1);
        // auth + round_info; nothing after close
        assert_eq!(connector.transport().frames.len(), 2);
    }

    #[test]
    fn test_forwards_through_connector_with_identity() {
        let mut d = EventDispatcher::new(authenticated_connector());
        d.process_batch(&FeedBatch::new(
            Channel::Info,
            vec![RawEvent::new("observing", "Bravo")],
        ));

        let frames = d.sink().transport().json_frames();
        assert_eq!(
            frames[1],
            json!({
                "playerName": "Observer",
                "groupCode": "GRP1",
                "type": "observing",
                "data": "Bravo"
            })
        );
    }
}
