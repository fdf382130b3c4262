//! Raw provider events and their classification.
//!
//! The instrumentation feed delivers loosely shaped `{key, value}` records.
//! Each record is classified by key against an ordered route table and its
//! payload is decoded into a typed [`InfoEvent`] or [`GameEvent`]. Decoding
//! happens per event so one malformed record never affects its neighbours.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::outgoing::Score;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON payload for '{key}': {source}")]
    InvalidJson {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// A single record from the provider feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub game_id: Option<u32>,
}

impl RawEvent {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            game_id: None,
        }
    }

    pub fn with_game_id(mut self, game_id: u32) -> Self {
        self.game_id = Some(game_id);
        self
    }

    /// The value as text. Scalars are rendered, structured values are rejected.
    pub fn value_text(&self) -> Result<Cow<'_, str>, DecodeError> {
        match &self.value {
            serde_json::Value::String(s) => Ok(Cow::Borrowed(s)),
            serde_json::Value::Number(n) => Ok(Cow::Owned(n.to_string())),
            serde_json::Value::Bool(b) => Ok(Cow::Owned(b.to_string())),
            other => Err(DecodeError::InvalidValue {
                key: self.key.clone(),
                reason: format!("expected a scalar, got {}", other),
            }),
        }
    }

    /// Decodes the value as JSON. The provider usually sends JSON encoded in a
    /// string, but already structured values are accepted too.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let result = match &self.value {
            serde_json::Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        };
        result.map_err(|source| DecodeError::InvalidJson {
            key: self.key.clone(),
            source,
        })
    }
}

/// Which provider channel a batch arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// State snapshots (`new-info-update`).
    Info,
    /// Discrete occurrences (`new-game-event`).
    Game,
}

/// A batch of raw events delivered together by the provider.
#[derive(Debug, Clone)]
pub struct FeedBatch {
    pub channel: Channel,
    pub events: Vec<RawEvent>,
    pub received_at: DateTime<Utc>,
}

impl FeedBatch {
    pub fn new(channel: Channel, events: Vec<RawEvent>) -> Self {
        Self {
            channel,
            events,
            received_at: Utc::now(),
        }
    }
}

/// How a route matches an event key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern {
    Contains(&'static str),
    Exact(&'static str),
}

impl KeyPattern {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Contains(fragment) => key.contains(fragment),
            Self::Exact(expected) => key == *expected,
        }
    }
}

/// Info channel event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    Scoreboard,
    Roster,
    Health,
    KillFeed,
    Observing,
    RoundNumber,
    RoundPhase,
    MatchScore,
    GameMode,
    Map,
    PlayerName,
    Ignored,
}

/// Info channel routes, evaluated in order. First match wins.
pub const INFO_ROUTES: &[(KeyPattern, InfoKind)] = &[
    (KeyPattern::Contains("scoreboard"), InfoKind::Scoreboard),
    (KeyPattern::Contains("roster"), InfoKind::Roster),
    (KeyPattern::Exact("health"), InfoKind::Health),
    (KeyPattern::Exact("kill_feed"), InfoKind::KillFeed),
    (KeyPattern::Exact("observing"), InfoKind::Observing),
    (KeyPattern::Exact("round_number"), InfoKind::RoundNumber),
    (KeyPattern::Exact("round_phase"), InfoKind::RoundPhase),
    (KeyPattern::Exact("match_score"), InfoKind::MatchScore),
    (KeyPattern::Exact("game_mode"), InfoKind::GameMode),
    (KeyPattern::Exact("map"), InfoKind::Map),
    (KeyPattern::Exact("player_name"), InfoKind::PlayerName),
    (KeyPattern::Exact("team"), InfoKind::Ignored),
    (KeyPattern::Exact("match_outcome"), InfoKind::Ignored),
    (KeyPattern::Exact("pseudo_match_id"), InfoKind::Ignored),
    (KeyPattern::Exact("player_id"), InfoKind::Ignored),
    (KeyPattern::Exact("region"), InfoKind::Ignored),
];

/// Game channel event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameKind {
    MatchStart,
    SpikePlanted,
    SpikeDetonated,
    SpikeDefused,
    MatchEnd,
    /// Duplicate of the info channel's kill feed.
    KillFeed,
}

/// Game channel routes.
pub const GAME_ROUTES: &[(KeyPattern, GameKind)] = &[
    (KeyPattern::Exact("kill_feed"), GameKind::KillFeed),
    (KeyPattern::Exact("match_start"), GameKind::MatchStart),
    (KeyPattern::Exact("spike_planted"), GameKind::SpikePlanted),
    (KeyPattern::Exact("spike_detonated"), GameKind::SpikeDetonated),
    (KeyPattern::Exact("spike_defused"), GameKind::SpikeDefused),
    (KeyPattern::Exact("match_end"), GameKind::MatchEnd),
];

fn route<K: Copy>(routes: &[(KeyPattern, K)], key: &str) -> Option<K> {
    routes
        .iter()
        .find(|(pattern, _)| pattern.matches(key))
        .map(|(_, kind)| *kind)
}

pub fn classify_info(key: &str) -> Option<InfoKind> {
    route(INFO_ROUTES, key)
}

pub fn classify_game(key: &str) -> Option<GameKind> {
    route(GAME_ROUTES, key)
}

/// Decoded info channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoEvent {
    Scoreboard(serde_json::Value),
    Roster {
        key: String,
        payload: serde_json::Value,
    },
    Health,
    KillFeed(serde_json::Value),
    Observing(String),
    RoundNumber(u32),
    RoundPhase(String),
    MatchScore(Score),
    GameMode(String),
    Map(String),
    PlayerName(String),
    Ignored(String),
    Unrecognized(String),
}

#[derive(Deserialize)]
struct GameModePayload {
    mode: String,
}

impl InfoEvent {
    pub fn decode(raw: &RawEvent) -> Result<Self, DecodeError> {
        let Some(kind) = classify_info(&raw.key) else {
            return Ok(Self::Unrecognized(raw.key.clone()));
        };

        let event = match kind {
            InfoKind::Scoreboard => Self::Scoreboard(raw.decode_json()?),
            InfoKind::Roster => Self::Roster {
                key: raw.key.clone(),
                payload: raw.decode_json()?,
            },
            InfoKind::Health => Self::Health,
            InfoKind::KillFeed => Self::KillFeed(raw.decode_json()?),
            InfoKind::Observing => Self::Observing(raw.value_text()?.into_owned()),
            InfoKind::RoundNumber => {
                let text = raw.value_text()?;
                let round = text.trim().parse().map_err(|e| DecodeError::InvalidValue {
                    key: raw.key.clone(),
                    reason: format!("'{}' is not a round number ({})", text, e),
                })?;
                Self::RoundNumber(round)
            }
            InfoKind::RoundPhase => Self::RoundPhase(raw.value_text()?.into_owned()),
            InfoKind::MatchScore => Self::MatchScore(raw.decode_json()?),
            InfoKind::GameMode => Self::GameMode(raw.decode_json::<GameModePayload>()?.mode),
            InfoKind::Map => Self::Map(raw.value_text()?.into_owned()),
            InfoKind::PlayerName => Self::PlayerName(raw.value_text()?.into_owned()),
            InfoKind::Ignored => Self::Ignored(raw.key.clone()),
        };

        Ok(event)
    }
}

/// Decoded game channel event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Occurred(GameKind),
    Unrecognized(String),
}

impl GameEvent {
    pub fn decode(raw: &RawEvent) -> Self {
        match classify_game(&raw.key) {
            Some(kind) => Self::Occurred(kind),
            None => Self::Unrecognized(raw.key.clone()),
        }
    }
}
