//! Messages exchanged with the ingest server.
//!
//! Outgoing messages are built by the dispatcher (or the formatter) without
//! any identity fields. The session connector wraps them in a [`WireFrame`]
//! at the send boundary, which is the only place identity is merged in.

use serde::{Deserialize, Serialize};

use crate::connectors::identity::{SessionIdentity, Team};

/// Map name the ingest server cannot hold as an enum member.
pub const MAP_SENTINEL: &str = "Infinity";

/// Spelling used on the wire in place of [`MAP_SENTINEL`].
pub const MAP_SENTINEL_ESCAPED: &str = "Infinityy";

/// Round phase reported once the match is over.
pub const TERMINAL_ROUND_PHASE: &str = "game_end";

/// Kind tag carried in the `type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Auth,
    Scoreboard,
    Roster,
    #[serde(rename = "killfeed")]
    KillFeed,
    Observing,
    RoundInfo,
    Score,
    GameMode,
    Map,
    MatchStart,
    SpikePlanted,
    SpikeDetonated,
    SpikeDefused,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Scoreboard => "scoreboard",
            Self::Roster => "roster",
            Self::KillFeed => "killfeed",
            Self::Observing => "observing",
            Self::RoundInfo => "round_info",
            Self::Score => "score",
            Self::GameMode => "game_mode",
            Self::Map => "map",
            Self::MatchStart => "match_start",
            Self::SpikePlanted => "spike_planted",
            Self::SpikeDetonated => "spike_detonated",
            Self::SpikeDefused => "spike_defused",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match score as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    #[serde(deserialize_with = "number_or_string")]
    pub won: u32,
    #[serde(deserialize_with = "number_or_string")]
    pub lost: u32,
}

/// Round phase plus the round it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundInfo {
    pub round_phase: String,
    pub round_number: u32,
}

impl RoundInfo {
    /// Returns true if this phase marks the end of the match.
    pub fn is_terminal(&self) -> bool {
        self.round_phase == TERMINAL_ROUND_PHASE
    }
}

/// Kind-specific payload of an outgoing message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingData {
    Flag(bool),
    Text(String),
    Score(Score),
    RoundInfo(RoundInfo),
    Structured(serde_json::Value),
}

/// A message ready for the connector, without identity fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub data: OutgoingData,
}

impl OutgoingMessage {
    pub fn new(kind: MessageKind, data: OutgoingData) -> Self {
        Self { kind, data }
    }

    /// A fixed `true` payload, used for discrete game occurrences.
    pub fn flag(kind: MessageKind) -> Self {
        Self::new(kind, OutgoingData::Flag(true))
    }

    pub fn text(kind: MessageKind, value: impl Into<String>) -> Self {
        Self::new(kind, OutgoingData::Text(value.into()))
    }

    /// Map name, with the sentinel rewritten to its escaped spelling.
    pub fn map(name: &str) -> Self {
        Self::text(MessageKind::Map, escape_map_name(name))
    }

    pub fn score(score: Score) -> Self {
        Self::new(MessageKind::Score, OutgoingData::Score(score))
    }

    pub fn round_info(info: RoundInfo) -> Self {
        Self::new(MessageKind::RoundInfo, OutgoingData::RoundInfo(info))
    }

    /// Returns the round info if this message carries one.
    pub fn as_round_info(&self) -> Option<&RoundInfo> {
        match &self.data {
            OutgoingData::RoundInfo(info) => Some(info),
            _ => None,
        }
    }
}

/// Rewrites the map sentinel so the receiving side can keep it as an enum member.
pub fn escape_map_name(name: &str) -> &str {
    if name == MAP_SENTINEL {
        MAP_SENTINEL_ESCAPED
    } else {
        name
    }
}

/// An outgoing message enriched with the session identity.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFrame<'a> {
    pub player_name: &'a str,
    pub group_code: &'a str,
    #[serde(flatten)]
    pub message: &'a OutgoingMessage,
}

impl<'a> WireFrame<'a> {
    pub fn new(identity: &'a SessionIdentity, message: &'a OutgoingMessage) -> Self {
        Self {
            player_name: &identity.observer_name,
            group_code: &identity.group_code,
            message,
        }
    }
}

/// The handshake request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest<'a> {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub player_name: &'a str,
    pub group_code: &'a str,
    pub left_team: &'a Team,
    pub right_team: &'a Team,
}

impl<'a> AuthRequest<'a> {
    pub fn new(identity: &'a SessionIdentity) -> Self {
        Self {
            kind: MessageKind::Auth,
            player_name: &identity.observer_name,
            group_code: &identity.group_code,
            left_team: &identity.left_team,
            right_team: &identity.right_team,
        }
    }
}

/// Parsed inbound frame from the ingest server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Auth {
        value: bool,
    },

    #[serde(other)]
    Unrecognized,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
