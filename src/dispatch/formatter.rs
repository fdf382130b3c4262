//! Field formatting collaborator.
//!
//! Turns decoded provider payloads into outgoing messages. The dispatcher
//! depends only on the [`Formatter`] trait; [`CanonicalFormatter`] is the
//! shape the ingest server currently expects.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::events::{MessageKind, OutgoingData, OutgoingMessage, RoundInfo};

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{kind} payload is not an object: {found}")]
    NotAnObject { kind: MessageKind, found: String },
}

/// What to format.
#[derive(Debug, Clone, Copy)]
pub enum FormatRequest<'a> {
    Scoreboard(&'a Value),
    Roster { key: &'a str, payload: &'a Value },
    KillFeed(&'a Value),
    RoundPhase { phase: &'a str, round_number: u32 },
}

pub trait Formatter {
    fn format(&self, request: FormatRequest<'_>) -> Result<OutgoingMessage, FormatError>;
}

/// Converts provider objects to camelCase keyed objects.
///
/// Roster entries also carry the slot number taken from their key
/// (`roster_4` becomes `"position": 4`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn format(&self, request: FormatRequest<'_>) -> Result<OutgoingMessage, FormatError> {
        let message = match request {
            FormatRequest::Scoreboard(payload) => OutgoingMessage::new(
                MessageKind::Scoreboard,
                OutgoingData::Structured(camel_case_object(MessageKind::Scoreboard, payload)?),
            ),
            FormatRequest::Roster { key, payload } => {
                let mut object = camel_case_object(MessageKind::Roster, payload)?;
                if let (Some(position), Value::Object(map)) = (roster_position(key), &mut object) {
                    map.insert("position".to_string(), Value::from(position));
                }
                OutgoingMessage::new(MessageKind::Roster, OutgoingData::Structured(object))
            }
            FormatRequest::KillFeed(payload) => OutgoingMessage::new(
                MessageKind::KillFeed,
                OutgoingData::Structured(camel_case_object(MessageKind::KillFeed, payload)?),
            ),
            FormatRequest::RoundPhase {
                phase,
                round_number,
            } => OutgoingMessage::round_info(RoundInfo {
                round_phase: phase.to_string(),
                round_number,
            }),
        };

        Ok(message)
    }
}

fn camel_case_object(kind: MessageKind, payload: &Value) -> Result<Value, FormatError> {
    let Value::Object(source) = payload else {
        return Err(FormatError::NotAnObject {
            kind,
            found: payload.to_string(),
        });
    };

    let object: Map<String, Value> = source
        .iter()
        .map(|(key, value)| (to_camel_case(key), value.clone()))
        .collect();
    Ok(Value::Object(object))
}

fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn roster_position(key: &str) -> Option<u32> {
    key.rsplit('_').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camel_case() {
        assert_eq!(to_camel_case("ult_points"), "ultPoints");
        assert_eq!(to_camel_case("is_local_player"), "isLocalPlayer");
        assert_eq!(to_camel_case("name"), "name");
        assert_eq!(to_camel_case("_private"), "private");
    }

    #[test]
    fn test_roster_gets_position() {
        let payload = json!({"name": "Player", "player_id": "abc", "rank": 3});
        let message = CanonicalFormatter
            .format(FormatRequest::Roster {
                key: "roster_4",
                payload: &payload,
            })
            .unwrap();

        assert_eq!(message.kind, MessageKind::Roster);
        let OutgoingData::Structured(data) = message.data else {
            panic!("expected structured data");
        };
        assert_eq!(data["position"], 4);
        assert_eq!(data["playerId"], "abc");
    }

    #[test]
    fn test_round_phase_carries_round_number() {
        let message = CanonicalFormatter
            .format(FormatRequest::RoundPhase {
                phase: "combat",
                round_number: 3,
            })
            .unwrap();
        let info = message.as_round_info().unwrap();
        assert_eq!(info.round_number, 3);
        assert_eq!(info.round_phase, "combat");
    }

    #[test]
    fn test_non_object_rejected() {
        let payload = json!([1, 2, 3]);
        let err = CanonicalFormatter
            .format(FormatRequest::KillFeed(&payload))
            .unwrap_err();
        assert_eq!(err.to_string(), "killfeed payload is not an object: [1,2,3]");
    }
}
