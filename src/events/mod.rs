//! Event types for the bridge.
//!
//! Raw provider records are decoded into typed events before the dispatcher
//! acts on them. Outgoing messages carry no identity until the session
//! connector frames them for the wire.

mod outgoing;
mod provider_events;

pub use outgoing::{
    escape_map_name, AuthRequest, InboundMessage, MessageKind, OutgoingData, OutgoingMessage,
    RoundInfo, Score, WireFrame, MAP_SENTINEL, MAP_SENTINEL_ESCAPED, TERMINAL_ROUND_PHASE,
};
pub use provider_events::{
    classify_game, classify_info, Channel, DecodeError, FeedBatch, GameEvent, GameKind,
    InfoEvent, InfoKind, KeyPattern, RawEvent, GAME_ROUTES, INFO_ROUTES,
};
