//! fencewatch protocol - Wire messages between the daemon and its clients
//!
//! One JSON object per line in both directions. Observers receive
//! [`BroadcastMessage`]s pushed by the daemon and [`ReplyMessage`]s
//! answering their own [`ClientMessage`]s.

pub mod message;
pub mod parse;

pub use message::{
    decode_client_line, decode_client_message, BroadcastMessage, ClientMessage, GeofencePayload,
    ProtocolError, ReplyMessage, ServerMessage, TouristPayload,
};
pub use parse::{
    RawFlag, RawGeofenceInput, RawGeofenceRef, RawId, RawLocationReport, RawNumber, RawSosSignal,
    RawTouristRegistration,
};
