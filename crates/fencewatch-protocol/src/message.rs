//! Protocol message types for observer communication.

use chrono::{DateTime, Utc};
use fencewatch_core::{Geofence, GeofenceId, Subject, SubjectId, ZoneStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parse::{
    RawGeofenceInput, RawGeofenceRef, RawLocationReport, RawSosSignal, RawTouristRegistration,
};

// ============================================================================
// Payloads
// ============================================================================

/// Subject fields as observers see them.
///
/// `status` and the SOS fields are only present on messages that carry
/// them; a plain listing sends id, name and coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouristPayload {
    pub tourist_id: SubjectId,
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ZoneStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sos_signal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sos_timestamp: Option<DateTime<Utc>>,
}

impl TouristPayload {
    /// Id, name and coordinates only.
    pub fn summary(subject: &Subject) -> Self {
        Self {
            tourist_id: subject.id.clone(),
            name: subject.name.clone(),
            lat: subject.location.latitude,
            lng: subject.location.longitude,
            status: None,
            sos_signal: None,
            sos_timestamp: None,
        }
    }

    /// Summary plus the evaluated zone status.
    pub fn located(subject: &Subject) -> Self {
        Self {
            status: Some(subject.status),
            ..Self::summary(subject)
        }
    }

    /// Every field the daemon knows, SOS state included.
    pub fn full(subject: &Subject) -> Self {
        Self {
            status: Some(subject.status),
            sos_signal: Some(subject.sos_active),
            sos_timestamp: subject.sos_timestamp,
            ..Self::summary(subject)
        }
    }
}

/// Geofence fields as observers see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofencePayload {
    pub id: GeofenceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
}

impl GeofencePayload {
    /// Shape used by `updateGeofence`: id, centre and radius.
    pub fn shape(geofence: &Geofence) -> Self {
        Self {
            id: geofence.id.clone(),
            name: None,
            lat: geofence.center.latitude,
            lng: geofence.center.longitude,
            radius: geofence.radius_meters,
        }
    }

    /// Shape plus name, used by `allGeofences`.
    pub fn named(geofence: &Geofence) -> Self {
        Self {
            name: Some(geofence.name.clone()),
            ..Self::shape(geofence)
        }
    }
}

// ============================================================================
// Daemon -> observer
// ============================================================================

/// Notifications pushed to every connected observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BroadcastMessage {
    /// A subject moved, changed zone status, or raised/cleared SOS
    #[serde(rename = "updateTourist")]
    SubjectUpdate { tourist: TouristPayload },

    /// A geofence was created or changed
    #[serde(rename = "updateGeofence")]
    GeofenceUpdate { geofence: GeofencePayload },

    /// A geofence was deleted
    #[serde(rename = "deleteGeofence")]
    GeofenceDelete {
        #[serde(rename = "geofenceId")]
        geofence_id: GeofenceId,
    },
}

impl BroadcastMessage {
    /// Update after a location report or recheck.
    pub fn subject_located(subject: &Subject) -> Self {
        Self::SubjectUpdate {
            tourist: TouristPayload::located(subject),
        }
    }

    /// Update carrying the full subject, SOS included.
    pub fn subject_full(subject: &Subject) -> Self {
        Self::SubjectUpdate {
            tourist: TouristPayload::full(subject),
        }
    }

    pub fn geofence_updated(geofence: &Geofence) -> Self {
        Self::GeofenceUpdate {
            geofence: GeofencePayload::shape(geofence),
        }
    }

    pub fn geofence_deleted(geofence_id: GeofenceId) -> Self {
        Self::GeofenceDelete { geofence_id }
    }

    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubjectUpdate { .. } => "updateTourist",
            Self::GeofenceUpdate { .. } => "updateGeofence",
            Self::GeofenceDelete { .. } => "deleteGeofence",
        }
    }
}

/// Responses addressed to the single client that asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReplyMessage {
    /// Answer to `getAllTourists`
    AllTourists { tourists: Vec<TouristPayload> },

    /// Answer to `getAllGeofences`
    AllGeofences { geofences: Vec<GeofencePayload> },

    /// A command was applied
    Ack {
        /// The `type` of the acknowledged command
        request: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tourist: Option<TouristPayload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        geofence: Option<GeofencePayload>,
        /// Subjects re-evaluated as a side effect of a geofence change
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rechecked: Option<usize>,
    },

    /// A command or request failed
    Error { message: String },
}

impl ReplyMessage {
    pub fn all_tourists(subjects: &[Subject]) -> Self {
        Self::AllTourists {
            tourists: subjects.iter().map(TouristPayload::summary).collect(),
        }
    }

    pub fn all_geofences(geofences: &[Geofence]) -> Self {
        Self::AllGeofences {
            geofences: geofences.iter().map(GeofencePayload::named).collect(),
        }
    }

    /// Plain acknowledgement with no payload.
    pub fn ack(request: &str) -> Self {
        Self::Ack {
            request: request.to_string(),
            tourist: None,
            geofence: None,
            rechecked: None,
        }
    }

    pub fn ack_tourist(request: &str, tourist: TouristPayload) -> Self {
        Self::Ack {
            request: request.to_string(),
            tourist: Some(tourist),
            geofence: None,
            rechecked: None,
        }
    }

    pub fn ack_geofence(request: &str, geofence: Option<GeofencePayload>, rechecked: usize) -> Self {
        Self::Ack {
            request: request.to_string(),
            tourist: None,
            geofence,
            rechecked: Some(rechecked),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Anything a client may read from the daemon.
///
/// Only used on the receiving side; the daemon encodes the concrete types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Broadcast(BroadcastMessage),
    Reply(ReplyMessage),
}

// ============================================================================
// Client -> daemon
// ============================================================================

/// Messages a client may send.
///
/// The two `getAll*` requests come from observers; the rest are commands
/// from data sources and operators.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    GetAllTourists,
    GetAllGeofences,
    CreateTourist(RawTouristRegistration),
    UpdateLocation(RawLocationReport),
    Sos(RawSosSignal),
    CreateGeofence(RawGeofenceInput),
    ModifyGeofence(RawGeofenceInput),
    RemoveGeofence(RawGeofenceRef),
}

impl ClientMessage {
    /// Wire tag, echoed back in acknowledgements.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetAllTourists => "getAllTourists",
            Self::GetAllGeofences => "getAllGeofences",
            Self::CreateTourist(_) => "createTourist",
            Self::UpdateLocation(_) => "updateLocation",
            Self::Sos(_) => "sos",
            Self::CreateGeofence(_) => "createGeofence",
            Self::ModifyGeofence(_) => "modifyGeofence",
            Self::RemoveGeofence(_) => "removeGeofence",
        }
    }
}

/// Errors decoding a client line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Decodes one line of client input.
pub fn decode_client_message(line: &str) -> Result<ClientMessage, ProtocolError> {
    serde_json::from_str(line.trim()).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Decodes one raw line as read off the socket.
///
/// Bytes that are not UTF-8 are malformed input like any other.
pub fn decode_client_line(line: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| ProtocolError::Malformed(format!("line is not valid UTF-8 ({e})")))?;
    decode_client_message(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fencewatch_core::Point;
    use serde_json::{json, Value};

    fn subject() -> Subject {
        let mut s = Subject::new(SubjectId::new("t-1"), Point::new(10.0, 20.0));
        s.name = Some("Ana".to_string());
        s
    }

    #[test]
    fn test_update_tourist_shape() {
        let msg = BroadcastMessage::subject_located(&subject());
        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "updateTourist",
                "tourist": {"tourist_id": "t-1", "name": "Ana", "lat": 10.0, "lng": 20.0, "status": "outside"}
            })
        );
    }

    #[test]
    fn test_update_tourist_full_carries_sos() {
        let mut s = subject();
        s.sos_active = true;
        s.sos_timestamp = Some(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());

        let value = serde_json::to_value(BroadcastMessage::subject_full(&s)).unwrap();
        let tourist = &value["tourist"];
        assert_eq!(tourist["sos_signal"], json!(true));
        assert_eq!(tourist["sos_timestamp"], json!("2026-01-02T03:04:05Z"));
    }

    #[test]
    fn test_unknown_name_is_null() {
        let s = Subject::new(SubjectId::new("t-2"), Point::new(1.0, 2.0));
        let value = serde_json::to_value(ReplyMessage::all_tourists(&[s])).unwrap();
        assert_eq!(
            value,
            json!({"type": "allTourists", "tourists": [{"tourist_id": "t-2", "name": null, "lat": 1.0, "lng": 2.0}]})
        );
    }

    #[test]
    fn test_geofence_messages() {
        let fence = Geofence {
            id: GeofenceId::new("1"),
            name: "Harbour".to_string(),
            center: Point::new(10.0, 20.0),
            radius_meters: 1000.0,
        };

        let update = serde_json::to_value(BroadcastMessage::geofence_updated(&fence)).unwrap();
        assert_eq!(
            update,
            json!({"type": "updateGeofence", "geofence": {"id": "1", "lat": 10.0, "lng": 20.0, "radius": 1000.0}})
        );

        let delete = serde_json::to_value(BroadcastMessage::geofence_deleted(GeofenceId::new("1"))).unwrap();
        assert_eq!(delete, json!({"type": "deleteGeofence", "geofenceId": "1"}));

        let all = serde_json::to_value(ReplyMessage::all_geofences(&[fence])).unwrap();
        assert_eq!(all["geofences"][0]["name"], json!("Harbour"));
        assert_eq!(all["geofences"][0]["radius"], json!(1000.0));
    }

    #[test]
    fn test_decode_observer_requests() {
        assert!(matches!(
            decode_client_message(r#"{"type":"getAllTourists"}"#).unwrap(),
            ClientMessage::GetAllTourists
        ));
        assert!(matches!(
            decode_client_message("{\"type\":\"getAllGeofences\"}\n").unwrap(),
            ClientMessage::GetAllGeofences
        ));
    }

    #[test]
    fn test_decode_commands() {
        let msg = decode_client_message(
            r#"{"type":"updateLocation","tourist_id":"t-1","lat":"10.0","long":20.0}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), "updateLocation");
        match msg {
            ClientMessage::UpdateLocation(raw) => {
                let (id, point) = raw.to_report().unwrap();
                assert_eq!(id.as_str(), "t-1");
                assert_eq!(point, Point::new(10.0, 20.0));
            }
            other => panic!("Expected UpdateLocation, got {other:?}"),
        }

        let msg = decode_client_message(r#"{"type":"sos","tourist_id":"t-1","sos_signal":1}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Sos(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = decode_client_message(r#"{"type":"dropTables"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = decode_client_message("not json").unwrap_err();
        assert!(err.to_string().starts_with("malformed message"));
    }

    #[test]
    fn test_decode_line_rejects_invalid_utf8() {
        let err = decode_client_line(b"{\"type\":\"sos\xff\"}\n").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(ref m) if m.contains("UTF-8")));

        let msg = decode_client_line(b"{\"type\":\"getAllGeofences\"}\n").unwrap();
        assert!(matches!(msg, ClientMessage::GetAllGeofences));
    }

    #[test]
    fn test_server_message_reads_both_kinds() {
        let broadcast: ServerMessage =
            serde_json::from_str(r#"{"type":"deleteGeofence","geofenceId":"4"}"#).unwrap();
        assert!(matches!(
            broadcast,
            ServerMessage::Broadcast(BroadcastMessage::GeofenceDelete { .. })
        ));

        let reply: ServerMessage =
            serde_json::from_str(r#"{"type":"error","message":"nope"}"#).unwrap();
        assert_eq!(reply, ServerMessage::Reply(ReplyMessage::error("nope")));
    }
}
