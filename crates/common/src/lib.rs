// ================
// crates/common/src/lib.rs
// ================
//! Shared types for the smart-door display server and its clients.
//! Defines the persisted display document and the WebSocket protocol
//! messages exchanged over a room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Widget slots on a display are fixed at three.
pub const WIDGET_SLOTS: usize = 3;

/// Widgets a freshly registered display starts with.
pub const DEFAULT_WIDGETS: [&str; WIDGET_SLOTS] =
    ["PinnedMessagesWidget", "ScheduleWidget", "WhiteboardWidget"];

/// Presence state shown on the display, also gates incoming calls.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Available,
    DoNotDisturb,
    Busy,
    Away,
}

/// The person (or office) a display belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub status: UserStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

/// One bearer session. Presenting `code` re-establishes a management
/// connection without credentials.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub code: String,
    pub created: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl SessionToken {
    pub fn generate() -> Self {
        let now = Utc::now();
        Self {
            code: Uuid::new_v4().to_string(),
            created: now,
            last_access: now,
        }
    }
}

/// A sticky note on the display. After sanitization at least one of
/// `text`/`image` is present.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Note {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl Note {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }
}

/// A subscribed calendar feed with its display colour.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalendarSource {
    pub url: String,
    pub colour: String,
}

/// Raw calendar entry as sent by clients, before sanitization.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CalendarSourcePatch {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub colour: Option<String>,
}

/// One event parsed out of a calendar feed. Timestamps are epoch
/// milliseconds; feeds that omit them yield 0.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
}

/// Aggregator output: one feed's events tagged with its colour.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalendarFeed {
    pub colour: String,
    pub events: Vec<CalendarEvent>,
}

/// The persisted record pairing one physical display with its state.
/// `room_code` is the rotatable capability that scopes a room;
/// `username`/`password_hash` are absent for legacy anonymous displays.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayDocument {
    pub id: String,
    pub room_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub sessions: Vec<SessionToken>,
    pub user: UserProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    pub widgets: [Option<String>; WIDGET_SLOTS],
    #[serde(default)]
    pub calendars: Vec<CalendarSource>,
    #[serde(default)]
    pub doodles: Vec<String>,
}

impl DisplayDocument {
    /// A fresh document with the registration defaults.
    pub fn new(room_code: String, username: Option<String>, password_hash: Option<String>) -> Self {
        let name = username.clone().unwrap_or_default();
        Self {
            id: Uuid::new_v4().to_string(),
            room_code,
            username,
            password_hash,
            sessions: Vec::new(),
            user: UserProfile {
                name,
                status: UserStatus::Available,
                profile_image: None,
            },
            background_url: None,
            notes: Vec::new(),
            widgets: DEFAULT_WIDGETS.map(|w| Some(w.to_string())),
            calendars: Vec::new(),
            doodles: Vec::new(),
        }
    }
}

/// Messages sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Pair as a Display using the room code capability.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_code: String,
        #[serde(default)]
        is_new_pairing: bool,
    },
    /// Create an account and pair as Management.
    Register { username: String, password: String },
    /// Pair as Management with credentials.
    Login { username: String, password: String },
    /// Pair as Management with a previously issued session code.
    LoginFromSession(String),
    /// Revoke exactly one session, then disconnect.
    Logout(String),
    GetUser,
    GetBackground,
    GetWidgets,
    GetNotes,
    GetDoodles,
    GetRoomCode,
    GetCalendar,
    UpdateStatus(UserStatus),
    UpdateName(String),
    UpdateBackground(Option<String>),
    UpdateWidgets(Vec<Option<String>>),
    UpdateNotes(Vec<Note>),
    UpdateCalendar(Vec<CalendarSourcePatch>),
    AddDoodle(String),
    RemoveDoodle(String),
    DeleteDoodles,
    /// Relayed to the room verbatim, never persisted.
    SendMessage(serde_json::Value),
    ClearMessages,
    /// Management only: rotate the room code, migrating management
    /// connections and evicting displays.
    ResetRoomCode,
    StartIntercomCall(String),
    DeclineCallRequest(String),
    CancelCallRequest(String),
    EndIntercomCall(String),
    IntercomCallSignalling(serde_json::Value),
}

/// Messages pushed from server to one or all room members
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    UserUpdate(UserProfile),
    BackgroundUpdate(Option<String>),
    WidgetsUpdate([Option<String>; WIDGET_SLOTS]),
    NotesUpdate(Vec<Note>),
    DoodlesUpdate(Vec<String>),
    CalendarUpdate(Vec<CalendarFeed>),
    NewMessage(serde_json::Value),
    ClearMessages,
    /// The room's current code, sent to the requester or to migrated
    /// management connections after rotation.
    RoomId(String),
    #[serde(rename_all = "camelCase")]
    RoomJoined { room_code: String },
    InvalidRoomCode,
    #[serde(rename_all = "camelCase")]
    LoginSuccess {
        room_code: String,
        session_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    LoginFailure { reason: String },
    /// A display freshly paired with this room.
    NewDeviceJoined,
    /// The room code this connection joined with is no longer valid.
    RoomInvalidate,
    IntercomCallRequest(String),
    DeclineCallRequest(String),
    CancelCallRequest(String),
    EndIntercomCall(String),
    IntercomCallSignalling(serde_json::Value),
    #[serde(rename_all = "camelCase")]
    MalformedMessage { err_msg: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_wire_shape() {
        let join = ClientMessage::JoinRoom {
            room_code: "123456".to_string(),
            is_new_pairing: true,
        };
        let json = serde_json::to_value(&join).unwrap();
        assert_eq!(json["event"], "join_room");
        assert_eq!(json["data"]["roomCode"], "123456");
        assert_eq!(json["data"]["isNewPairing"], true);

        // Single-payload events carry the bare value.
        let status = ClientMessage::UpdateStatus(UserStatus::DoNotDisturb);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["event"], "update_status");
        assert_eq!(json["data"], "DO_NOT_DISTURB");
    }

    #[test]
    fn unit_events_parse_without_data() {
        let msg: ClientMessage = serde_json::from_str(r#"{"event":"get_user"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::GetUser));

        let msg: ClientMessage = serde_json::from_str(r#"{"event":"clear_messages"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::ClearMessages));
    }

    #[test]
    fn server_message_wire_shape() {
        let msg = ServerMessage::LoginSuccess {
            room_code: "654321".to_string(),
            session_code: "abc".to_string(),
            username: Some("alice".to_string()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "login_success");
        assert_eq!(json["data"]["roomCode"], "654321");
        assert_eq!(json["data"]["username"], "alice");

        let json = serde_json::to_value(&ServerMessage::RoomInvalidate).unwrap();
        assert_eq!(json["event"], "room_invalidate");
    }

    #[test]
    fn document_round_trips_camel_case() {
        let doc = DisplayDocument::new("111222".to_string(), Some("alice".to_string()), None);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["roomCode"], "111222");
        assert_eq!(json["user"]["status"], "AVAILABLE");
        assert_eq!(json["widgets"].as_array().unwrap().len(), WIDGET_SLOTS);

        let back: DisplayDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn fresh_document_defaults() {
        let doc = DisplayDocument::new("999000".to_string(), None, None);
        assert_eq!(doc.user.status, UserStatus::Available);
        assert_eq!(doc.widgets[0].as_deref(), Some("PinnedMessagesWidget"));
        assert!(doc.notes.is_empty());
        assert!(doc.calendars.is_empty());
        assert!(doc.doodles.is_empty());
        assert!(doc.sessions.is_empty());
    }
}
