use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Cursor location inside a file. `lineNumber` is accepted for editors that report it that way.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    #[serde(alias = "lineNumber")]
    pub line: u32,
    pub column: u32,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceAction {
    Join,
    Leave,
}

/// Someone currently present on a file's hub
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub identity: String,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

/// Messages a client sends over its connection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(alias = "file_update")]
    ContentUpdate { content: String },
    #[serde(alias = "presence_join")]
    PresenceAnnounce {
        #[serde(alias = "username")]
        identity: String,
    },
    PresenceLeave {},
    CursorUpdate { position: CursorPosition },
    Ping {},
}

/// Messages the server pushes to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ContentUpdate {
        content: String,
    },
    PresenceEvent {
        identity: String,
        action: PresenceAction,
    },
    CursorUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        identity: Option<String>,
        position: CursorPosition,
    },
    PresenceState {
        participants: Vec<Participant>,
    },
    Pong {
        date: String,
    },
}

impl ServerMessage {
    pub fn presence(identity: impl Into<String>, action: PresenceAction) -> Self {
        ServerMessage::PresenceEvent { identity: identity.into(), action }
    }
}
