// Relay event envelope for the pairlab collaboration channel.

use serde::{Deserialize, Serialize};

/// Event kinds carried over the relay socket.
///
/// Wire strings are kebab-case (`code-change`, `session-join`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// An edit to a shared file's content.
    CodeChange,
    /// A participant's cursor moved.
    CursorMove,
    /// A new file was created in the session.
    FileCreate,
    /// A file was deleted from the session.
    FileDelete,
    /// A chat message.
    ChatMessage,
    /// A participant joined a session.
    SessionJoin,
    /// A participant left a session.
    SessionLeave,
    /// Shared terminal output.
    TerminalOutput,
    /// Shared terminal input.
    TerminalInput,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CodeChange => "code-change",
            Self::CursorMove => "cursor-move",
            Self::FileCreate => "file-create",
            Self::FileDelete => "file-delete",
            Self::ChatMessage => "chat-message",
            Self::SessionJoin => "session-join",
            Self::SessionLeave => "session-leave",
            Self::TerminalOutput => "terminal-output",
            Self::TerminalInput => "terminal-input",
        }
    }
}

/// The uniform envelope exchanged over the relay socket and fanned out
/// verbatim to the other members of its session.
///
/// `payload` is kind-specific and opaque to the relay; typed views exist
/// below for the payloads the server itself reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    pub kind: EventKind,
    pub session_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RelayEvent {
    /// Parse the payload as a kind-specific structure.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// The `session-leave` envelope the server synthesizes when a
    /// connection drops without sending an explicit leave.
    pub fn synthesized_leave(session_id: i64, sender_id: i64) -> Self {
        Self {
            kind: EventKind::SessionLeave,
            session_id,
            sender_id,
            payload: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Typed view of a `code-change` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeChangePayload {
    /// Persisted file the edit applies to; `None` for an unsaved buffer.
    #[serde(default)]
    pub file_id: Option<i64>,
    pub content: String,
}

/// Typed view of a `file-create` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileCreatePayload {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Typed view of a `cursor-move` payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovePayload {
    #[serde(default)]
    pub file_id: Option<i64>,
    pub line: u32,
    pub column: u32,
}

/// Typed view of a `chat-message` payload. `sent_at` is the client's own
/// clock, carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub text: String,
    #[serde(default)]
    pub sent_at: Option<String>,
}

/// Typed view of `terminal-input` and `terminal-output` payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TerminalPayload {
    pub data: String,
}

pub fn decode_event(raw: &str) -> Result<RelayEvent, serde_json::Error> {
    serde_json::from_str::<RelayEvent>(raw)
}

pub fn encode_event(event: &RelayEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
