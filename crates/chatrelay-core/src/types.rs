//! OpenCode data model, as consumed by chatrelay.
//!
//! Every entity here is owned by the external OpenCode server. chatrelay
//! only reads, creates or deletes them by id and never persists them.
//!
//! # Wire Shapes
//!
//! ```json
//! // Session
//! {"id": "ses_1", "title": "Refactor", "parentID": null,
//!  "time": {"created": 1717000000000, "updated": 1717000005000}}
//!
//! // Message with parts
//! {"info": {"id": "msg_1", "sessionID": "ses_1", "role": "assistant",
//!           "time": {"created": 1717000000000}},
//!  "parts": [{"type": "text", "text": "Hello"},
//!            {"type": "tool", "tool": "bash", "input": {"command": "ls"}}]}
//! ```

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Convert a Unix-millisecond timestamp to a UTC datetime.
fn millis_to_utc(ms: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms as i64)
}

/// Timestamps for a session (Unix ms).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTime {
    #[serde(default)]
    pub created: f64,
    #[serde(default)]
    pub updated: f64,
}

/// One conversation thread on the OpenCode server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Parent session for forked conversations.
    #[serde(rename = "parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub time: SessionTime,
}

impl Session {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.time.created)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.time.updated)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Timestamps for a message (Unix ms).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageTime {
    #[serde(default)]
    pub created: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<f64>,
}

/// Message metadata without its content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,

    #[serde(rename = "sessionID")]
    pub session_id: String,

    pub role: Role,

    #[serde(default)]
    pub time: MessageTime,
}

impl MessageInfo {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.time.created)
    }
}

/// A message paired with its ordered content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageWithParts {
    pub info: MessageInfo,

    #[serde(default)]
    pub parts: Vec<Part>,
}

impl MessageWithParts {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A text block. Streaming output grows `text` through deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub text: String,
}

/// A tool invocation and, once finished, its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Tool name: "bash", "edit", "read", etc.
    #[serde(alias = "tool")]
    pub name: String,

    #[serde(default)]
    pub input: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

/// One element of a message's content.
///
/// OpenCode emits many part types (`step-start`, `reasoning`, `file`, ...).
/// Only `text` and `tool` are interpreted; everything else is kept verbatim
/// so it survives re-serialization and can still be matched by type.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(TextPart),
    Tool(ToolPart),
    Other {
        part_type: String,
        raw: serde_json::Value,
    },
}

impl Part {
    /// Create a text part with no id.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(TextPart {
            id: None,
            text: text.into(),
        })
    }

    /// The wire `type` tag of this part.
    pub fn part_type(&self) -> &str {
        match self {
            Part::Text(_) => "text",
            Part::Tool(_) => "tool",
            Part::Other { part_type, .. } => part_type,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TaggedPart<'a> {
    Text(&'a TextPart),
    Tool(&'a ToolPart),
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Part::Text(text) => TaggedPart::Text(text).serialize(serializer),
            Part::Tool(tool) => TaggedPart::Tool(tool).serialize(serializer),
            Part::Other { raw, .. } => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let part_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| de::Error::missing_field("type"))?
            .to_string();

        match part_type.as_str() {
            "text" => serde_json::from_value(value)
                .map(Part::Text)
                .map_err(de::Error::custom),
            "tool" => serde_json::from_value(value)
                .map(Part::Tool)
                .map_err(de::Error::custom),
            _ => Ok(Part::Other {
                part_type,
                raw: value,
            }),
        }
    }
}

/// Transient generation status of a session, delivered only via events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Busy,
    Retry {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// When the next attempt happens (Unix ms).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<f64>,
    },
    /// Any status type this client does not know about.
    #[serde(other)]
    Unknown,
}

impl SessionStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionStatus::Busy)
    }
}

/// An agent configured on the OpenCode server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// "primary", "subagent" or "all".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Which provider/model pair should answer a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelector {
    #[serde(rename = "providerID")]
    pub provider_id: String,

    #[serde(rename = "modelID")]
    pub model_id: String,
}

impl ModelSelector {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
