//! OpenCode event decoding.
//!
//! Each SSE frame's `data` is a JSON object. Two envelopes occur in the wild:
//!
//! ```json
//! {"type": "session.status", "properties": {...}}                  // /event
//! {"directory": "/w", "payload": {"type": "...", "properties": {...}}} // /global/event
//! ```
//!
//! The `payload` wrapper is unwrapped when present. Only three event types
//! affect chat state; the rest decode to [`ChatEvent::Other`] so callers can
//! still log or relay them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{MessageInfo, Part, SessionStatus};

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event {event_type} is missing {field}")]
    MissingField {
        event_type: String,
        field: &'static str,
    },
}

/// A decoded event relevant to a chat view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// Message metadata changed; `parts` is present only on full updates.
    #[serde(rename = "message.updated")]
    MessageUpdated {
        info: MessageInfo,
        #[serde(skip_serializing_if = "Option::is_none")]
        parts: Option<Vec<Part>>,
    },

    /// One part was added or changed. `delta` is the text appended since the
    /// previous update of a streaming text part.
    #[serde(rename = "message.part.updated")]
    PartUpdated {
        #[serde(rename = "sessionID", skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(rename = "messageID")]
        message_id: String,
        part: Part,
        #[serde(skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
    },

    #[serde(rename = "session.status")]
    StatusChanged {
        #[serde(rename = "sessionID")]
        session_id: String,
        status: SessionStatus,
    },

    /// Any other event type, kept for logging and relaying.
    #[serde(rename = "other")]
    Other {
        event_type: String,
        #[serde(rename = "sessionID", skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}

impl ChatEvent {
    /// The session this event belongs to, if it names one.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ChatEvent::MessageUpdated { info, .. } => Some(&info.session_id),
            ChatEvent::PartUpdated { session_id, .. } => session_id.as_deref(),
            ChatEvent::StatusChanged { session_id, .. } => Some(session_id),
            ChatEvent::Other { session_id, .. } => session_id.as_deref(),
        }
    }

    /// The wire type tag.
    pub fn event_type(&self) -> &str {
        match self {
            ChatEvent::MessageUpdated { .. } => "message.updated",
            ChatEvent::PartUpdated { .. } => "message.part.updated",
            ChatEvent::StatusChanged { .. } => "session.status",
            ChatEvent::Other { event_type, .. } => event_type,
        }
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    properties: Value,
}

#[derive(Deserialize)]
struct MessageUpdatedProps {
    info: MessageInfo,
    #[serde(default)]
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
struct PartUpdatedProps {
    #[serde(rename = "sessionID", default)]
    session_id: Option<String>,
    #[serde(rename = "messageID", default)]
    message_id: Option<String>,
    part: Value,
    #[serde(default)]
    delta: Option<String>,
}

#[derive(Deserialize)]
struct StatusProps {
    #[serde(rename = "sessionID")]
    session_id: String,
    status: SessionStatus,
}

fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// Decode one frame's data into a [`ChatEvent`].
pub fn decode_event(data: &str) -> Result<ChatEvent, EventError> {
    let value: Value = serde_json::from_str(data)?;

    // Unwrap the /global/event envelope
    let payload = match value.get("payload") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => value,
    };

    let raw: RawEvent = serde_json::from_value(payload)?;

    match raw.event_type.as_str() {
        "message.updated" => {
            let props: MessageUpdatedProps = serde_json::from_value(raw.properties)?;
            Ok(ChatEvent::MessageUpdated {
                info: props.info,
                parts: props.parts,
            })
        }

        "message.part.updated" => {
            let props: PartUpdatedProps = serde_json::from_value(raw.properties)?;

            // OpenCode embeds the owning ids in the part itself
            let message_id = props
                .message_id
                .or_else(|| str_at(&props.part, "messageID").map(String::from))
                .ok_or_else(|| EventError::MissingField {
                    event_type: raw.event_type.clone(),
                    field: "messageID",
                })?;
            let session_id = props
                .session_id
                .or_else(|| str_at(&props.part, "sessionID").map(String::from));
            let part: Part = serde_json::from_value(props.part)?;

            Ok(ChatEvent::PartUpdated {
                session_id,
                message_id,
                part,
                delta: props.delta,
            })
        }

        "session.status" => {
            let props: StatusProps = serde_json::from_value(raw.properties)?;
            Ok(ChatEvent::StatusChanged {
                session_id: props.session_id,
                status: props.status,
            })
        }

        _ => {
            let props = &raw.properties;
            let session_id = str_at(props, "sessionID")
                .or_else(|| props.get("info").and_then(|i| str_at(i, "sessionID")))
                .or_else(|| props.get("part").and_then(|p| str_at(p, "sessionID")))
                .map(String::from);
            Ok(ChatEvent::Other {
                event_type: raw.event_type,
                session_id,
            })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
