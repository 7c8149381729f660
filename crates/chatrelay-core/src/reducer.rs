//! Chat state reconciliation.
//!
//! [`reduce`] is a pure `(state, event) -> state` function. It knows nothing
//! about transports, so every reconciliation rule is testable without a
//! live connection.
//!
//! Local state is only a cache of the OpenCode server's state, keyed by
//! message id. Nothing here is persisted; reloading re-fetches history.

use serde::Serialize;

use crate::events::ChatEvent;
use crate::types::{MessageWithParts, Part};

/// What a chat view shows for one open session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatState {
    /// The open session. Events for any other session are ignored.
    pub session_id: Option<String>,
    /// Messages in arrival order.
    pub messages: Vec<MessageWithParts>,
    /// Whether the assistant is generating.
    pub generating: bool,
}

impl ChatState {
    /// State for `session_id`, seeded with already-fetched history.
    pub fn new(session_id: impl Into<String>, history: Vec<MessageWithParts>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            messages: history,
            generating: false,
        }
    }

    pub fn message(&self, id: &str) -> Option<&MessageWithParts> {
        self.messages.iter().find(|m| m.info.id == id)
    }

    /// Apply one event in place. Returns whether anything changed.
    pub fn apply(&mut self, event: &ChatEvent) -> bool {
        let Some(open) = self.session_id.as_deref() else {
            return false;
        };
        // Events that name no session cannot be attributed
        if event.session_id() != Some(open) {
            return false;
        }

        match event {
            ChatEvent::MessageUpdated { info, parts } => {
                match self.messages.iter_mut().find(|m| m.info.id == info.id) {
                    Some(existing) => {
                        existing.info = info.clone();
                        if let Some(parts) = parts {
                            existing.parts = parts.clone();
                        }
                    }
                    None => self.messages.push(MessageWithParts {
                        info: info.clone(),
                        parts: parts.clone().unwrap_or_default(),
                    }),
                }
                true
            }

            ChatEvent::PartUpdated {
                message_id,
                part,
                delta,
                ..
            } => {
                let Some(message) = self.messages.iter_mut().find(|m| &m.info.id == message_id)
                else {
                    log::debug!("Part update for unknown message {}", message_id);
                    return false;
                };
                upsert_part(&mut message.parts, part, delta.as_deref());
                true
            }

            ChatEvent::StatusChanged { status, .. } => {
                let generating = status.is_busy();
                let changed = self.generating != generating;
                self.generating = generating;
                changed
            }

            ChatEvent::Other { .. } => false,
        }
    }
}

/// Merge `incoming` into `parts`.
///
/// The first part with the same type is the target. A delta on a text
/// target is appended to its text; otherwise the target is replaced. With
/// no target the part is appended.
fn upsert_part(parts: &mut Vec<Part>, incoming: &Part, delta: Option<&str>) {
    let target = parts
        .iter_mut()
        .find(|p| p.part_type() == incoming.part_type());

    match (target, delta) {
        (Some(Part::Text(existing)), Some(delta)) => existing.text.push_str(delta),
        (Some(existing), _) => *existing = incoming.clone(),
        (None, _) => parts.push(incoming.clone()),
    }
}

/// Pure reducer: `state` after `event`.
pub fn reduce(mut state: ChatState, event: &ChatEvent) -> ChatState {
    state.apply(event);
    state
}

// ============================================================================
// TESTS
// ============================================================================
