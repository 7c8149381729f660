//! Plain-text rendering for the one-shot commands.

use chatrelay_core::types::{Agent, Role};
use chatrelay_core::{ChatState, MessageWithParts, Session};

/// One line per session: id, title, last update.
pub fn sessions(list: &[Session]) -> String {
    list.iter()
        .map(|s| {
            let updated = s
                .updated_at()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("{}\t{}\t{}", s.id, updated, s.title)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn agents(list: &[Agent]) -> String {
    list.iter()
        .map(|a| {
            format!(
                "{}\t{}\t{}",
                a.name,
                a.mode.as_deref().unwrap_or("-"),
                a.description.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn message(message: &MessageWithParts) -> String {
    let who = match message.info.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    format!("{}> {}", who, message.text())
}

/// The latest message plus a marker while the assistant is generating.
pub fn latest(state: &ChatState) -> String {
    let line = state.messages.last().map(message).unwrap_or_default();
    if state.generating {
        format!("{} ...", line)
    } else {
        line
    }
}
