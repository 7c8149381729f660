//! Page controller: per-request read and write paths for the chat page.
//!
//! Both entry points are stateless. Everything they need (client, fixed
//! model/agent selection) is passed in, and each invocation performs its
//! own calls and returns.
//!
//! - [`load`] answers a page load. Failed fetches become
//!   [`Loaded::Failed`] instead of silently looking empty.
//! - [`act`] answers a form submission. Failures are returned as an
//!   [`ActionResult`] with `success: false`; nothing escapes the action.

use serde::{Deserialize, Serialize};

use crate::client::OpenCodeClient;
use crate::config::{ChatDefaults, DEFAULT_SESSION_TITLE};
use crate::types::{MessageWithParts, Session};

// ============================================================================
// READ PATH
// ============================================================================

/// Outcome of one fetch on the read path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum Loaded<T> {
    Ready(T),
    Failed { error: String },
}

impl<T> Loaded<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, Loaded::Failed { .. })
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Loaded::Ready(value) => Some(value),
            Loaded::Failed { .. } => None,
        }
    }
}

/// Everything the chat page renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    pub directory: String,
    pub sessions: Loaded<Vec<Session>>,
    /// The requested session, if it appears in the session list.
    pub current_session: Option<Session>,
    /// History of the requested session; absent when none was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Loaded<Vec<MessageWithParts>>>,
    /// Where the view should subscribe for live events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_url: Option<String>,
}

/// Read path: session list, plus history for `session_id` if given.
pub fn load(
    client: &OpenCodeClient,
    defaults: &ChatDefaults,
    session_id: Option<&str>,
    directory: Option<&str>,
) -> PageData {
    let session_id = session_id.filter(|id| !id.is_empty());

    let sessions = match client.list_sessions(directory) {
        Ok(list) => Loaded::Ready(list),
        Err(e) => {
            log::warn!("Failed to load sessions: {}", e);
            Loaded::Failed {
                error: e.to_string(),
            }
        }
    };

    let current_session = session_id.and_then(|id| {
        sessions
            .ready()
            .and_then(|list| list.iter().find(|s| s.id == id).cloned())
    });

    let messages = session_id.map(|id| {
        match client.list_messages(id, defaults.message_limit, directory) {
            Ok(list) => Loaded::Ready(list),
            Err(e) => {
                log::warn!("Failed to load messages for {}: {}", id, e);
                Loaded::Failed {
                    error: e.to_string(),
                }
            }
        }
    });

    let event_url = match client.event_url(directory) {
        Ok(url) => Some(url),
        Err(e) => {
            log::warn!("Failed to build event URL: {}", e);
            None
        }
    };

    PageData {
        directory: client.resolve_directory(directory).to_string(),
        sessions,
        current_session,
        messages,
        event_url,
    }
}

// ============================================================================
// WRITE PATH
// ============================================================================

/// A submitted chat form. Which fields matter depends on `intent`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionForm {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "sessionID", alias = "session_id")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
}

/// The action branch a form selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    CreateSession { title: String },
    SendMessage { session_id: String, text: String },
    Abort { session_id: String },
}

impl Intent {
    pub fn from_form(form: &ActionForm) -> Result<Self, String> {
        let session_id = || {
            form.session_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .ok_or_else(|| "Missing sessionId".to_string())
        };

        match form.intent.as_str() {
            "create-session" => {
                let title = form
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(DEFAULT_SESSION_TITLE);
                Ok(Intent::CreateSession {
                    title: title.to_string(),
                })
            }
            "send-message" => {
                let session_id = session_id()?;
                let text = form
                    .text
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| "Message text is required".to_string())?;
                Ok(Intent::SendMessage {
                    session_id,
                    text: text.to_string(),
                })
            }
            "abort" => Ok(Intent::Abort {
                session_id: session_id()?,
            }),
            "" => Err("Missing intent".to_string()),
            other => Err(format!("Unknown intent: {}", other)),
        }
    }
}

/// What a successful action produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionOutcome {
    SessionCreated { session: Session },
    MessageSent { message: MessageWithParts },
    Aborted { aborted: bool },
}

/// Result payload of an action, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ActionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn ok(intent: &str, data: ActionOutcome) -> Self {
        Self {
            success: true,
            intent: intent.to_string(),
            data: Some(data),
            error: None,
        }
    }

    fn failed(intent: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        log::warn!("Action {:?} failed: {}", intent, error);
        Self {
            success: false,
            intent: intent.to_string(),
            data: None,
            error: Some(error),
        }
    }
}

/// Write path: dispatch one form submission to exactly one client call.
pub fn act(client: &OpenCodeClient, defaults: &ChatDefaults, form: &ActionForm) -> ActionResult {
    let intent = match Intent::from_form(form) {
        Ok(i) => i,
        Err(e) => return ActionResult::failed(&form.intent, e),
    };
    let directory = form.directory.as_deref().filter(|d| !d.is_empty());

    let outcome = match intent {
        Intent::CreateSession { title } => client
            .create_session(&title, None, directory)
            .map(|session| ActionOutcome::SessionCreated { session }),
        Intent::SendMessage { session_id, text } => client
            .send_message(
                &session_id,
                &defaults.model,
                &defaults.agent,
                &[text],
                directory,
            )
            .map(|message| ActionOutcome::MessageSent { message }),
        Intent::Abort { session_id } => client
            .abort_session(&session_id, directory)
            .map(|aborted| ActionOutcome::Aborted { aborted }),
    };

    match outcome {
        Ok(data) => ActionResult::ok(&form.intent, data),
        Err(e) => ActionResult::failed(&form.intent, e.to_string()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
