//! Server-side OpenCode API client.
//!
//! Translates typed calls into HTTP requests against an OpenCode server.
//!
//! # API Surface
//!
//! ```text
//! GET    /session                 list sessions
//! POST   /session                 create session {title, parentID?}
//! GET    /session/{id}            fetch one session
//! DELETE /session/{id}            delete a session
//! GET    /session/{id}/message    list messages (?limit=N)
//! POST   /session/{id}/message    send message {model, agent, parts}
//! POST   /session/{id}/abort      cancel in-flight generation
//! GET    /agent                   list agents
//! GET    /event                   SSE stream for a working directory
//! ```
//!
//! Every request carries a `directory` query parameter naming the working
//! tree the agent operates on. Callers may pass one per call; otherwise the
//! configured default is used.
//!
//! One call is one request. A non-2xx answer becomes
//! [`ClientError::Http`] with the status and body text. There is no retry,
//! timeout or backoff here.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::{EventReader, HttpRequest, Method, Transport, UreqTransport};
use crate::types::{Agent, MessageWithParts, ModelSelector, Part, Session};

/// Handle to one OpenCode server. Cheap to clone.
#[derive(Clone)]
pub struct OpenCodeClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl OpenCodeClient {
    /// Client using the blocking `ureq` transport.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(UreqTransport::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The directory a call will use when given `directory`.
    pub fn resolve_directory<'a>(&'a self, directory: Option<&'a str>) -> &'a str {
        directory.unwrap_or(&self.config.directory)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn list_sessions(&self, directory: Option<&str>) -> Result<Vec<Session>, ClientError> {
        let url = self.url(&["session"], &[], directory)?;
        self.send(Method::Get, url, None)
    }

    pub fn create_session(
        &self,
        title: &str,
        parent_id: Option<&str>,
        directory: Option<&str>,
    ) -> Result<Session, ClientError> {
        let mut body = json!({ "title": title });
        if let Some(parent) = parent_id {
            body["parentID"] = json!(parent);
        }
        let url = self.url(&["session"], &[], directory)?;
        self.send(Method::Post, url, Some(body))
    }

    pub fn get_session(&self, id: &str, directory: Option<&str>) -> Result<Session, ClientError> {
        let url = self.url(&["session", id], &[], directory)?;
        self.send(Method::Get, url, None)
    }

    pub fn delete_session(&self, id: &str, directory: Option<&str>) -> Result<bool, ClientError> {
        let url = self.url(&["session", id], &[], directory)?;
        self.send(Method::Delete, url, None)
    }

    /// Cancel the session's in-flight generation. Fire-and-forget: the
    /// effect only becomes visible through a later `session.status` event.
    pub fn abort_session(&self, id: &str, directory: Option<&str>) -> Result<bool, ClientError> {
        let url = self.url(&["session", id, "abort"], &[], directory)?;
        self.send(Method::Post, url, None)
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub fn list_messages(
        &self,
        session_id: &str,
        limit: usize,
        directory: Option<&str>,
    ) -> Result<Vec<MessageWithParts>, ClientError> {
        let limit = limit.to_string();
        let url = self.url(
            &["session", session_id, "message"],
            &[("limit", limit.as_str())],
            directory,
        )?;
        self.send(Method::Get, url, None)
    }

    /// Send a user message made of `texts` (one text part each, in order).
    pub fn send_message(
        &self,
        session_id: &str,
        model: &ModelSelector,
        agent: &str,
        texts: &[String],
        directory: Option<&str>,
    ) -> Result<MessageWithParts, ClientError> {
        let parts: Vec<Part> = texts.iter().map(|t| Part::text(t.as_str())).collect();
        let body = json!({
            "model": model,
            "agent": agent,
            "parts": parts,
        });
        let url = self.url(&["session", session_id, "message"], &[], directory)?;
        self.send(Method::Post, url, Some(body))
    }

    // ------------------------------------------------------------------
    // Agents and events
    // ------------------------------------------------------------------

    pub fn list_agents(&self, directory: Option<&str>) -> Result<Vec<Agent>, ClientError> {
        let url = self.url(&["agent"], &[], directory)?;
        self.send(Method::Get, url, None)
    }

    /// URL of the server-sent-event stream for a directory.
    pub fn event_url(&self, directory: Option<&str>) -> Result<String, ClientError> {
        self.url(&["event"], &[], directory)
    }

    /// Open the event stream for a directory.
    pub fn open_event_stream(&self, directory: Option<&str>) -> Result<EventReader, ClientError> {
        let url = self.event_url(directory)?;
        self.transport.open_stream(&url)
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn url(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        directory: Option<&str>,
    ) -> Result<String, ClientError> {
        let mut url = Url::parse(&self.config.base_url)?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("directory", self.resolve_directory(directory));
        }

        Ok(url.into())
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
    ) -> Result<T, ClientError> {
        let request = HttpRequest { method, url, body };
        let response = self.transport.execute(&request)?;

        if !response.is_success() {
            log::debug!(
                "{} {} failed with {}",
                request.method,
                request.url,
                response.status
            );
            return Err(ClientError::Http {
                status: response.status,
                body: response.body,
            });
        }

        Ok(serde_json::from_str(&response.body)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
