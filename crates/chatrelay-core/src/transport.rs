//! HTTP transport seam.
//!
//! [`OpenCodeClient`](crate::client::OpenCodeClient) never touches the
//! network directly. It builds an [`HttpRequest`] and hands it to a
//! [`Transport`], so tests can swap in an in-memory fake and production uses
//! [`UreqTransport`].

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

use crate::error::ClientError;

/// HTTP methods used against the OpenCode API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-resolved request: URL already carries its query string.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

/// Status and body text of a completed request, whatever the status.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Readable event stream handed back by [`Transport::open_stream`].
pub type EventReader = Box<dyn BufRead + Send>;

/// Something that can perform HTTP requests.
pub trait Transport: Send + Sync {
    /// Perform one request. Non-2xx statuses are returned as responses, not
    /// errors; only failures to get any response are `Err`.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError>;

    /// Open a long-lived `text/event-stream` GET. A non-2xx status is an
    /// [`ClientError::Http`].
    fn open_stream(&self, url: &str) -> Result<EventReader, ClientError>;
}

/// How long an event stream read blocks before the reader gets a chance to
/// notice it was closed. An idle stream yields a `TimedOut` read error at
/// this interval; see [`crate::sse::is_idle`].
pub const STREAM_IDLE_POLL: Duration = Duration::from_millis(500);

/// Blocking transport backed by `ureq` agents.
///
/// REST calls have no timeout and wait as long as the server takes. Event
/// streams use their own agent whose reads time out every
/// [`STREAM_IDLE_POLL`], so a closed subscription releases its connection
/// even when the server sends nothing.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            stream_agent: ureq::AgentBuilder::new()
                .timeout_read(STREAM_IDLE_POLL)
                .build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        log::debug!("{} {}", request.method, request.url);

        let req = self
            .agent
            .request(request.method.as_str(), &request.url)
            .set("Accept", "application/json");

        let result = match &request.body {
            Some(body) => req.send_json(body.clone()),
            None => req.call(),
        };

        let response = match result {
            Ok(r) => r,
            // Non-2xx still carries a body worth reporting
            Err(ureq::Error::Status(_, r)) => r,
            Err(ureq::Error::Transport(t)) => return Err(ClientError::Transport(t.to_string())),
        };

        // into_string() caps bodies at 10 MB; long transcripts exceed that
        let status = response.status();
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| ClientError::Transport(format!("Failed to read response body: {}", e)))?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(HttpResponse { status, body })
    }

    fn open_stream(&self, url: &str) -> Result<EventReader, ClientError> {
        log::debug!("GET {} (event stream)", url);

        let response = match self
            .stream_agent
            .get(url)
            .set("Accept", "text/event-stream")
            .call()
        {
            Ok(r) => r,
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_default();
                return Err(ClientError::Http { status, body });
            }
            Err(ureq::Error::Transport(t)) => return Err(ClientError::Transport(t.to_string())),
        };

        Ok(Box::new(BufReader::new(response.into_reader())))
    }
}
