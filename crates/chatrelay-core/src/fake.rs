//! In-memory [`Transport`] for tests.
//!
//! Routes are matched on method and URL path (query string ignored). Every
//! executed request is recorded so tests can assert on URLs and bodies.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Mutex, PoisonError};

use crate::error::ClientError;
use crate::transport::{EventReader, HttpRequest, HttpResponse, Method, Transport};

#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<(Method, String), HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    streams: Mutex<VecDeque<Result<String, ClientError>>>,
    stream_urls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` with `status` and a JSON body.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.respond_text(method, path, status, body.to_string());
    }

    /// Answer `method path` with `status` and a raw text body.
    pub fn respond_text(&self, method: Method, path: &str, status: u16, body: impl Into<String>) {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).insert(
            (method, path.to_string()),
            HttpResponse {
                status,
                body: body.into(),
            },
        );
    }

    /// Queue the raw text of one event-stream connection.
    pub fn push_stream(&self, body: impl Into<String>) {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(body.into()));
    }

    /// Queue a failed event-stream connection attempt.
    pub fn push_stream_error(&self, error: ClientError) {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests().pop()
    }

    /// URLs passed to `open_stream`, in order.
    pub fn stream_urls(&self) -> Vec<String> {
        self.stream_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn path_of(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl Transport for FakeTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ClientError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let key = (request.method, path_of(&request.url));
        let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(routes.get(&key).cloned().unwrap_or_else(|| HttpResponse {
            status: 404,
            body: format!("No route for {} {}", key.0, key.1),
        }))
    }

    fn open_stream(&self, url: &str) -> Result<EventReader, ClientError> {
        self.stream_urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        match self
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            Some(Ok(body)) => Ok(Box::new(Cursor::new(body.into_bytes()))),
            Some(Err(e)) => Err(e),
            None => Err(ClientError::Transport("connection refused".to_string())),
        }
    }
}
