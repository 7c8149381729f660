//! HTTP relay for browser-based access to an OpenCode server.
//!
//! Exposes the chat page controller via REST and the session event stream
//! via server-sent events.

mod events;
mod relay;
mod routes;
mod state;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{delete, get},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub use relay::{RelayHub, RelayOptions};
pub use routes::ApiResponse;
pub use state::SharedState;

/// Build the relay's router. Unmatched paths are served from `static_dir`
/// when given.
pub fn router(state: Arc<SharedState>, static_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health))
        .route("/api/chat", get(routes::get_chat).post(routes::post_chat))
        .route("/api/agents", get(routes::list_agents))
        .route("/api/session/{id}", delete(routes::delete_session))
        .route("/api/events", get(events::events_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Serve until `shutdown` resolves, then close upstream subscriptions.
///
/// Open browser event streams are ended as soon as `shutdown` resolves so
/// that graceful shutdown only waits for ordinary requests.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<SharedState>,
    static_dir: Option<PathBuf>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("HTTP relay listening on http://{}", addr);
    }

    let app = router(Arc::clone(&state), static_dir);
    let stopping = Arc::clone(&state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            log::info!("HTTP relay shutting down");
            stopping.begin_shutdown();
        })
        .await;

    state.hub.shutdown();
    result
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use chatrelay_core::fake::FakeTransport;
    use chatrelay_core::subscription::ReconnectPolicy;
    use chatrelay_core::transport::Method as UpstreamMethod;
    use chatrelay_core::{ChatDefaults, ClientConfig, OpenCodeClient};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn state_with(fake: &Arc<FakeTransport>) -> Arc<SharedState> {
        let client = OpenCodeClient::with_transport(
            ClientConfig::new("http://opencode.test", "/workspace"),
            fake.clone(),
        );
        let options = RelayOptions {
            reconnect: ReconnectPolicy::never(),
            transcript_dir: None,
        };
        Arc::new(SharedState::new(client, ChatDefaults::default(), options))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    mod page {
        use super::*;

        #[tokio::test]
        async fn health() {
            let app = router(state_with(&Arc::new(FakeTransport::new())), None);
            let response = app.oneshot(get("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&bytes[..], b"ok");
        }

        #[tokio::test]
        async fn get_chat_returns_page_data() {
            let fake = Arc::new(FakeTransport::new());
            fake.respond(UpstreamMethod::Get, "/session", 200, json!([{"id": "s1", "title": "One"}]));
            fake.respond(UpstreamMethod::Get, "/session/s1/message", 200, json!([]));
            let app = router(state_with(&fake), None);

            let (status, body) = call(app, get("/api/chat?session=s1&directory=%2Frepo")).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["directory"], "/repo");
            assert_eq!(body["currentSession"]["title"], "One");
            assert_eq!(body["messages"], json!({"status": "ready", "data": []}));
        }

        #[tokio::test]
        async fn get_chat_reports_upstream_failure_in_body() {
            let fake = Arc::new(FakeTransport::new());
            fake.respond_text(UpstreamMethod::Get, "/session", 500, "boom");
            let app = router(state_with(&fake), None);

            let (status, body) = call(app, get("/api/chat")).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["sessions"]["status"], "failed");
            assert_eq!(body["sessions"]["data"]["error"], "HTTP 500: boom");
        }

        #[tokio::test]
        async fn post_chat_creates_session() {
            let fake = Arc::new(FakeTransport::new());
            fake.respond(UpstreamMethod::Post, "/session", 200, json!({"id": "s3", "title": "New Session"}));
            let app = router(state_with(&fake), None);

            let (status, body) = call(
                app,
                post_json("/api/chat", json!({"intent": "create-session", "title": ""})),
            )
            .await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
            assert_eq!(body["data"]["kind"], "sessionCreated");
            assert_eq!(body["data"]["session"]["id"], "s3");
        }

        #[tokio::test]
        async fn post_chat_accepts_form_body() {
            let fake = Arc::new(FakeTransport::new());
            fake.respond(UpstreamMethod::Post, "/session/s1/abort", 200, json!(true));
            let app = router(state_with(&fake), None);

            let request = Request::builder()
                .method(Method::POST)
                .uri("/api/chat")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("intent=abort&sessionId=s1"))
                .unwrap();
            let (status, body) = call(app, request).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"], json!({"kind": "aborted", "aborted": true}));
        }

        #[tokio::test]
        async fn post_chat_send_to_missing_session_fails_in_body() {
            let fake = Arc::new(FakeTransport::new());
            fake.respond_text(UpstreamMethod::Post, "/session/ghost/message", 404, "Session not found");
            let app = router(state_with(&fake), None);

            let (status, body) = call(
                app,
                post_json(
                    "/api/chat",
                    json!({"intent": "send-message", "sessionId": "ghost", "text": "hi"}),
                ),
            )
            .await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "HTTP 404: Session not found");
        }

        #[tokio::test]
        async fn post_chat_rejects_unknown_intent() {
            let fake = Arc::new(FakeTransport::new());
            let app = router(state_with(&fake), None);

            let (status, body) = call(app, post_json("/api/chat", json!({"intent": "explode"}))).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Unknown intent: explode");
            assert!(fake.requests().is_empty());
        }

        #[tokio::test]
        async fn post_chat_rejects_malformed_body() {
            let app = router(state_with(&Arc::new(FakeTransport::new())), None);

            let (status, body) = call(
                app,
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{"))
                    .unwrap(),
            )
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], false);
        }
    }

    mod envelope_routes {
        use super::*;

        #[tokio::test]
        async fn list_agents() {
            let fake = Arc::new(FakeTransport::new());
            fake.respond(UpstreamMethod::Get, "/agent", 200, json!([{"name": "build"}, {"name": "plan"}]));
            let app = router(state_with(&fake), None);

            let (status, body) = call(app, get("/api/agents")).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"][1]["name"], "plan");
        }

        #[tokio::test]
        async fn list_agents_upstream_down() {
            let app = router(state_with(&Arc::new(FakeTransport::new())), None);

            let (status, body) = call(app, get("/api/agents")).await;

            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert_eq!(body["success"], false);
        }

        #[tokio::test]
        async fn delete_session() {
            let fake = Arc::new(FakeTransport::new());
            fake.respond(UpstreamMethod::Delete, "/session/s1", 200, json!(true));
            let app = router(state_with(&fake), None);

            let request = Request::builder()
                .method(Method::DELETE)
                .uri("/api/session/s1?directory=%2Frepo")
                .body(Body::empty())
                .unwrap();
            let (status, body) = call(app, request).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"success": true, "data": true}));
            assert!(fake.last_request().unwrap().url.ends_with("directory=%2Frepo"));
        }

        #[tokio::test]
        async fn delete_missing_session_is_404() {
            let fake = Arc::new(FakeTransport::new());
            fake.respond_text(UpstreamMethod::Delete, "/session/gone", 404, "not found");
            let app = router(state_with(&fake), None);

            let request = Request::builder()
                .method(Method::DELETE)
                .uri("/api/session/gone")
                .body(Body::empty())
                .unwrap();
            let (status, _) = call(app, request).await;

            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    mod event_stream {
        use super::*;

        #[tokio::test]
        async fn requires_session() {
            let app = router(state_with(&Arc::new(FakeTransport::new())), None);

            let (status, body) = call(app, get("/api/events")).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Missing required parameter: session");
        }

        #[tokio::test]
        async fn relays_only_the_watched_session() {
            let fake = Arc::new(FakeTransport::new());
            fake.push_stream(concat!(
                "data: {\"type\":\"session.status\",\"properties\":{\"sessionID\":\"other\",\"status\":{\"type\":\"busy\"}}}\n\n",
                "data: {\"type\":\"session.status\",\"properties\":{\"sessionID\":\"s1\",\"status\":{\"type\":\"busy\"}}}\n\n",
            ));
            let app = router(state_with(&fake), None);

            let response = app.oneshot(get("/api/events?session=s1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "text/event-stream"
            );

            let mut body = response.into_body().into_data_stream();
            let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let text = String::from_utf8(chunk.to_vec()).unwrap();

            assert!(text.contains("event: session.status"));
            assert!(text.contains("\"sessionID\":\"s1\""));
            assert!(!text.contains("other"));
            assert_eq!(fake.stream_urls()[0], "http://opencode.test/event?directory=%2Fworkspace");
        }
    }

    #[tokio::test]
    async fn serves_static_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>chat</h1>").unwrap();
        let app = router(
            state_with(&Arc::new(FakeTransport::new())),
            Some(dir.path().to_path_buf()),
        );

        let response = app.oneshot(get("/index.html")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<h1>chat</h1>");
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let state = state_with(&Arc::new(FakeTransport::new()));

        let result = serve(listener, state, None, async {}).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn serve_stops_with_a_browser_stream_open() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = state_with(&Arc::new(FakeTransport::new()));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, None, async move {
            let _ = stop_rx.await;
        }));

        let mut browser = tokio::net::TcpStream::connect(addr).await.unwrap();
        browser
            .write_all(b"GET /api/events?session=s1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut head = [0u8; 12];
        tokio::time::timeout(Duration::from_secs(5), browser.read_exact(&mut head))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&head, b"HTTP/1.1 200");

        let _ = stop_tx.send(());
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("serve kept waiting on the event stream")
            .unwrap();
        assert!(result.is_ok());
    }
}
