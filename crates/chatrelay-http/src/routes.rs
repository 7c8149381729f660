//! HTTP route handlers for the chat page.
//!
//! `/api/chat` is the page controller: GET is the read path, POST the write
//! path. The smaller routes answer with the `{success, data, error}`
//! envelope. Client calls block, so every handler runs them on tokio's
//! blocking pool.

use axum::{
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use chatrelay_core::controller::{self, ActionForm, Intent, PageData};

use crate::SharedState;

/// Response envelope for the non-page routes.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    /// Whether the call succeeded.
    pub success: bool,
    /// The result data (if successful).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type ApiReply = (StatusCode, Json<ApiResponse>);

impl ApiResponse {
    pub fn ok(data: impl Serialize) -> ApiReply {
        match serde_json::to_value(data) {
            Ok(data) => (
                StatusCode::OK,
                Json(Self {
                    success: true,
                    data: Some(data),
                    error: None,
                }),
            ),
            Err(e) => Self::failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    pub fn failure(status: StatusCode, error: impl Into<String>) -> ApiReply {
        (
            status,
            Json(Self {
                success: false,
                data: None,
                error: Some(error.into()),
            }),
        )
    }
}

/// Query string for `/api/chat`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub session: Option<String>,
    pub directory: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryQuery {
    pub directory: Option<String>,
}

/// Treat `?directory=` like an absent parameter.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn blocking<T, F>(f: F) -> Result<T, ApiReply>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        log::error!("Blocking task failed: {}", e);
        ApiResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })
}

/// Handler for GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Handler for GET /api/chat
pub async fn get_chat(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<ChatQuery>,
) -> Result<Json<PageData>, ApiReply> {
    let session = non_empty(query.session);
    let directory = non_empty(query.directory);
    log::debug!("HTTP load chat: session={:?} directory={:?}", session, directory);

    let page = blocking(move || {
        controller::load(
            &state.client,
            &state.defaults,
            session.as_deref(),
            directory.as_deref(),
        )
    })
    .await?;
    Ok(Json(page))
}

/// Handler for POST /api/chat
///
/// Accepts JSON or an urlencoded form. A form that names no valid intent is
/// a 400; failures of the upstream call are reported in the body with 200.
pub async fn post_chat(State(state): State<Arc<SharedState>>, request: Request) -> Response {
    let form = match read_form(request).await {
        Ok(f) => f,
        Err(e) => return ApiResponse::failure(StatusCode::BAD_REQUEST, e).into_response(),
    };
    log::debug!("HTTP chat action: {}", form.intent);

    let status = match Intent::from_form(&form) {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::BAD_REQUEST,
    };

    match blocking(move || controller::act(&state.client, &state.defaults, &form)).await {
        Ok(result) => (status, Json(result)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn read_form(request: Request) -> Result<ActionForm, String> {
    let is_urlencoded = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_urlencoded {
        Form::<ActionForm>::from_request(request, &())
            .await
            .map(|Form(form)| form)
            .map_err(|e| e.body_text())
    } else {
        Json::<ActionForm>::from_request(request, &())
            .await
            .map(|Json(form)| form)
            .map_err(|e| e.body_text())
    }
}

/// Handler for GET /api/agents
pub async fn list_agents(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<DirectoryQuery>,
) -> ApiReply {
    let directory = non_empty(query.directory);
    let result = match blocking(move || state.client.list_agents(directory.as_deref())).await {
        Ok(r) => r,
        Err(reply) => return reply,
    };
    match result {
        Ok(agents) => ApiResponse::ok(agents),
        Err(e) => {
            log::warn!("Failed to list agents: {}", e);
            ApiResponse::failure(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// Handler for DELETE /api/session/{id}
pub async fn delete_session(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
    Query(query): Query<DirectoryQuery>,
) -> ApiReply {
    let directory = non_empty(query.directory);
    let result =
        match blocking(move || state.client.delete_session(&id, directory.as_deref())).await {
            Ok(r) => r,
            Err(reply) => return reply,
        };
    match result {
        Ok(deleted) => ApiResponse::ok(deleted),
        Err(e) => {
            log::warn!("Failed to delete session: {}", e);
            let status = match e.status() {
                Some(404) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            };
            ApiResponse::failure(status, e.to_string())
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
