//! HTTP surface of the chat service (axum).
//!
//! | route | purpose |
//! |---|---|
//! | `GET /chat?message=...` | run one question through the [`ChatOrchestrator`] |
//! | `GET /tools` | list the remote tools |
//! | `GET /resources` | list the remote resources |
//! | `POST /callTool` | invoke one tool directly with `{ "toolName", "input" }` |
//!
//! Errors use one JSON envelope:
//!
//! ```json
//! { "statusCode": 400, "timestamp": "2025-01-01T00:00:00.000Z", "path": "/chat",
//!   "method": "GET", "message": "消息内容不能为空" }
//! ```
//!
//! A failed chat additionally carries the `error` tag of the failed stage. Every request is
//! logged on entry and exit with its status, latency and a correlation id, which is also
//! returned in the `x-request-id` header.

use crate::mcpchat::config::ChatConfig;
use crate::mcpchat::gateway::GatewayError;
use crate::mcpchat::orchestrator::{ChatOrchestrator, GENERIC_FAILURE_MESSAGE};
use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const EMPTY_MESSAGE_ERROR: &str = "消息内容不能为空";
pub const EMPTY_TOOL_NAME_ERROR: &str = "工具名称不能为空";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ChatOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallToolRequest {
    #[serde(rename = "toolName", default)]
    pub tool_name: String,
    #[serde(default)]
    pub input: JsonValue,
}

/// Build the router with logging middleware attached.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", get(chat))
        .route("/tools", get(list_tools))
        .route("/resources", get(list_resources))
        .route("/callTool", post(call_tool))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Bind `config.bind_address()` and serve until Ctrl-C.
pub async fn serve(config: &ChatConfig, state: AppState) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    log::info!("mcpchat listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    log::info!("shutdown signal received");
}

/// `{statusCode, timestamp, path, method, message}` with the given status.
pub fn error_envelope(status: StatusCode, method: &Method, uri: &Uri, message: &str) -> JsonValue {
    json!({
        "statusCode": status.as_u16(),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "path": uri.to_string(),
        "method": method.as_str(),
        "message": message,
    })
}

fn error_response(status: StatusCode, method: &Method, uri: &Uri, message: &str) -> Response {
    let envelope = error_envelope(status, method, uri, message);
    log::error!("{} {} {}", method, uri, envelope);
    (status, Json(envelope)).into_response()
}

fn gateway_failure(method: &Method, uri: &Uri, err: &GatewayError) -> Response {
    log::error!("{} {} gateway failure: {}", method, uri, err);
    error_response(StatusCode::BAD_GATEWAY, method, uri, GENERIC_FAILURE_MESSAGE)
}

async fn chat(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(query): Query<ChatQuery>,
) -> Response {
    let message = query.message.unwrap_or_default();
    if message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, &method, &uri, EMPTY_MESSAGE_ERROR);
    }

    let outcome = state.orchestrator.chat(&message).await;
    match outcome.error {
        Some(tag) => {
            let mut envelope =
                error_envelope(StatusCode::INTERNAL_SERVER_ERROR, &method, &uri, &outcome.message);
            envelope["error"] = JsonValue::String(tag);
            log::error!("{} {} {}", method, uri, envelope);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
        }
        None => (StatusCode::OK, Json(json!({ "message": outcome.message }))).into_response(),
    }
}

async fn list_tools(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    match state.orchestrator.gateway().list_tools().await {
        Ok(tools) => (StatusCode::OK, Json(json!({ "tools": tools }))).into_response(),
        Err(err) => gateway_failure(&method, &uri, &err),
    }
}

async fn list_resources(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    match state.orchestrator.gateway().list_resources().await {
        Ok(resources) => (StatusCode::OK, Json(json!({ "resources": resources }))).into_response(),
        Err(err) => gateway_failure(&method, &uri, &err),
    }
}

async fn call_tool(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Json(request): Json<CallToolRequest>,
) -> Response {
    let tool_name = request.tool_name.trim();
    if tool_name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, &method, &uri, EMPTY_TOOL_NAME_ERROR);
    }
    let input = match request.input {
        JsonValue::Null => json!({}),
        other => other,
    };

    match state.orchestrator.gateway().invoke(tool_name, input).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => gateway_failure(&method, &uri, &err),
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    log::info!("[Request] {} {} ({})", method, uri, request_id);

    let mut response = next.run(request).await;

    log::info!(
        "[Response] {} {} {} - {}ms ({})",
        method,
        uri,
        response.status().as_u16(),
        started.elapsed().as_millis(),
        request_id
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
