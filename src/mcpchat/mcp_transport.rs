//! MCP client transport over HTTP.
//!
//! [`McpHttpTransport`] speaks JSON-RPC 2.0 to a single MCP endpoint using HTTP POST
//! ("streamable HTTP"). Servers may answer either with a plain JSON body or with an SSE
//! framed body (`event: message` / `data: {...}` records); both are accepted and the
//! JSON-RPC response whose `id` matches the request is extracted.
//!
//! The `initialize` handshake is followed by a `notifications/initialized` notification. If
//! the server assigns an `Mcp-Session-Id`, it is echoed on every later request.

use crate::mcpchat::clients::common::get_shared_http_client;
use crate::mcpchat::gateway::{GatewayError, GatewayTransport, ResourceDescriptor, ToolDescriptor};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Protocol revision announced during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

#[derive(Deserialize)]
struct ToolListResult {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

#[derive(Deserialize)]
struct ResourceListResult {
    #[serde(default)]
    resources: Vec<ResourceDescriptor>,
}

/// JSON-RPC over HTTP transport for a remote MCP server.
pub struct McpHttpTransport {
    endpoint: String,
    client_name: String,
    client_version: String,
    http: reqwest::Client,
    request_id: AtomicU64,
    session_id: RwLock<Option<String>>,
}

impl McpHttpTransport {
    /// Create a transport for `endpoint` identifying itself as `client_name`/`client_version`.
    pub fn new(endpoint: &str, client_name: &str, client_version: &str) -> Self {
        Self::new_with_http_client(
            get_shared_http_client().clone(),
            endpoint,
            client_name,
            client_version,
        )
    }

    /// Same as [`McpHttpTransport::new`] with a caller supplied HTTP client.
    pub fn new_with_http_client(
        http: reqwest::Client,
        endpoint: &str,
        client_name: &str,
        client_version: &str,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client_name: client_name.to_string(),
            client_version: client_version.to_string(),
            http,
            request_id: AtomicU64::new(1),
            session_id: RwLock::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Session id assigned by the server during the last handshake, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn post(&self, body: &JsonValue) -> Result<reqwest::Response, GatewayError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, ACCEPT_BOTH)
            .json(body);
        let session = self.session_id.read().await.clone();
        if let Some(session) = session.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|err| {
            GatewayError::Transport(format!("request to {} failed: {}", self.endpoint, err))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && session.is_some() {
            let mut current = self.session_id.write().await;
            // a concurrent handshake may already have replaced it
            if *current == session {
                *current = None;
            }
            return Err(GatewayError::SessionExpired(format!(
                "{} returned HTTP {}",
                self.endpoint, status
            )));
        }
        if !status.is_success() {
            return Err(GatewayError::Transport(format!(
                "{} returned HTTP {}",
                self.endpoint, status
            )));
        }
        Ok(response)
    }

    async fn send_request(&self, method: &str, params: JsonValue) -> Result<JsonValue, GatewayError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let response = self.post(&body).await?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            *self.session_id.write().await = Some(session.to_string());
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .map(is_event_stream)
            .unwrap_or(false);
        let text = response
            .text()
            .await
            .map_err(|err| GatewayError::Transport(format!("reading {} response: {}", method, err)))?;

        let payload = if is_event_stream {
            find_in_event_stream(&text, id).ok_or_else(|| {
                GatewayError::Protocol(format!("no response to '{}' in event stream", method))
            })?
        } else {
            serde_json::from_str(&text).map_err(|err| {
                GatewayError::Protocol(format!("invalid JSON response to '{}': {}", method, err))
            })?
        };

        extract_result(payload, method)
    }

    async fn send_notification(&self, method: &str) -> Result<(), GatewayError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method
        });
        self.post(&body).await.map(|_| ())
    }
}

#[async_trait]
impl GatewayTransport for McpHttpTransport {
    async fn handshake(&self) -> Result<(), GatewayError> {
        *self.session_id.write().await = None;
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": self.client_name,
                "version": self.client_version,
            }
        });
        let result = self
            .send_request("initialize", params)
            .await
            .map_err(|err| GatewayError::Connect(err.to_string()))?;

        if let Some(server) = result.get("serverInfo") {
            log::debug!("MCP server info: {}", server);
        }

        self.send_notification("notifications/initialized")
            .await
            .map_err(|err| GatewayError::Connect(err.to_string()))
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, GatewayError> {
        let result = self.send_request("tools/list", json!({})).await?;
        let parsed: ToolListResult = serde_json::from_value(result)
            .map_err(|err| GatewayError::Protocol(format!("decoding tool list: {}", err)))?;
        Ok(parsed.tools)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, GatewayError> {
        let result = self.send_request("resources/list", json!({})).await?;
        let parsed: ResourceListResult = serde_json::from_value(result)
            .map_err(|err| GatewayError::Protocol(format!("decoding resource list: {}", err)))?;
        Ok(parsed.resources)
    }

    async fn call_tool(&self, name: &str, arguments: JsonValue) -> Result<JsonValue, GatewayError> {
        let result = self
            .send_request(
                "tools/call",
                json!({
                    "name": name,
                    "arguments": arguments
                }),
            )
            .await?;

        if result.get("isError").and_then(JsonValue::as_bool) == Some(true) {
            return Err(GatewayError::Invocation {
                tool: name.to_string(),
                reason: tool_error_text(&result),
            });
        }
        Ok(result)
    }
}

fn is_event_stream(value: &HeaderValue) -> bool {
    value
        .to_str()
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false)
}

/// Find the JSON-RPC message answering `request_id` in an SSE body.
///
/// Multi-line `data:` fields of one event are joined with `\n`, events are separated by a
/// blank line. Events that are not JSON, or answer another id, are skipped.
fn find_in_event_stream(body: &str, request_id: u64) -> Option<JsonValue> {
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !data.is_empty() {
                events.push(std::mem::take(&mut data));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|event| serde_json::from_str::<JsonValue>(event).ok())
        .find(|payload| matches_request(payload, request_id))
}

fn matches_request(payload: &JsonValue, request_id: u64) -> bool {
    match payload.get("id") {
        Some(JsonValue::Number(num)) => num.as_u64() == Some(request_id),
        Some(JsonValue::String(text)) => text.parse::<u64>().map_or(false, |id| id == request_id),
        _ => false,
    }
}

fn extract_result(payload: JsonValue, method: &str) -> Result<JsonValue, GatewayError> {
    if let Some(error) = payload.get("error") {
        let message = error
            .get("message")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(GatewayError::Protocol(format!("'{}' failed: {}", method, message)));
    }
    payload
        .get("result")
        .cloned()
        .ok_or_else(|| GatewayError::Protocol(format!("'{}' response has no result", method)))
}

fn tool_error_text(result: &JsonValue) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(JsonValue::as_str))
                .collect()
        })
        .unwrap_or_default();
    if texts.is_empty() {
        "remote tool reported an error".to_string()
    } else {
        texts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_stream_response_is_matched_by_id() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\
                    \n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\n\
                    \n";
        let payload = find_in_event_stream(body, 7).unwrap();
        assert_eq!(payload["result"]["tools"], json!([]));
        assert!(find_in_event_stream(body, 8).is_none());
    }

    #[test]
    fn multi_line_data_fields_are_joined() {
        let body = "data: {\"jsonrpc\":\"2.0\",\r\ndata: \"id\":\"3\",\"result\":{}}\r\n\r\n";
        let payload = find_in_event_stream(body, 3).unwrap();
        assert_eq!(payload["result"], json!({}));
    }

    #[test]
    fn json_rpc_errors_become_protocol_errors() {
        let err = extract_result(
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "Method not found"}}),
            "resources/list",
        )
        .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Protocol("'resources/list' failed: Method not found".into())
        );
    }

    #[test]
    fn tool_error_text_joins_text_content() {
        let result = json!({
            "isError": true,
            "content": [
                {"type": "text", "text": "city not found"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "try again"}
            ]
        });
        assert_eq!(tool_error_text(&result), "city not found\ntry again");
        assert_eq!(
            tool_error_text(&json!({"isError": true})),
            "remote tool reported an error"
        );
    }
}
