#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mcpchat::client_wrapper::{ClientWrapper, Message, ModelError};
use mcpchat::gateway::{
    GatewayError, GatewayTransport, ResourceDescriptor, ToolDescriptor, ToolGateway,
};
use mcpchat::orchestrator::{ChatOrchestrator, GENERIC_FAILURE_MESSAGE, TAG_TOOL_DISCOVERY_FAILED};
use mcpchat::server::{build_router, AppState, EMPTY_MESSAGE_ERROR, EMPTY_TOOL_NAME_ERROR};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct StubTransport {
    reachable: bool,
}

#[async_trait]
impl GatewayTransport for StubTransport {
    async fn handshake(&self) -> Result<(), GatewayError> {
        if self.reachable {
            Ok(())
        } else {
            Err(GatewayError::Connect("connection refused".to_string()))
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, GatewayError> {
        Ok(vec![ToolDescriptor {
            name: "time".to_string(),
            description: "当前时间".to_string(),
            input_schema: json!({"type": "object"}),
        }])
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, GatewayError> {
        Ok(vec![ResourceDescriptor {
            uri: "file:///docs/readme.md".to_string(),
            name: "readme".to_string(),
            description: None,
            mime_type: Some("text/markdown".to_string()),
        }])
    }

    async fn call_tool(&self, name: &str, arguments: JsonValue) -> Result<JsonValue, GatewayError> {
        match name {
            "time" => Ok(json!({"content": [{"type": "text", "text": "12:00"}], "echo": arguments})),
            other => Err(GatewayError::Invocation {
                tool: other.to_string(),
                reason: "unknown tool".to_string(),
            }),
        }
    }
}

struct DirectAnswerClient {
    calls: AtomicUsize,
}

#[async_trait]
impl ClientWrapper for DirectAnswerClient {
    async fn send_message(
        &self,
        _messages: &[Message],
        _model: &str,
    ) -> Result<Message, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Message::assistant(r#"{"steps":[],"content":"你好！有什么我能帮你的？"}"#))
    }

    fn model_name(&self) -> &str {
        "direct"
    }
}

fn router(reachable: bool) -> (Router, Arc<DirectAnswerClient>) {
    let client = Arc::new(DirectAnswerClient {
        calls: AtomicUsize::new(0),
    });
    let gateway = Arc::new(ToolGateway::new(
        Arc::new(StubTransport { reachable }),
        Duration::from_secs(5),
    ));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        gateway,
        client.clone(),
        "plan",
        "summary",
        Duration::from_secs(5),
    ));
    (build_router(AppState::new(orchestrator)), client)
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, JsonValue, bool) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let has_request_id = response.headers().contains_key("x-request-id");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, body, has_request_id)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn chat_answers_with_message() {
    let (router, _) = router(true);
    // 你好
    let (status, body, has_request_id) = send(router, get("/chat?message=%E4%BD%A0%E5%A5%BD")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "你好！有什么我能帮你的？"}));
    assert!(has_request_id);
}

#[tokio::test]
async fn blank_or_missing_message_is_rejected_before_the_pipeline() {
    for uri in ["/chat?message=%20%20", "/chat"] {
        let (router, client) = router(true);
        let (status, body, _) = send(router, get(uri)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
        assert_eq!(body["message"], EMPTY_MESSAGE_ERROR);
        assert_eq!(body["method"], "GET");
        assert_eq!(body["path"], uri);
        assert!(body["timestamp"].is_string());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn failed_chat_returns_safe_message_and_tag() {
    let (router, _) = router(false);
    let (status, body, _) = send(router, get("/chat?message=hello")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["statusCode"], 500);
    assert_eq!(body["message"], GENERIC_FAILURE_MESSAGE);
    assert_eq!(body["error"], TAG_TOOL_DISCOVERY_FAILED);
    assert!(!body.to_string().contains("connection refused"));
}

#[tokio::test]
async fn tools_and_resources_are_listed() {
    let (router, _) = router(true);
    let (status, body, _) = send(router.clone(), get("/tools")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools"][0]["name"], "time");
    assert_eq!(body["tools"][0]["inputSchema"], json!({"type": "object"}));

    let (status, body, _) = send(router, get("/resources")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resources"][0]["uri"], "file:///docs/readme.md");
    assert_eq!(body["resources"][0]["mimeType"], "text/markdown");
}

#[tokio::test]
async fn unreachable_gateway_is_a_bad_gateway() {
    let (router, _) = router(false);
    let (status, body, _) = send(router, get("/tools")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["statusCode"], 502);
    assert_eq!(body["path"], "/tools");
    assert_eq!(body["message"], GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn call_tool_invokes_directly() {
    let (router, _) = router(true);
    let (status, body, _) = send(
        router.clone(),
        post_json("/callTool", json!({"toolName": "time", "input": {"tz": "Asia/Shanghai"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"][0]["text"], "12:00");
    assert_eq!(body["echo"], json!({"tz": "Asia/Shanghai"}));

    let (status, body, _) = send(router.clone(), post_json("/callTool", json!({"toolName": "time"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["echo"], json!({}));

    let (status, body, _) = send(router.clone(), post_json("/callTool", json!({"toolName": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], EMPTY_TOOL_NAME_ERROR);

    let (status, _, _) = send(router, post_json("/callTool", json!({"toolName": "teleport"}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
