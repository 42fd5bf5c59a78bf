//! Remote Tool Gateway
//!
//! The gateway is the process-wide, lazily connected handle to the remote capability
//! server. It owns a [`GatewayTransport`] (the wire protocol) and adds the lifecycle the
//! chat pipeline relies on:
//!
//! - a connected flag that flips to `true` after a successful handshake and back to `false`
//!   after a failed one or once the server reports the session as expired,
//! - single-flight connects: concurrent callers that observe "not connected" wait on one
//!   handshake and all get its outcome, success or failure,
//! - a time bound on every remote call, reported as [`GatewayError::Timeout`].
//!
//! # Architecture
//!
//! ```text
//! ChatOrchestrator / StepExecutor → ToolGateway → GatewayTransport (trait) → [MCP over HTTP | test double]
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::gateway::ToolGateway;
//! use mcpchat::mcp_transport::McpHttpTransport;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), mcpchat::gateway::GatewayError> {
//! let transport = McpHttpTransport::new("http://localhost:3000/mcp", "mcp-client", "1.0.0");
//! let gateway = ToolGateway::new(Arc::new(transport), Duration::from_secs(30));
//!
//! for tool in gateway.list_tools().await? {
//!     println!("{}: {}", tool.name, tool.description);
//! }
//! let result = gateway
//!     .invoke("weather", serde_json::json!({"city": "北京"}))
//!     .await?;
//! println!("{}", result);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A callable tool advertised by the remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool input; passed through to the model untouched.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: JsonValue,
}

/// A readable resource advertised by the remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Connection or remote-invocation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The handshake with the remote server failed.
    Connect(String),
    /// A lower level network/HTTP failure.
    Transport(String),
    /// The server no longer knows our session; a new handshake is required.
    SessionExpired(String),
    /// The remote answered with something that is not a valid protocol response.
    Protocol(String),
    /// A tool invocation failed, either in transit or on the remote side.
    Invocation { tool: String, reason: String },
    /// The operation exceeded its time bound.
    Timeout { operation: String, limit: Duration },
}

impl GatewayError {
    fn for_tool(self, tool: &str) -> GatewayError {
        match self {
            GatewayError::Invocation { .. } => self,
            other => GatewayError::Invocation {
                tool: tool.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Connect(msg) => write!(f, "Gateway connect failed: {}", msg),
            GatewayError::Transport(msg) => write!(f, "Gateway transport error: {}", msg),
            GatewayError::SessionExpired(msg) => write!(f, "Gateway session expired: {}", msg),
            GatewayError::Protocol(msg) => write!(f, "Gateway protocol error: {}", msg),
            GatewayError::Invocation { tool, reason } => {
                write!(f, "Tool '{}' invocation failed: {}", tool, reason)
            }
            GatewayError::Timeout { operation, limit } => write!(
                f,
                "Gateway operation '{}' timed out after {} ms",
                operation,
                limit.as_millis()
            ),
        }
    }
}

impl Error for GatewayError {}

/// Wire protocol spoken with the remote capability server.
///
/// Implementations do not track connection state; [`ToolGateway`] decides when
/// [`handshake`](GatewayTransport::handshake) runs.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Establish (or re-establish) the session with the remote server.
    async fn handshake(&self) -> Result<(), GatewayError>;

    /// List the tools the remote server exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, GatewayError>;

    /// List the resources the remote server exposes.
    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, GatewayError>;

    /// Invoke one tool and return its raw result payload.
    async fn call_tool(&self, name: &str, arguments: JsonValue)
        -> Result<JsonValue, GatewayError>;

    /// Protocol identifier used in logs.
    fn protocol_name(&self) -> &str {
        "mcp"
    }
}

/// Lifecycle-managed connection to the remote capability server.
///
/// One instance is shared (via `Arc`) by every chat request in the process.
pub struct ToolGateway {
    transport: Arc<dyn GatewayTransport>,
    connected: AtomicBool,
    // number of finished handshake attempts
    attempts: AtomicU64,
    // outcome of the latest attempt, handed to callers that queued behind it
    connect_guard: Mutex<Option<GatewayError>>,
    call_timeout: Duration,
}

impl ToolGateway {
    /// Wrap `transport`, bounding each remote call by `call_timeout`.
    pub fn new(transport: Arc<dyn GatewayTransport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            connected: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            connect_guard: Mutex::new(None),
            call_timeout,
        }
    }

    /// Whether the last handshake succeeded.
    ///
    /// A transport failure in the middle of a call does not reset this flag. A failed
    /// handshake does, and so does [`GatewayError::SessionExpired`].
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Force a fresh handshake, serialized with any other connect in flight.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let mut last_error = self.connect_guard.lock().await;
        self.handshake_locked(&mut last_error).await
    }

    /// Handshake only if not already connected.
    ///
    /// Callers that arrive while another handshake is running wait for it and then reuse
    /// its result instead of starting their own. A failed attempt fails all of its waiters;
    /// the next caller to arrive afterwards starts a new one.
    pub async fn ensure_connected(&self) -> Result<(), GatewayError> {
        if self.is_connected() {
            return Ok(());
        }
        let seen = self.attempts.load(Ordering::Acquire);
        let mut last_error = self.connect_guard.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(err) = last_error.as_ref() {
                return Err(err.clone());
            }
        }
        self.handshake_locked(&mut last_error).await
    }

    async fn handshake_locked(
        &self,
        last_error: &mut Option<GatewayError>,
    ) -> Result<(), GatewayError> {
        let result = self
            .bounded("connect", self.transport.handshake())
            .await
            .map_err(|err| match err {
                GatewayError::Connect(_) | GatewayError::Timeout { .. } => err,
                other => GatewayError::Connect(other.to_string()),
            });

        *last_error = result.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(()) => {
                self.connected.store(true, Ordering::Release);
                log::info!(
                    "Successfully connected to {} server",
                    self.transport.protocol_name()
                );
                Ok(())
            }
            Err(err) => {
                self.connected.store(false, Ordering::Release);
                log::error!(
                    "Failed to connect to {} server: {}",
                    self.transport.protocol_name(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Discover the remote tools, connecting first if needed.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, GatewayError> {
        self.ensure_connected().await?;
        self.bounded("tools/list", self.transport.list_tools())
            .await
            .map_err(|err| {
                log::error!("Failed to get tools: {}", err);
                self.forget_expired_session(err)
            })
    }

    /// Discover the remote resources, connecting first if needed.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, GatewayError> {
        self.ensure_connected().await?;
        self.bounded("resources/list", self.transport.list_resources())
            .await
            .map_err(|err| {
                log::error!("Failed to get resources: {}", err);
                self.forget_expired_session(err)
            })
    }

    /// Invoke one tool. Every failure is reported as [`GatewayError::Invocation`] naming
    /// the tool.
    pub async fn invoke(&self, name: &str, arguments: JsonValue) -> Result<JsonValue, GatewayError> {
        let result = match self.ensure_connected().await {
            Ok(()) => {
                self.bounded("tools/call", self.transport.call_tool(name, arguments))
                    .await
            }
            Err(err) => Err(err),
        };
        result.map_err(|err| {
            let err = self.forget_expired_session(err).for_tool(name);
            log::error!("Failed to call tool: {}: {}", name, err);
            err
        })
    }

    fn forget_expired_session(&self, err: GatewayError) -> GatewayError {
        if let GatewayError::SessionExpired(_) = err {
            if self.connected.swap(false, Ordering::AcqRel) {
                log::warn!(
                    "{} session expired, reconnecting on next use",
                    self.transport.protocol_name()
                );
            }
        }
        err
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                operation: operation.to_string(),
                limit: self.call_timeout,
            }),
        }
    }
}
