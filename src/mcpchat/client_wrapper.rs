//! Language model client seam.
//!
//! A [`ClientWrapper`] is a wrapper around a specific chat-completion service. It sends an
//! ordered list of role-tagged [`Message`]s and returns the assistant reply. It does not keep
//! any conversation state; every chat request builds its own message lists.
//!
//! Callers that want to degrade instead of abort go through [`complete`], which folds a
//! [`ModelError`] into a [`CompletionResult`] with an empty `content` and an error reason.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::client_wrapper::{complete, Message};
//! use mcpchat::clients::openai::OpenAIClient;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = OpenAIClient::new("sk-...", "https://api.openai.com/v1", "gpt-4.1-mini");
//! let result = complete(
//!     &client,
//!     &[Message::system("You are terse."), Message::user("Hello!")],
//!     "gpt-4.1-mini",
//!     Duration::from_secs(30),
//! )
//! .await;
//! if let Some(reason) = result.error {
//!     log::warn!("model unavailable: {}", reason);
//! } else {
//!     println!("{}", result.content);
//! }
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Represents the possible roles for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    // steers the model's behaviour
    System,
    // the end user (or a plan step speaking on their behalf)
    User,
    // content previously generated by the model
    Assistant,
}

impl Role {
    /// Parse the wire name of a role (`"system"`, `"user"`, `"assistant"`).
    pub fn parse(name: &str) -> Option<Role> {
        match name.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single role-tagged message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Failure of a completion call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The request never produced an HTTP response (DNS, connect, TLS, reset).
    Request(String),
    /// The provider answered with a non-success status.
    Api { status: u16, message: String },
    /// The response body could not be decoded.
    Decode(String),
    /// The provider returned no choices or an empty reply.
    EmptyResponse,
    /// The call exceeded its time bound.
    Timeout(Duration),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Request(msg) => write!(f, "Model request failed: {}", msg),
            ModelError::Api { status, message } => {
                write!(f, "Model API returned status {}: {}", status, message)
            }
            ModelError::Decode(msg) => write!(f, "Model response could not be decoded: {}", msg),
            ModelError::EmptyResponse => write!(f, "Model returned an empty response"),
            ModelError::Timeout(limit) => {
                write!(f, "Model call timed out after {} ms", limit.as_millis())
            }
        }
    }
}

impl Error for ModelError {}

/// Trait defining the interface to a chat-completion service.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send `messages` to the given `model` and return the assistant reply.
    async fn send_message(&self, messages: &[Message], model: &str)
        -> Result<Message, ModelError>;

    /// Default model identifier of this client.
    fn model_name(&self) -> &str;

    /// Usage reported by the *last* `send_message()` call, if the client tracks it.
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    /// Clients that track [`TokenUsage`] return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}

/// Degradable outcome of a model call: either `content` or an `error` reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionResult {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            error: Some(reason.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Send `messages` bounded by `limit`; an expired call becomes [`ModelError::Timeout`].
pub async fn send_with_timeout(
    client: &dyn ClientWrapper,
    messages: &[Message],
    model: &str,
    limit: Duration,
) -> Result<Message, ModelError> {
    match tokio::time::timeout(limit, client.send_message(messages, model)).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::Timeout(limit)),
    }
}

/// Like [`send_with_timeout`] but converts the failure into a [`CompletionResult`].
pub async fn complete(
    client: &dyn ClientWrapper,
    messages: &[Message],
    model: &str,
    limit: Duration,
) -> CompletionResult {
    match send_with_timeout(client, messages, model, limit).await {
        Ok(reply) => CompletionResult::ok(reply.content),
        Err(err) => {
            log::error!("model call to '{}' failed: {}", model, err);
            CompletionResult::failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClient(Result<&'static str, ModelError>);

    #[async_trait]
    impl ClientWrapper for FixedClient {
        async fn send_message(
            &self,
            _messages: &[Message],
            _model: &str,
        ) -> Result<Message, ModelError> {
            self.0.clone().map(Message::assistant)
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct HangingClient;

    #[async_trait]
    impl ClientWrapper for HangingClient {
        async fn send_message(
            &self,
            _messages: &[Message],
            _model: &str,
        ) -> Result<Message, ModelError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Message::assistant("too late"))
        }

        fn model_name(&self) -> &str {
            "hanging"
        }
    }

    #[test]
    fn role_round_trips_through_wire_names() {
        assert_eq!(Role::parse("System"), Some(Role::System));
        assert_eq!(Role::parse(" user "), Some(Role::User));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("tool"), None);
        assert_eq!(
            serde_json::to_string(&Message::user("hi")).unwrap(),
            r#"{"role":"user","content":"hi"}"#
        );
    }

    #[tokio::test]
    async fn complete_returns_content_on_success() {
        let client = FixedClient(Ok("pong"));
        let result = complete(&client, &[Message::user("ping")], "m", Duration::from_secs(1)).await;
        assert_eq!(result, CompletionResult::ok("pong"));
    }

    #[tokio::test]
    async fn complete_degrades_model_errors() {
        let client = FixedClient(Err(ModelError::Api {
            status: 401,
            message: "bad key".into(),
        }));
        let result = complete(&client, &[Message::user("ping")], "m", Duration::from_secs(1)).await;
        assert!(result.is_error());
        assert!(result.content.is_empty());
    }

    #[tokio::test]
    async fn hung_calls_become_timeouts() {
        let err = send_with_timeout(
            &HangingClient,
            &[Message::user("ping")],
            "m",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert_eq!(err, ModelError::Timeout(Duration::from_millis(50)));
    }

    #[test]
    fn default_usage_is_none() {
        assert!(FixedClient(Ok("x")).get_last_usage().is_none());
    }
}
