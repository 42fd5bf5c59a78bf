//! The `OpenAIClient` struct implements `ClientWrapper` for any OpenAI-compatible
//! Chat Completions endpoint (OpenAI itself, DashScope compatible mode, self-hosted
//! gateways), capturing both the assistant response and the token usage of the last call.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::client_wrapper::{ClientWrapper, Message};
//! use mcpchat::clients::openai::OpenAIClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
//!     let client = OpenAIClient::new(
//!         &key,
//!         "https://dashscope.aliyuncs.com/compatible-mode/v1",
//!         "qwen-plus",
//!     );
//!
//!     let reply = client
//!         .send_message(
//!             &[Message::system("You are an assistant."), Message::user("Hello!")],
//!             client.model_name(),
//!         )
//!         .await
//!         .unwrap();
//!     println!("Assistant: {}", reply.content);
//!
//!     if let Some(usage) = client.get_last_usage() {
//!         println!(
//!             "Tokens: input: {}, output: {}, total: {}",
//!             usage.input_tokens, usage.output_tokens, usage.total_tokens
//!         );
//!     }
//! }
//! ```

use std::sync::Mutex;

use async_trait::async_trait;
use openai_rust2 as openai_rust;
use openai_rust::chat;

use crate::mcpchat::client_wrapper::{ClientWrapper, Message, ModelError, Role, TokenUsage};
use crate::mcpchat::clients::common::{get_shared_http_client, join_url};

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const DEFAULT_URL_PATH: &str = "/v1/chat/completions";

/// Client wrapper for OpenAI-compatible Chat Completions APIs.
///
/// The wrapper keeps the default model identifier plus an internal [`TokenUsage`] slot so
/// callers can inspect how many tokens each request consumed. It reuses the shared HTTP
/// client configured in [`crate::mcpchat::clients::common`].
pub struct OpenAIClient {
    client: openai_rust::Client,
    base_url: String,
    url_path: String,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Construct a client for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(secret_key: &str, base_url: &str, model_name: &str) -> Self {
        Self::new_with_http_client(get_shared_http_client().clone(), secret_key, base_url, model_name)
    }

    /// Construct a client that uses a caller supplied [`reqwest::Client`].
    pub fn new_with_http_client(
        http: reqwest::Client,
        secret_key: &str,
        base_url: &str,
        model_name: &str,
    ) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(secret_key, http, base_url),
            base_url: base_url.to_string(),
            url_path: completions_path(base_url),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    /// Base URL the client posts to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute request path handed to `openai_rust` for every completion.
    pub fn url_path(&self) -> &str {
        &self.url_path
    }

    fn record_usage(&self, usage: Option<TokenUsage>) {
        if let Ok(mut slot) = self.token_usage.lock() {
            *slot = usage;
        }
    }
}

/// `openai_rust` replaces the base URL's path with the one it is given, so the
/// completions path has to carry the base path (`/compatible-mode/v1`, `/v1`, ...).
fn completions_path(base_url: &str) -> String {
    match reqwest::Url::parse(base_url) {
        Ok(url) if url.path() != "/" => join_url(url.path(), CHAT_COMPLETIONS_PATH),
        Ok(_) => DEFAULT_URL_PATH.to_string(),
        Err(err) => {
            log::warn!(
                "OpenAIClient: base url {:?} does not parse ({}), using {}",
                base_url,
                err,
                DEFAULT_URL_PATH
            );
            DEFAULT_URL_PATH.to_string()
        }
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<Message, ModelError> {
        // Convert the provided messages into the format expected by openai_rust
        let mut formatted_messages = Vec::with_capacity(messages.len());
        for msg in messages {
            formatted_messages.push(chat::Message {
                role: msg.role.as_str().to_owned(),
                content: msg.content.clone(),
            });
        }

        let chat_arguments = chat::ChatArguments::new(model, formatted_messages);
        let response = self
            .client
            .create_chat(chat_arguments, Some(self.url_path.clone()))
            .await
            .map_err(|err| {
                log::error!(
                    "OpenAIClient::send_message(...): OpenAI API Error from {}{}: {}",
                    self.base_url,
                    self.url_path,
                    err
                );
                ModelError::Request(err.to_string())
            })?;

        self.record_usage(Some(TokenUsage {
            input_tokens: response.usage.prompt_tokens as usize,
            output_tokens: response.usage.completion_tokens as usize,
            total_tokens: response.usage.total_tokens as usize,
        }));

        let content = response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::EmptyResponse)?;

        Ok(Message::new(Role::Assistant, content))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_path_keeps_the_base_path() {
        assert_eq!(
            completions_path("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            "/compatible-mode/v1/chat/completions"
        );
        assert_eq!(
            completions_path("https://api.openai.com/v1/"),
            "/v1/chat/completions"
        );
        assert_eq!(completions_path("http://localhost:1234"), DEFAULT_URL_PATH);
        assert_eq!(completions_path("not a url"), DEFAULT_URL_PATH);
    }

    #[test]
    fn constructor_keeps_model_and_base_url() {
        let client = OpenAIClient::new("", "http://localhost:1234/v1", "local-model");
        assert_eq!(client.model_name(), "local-model");
        assert_eq!(client.base_url(), "http://localhost:1234/v1");
        assert_eq!(client.url_path(), "/v1/chat/completions");
        assert!(client.get_last_usage().is_none());
    }
}
