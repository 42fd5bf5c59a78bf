//! Final summarization pass.

use crate::mcpchat::client_wrapper::{complete, ClientWrapper, CompletionResult, Message};
use crate::mcpchat::executor::{results_to_json, StepResult};
use std::sync::Arc;
use std::time::Duration;

/// Fixed instruction for the summarizing model.
pub const SUMMARY_INSTRUCTION: &str = "分析多个工具的返回结果，结合用户的原始问题，返回一个综合的简洁总结。\
保持用户问题的原意，不要复述问题本身，不要返回额外的内容，包括前缀。";

/// Turns accumulated step results into the user-facing answer.
pub struct Summarizer {
    client: Arc<dyn ClientWrapper>,
    model: String,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(client: Arc<dyn ClientWrapper>, model: impl Into<String>, timeout: Duration) -> Self {
        Summarizer {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Summarize `results` as an answer to `question`.
    ///
    /// Never fails: a model error comes back as a [`CompletionResult`] with empty content and
    /// the error reason.
    pub async fn summarize(&self, results: &[StepResult], question: &str) -> CompletionResult {
        let messages = summary_messages(results, question);
        complete(self.client.as_ref(), &messages, &self.model, self.timeout).await
    }
}

pub fn summary_messages(results: &[StepResult], question: &str) -> Vec<Message> {
    vec![
        Message::system(SUMMARY_INSTRUCTION),
        Message::system(format!("工具返回结果：{}", results_to_json(results))),
        Message::user(question),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcpchat::client_wrapper::{ModelError, Role};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Vec<(String, Vec<Message>)>>,
        fail: bool,
    }

    #[async_trait]
    impl ClientWrapper for RecordingClient {
        async fn send_message(
            &self,
            messages: &[Message],
            model: &str,
        ) -> Result<Message, ModelError> {
            self.seen
                .lock()
                .await
                .push((model.to_string(), messages.to_vec()));
            if self.fail {
                Err(ModelError::Request("connection reset".into()))
            } else {
                Ok(Message::assistant("北京今天晴，21度。"))
            }
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn summary_sees_instruction_results_and_question() {
        let client = Arc::new(RecordingClient::default());
        let summarizer = Summarizer::new(client.clone(), "qwen-turbo", Duration::from_secs(1));

        let results = vec![StepResult::tool("weather", r#"{"city":"北京","temp":21}"#)];
        let summary = summarizer.summarize(&results, "北京今天天气怎么样").await;
        assert_eq!(summary, CompletionResult::ok("北京今天晴，21度。"));

        let seen = client.seen.lock().await;
        let (model, messages) = &seen[0];
        assert_eq!(model, "qwen-turbo");
        assert_eq!(messages[0], Message::system(SUMMARY_INSTRUCTION));
        assert_eq!(messages[1].role, Role::System);
        assert!(messages[1].content.contains("weather"));
        assert_eq!(messages[2], Message::user("北京今天天气怎么样"));
    }

    #[tokio::test]
    async fn model_failure_degrades_to_error_result() {
        let client = Arc::new(RecordingClient {
            fail: true,
            ..Default::default()
        });
        let summarizer = Summarizer::new(client, "m", Duration::from_secs(1));
        let summary = summarizer.summarize(&[], "q").await;
        assert!(summary.content.is_empty());
        assert_eq!(
            summary.error.as_deref(),
            Some("Model request failed: connection reset")
        );
    }
}
