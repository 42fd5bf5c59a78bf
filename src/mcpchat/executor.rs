//! Sequential plan execution.
//!
//! [`StepExecutor`] walks the steps of a plan in order. Tool steps go to the [`ToolGateway`],
//! model steps go to the [`ClientWrapper`] with every earlier result prepended as system
//! context. The first failure stops the walk; the results gathered so far are returned in the
//! [`ExecutionFailure`] together with the error.

use crate::mcpchat::client_wrapper::{send_with_timeout, ClientWrapper, Message, ModelError};
use crate::mcpchat::event::{ChatEvent, EventHandler};
use crate::mcpchat::gateway::{GatewayError, ToolGateway};
use crate::mcpchat::plan::PlanStep;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const CONTEXT_PREAMBLE: &str = "以下是之前步骤的执行结果（JSON）：";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Tool,
    Model,
}

/// Output of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Tool name for tool steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Serialized tool payload or model reply text.
    pub output: String,
}

impl StepResult {
    pub fn tool(name: impl Into<String>, output: impl Into<String>) -> Self {
        StepResult {
            kind: StepKind::Tool,
            tool: Some(name.into()),
            output: output.into(),
        }
    }

    pub fn model(output: impl Into<String>) -> Self {
        StepResult {
            kind: StepKind::Model,
            tool: None,
            output: output.into(),
        }
    }
}

/// Serialize results as a JSON array, the form handed to later model calls.
pub fn results_to_json(results: &[StepResult]) -> String {
    // a Vec of plain structs cannot fail to serialize
    serde_json::to_string(results).unwrap_or_else(|_| "[]".to_string())
}

/// Why a step failed.
#[derive(Debug, Clone, PartialEq)]
pub enum StepError {
    Gateway(GatewayError),
    Model(ModelError),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::Gateway(err) => write!(f, "{}", err),
            StepError::Model(err) => write!(f, "{}", err),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StepError::Gateway(err) => Some(err),
            StepError::Model(err) => Some(err),
        }
    }
}

impl From<GatewayError> for StepError {
    fn from(err: GatewayError) -> Self {
        StepError::Gateway(err)
    }
}

impl From<ModelError> for StepError {
    fn from(err: ModelError) -> Self {
        StepError::Model(err)
    }
}

/// Aborted execution: the results before `failed_step` plus the error that stopped it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    pub completed: Vec<StepResult>,
    pub failed_step: usize,
    pub error: StepError,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step #{} failed after {} completed step(s): {}",
            self.failed_step,
            self.completed.len(),
            self.error
        )
    }
}

impl Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs plan steps one after another.
pub struct StepExecutor {
    gateway: Arc<ToolGateway>,
    client: Arc<dyn ClientWrapper>,
    model: String,
    model_timeout: Duration,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl StepExecutor {
    pub fn new(
        gateway: Arc<ToolGateway>,
        client: Arc<dyn ClientWrapper>,
        model: impl Into<String>,
        model_timeout: Duration,
    ) -> Self {
        StepExecutor {
            gateway,
            client,
            model: model.into(),
            model_timeout,
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Execute `steps` in order. An empty slice yields an empty result list.
    pub async fn execute(
        &self,
        request_id: &str,
        steps: &[PlanStep],
    ) -> Result<Vec<StepResult>, ExecutionFailure> {
        let mut results: Vec<StepResult> = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let label = step.label();
            log::info!("[{}] step #{} ({}) started", request_id, index, label);
            self.emit(ChatEvent::StepStarted {
                request_id: request_id.to_string(),
                index,
                label: label.clone(),
            })
            .await;

            let outcome = match step {
                PlanStep::Tool { tool, input } => self.run_tool(tool, input).await,
                PlanStep::Model { messages } => self.run_model(messages, &results).await,
            };

            match outcome {
                Ok(result) => {
                    log::info!(
                        "[{}] step #{} ({}) completed, {} chars",
                        request_id,
                        index,
                        label,
                        result.output.len()
                    );
                    self.emit(ChatEvent::StepCompleted {
                        request_id: request_id.to_string(),
                        index,
                        label,
                        output_length: result.output.len(),
                    })
                    .await;
                    results.push(result);
                }
                Err(error) => {
                    log::error!("[{}] step #{} ({}) failed: {}", request_id, index, label, error);
                    self.emit(ChatEvent::StepFailed {
                        request_id: request_id.to_string(),
                        index,
                        label,
                        error: error.to_string(),
                    })
                    .await;
                    return Err(ExecutionFailure {
                        completed: results,
                        failed_step: index,
                        error,
                    });
                }
            }
        }

        Ok(results)
    }

    async fn run_tool(
        &self,
        tool: &str,
        input: &serde_json::Map<String, JsonValue>,
    ) -> Result<StepResult, StepError> {
        let payload = self
            .gateway
            .invoke(tool, JsonValue::Object(input.clone()))
            .await?;
        let output = match payload {
            JsonValue::String(text) => text,
            other => other.to_string(),
        };
        Ok(StepResult::tool(tool, output))
    }

    async fn run_model(
        &self,
        messages: &[Message],
        prior: &[StepResult],
    ) -> Result<StepResult, StepError> {
        let request = with_prior_results(messages, prior);
        let reply = send_with_timeout(
            self.client.as_ref(),
            &request,
            &self.model,
            self.model_timeout,
        )
        .await?;
        Ok(StepResult::model(reply.content))
    }

    async fn emit(&self, event: ChatEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_chat_event(&event).await;
        }
    }
}

/// Messages for a model step: prior results as one leading system message (if any), then the
/// step's own messages.
pub fn with_prior_results(messages: &[Message], prior: &[StepResult]) -> Vec<Message> {
    let mut request = Vec::with_capacity(messages.len() + 1);
    if !prior.is_empty() {
        request.push(Message::system(format!(
            "{}\n{}",
            CONTEXT_PREAMBLE,
            results_to_json(prior)
        )));
    }
    request.extend_from_slice(messages);
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcpchat::client_wrapper::Role;

    #[test]
    fn first_model_step_gets_no_context_message() {
        let messages = vec![Message::user("hi")];
        assert_eq!(with_prior_results(&messages, &[]), messages);
    }

    #[test]
    fn prior_results_lead_as_system_context() {
        let prior = vec![StepResult::tool("weather", r#"{"temp":21}"#)];
        let request = with_prior_results(&[Message::user("穿什么？")], &prior);
        assert_eq!(request.len(), 2);
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.contains(r#""tool":"weather""#));
        assert!(request[0].content.contains(r#"{\"temp\":21}"#));
        assert_eq!(request[1], Message::user("穿什么？"));
    }

    #[test]
    fn results_serialize_with_kind_tag() {
        let json = results_to_json(&[StepResult::tool("time", "12:00"), StepResult::model("ok")]);
        assert_eq!(
            json,
            r#"[{"type":"tool","tool":"time","output":"12:00"},{"type":"model","output":"ok"}]"#
        );
    }

    #[test]
    fn failure_display_names_step_and_cause() {
        let failure = ExecutionFailure {
            completed: vec![StepResult::model("a")],
            failed_step: 1,
            error: StepError::Model(ModelError::EmptyResponse),
        };
        assert_eq!(
            failure.to_string(),
            "step #1 failed after 1 completed step(s): Model returned an empty response"
        );
        assert!(failure.source().is_some());
    }
}
