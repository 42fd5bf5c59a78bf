//! Chat entry point.
//!
//! [`ChatOrchestrator::chat`] runs one question through the whole pipeline:
//!
//! ```text
//! Discovering ─▶ Planning ─▶ Interpreting ─┬─▶ Executing ─▶ Summarizing ─▶ Answered
//!      │             │                      └─▶ Answered (direct answer / fallback)
//!      └─────────────┴──────────── Executing/Summarizing errors ─────────▶ Failed
//! ```
//!
//! Every failure ends in a [`ChatOutcome`] carrying a fixed, localized message and a short
//! error tag. Technical detail is logged with the request id and never returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpchat::clients::openai::OpenAIClient;
//! use mcpchat::gateway::ToolGateway;
//! use mcpchat::mcp_transport::McpHttpTransport;
//! use mcpchat::orchestrator::ChatOrchestrator;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let gateway = Arc::new(ToolGateway::new(
//!     Arc::new(McpHttpTransport::new("http://localhost:3000/mcp", "mcp-client", "1.0.0")),
//!     Duration::from_secs(30),
//! ));
//! let client = Arc::new(OpenAIClient::new(
//!     &std::env::var("OPENAI_API_KEY").unwrap_or_default(),
//!     "https://dashscope.aliyuncs.com/compatible-mode/v1",
//!     "qwen-plus",
//! ));
//! let orchestrator = ChatOrchestrator::new(gateway, client, "qwen-plus", "qwen-plus", Duration::from_secs(60));
//!
//! let outcome = orchestrator.chat("北京今天天气怎么样").await;
//! println!("{}", outcome.message);
//! # }
//! ```

use crate::mcpchat::client_wrapper::{complete, ClientWrapper, Message};
use crate::mcpchat::event::{preview_message, ChatEvent, EventHandler};
use crate::mcpchat::executor::StepExecutor;
use crate::mcpchat::gateway::{ToolDescriptor, ToolGateway};
use crate::mcpchat::plan::{parse_plan, Plan};
use crate::mcpchat::summarizer::Summarizer;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const GENERIC_FAILURE_MESSAGE: &str = "抱歉，处理您的请求时出现错误";
pub const EXECUTION_FAILURE_MESSAGE: &str = "抱歉，执行工具调用时出现错误";
pub const SUMMARY_FAILURE_MESSAGE: &str = "抱歉，总结结果时出现错误";
pub const NO_PLAN_MESSAGE: &str = "无法找到合适的工具处理您的请求";

pub const TAG_TOOL_DISCOVERY_FAILED: &str = "tool_discovery_failed";
pub const TAG_PLANNING_FAILED: &str = "planning_failed";
pub const TAG_EXECUTION_FAILED: &str = "execution_failed";
pub const TAG_SUMMARY_FAILED: &str = "summary_failed";

const ROLE_PROMPT: &str = "你是一个专业的助手，请根据用户的问题，给出相应的回答。";

const FORMAT_PROMPT: &str = r#"根据用户的输入以及可用的工具，判断用户想要做什么。如果不需要调用工具或者无法完成用户的需求，则自行处理用户的问题，并返回以下格式的数据：
{
  "steps": [],
  "content": "你的回答"
}
如果需要调用工具或者分步处理，应该返回一个或多个步骤，每个步骤是一个可用的工具调用或者一次大模型调用。调用工具后，应该立即调用大模型分析下一步的输入，返回格式为：
{
  "steps": [
    { "type": "tool", "tool": "tool_name", "input": { "key": "value" } },
    { "type": "model", "input": { "messages": [ { "role": "user", "content": "需要输入的问题" } ] } }
  ]
}
除了以上内容，不要返回任何其他内容"#;

/// Terminal value of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatOutcome {
    /// Always non-empty; a fixed safe message when `error` is set.
    pub message: String,
    /// Short machine-readable tag of the failed stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatOutcome {
    pub fn answered(message: impl Into<String>) -> Self {
        ChatOutcome {
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(message: &str, tag: &str) -> Self {
        ChatOutcome {
            message: message.to_string(),
            error: Some(tag.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Pipeline stage of a request, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    Discovering,
    Planning,
    Interpreting,
    Executing,
    Summarizing,
    Answered,
    Failed,
}

impl fmt::Display for ChatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatStage::Discovering => "discovering",
            ChatStage::Planning => "planning",
            ChatStage::Interpreting => "interpreting",
            ChatStage::Executing => "executing",
            ChatStage::Summarizing => "summarizing",
            ChatStage::Answered => "answered",
            ChatStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Composes gateway, planner model, executor and summarizer into one request cycle.
///
/// Cheap to share: wrap it in an `Arc` and call [`chat`](ChatOrchestrator::chat) from any
/// number of tasks. The only state shared between requests is the gateway connection.
pub struct ChatOrchestrator {
    gateway: Arc<ToolGateway>,
    client: Arc<dyn ClientWrapper>,
    planning_model: String,
    model_timeout: Duration,
    executor: StepExecutor,
    summarizer: Summarizer,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ChatOrchestrator {
    /// `planning_model` is also used for model steps of a plan.
    pub fn new(
        gateway: Arc<ToolGateway>,
        client: Arc<dyn ClientWrapper>,
        planning_model: &str,
        summary_model: &str,
        model_timeout: Duration,
    ) -> Self {
        let executor = StepExecutor::new(
            gateway.clone(),
            client.clone(),
            planning_model,
            model_timeout,
        );
        let summarizer = Summarizer::new(client.clone(), summary_model, model_timeout);
        ChatOrchestrator {
            gateway,
            client,
            planning_model: planning_model.to_string(),
            model_timeout,
            executor,
            summarizer,
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.executor = self.executor.with_event_handler(handler.clone());
        self.event_handler = Some(handler);
        self
    }

    pub fn gateway(&self) -> &Arc<ToolGateway> {
        &self.gateway
    }

    /// Answer one question. Never fails; see [`ChatOutcome`].
    pub async fn chat(&self, question: &str) -> ChatOutcome {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        log::info!("[{}] chat: {}", request_id, preview_message(question));
        self.emit(ChatEvent::RequestStarted {
            request_id: request_id.clone(),
            message_preview: preview_message(question),
        })
        .await;

        let outcome = self.run(&request_id, question).await;

        let stage = if outcome.is_failed() {
            ChatStage::Failed
        } else {
            ChatStage::Answered
        };
        log::info!(
            "[{}] {} in {} ms",
            request_id,
            stage,
            started.elapsed().as_millis()
        );
        self.emit(ChatEvent::RequestFinished {
            request_id,
            error: outcome.error.clone(),
            elapsed_ms: started.elapsed().as_millis(),
        })
        .await;
        outcome
    }

    async fn run(&self, request_id: &str, question: &str) -> ChatOutcome {
        self.enter(request_id, ChatStage::Discovering);
        let tools = match self.gateway.list_tools().await {
            Ok(tools) => tools,
            Err(err) => {
                log::error!("[{}] tool discovery failed: {}", request_id, err);
                return ChatOutcome::failed(GENERIC_FAILURE_MESSAGE, TAG_TOOL_DISCOVERY_FAILED);
            }
        };
        self.emit(ChatEvent::ToolsDiscovered {
            request_id: request_id.to_string(),
            tool_names: tools.iter().map(|tool| tool.name.clone()).collect(),
        })
        .await;

        self.enter(request_id, ChatStage::Planning);
        let planning = complete(
            self.client.as_ref(),
            &planning_messages(&tools, question),
            &self.planning_model,
            self.model_timeout,
        )
        .await;
        if let Some(reason) = planning.error {
            log::error!("[{}] planning failed: {}", request_id, reason);
            return ChatOutcome::failed(GENERIC_FAILURE_MESSAGE, TAG_PLANNING_FAILED);
        }

        self.enter(request_id, ChatStage::Interpreting);
        let plan = match parse_plan(&planning.content) {
            Ok(plan) => {
                log::debug!("[{}] plan: {:?}", request_id, plan);
                self.emit(ChatEvent::PlanReady {
                    request_id: request_id.to_string(),
                    step_count: plan.steps.len(),
                    has_direct_answer: plan.direct_answer.is_some(),
                })
                .await;
                plan
            }
            Err(err) => {
                log::warn!(
                    "[{}] {}; answering with the raw planning text",
                    request_id,
                    err
                );
                self.emit(ChatEvent::PlanUnparseable {
                    request_id: request_id.to_string(),
                    error: err.to_string(),
                })
                .await;
                Plan::answer(planning.content.trim())
            }
        };

        if plan.steps.is_empty() {
            return match plan.direct_answer {
                Some(answer) if !answer.trim().is_empty() => ChatOutcome::answered(answer),
                _ => ChatOutcome::answered(NO_PLAN_MESSAGE),
            };
        }

        self.enter(request_id, ChatStage::Executing);
        let results = match self.executor.execute(request_id, &plan.steps).await {
            Ok(results) => results,
            Err(failure) => {
                log::error!("[{}] execution aborted: {}", request_id, failure);
                return ChatOutcome::failed(EXECUTION_FAILURE_MESSAGE, TAG_EXECUTION_FAILED);
            }
        };

        self.enter(request_id, ChatStage::Summarizing);
        let summary = self.summarizer.summarize(&results, question).await;
        self.emit(ChatEvent::SummaryProduced {
            request_id: request_id.to_string(),
            content_length: summary.content.len(),
            error: summary.error.clone(),
        })
        .await;

        match summary.error {
            Some(reason) => {
                log::error!("[{}] summary failed: {}", request_id, reason);
                ChatOutcome::failed(SUMMARY_FAILURE_MESSAGE, TAG_SUMMARY_FAILED)
            }
            None if summary.content.trim().is_empty() => {
                log::error!("[{}] summary came back empty", request_id);
                ChatOutcome::failed(SUMMARY_FAILURE_MESSAGE, TAG_SUMMARY_FAILED)
            }
            None => ChatOutcome::answered(summary.content),
        }
    }

    fn enter(&self, request_id: &str, stage: ChatStage) {
        log::debug!("[{}] → {}", request_id, stage);
    }

    async fn emit(&self, event: ChatEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_chat_event(&event).await;
        }
    }
}

/// Planning conversation: role, available tools, output contract, then the question.
pub fn planning_messages(tools: &[ToolDescriptor], question: &str) -> Vec<Message> {
    let tools_json = serde_json::to_string(tools).unwrap_or_else(|_| "[]".to_string());
    vec![
        Message::system(ROLE_PROMPT),
        Message::system(format!("以下是可用的工具和描述：{}", tools_json)),
        Message::system(FORMAT_PROMPT),
        Message::user(question),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcpchat::client_wrapper::Role;
    use serde_json::json;

    #[test]
    fn planning_prompt_lists_tools_before_the_question() {
        let tools = vec![ToolDescriptor {
            name: "weather".into(),
            description: "查询天气".into(),
            input_schema: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        }];
        let messages = planning_messages(&tools, "北京今天天气怎么样");
        assert_eq!(messages.len(), 4);
        assert!(messages[..3].iter().all(|m| m.role == Role::System));
        assert!(messages[1].content.contains(r#""name":"weather""#));
        assert!(messages[1].content.contains(r#""inputSchema""#));
        assert!(messages[2].content.contains(r#""steps""#));
        assert_eq!(messages[3], Message::user("北京今天天气怎么样"));
    }

    #[test]
    fn outcome_serializes_without_absent_error() {
        assert_eq!(
            serde_json::to_value(ChatOutcome::answered("你好")).unwrap(),
            json!({"message": "你好"})
        );
        assert_eq!(
            serde_json::to_value(ChatOutcome::failed(SUMMARY_FAILURE_MESSAGE, TAG_SUMMARY_FAILED))
                .unwrap(),
            json!({"message": "抱歉，总结结果时出现错误", "error": "summary_failed"})
        );
    }
}
