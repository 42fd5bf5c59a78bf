//! # mcpchat
//!
//! mcpchat answers natural-language questions with the help of tools exposed by a remote
//! [Model Context Protocol](https://modelcontextprotocol.io) server. One chat request runs
//! through a fixed pipeline:
//!
//! 1. **Discover** the remote tools through the shared [`ToolGateway`].
//! 2. **Plan**: a language model sees the tools and the question and answers with a JSON plan
//!    (a list of tool/model steps) or a direct answer.
//! 3. **Interpret** the plan with [`plan::parse_plan`], tolerating fences, prose and bad steps.
//! 4. **Execute** the steps in order with [`executor::StepExecutor`].
//! 5. **Summarize** the step results into one answer with [`summarizer::Summarizer`].
//!
//! [`ChatOrchestrator`] composes these stages and maps every failure to a fixed, user-safe
//! message plus a short error tag. The `server` feature (on by default) adds an axum HTTP
//! surface in [`server`] and the `mcpchatd` daemon.
//!
//! ## Wiring it together
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcpchat::clients::openai::OpenAIClient;
//! use mcpchat::mcp_transport::McpHttpTransport;
//! use mcpchat::{ChatConfig, ChatOrchestrator, ToolGateway};
//!
//! #[tokio::main]
//! async fn main() {
//!     mcpchat::init_logger();
//!     let config = ChatConfig::from_env();
//!
//!     let transport = McpHttpTransport::new(
//!         &config.mcp_server_url,
//!         &config.mcp_client_name,
//!         &config.mcp_client_version,
//!     );
//!     let gateway = Arc::new(ToolGateway::new(Arc::new(transport), config.gateway_timeout));
//!     let client = Arc::new(OpenAIClient::new(
//!         &config.openai_api_key,
//!         &config.openai_base_url,
//!         &config.planning_model,
//!     ));
//!
//!     let orchestrator = ChatOrchestrator::new(
//!         gateway,
//!         client,
//!         &config.planning_model,
//!         &config.summary_model,
//!         config.model_timeout,
//!     );
//!     let outcome = orchestrator.chat("北京今天天气怎么样").await;
//!     println!("{}", outcome.message);
//! }
//! ```
//!
//! ## Swapping collaborators
//!
//! The two outbound seams are traits: [`ClientWrapper`] for the language model and
//! [`gateway::GatewayTransport`] for the tool server. Tests drive the whole pipeline with
//! in-memory implementations of both.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// `RUST_LOG` controls verbosity; calling this more than once is harmless.
///
/// ```rust
/// mcpchat::init_logger();
/// mcpchat::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

pub mod mcpchat;

pub use mcpchat::client_wrapper;
pub use mcpchat::client_wrapper::{ClientWrapper, CompletionResult, Message, ModelError, Role};
pub use mcpchat::clients;
pub use mcpchat::config;
pub use mcpchat::config::ChatConfig;
pub use mcpchat::event;
pub use mcpchat::event::{ChatEvent, EventHandler};
pub use mcpchat::executor;
pub use mcpchat::executor::{ExecutionFailure, StepError, StepExecutor, StepResult};
pub use mcpchat::gateway;
pub use mcpchat::gateway::{GatewayError, ToolGateway};
pub use mcpchat::mcp_transport;
pub use mcpchat::orchestrator;
pub use mcpchat::orchestrator::{ChatOrchestrator, ChatOutcome};
pub use mcpchat::plan;
pub use mcpchat::plan::{Plan, PlanParseError, PlanStep};
#[cfg(feature = "server")]
pub use mcpchat::server;
pub use mcpchat::summarizer;
