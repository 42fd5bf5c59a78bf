// src/mcpchat/mod.rs

pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod executor;
pub mod gateway;
pub mod mcp_transport;
pub mod orchestrator;
pub mod plan;
#[cfg(feature = "server")]
pub mod server;
pub mod summarizer;

pub use config::ChatConfig;
pub use gateway::ToolGateway;
pub use orchestrator::ChatOrchestrator;
