//! mcpchatd: HTTP daemon serving the chat pipeline.
//!
//! ```text
//! RUST_LOG=info MCP_SERVER_URL=http://localhost:3000/mcp OPENAI_API_KEY=sk-... mcpchatd
//! ```

use std::sync::Arc;

use mcpchat::clients::openai::OpenAIClient;
use mcpchat::mcp_transport::McpHttpTransport;
use mcpchat::server::{serve, AppState};
use mcpchat::{ChatConfig, ChatOrchestrator, ToolGateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    mcpchat::init_logger();

    let config = ChatConfig::from_env();
    log::info!("starting mcpchatd with {:?}", config);

    let transport = McpHttpTransport::new(
        &config.mcp_server_url,
        &config.mcp_client_name,
        &config.mcp_client_version,
    );
    let gateway = Arc::new(ToolGateway::new(Arc::new(transport), config.gateway_timeout));

    // the first chat request reconnects lazily if this fails
    if let Err(err) = gateway.connect().await {
        log::warn!("MCP server not reachable at startup: {}", err);
    }

    let client = Arc::new(OpenAIClient::new(
        &config.openai_api_key,
        &config.openai_base_url,
        &config.planning_model,
    ));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        gateway,
        client,
        &config.planning_model,
        &config.summary_model,
        config.model_timeout,
    ));

    serve(&config, AppState::new(orchestrator)).await
}
