use financial_assistant_agent::{
    agent::Orchestrator,
    api::start_server,
    checkpoint::build_checkpoint_store,
    config::AgentConfig,
    gateway::{ChatCompletionsClient, ModelGateway},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(AgentConfig::from_env()?);

    info!("Financial assistant API server: {}", config.project_name);
    info!("Port: {}", config.api_port);

    // Create components
    let gateway: Arc<dyn ModelGateway> = Arc::new(ChatCompletionsClient::from_config(&config)?);
    let checkpoints = build_checkpoint_store(&config);

    let orchestrator = Arc::new(Orchestrator::new(config.clone(), gateway, checkpoints));

    info!("Orchestrator initialized");

    start_server(orchestrator, config.api_port).await?;

    Ok(())
}
