use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wayfinder_agent::orchestrator::Orchestrator;
use wayfinder_agent::providers::GroqClient;
use wayfinder_agent::registry::ToolRegistry;
use wayfinder_core::WayfinderConfig;
use wayfinder_gateway::GatewayServer;
use wayfinder_memory::SqliteStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Wayfinder travel agent server", long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "wayfinder.toml")]
    config: String,

    /// Path to the SQLite database (overrides config)
    #[arg(long)]
    db: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut config = WayfinderConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.memory.db_path = db;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("Opening store at {}", config.memory.db_path);
    let store = Arc::new(SqliteStore::new(&config.memory.db_path).await?);

    let mut registry = ToolRegistry::new();
    wayfinder_tools::register_default_tools(&mut registry, &config.amadeus)?;

    let api_key = config
        .llm
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("GROQ_API_KEY is not set"))?;
    let llm = Arc::new(GroqClient::new(
        api_key,
        &config.llm.base_url,
        &config.llm.model,
    )?);

    let mut orchestrator = Orchestrator::new(llm, Arc::new(registry), store.clone(), store.clone())
        .with_max_retries(config.agent.max_retries)
        .with_max_steps(config.agent.max_steps)
        .with_params(wayfinder_agent::llm::CompletionParams {
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        });
    if let Some(fallback_key) = config.llm.fallback_api_key.as_deref() {
        info!("Fallback model credential configured");
        let fallback = Arc::new(GroqClient::new(
            fallback_key,
            &config.llm.base_url,
            &config.llm.model,
        )?);
        orchestrator = orchestrator.with_fallback(fallback);
    }

    info!(
        "Starting Wayfinder with model {} on {}:{}",
        config.llm.model, config.server.host, config.server.port
    );
    let server = GatewayServer::new(
        Arc::new(orchestrator),
        store,
        &config.server.host,
        config.server.port,
    );
    server.start().await?;
    Ok(())
}
