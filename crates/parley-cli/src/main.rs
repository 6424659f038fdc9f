mod client;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use config::{ParleyConfig, DEFAULT_CONFIG_PATH};
use parley_agent::{AgentRunner, LlmClient};
use parley_gateway::GatewayServer;
use parley_skills::SkillRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley", about = "Parley: streaming agentic answers over HTTP")]
struct Cli {
    /// Path to config file (default: parley.toml, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Send a query to a running gateway and print its events
    Chat {
        /// The question to ask
        query: String,
        /// Gateway base URL
        #[arg(long, env = "PARLEY_URL", default_value = "http://localhost:3000")]
        url: String,
    },
    /// Inspect tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List registered tools
    List,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn build_registry(config: &ParleyConfig) -> anyhow::Result<SkillRegistry> {
    let mut registry =
        SkillRegistry::with_timeout(Duration::from_secs(config.agent.tool_timeout_secs));
    parley_builtins::register_builtins(&mut registry, config.search.to_search_config())?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = match &cli.config {
        Some(path) => ParleyConfig::load(path, true)?,
        None => ParleyConfig::load(Path::new(DEFAULT_CONFIG_PATH), false)?,
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let registry = build_registry(&config)?;
            info!(
                count = registry.skill_count(),
                timeout_secs = registry.timeout().as_secs(),
                "Built-in tools registered"
            );
            if config.model.api_key.is_none() {
                warn!("GEMINI_API_KEY is not set; queries will fail until it is configured");
            }
            if config.search.api_key.is_none() {
                warn!("SERPAPI_KEY is not set; web searches will return an error");
            }

            let llm = Arc::new(LlmClient::new(config.model));
            let runner = Arc::new(AgentRunner::new(llm, Arc::new(registry), config.agent));
            let app = GatewayServer::build(runner);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Parley gateway listening on {}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Chat { query, url } => client::run_chat(&url, &query).await?,
        Commands::Tools { action } => match action {
            ToolsAction::List => {
                let registry = build_registry(&config)?;
                let tools = registry.declarations();
                if tools.is_empty() {
                    println!("No tools registered.");
                } else {
                    println!("Registered tools:");
                    for tool in &tools {
                        println!("  {}: {}", tool.name, tool.description);
                    }
                    println!("\nTotal: {} tool(s)", tools.len());
                }
            }
        },
    }

    Ok(())
}
