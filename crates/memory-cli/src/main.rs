// ============================================================================
// mcp-server-qdrant: MCP server giving assistants a Qdrant-backed memory
// ============================================================================
// Usage:
//   mcp-server-qdrant [serve]                       Run the MCP server on stdio
//   mcp-server-qdrant store TEXT [--metadata JSON]  Store one entry
//   mcp-server-qdrant find QUERY [--limit N]        Search stored entries
//   mcp-server-qdrant config                        Show resolved configuration
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use memory_core::mcp::render_results;
use memory_core::memory::create_embedding_provider;
use memory_core::{
    Config, Entry, McpServer, Metadata, QdrantBackend, QdrantConnector, ToolDispatcher,
};
use tracing::{debug, error, info};

/// Semantic memory for MCP clients, backed by Qdrant
#[derive(Parser)]
#[command(name = "mcp-server-qdrant", version, about = "MCP server storing and finding memories in Qdrant")]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdin/stdout (default)
    Serve,

    /// Store a piece of information
    Store {
        /// Text to remember
        information: String,

        /// JSON object stored alongside the text
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Find stored information similar to a query
    Find {
        query: String,

        /// Maximum number of results (default: QDRANT_SEARCH_LIMIT)
        #[arg(long)]
        limit: Option<u64>,

        /// Minimum similarity score, 0 disables the floor
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        score_threshold: f32,
    },

    /// Print the resolved configuration with secrets redacted
    Config,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("memory_core=info,mcp_server_qdrant=info"));

    // stdout belongs to the protocol
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn parse_metadata(raw: &str) -> Result<Metadata> {
    serde_json::from_str::<Metadata>(raw)
        .map_err(|e| anyhow!("--metadata must be a JSON object: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_loaded = match &cli.env_file {
        Some(path) => Some(
            dotenvy::from_path(path)
                .map_err(|e| anyhow!("Failed to load env file {}: {}", path.display(), e))?,
        ),
        None => dotenvy::dotenv().ok().map(|_| ()),
    };

    init_logging();
    if env_loaded.is_none() {
        debug!("No .env file loaded");
    }

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        anyhow!(e)
    })?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Config => {
            for (label, value) in config.summary() {
                println!("{:<22} {}", label, value);
            }
            Ok(())
        }
        Commands::Serve => cmd_serve(config).await,
        Commands::Store {
            information,
            metadata,
        } => {
            let metadata = metadata.as_deref().map(parse_metadata).transpose()?;
            cmd_store(&config, information, metadata).await
        }
        Commands::Find {
            query,
            limit,
            score_threshold,
        } => cmd_find(&config, &query, limit, score_threshold).await,
    }
}

fn build_connector(config: &Config) -> Result<Arc<QdrantConnector>> {
    let embeddings = Arc::new(create_embedding_provider(&config.openai));
    let backend = Arc::new(QdrantBackend::new(&config.qdrant)?);

    Ok(Arc::new(QdrantConnector::new(
        backend,
        embeddings,
        config.qdrant.collection_name.clone(),
    )))
}

async fn cmd_serve(config: Config) -> Result<()> {
    info!("Starting {} v{}", memory_core::mcp::SERVER_NAME, env!("CARGO_PKG_VERSION"));
    for (label, value) in config.summary() {
        info!("{}: {}", label, value);
    }

    let connector = build_connector(&config)?;
    let dispatcher = ToolDispatcher::new(connector, config.qdrant.search_limit, config.tools);

    McpServer::new(Arc::new(dispatcher)).serve_stdio().await
}

async fn cmd_store(config: &Config, information: String, metadata: Option<Metadata>) -> Result<()> {
    let connector = build_connector(config)?;

    let entry = Entry {
        content: information,
        metadata,
    };
    let id = connector.store(&entry).await?;

    println!("Stored {} in '{}'", id, connector.collection_name());
    Ok(())
}

async fn cmd_find(config: &Config, query: &str, limit: Option<u64>, score_threshold: f32) -> Result<()> {
    let connector = build_connector(config)?;
    let limit = limit.unwrap_or(config.qdrant.search_limit);

    let entries = connector.search(query, limit, score_threshold).await?;

    println!("{}", render_results(query, &entries));
    Ok(())
}
