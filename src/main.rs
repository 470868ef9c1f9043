//! dbapi - HTTP data-access server
//!
//! Serves the bounded message-channel broker and the instance info endpoint.

use clap::{Parser, Subcommand};
use dbapi_server::{run_metrics_server, Config, Metrics, Server, TokenValidator};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "dbapi", version, about = "HTTP data-access server")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "DBAPI_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides the configuration)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SHA-256 hash of a token for auth.token_hashes
    HashToken {
        /// The token (a GUID)
        token: String,
    },
    /// Generate a new token and print it with its hash
    GenerateToken,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Token helpers run locally
    match cli.command {
        Some(Commands::HashToken { token }) => {
            let token = Uuid::parse_str(token.trim())?;
            println!("{}", TokenValidator::hash_token(&token));
            return Ok(());
        }
        Some(Commands::GenerateToken) => {
            let token = Uuid::new_v4();
            println!("token: {}", token);
            println!("hash:  {}", TokenValidator::hash_token(&token));
            return Ok(());
        }
        None => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = match cli.config {
        Some(ref path) => {
            let config = Config::load_from(path).map_err(|e| {
                tracing::error!("Failed to load config: {}", e);
                e
            })?;
            tracing::info!("Loaded config from {}", path.display());
            config
        }
        None => {
            tracing::info!("Using default configuration");
            Config::from_env()
        }
    };
    if let Some(bind) = cli.bind {
        config.network.bind_addr = bind;
    }

    // Load auth secrets from external file if configured
    if let Err(e) = config.load_secrets() {
        tracing::error!("Failed to load auth secrets: {}", e);
        return Err(e.into());
    }
    config.validate()?;

    tracing::info!("Starting dbapi server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!(
        "  Broker limits: {} channels, {} messages per channel",
        config.broker.max_channels,
        config.broker.max_messages_per_channel
    );

    let metrics = if config.metrics.enabled {
        Some(Arc::new(Metrics::new()?))
    } else {
        None
    };
    let server = Arc::new(Server::from_config(&config, metrics.clone()));

    let auth = server.handler().auth();
    if auth.is_required() {
        tracing::info!(
            "  Authentication: enabled ({} token(s), localhost {})",
            auth.validator().token_count(),
            if config.auth.require_token_for_localhost {
                "requires token"
            } else {
                "exempt"
            }
        );
        tracing::info!("  Session token: {}", auth.validator().session_token());
    } else {
        tracing::info!("  Authentication: disabled");
    }

    // Spawn metrics server
    let metrics_handle = metrics.map(|metrics| {
        let addr = config.metrics.bind_addr;
        let shutdown = server.subscribe_shutdown();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        })
    });

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
