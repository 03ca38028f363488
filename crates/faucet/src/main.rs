//! Faucet service binary

use clap::Parser;
use kol_common::utils::logging::init_logging;
use kol_faucet::api::create_router;
use kol_faucet::{FaucetConfig, FaucetService, JsonRpcClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Server address
    #[arg(long)]
    server_addr: Option<String>,

    /// RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Backend wallet private key
    #[arg(long, env = "BACKEND_WALLET_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Rate limit window (seconds)
    #[arg(long)]
    rate_limit_window: Option<u64>,

    /// Refuse to start on configuration errors
    #[arg(long)]
    production: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = FaucetConfig::load(args.config.as_deref())?;

    // Override with CLI arguments
    if let Some(addr) = args.server_addr {
        config.server_addr = addr;
    }

    if let Some(rpc_url) = args.rpc_url {
        config.rpc_url = rpc_url;
    }

    if let Some(key) = args.private_key {
        config.private_key = Some(key);
    }

    if let Some(window) = args.rate_limit_window {
        config.rate_limit_window_secs = window;
    }

    if args.production {
        config.production = true;
    }

    if args.debug {
        config.logging.level = "debug".to_string();
    }

    let _log_guard = init_logging(&config.logging)?;

    info!("Starting KOL Faucet v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  RPC URL: {}", config.rpc_url);
    info!("  Mode: {}", if config.production { "production" } else { "development" });
    info!(
        "  Rate limit: {} requests / {}s",
        config.max_requests_per_window, config.rate_limit_window_secs
    );

    let chain = Arc::new(JsonRpcClient::new(config.rpc_url.clone(), config.rpc_timeout())?);
    let service = Arc::new(FaucetService::from_config(&config, chain)?);
    info!("Faucet service initialized");

    let balances = service.clone();
    tokio::spawn(async move {
        balances.log_balances().await;
    });

    let mut app = create_router(service).layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        app = app.layer(cors);
        info!("CORS enabled");
    }

    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
