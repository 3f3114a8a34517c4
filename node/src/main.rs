// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # LendVault Node
//!
//! Entry point for the `lendvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, deploys the vault, funds the genesis
//! accounts, and serves the HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`     start the node
//! - `init`    write a default config file
//! - `status`  query a running node's status endpoint
//! - `version` print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use lendvault_contracts::config::CONTRACT_VERSION;
use lendvault_contracts::types::{format_ether, format_units};
use lendvault_contracts::Runtime;

use cli::{Commands, LendVaultCli};
use config::NodeConfig;
use logging::{LogFormat, DEFAULT_FILTER};
use metrics::VaultMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LendVaultCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_config(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Deploys the vault and serves the API and metrics until shutdown.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(DEFAULT_FILTER, args.log_format)?;

    let node_config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            tracing::info!("no config given, using devnet defaults");
            NodeConfig::default()
        }
    };

    tracing::info!(
        network = %node_config.network,
        host = %args.host,
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        "starting lendvault-node"
    );

    // --- Vault ---
    let vault_config = node_config.vault_config()?;
    let decimals = vault_config.decimals;
    let mut runtime = Runtime::new(vault_config).context("failed to deploy vault")?;

    // --- Genesis ---
    for (address, balance) in node_config.genesis_balances()? {
        runtime
            .fund(&address, balance)
            .with_context(|| format!("failed to fund genesis account {}", address))?;
        tracing::info!(%address, balance = %format_ether(balance), "genesis account funded");
    }
    tracing::info!(
        vault = %runtime.vault_address(),
        symbol = %runtime.vault().symbol(),
        total_supply = %format_units(runtime.vault().total_supply(), decimals),
        "vault ready"
    );

    // --- Metrics ---
    let vault_metrics = Arc::new(VaultMetrics::new());
    vault_metrics.observe(&runtime);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (contracts {})",
            env!("CARGO_PKG_VERSION"),
            CONTRACT_VERSION
        ),
        network: node_config.network.clone(),
        runtime: Arc::new(Mutex::new(runtime)),
        event_tx,
        metrics: Arc::clone(&vault_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.host, args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&vault_metrics));
    let metrics_addr = format!("{}:{}", args.host, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("lendvault-node stopped");
    Ok(())
}

/// Writes the default devnet config.
fn init_config(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("lendvault_node=info", LogFormat::Pretty)?;

    let path = &args.output;
    if path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    let node_config = NodeConfig::default();
    node_config
        .save(path)
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    tracing::info!(path = %path.display(), "config written");

    println!("Config written.");
    println!("  Path           : {}", path.display());
    println!("  Network        : {}", node_config.network);
    println!(
        "  Vault          : {} ({})",
        node_config.vault.name, node_config.vault.symbol
    );
    println!("  Genesis        : {} accounts", node_config.genesis.len());

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let body = http_get(&args.rpc_addr, "/status").await?;
    println!("{}", body);
    Ok(())
}

/// Plain HTTP/1.1 GET over a tokio TCP stream.
async fn http_get(addr: &str, path: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = addr
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr,
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Body starts after the first blank line.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("lendvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("contracts      {}", CONTRACT_VERSION);
    println!("rustc          {}", rustc_version());
}

fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
