//! ShadowAuth gateway server
//!
//! Serves the checkpoint-gated key-issuance API: clients walk a script's
//! ad-verification checkpoints through this gateway and receive a
//! time-bounded license key on completion.
//!
//! Usage:
//!   shadowauth-server --scripts scripts.json --port 8420

use anyhow::{Context, Result};
use clap::Parser;
use shadowauth_keys::MemoryKeyStore;
use shadowauth_registry::Registry;
use shadowauth_server::{build_router, AppState};
use shadowauth_session::{MemorySessionStore, SessionConfig, SessionManager};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "shadowauth-server")]
#[command(about = "Checkpoint-gated license key issuance gateway")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8420")]
    port: u16,

    /// Path to the script/checkpoint registry JSON document
    #[arg(short, long)]
    scripts: PathBuf,

    /// Public base URL embedded in provider redirect callbacks
    #[arg(long, default_value = "http://localhost:8420")]
    public_url: String,

    /// Session inactivity TTL in hours
    #[arg(long, default_value = "24")]
    session_ttl_hours: i64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("ShadowAuth gateway starting...");
    let registry = Registry::from_file(&args.scripts)
        .with_context(|| format!("failed to load script registry from {:?}", args.scripts))?;
    let script_count = registry.len();

    let config = SessionConfig {
        session_ttl: chrono::Duration::hours(args.session_ttl_hours),
        callback_base: format!(
            "{}/api/v1/gateway",
            args.public_url.trim_end_matches('/')
        ),
        ..SessionConfig::default()
    };
    let manager = SessionManager::new(
        Arc::new(registry),
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryKeyStore::new()),
        config,
    );
    let app = build_router(AppState {
        manager: Arc::new(manager),
    });

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!("\n========================================");
    println!("  ShadowAuth Gateway Running");
    println!("========================================");
    println!("  Address:   {addr}");
    println!("  Scripts:   {script_count}");
    println!("  Endpoint:  /api/v1/gateway");
    println!("========================================\n");

    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;
    Ok(())
}
