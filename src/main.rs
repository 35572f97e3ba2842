//! # Dialcast — Outbound Campaign Scheduler
//!
//! Bridges a PBX call-control API and a CRM: pulls dialable contacts,
//! places calls, tracks them to completion, and writes the outcomes back.
//!
//! Usage:
//!   dialcast                          # ~/.dialcast/config.toml, port 3020
//!   dialcast --config ./dialcast.toml
//!   dialcast --port 8080

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use dialcast_core::config::DialcastConfig;
use dialcast_core::types::AuthDescriptor;
use dialcast_crm::CrmClient;
use dialcast_engine::{
    AlertNotifier, CampaignRegistry, DialScheduler, PersistenceBridge, SchedulerGuards,
};
use dialcast_gateway::AppState;
use dialcast_telephony::PbxClient;

#[derive(Parser)]
#[command(name = "dialcast", version, about = "Outbound campaign scheduler")]
struct Cli {
    /// Path to the config file (default: ~/.dialcast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the gateway port
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "dialcast=debug,tower_http=debug"
    } else {
        "dialcast=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => DialcastConfig::load_from(path)?,
        None => DialcastConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let telephony = Arc::new(PbxClient::new(&config.telephony)?);
    let crm = Arc::new(CrmClient::new(&config.crm)?);
    let registry = Arc::new(CampaignRegistry::new());
    let guards = Arc::new(SchedulerGuards::new());
    let auto_restart = Arc::new(AtomicBool::new(config.scheduler.auto_restart));
    let (feed, _) = broadcast::channel(64);

    // Restore campaigns before the first tick so a restart picks up where
    // the old process left off.
    let persistence =
        PersistenceBridge::new(registry.clone(), crm.clone(), config.backup.name.clone());
    if config.backup.enabled {
        match persistence.restore().await {
            Ok(count) if count > 0 => tracing::info!(count, "campaigns restored"),
            Ok(_) => {}
            Err(e) => tracing::warn!("campaign restore failed, starting empty: {e}"),
        }
        persistence.spawn(config.backup.interval_secs);
    }

    let _ = AlertNotifier::new(registry.clone(), config.alert.clone()).spawn();

    let admin_auth = AuthDescriptor {
        grant_type: config.telephony.admin_grant_type.clone(),
        client_id: config.telephony.admin_client_id.clone(),
        client_secret: config.telephony.admin_client_secret.clone(),
    };
    let scheduler = DialScheduler::new(
        registry.clone(),
        telephony.clone(),
        crm.clone(),
        feed.clone(),
        guards.clone(),
        auto_restart.clone(),
        config.scheduler.clone(),
        admin_auth,
    );
    tokio::spawn(scheduler.run());

    println!("Dialcast v{}", env!("CARGO_PKG_VERSION"));
    println!("   Gateway:   http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Telephony: {}", config.telephony.host);
    println!("   CRM:       {}", config.crm.host);
    println!();

    let state = AppState {
        registry,
        telephony,
        guards,
        auto_restart,
        feed,
        start_time: std::time::Instant::now(),
    };
    dialcast_gateway::start(&config.gateway, state).await
}
