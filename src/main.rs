#![recursion_limit = "256"]

//! # Main Entry Point
//!
//! Wires the orchestration layer together:
//! - Domain: Configuration and Types
//! - Infrastructure: Matrix transport, LLM responder, JSON store, content lookups
//! - Application: Supervisor, Aggregator, Turn Pipeline, Broadcasts, Router
//! - Interface: Operator Command Handlers
//!

mod application;
mod domain;
mod infrastructure;
mod interface;
mod strings;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

use crate::application::broadcast::BroadcastScheduler;
use crate::application::handle::TransportHandleProvider;
use crate::application::orchestrator::Orchestrator;
use crate::application::pipeline::TurnPipeline;
use crate::application::state::ConversationRegistry;
use crate::application::supervisor::{ConnectionSupervisor, ReconnectPolicy};
use crate::domain::config::AppConfig;
use crate::domain::paths;
use crate::domain::traits::{Clock, StateStore, SystemClock, Transport};
use crate::domain::types::ConnectMethod;
use crate::infrastructure::content::HttpContentProvider;
use crate::infrastructure::llm::LlmResponder;
use crate::infrastructure::matrix::MatrixTransport;
use crate::infrastructure::operator::SessionOperatorSink;
use crate::infrastructure::store::JsonStateStore;
use crate::strings::logs;

/// Conversational bot for Matrix rooms with human handoff and scheduled broadcasts.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to config.yaml (defaults to data/config.yaml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log in through the homeserver's single sign-on instead of a password.
    #[arg(long)]
    sso: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load Configuration
    let config_path = args.config.unwrap_or_else(paths::default_config_path);
    let config = AppConfig::load(&config_path)?;
    let data_dir = config.system.data_dir.clone();

    // 2. Logging Setup
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    // Clear previous session log
    let log_path = data_dir.join(paths::LOG_FILE);
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }

    let file_appender = tracing_appender::rolling::never(&data_dir, paths::LOG_FILE);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,matrix_sdk=warn,matrix_sdk_base=warn,matrix_sdk_crypto=error,ruma=warn,hyper=warn")
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!("Starting Parley...");
    tracing::info!("{}", logs::config_loaded(&config.services.matrix.username));

    // 3. Infrastructure
    let store: Arc<dyn StateStore> = Arc::new(JsonStateStore::new(&data_dir));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let transport = Arc::new(MatrixTransport::new(
        config.services.matrix.clone(),
        config.operator.clone(),
    ));
    let responder = Arc::new(LlmResponder::new(&config)?);

    // 4. Application
    let handle = TransportHandleProvider::new();
    let supervisor = ConnectionSupervisor::new(
        transport.clone(),
        store.clone(),
        handle.clone(),
        ReconnectPolicy::from_config(&config.reconnect),
    );

    let registry = ConversationRegistry::new(store.clone());
    tracing::info!("{}", logs::hydrated(registry.hydrate().await));

    let pipeline = Arc::new(TurnPipeline::new(
        &config,
        registry,
        responder,
        handle.clone(),
        Arc::new(SessionOperatorSink::new(handle.clone())),
        clock.clone(),
    )?);

    let scheduler = BroadcastScheduler::new(
        store.clone(),
        handle.clone(),
        Arc::new(HttpContentProvider::new()),
        clock,
    );
    let seeded = scheduler.seed(&config.broadcasts).await?;
    if seeded > 0 {
        tracing::info!("{}", logs::broadcasts_seeded(seeded));
    }
    supervisor.add_listener(scheduler.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        supervisor.clone(),
        pipeline,
        scheduler,
    ));
    transport.subscribe(orchestrator);

    // 5. Connect
    let method = if args.sso {
        ConnectMethod::SingleSignOn
    } else {
        ConnectMethod::Password
    };
    let stdin = Arc::new(tokio::sync::Mutex::new(
        tokio::io::BufReader::new(tokio::io::stdin()).lines(),
    ));
    supervisor
        .start(method, |challenge| {
            println!("{}", challenge.prompt);
            let stdin = stdin.clone();
            async move { stdin.lock().await.next_line().await.ok().flatten() }
        })
        .await?;

    // 6. Run until interrupted
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("{}", logs::shutdown_fail(&e.to_string()));
    }
    tracing::info!("{}", logs::SHUTDOWN);

    Ok(())
}
