//! Vestibule - guest sessions and identity resolution

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vestibule::{
    clock::system_clock,
    config::{Args, KvBackend, LogFormat},
    kv::{self, MemoryKvStore, MongoKvStore, SharedKv},
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("vestibule={},info", args.log_level).into());
    match args.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Vestibule");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("KV backend: {:?}", args.kv_backend);
    info!("Session TTL: {}s", args.session_ttl_secs);
    info!("======================================");

    let store: SharedKv = match args.kv_backend {
        KvBackend::Memory => {
            let memory = Arc::new(MemoryKvStore::new());
            kv::spawn_cleanup_task(Arc::clone(&memory), args.sweep_interval());
            memory
        }
        KvBackend::Mongodb => {
            let mongo = MongoKvStore::connect(
                &args.mongodb_uri,
                &args.mongodb_db,
                &args.mongodb_collection,
            )
            .await?;
            Arc::new(mongo)
        }
    };

    let state = Arc::new(server::AppState::new(args, store, system_clock())?);

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
