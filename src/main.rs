#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Eonhub entrypoint (systemd-friendly).
//! Runs the hub against the in-memory dev chain and serves metrics/info.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info, warn};

use eonhub::chain::{ChainConnector, InMemoryChain};
use eonhub::core::crypto::service::CryptoService;
use eonhub::core::state::store::HubStore;
use eonhub::core::types::{HubConfig, HubInfo};
use eonhub::hub::Hub;
use eonhub::monitoring::metrics::Metrics;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Config file if `EONHUB_CONFIG` points at one, else defaults with env
/// overrides.
fn load_config() -> HubConfig {
    if let Ok(path) = std::env::var("EONHUB_CONFIG") {
        match std::fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str::<HubConfig>(&raw) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    error!(%path, ?e, "config file invalid, falling back to defaults");
                }
            },
            Err(e) => {
                error!(%path, ?e, "config file unreadable, falling back to defaults");
            }
        }
    }
    let mut cfg = HubConfig::default();
    cfg.data_dir = env("EONHUB_DATA_DIR", &cfg.data_dir);
    if let Ok(n) = env("EONHUB_BLOCKS_PER_EON", "").parse() {
        cfg.blocks_per_eon = n;
    }
    cfg.metrics_listen_addr = env("EONHUB_METRICS_ADDR", &cfg.metrics_listen_addr);
    cfg
}

struct AppState {
    hub: Arc<Hub<InMemoryChain>>,
    metrics: Arc<Metrics>,
}

async fn metrics_handler(State(st): State<Arc<AppState>>) -> String {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if encoder
        .encode(&st.metrics.registry.gather(), &mut buf)
        .is_err()
    {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn hubinfo_handler(State(st): State<Arc<AppState>>) -> Json<HubInfo> {
    Json(st.hub.hub_info())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("EONHUB_LOG_JSON").is_ok() {
        let _ = tracing_subscriber::fmt().json().try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .compact()
            .try_init();
    }

    let cfg = load_config();
    info!(data_dir = %cfg.data_dir, blocks_per_eon = cfg.blocks_per_eon, "eonhub starting");

    let metrics = Arc::new(Metrics::new().context("metrics init")?);
    let store_dir = format!("{}/state", cfg.data_dir);
    let store = HubStore::open(&store_dir).context("store open")?;
    let crypto = CryptoService::load_or_create(&Path::new(&cfg.data_dir).join("hub.key"))
        .context("hub key load")?;
    let chain = Arc::new(InMemoryChain::new());

    let listen_addr = cfg.metrics_listen_addr.clone();
    let hub = Arc::new(
        Hub::new(cfg, crypto, Arc::clone(&chain), store, Arc::clone(&metrics))
            .context("hub init")?,
    );

    // Drive the hub from block pushes.
    let mut blocks = chain.watch_blocks();
    let driver_hub = Arc::clone(&hub);
    let driver = tokio::spawn(async move {
        while let Some(height) = blocks.recv().await {
            if let Err(e) = driver_hub.on_block(height) {
                error!(height, ?e, "block handling failed");
            }
        }
        warn!("block channel closed");
    });

    // Dev chain has no external block producer; tick one out on an interval.
    let block_ms: u64 = env("EONHUB_DEV_BLOCK_MS", "1000").parse().unwrap_or(1000);
    let ticker_chain = Arc::clone(&chain);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(block_ms));
        loop {
            interval.tick().await;
            ticker_chain.produce_blocks(1);
        }
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/hubinfo", get(hubinfo_handler))
        .with_state(Arc::new(AppState {
            hub: Arc::clone(&hub),
            metrics,
        }));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .context("metrics listener bind")?;
    info!(%listen_addr, "serving /metrics and /hubinfo");

    tokio::select! {
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                error!(?e, "http server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    driver.abort();
    Ok(())
}
