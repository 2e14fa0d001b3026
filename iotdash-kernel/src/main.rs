/**
 * IOTDASH KERNEL - Point d'entrée principal du serveur
 *
 * RÔLE : Orchestration de tous les modules : config, stores documentaires,
 * cœur en mémoire (liveness, télémétrie, commandes), sweep périodique, HTTP.
 *
 * ARCHITECTURE : Polling HTTP uniquement. Les devices poussent leurs données
 * et récupèrent leurs commandes ; le dashboard lit et empile des commandes.
 */

mod auth;
mod commands;
mod config;
mod error;
mod gateway;
mod health;
mod http;
mod liveness;
mod models;
mod registry;
mod state;
mod store;
mod telemetry;
mod users;

use crate::auth::TokenIssuer;
use crate::config::{load_config, secret_key};
use crate::health::HealthTracker;
use crate::liveness::LivenessTracker;
use crate::registry::{DeviceLookup, DeviceStore};
use crate::state::{AppState, Core};
use crate::users::UserStore;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("iotdash_kernel=info,tower_http=info"));

    let json_logging = std::env::var("IOTDASH_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();
    init_logging();

    let cfg = load_config().await;
    let secret = secret_key().context("IOTDASH_SECRET_KEY must be set")?;

    // stores documentaires
    let data_dir = &cfg.storage.data_dir;
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let devices = Arc::new(
        DeviceStore::open(data_dir.join("devices.json"))
            .await
            .context("failed to load device registry")?,
    );
    let users = Arc::new(
        UserStore::open(data_dir.join("users.json"))
            .await
            .context("failed to load users")?,
    );

    // cœur en mémoire + sweep de liveness
    let core = Core::new(cfg.liveness.timeout_ms);
    LivenessTracker::spawn_sweeper(
        core.liveness.clone(),
        Duration::from_secs(cfg.liveness.sweep_interval_secs.max(1)),
    );

    let app_state = AppState {
        core,
        lookup: devices.clone() as Arc<dyn DeviceLookup>,
        devices,
        users,
        tokens: Arc::new(TokenIssuer::new(&secret, cfg.auth.token_ttl_days)),
        health_tracker: HealthTracker::new(),
    };

    let app = http::build_router(app_state);

    let addr = format!("{}:{}", cfg.http.host, cfg.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[kernel] listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("[kernel] shutting down");
        })
        .await?;
    Ok(())
}
