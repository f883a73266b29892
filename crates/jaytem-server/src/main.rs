use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jaytem_core::{config::Config, db::Db, store::MemoryStore};
use jaytem_server::{auth::bootstrap_admin, build_router, logging::LogFeed, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(3600);

/// Hourly sweep: expire stale stored sessions, drop their progress streams
/// and evict streams that ended longer ago than the session lifetime.
fn spawn_housekeeping(state: Arc<AppState>, db: Option<Arc<Db>>) {
    let max_age_hours = state.config.session_max_age_hours;
    let stream_max_age = Duration::from_secs(u64::try_from(max_age_hours).unwrap_or(0) * 3600);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            tick.tick().await;
            if let Some(db) = &db {
                match db.expire_sessions(max_age_hours).await {
                    Ok(ids) if ids.is_empty() => {},
                    Ok(ids) => {
                        for id in &ids {
                            state.pipeline.stream_manager.remove(id).await;
                        }
                        info!(expired = ids.len(), "dropped stale sessions");
                    },
                    Err(e) => error!("session expiry failed: {e:#}"),
                }
            }
            let evicted = state.pipeline.stream_manager.evict_ended(stream_max_age).await;
            if evicted > 0 {
                info!(evicted, "dropped finished progress streams");
            }
        }
    });
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logs = LogFeed::new();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jaytem_server=info,jaytem_core=info,jaytem_agent=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(logs.layer())
        .init();

    let config = Config::from_env()?;

    for key in config.missing_model_settings() {
        warn!("{key} is not set; evaluations will fail until it is");
    }
    let backend = Arc::new(jaytem_agent::backend_from_config(&config));
    info!(provider = %config.model_provider, "model backend configured");

    let (state, db) = if config.database_url.is_empty() {
        warn!("DATABASE_URL not set; sessions and accounts live in memory only");
        let store = Arc::new(MemoryStore::new());
        bootstrap_admin(&config, store.as_ref()).await?;
        (AppState::new(config, store, backend, logs), None)
    } else {
        let db = Db::open(&config.database_url).context("opening database pool")?;
        db.migrate().await.context("applying schema")?;
        let db = Arc::new(db);
        bootstrap_admin(&config, db.as_ref()).await?;
        (AppState::new(config, Arc::clone(&db), backend, logs), Some(db))
    };
    spawn_housekeeping(Arc::clone(&state), db);

    let addr = format!("{}:{}", state.config.web_bind, state.config.web_port);
    let app = build_router(state);

    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
