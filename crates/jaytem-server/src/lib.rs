pub mod auth;
pub mod logging;
pub mod routes;

use std::{collections::HashMap, sync::Arc, time::Instant};

use axum::{
    routing::{get, post},
    Router,
};
use jaytem_core::{
    agent::ModelBackend,
    config::Config,
    pipeline::Pipeline,
    store::{CredentialStore, PromptStore, SessionStore},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::auth::SessionKeys;
use crate::logging::LogFeed;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub prompts: Arc<dyn PromptStore>,
    pub users: Arc<dyn CredentialStore>,
    pub pipeline: Arc<Pipeline>,
    /// Cancellation handles of in-flight evaluations, by session id.
    pub runs: Mutex<HashMap<String, CancellationToken>>,
    pub config: Arc<Config>,
    pub keys: SessionKeys,
    pub logs: LogFeed,
    pub start_time: Instant,
}

impl AppState {
    /// Wire every store seam to `store` and build the pipeline around it.
    pub fn new<S>(
        config: Config,
        store: Arc<S>,
        backend: Arc<dyn ModelBackend>,
        logs: LogFeed,
    ) -> Arc<Self>
    where
        S: SessionStore + PromptStore + CredentialStore + 'static,
    {
        let secret = if config.jwt_secret.is_empty() {
            warn!("JWT_SECRET not set; logins will not survive a restart");
            auth::random_secret()
        } else {
            config.jwt_secret.as_bytes().to_vec()
        };
        let keys = SessionKeys::new(&secret, config.auth_session_hours, config.cookie_secure);

        let (pipeline, _events) = Pipeline::new(store.clone(), backend, config.pipeline_settings());

        Arc::new(Self {
            sessions: store.clone(),
            prompts: store.clone(),
            users: store,
            pipeline: Arc::new(pipeline),
            runs: Mutex::new(HashMap::new()),
            config: Arc::new(config),
            keys,
            logs,
            start_time: Instant::now(),
        })
    }
}

// ── Router ────────────────────────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(routes::health))
        // Auth
        .route("/api/auth/login", post(routes::login))
        .route("/api/auth/logout", post(routes::logout))
        // Sessions
        .route("/api/sessions", post(routes::create_session))
        .route(
            "/api/sessions/:id",
            get(routes::get_session).delete(routes::delete_session),
        )
        .route("/api/sessions/:id/acknowledge", post(routes::acknowledge_session))
        .route("/api/sessions/:id/evaluate", post(routes::evaluate_session))
        .route("/api/sessions/:id/cancel", post(routes::cancel_session))
        .route("/api/sessions/:id/events", get(routes::sse_session_events))
        .route("/api/sessions/:id/report", get(routes::get_report))
        .route("/api/sessions/:id/report.pdf", get(routes::get_report_pdf))
        // Developer output view
        .route("/api/dev/sessions/:id/outputs", get(routes::dev_outputs))
        .route("/api/dev/sessions/:id/outputs.txt", get(routes::dev_outputs_text))
        // Admin
        .route(
            "/api/admin/prompts",
            get(routes::get_prompts).put(routes::put_prompts),
        )
        .route("/api/admin/prompts/reset", post(routes::reset_prompts))
        .route(
            "/api/admin/users",
            get(routes::list_users)
                .post(routes::create_user)
                .put(routes::update_user)
                .delete(routes::delete_user),
        )
        .route("/api/admin/logs", get(routes::sse_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
