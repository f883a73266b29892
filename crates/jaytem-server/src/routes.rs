use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use chrono::Utc;
use jaytem_core::{
    credentials::{hash_password, verify_password, CredentialError},
    pipeline::RunStatus,
    report::{self, ReportError},
    store::normalize_email,
    ClientIntake, CredentialRecord, PromptSet, PromptSetPatch, Session, StepId, UserRole,
    UserSummary, UserUpdate,
};
use jaytem_domains::default_prompts;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::auth::{AdminUser, AuthUser, DevAccess};
use crate::AppState;

// ── Error helper ──────────────────────────────────────────────────────────

pub(crate) fn internal(e: impl std::fmt::Display) -> StatusCode {
    tracing::error!("internal error: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Status plus a short message rendered as `{"error": ...}`.
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("error"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn report_error(e: ReportError) -> ApiError {
    match e {
        ReportError::Incomplete { .. } => {
            ApiError::new(StatusCode::CONFLICT, "Evaluation is not complete")
        },
        ReportError::Pdf(_) => internal(e).into(),
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────

async fn load_session(state: &AppState, id: &str) -> ApiResult<Session> {
    state
        .sessions
        .load_session(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Session not found"))
}

/// Stored PromptSet, or the built-in legal defaults when none is stored.
async fn current_prompts(state: &AppState) -> ApiResult<PromptSet> {
    Ok(state
        .prompts
        .load_prompts()
        .await
        .map_err(internal)?
        .unwrap_or_else(default_prompts))
}

/// Cancel any run and drop every trace of the session.
async fn discard_session(state: &AppState, id: &str) -> ApiResult<bool> {
    if let Some(token) = state.runs.lock().await.remove(id) {
        token.cancel();
    }
    state.pipeline.stream_manager.remove(id).await;
    let existed = state.sessions.delete_session(id).await.map_err(internal)?;
    if existed {
        info!(session_id = %id, "session discarded");
    }
    Ok(existed)
}

// ── Health ────────────────────────────────────────────────────────────────

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_s": state.start_time.elapsed().as_secs(),
    }))
}

// ── Auth ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct LoginBody {
    email: String,
    password: String,
}

pub(crate) async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> ApiResult<impl IntoResponse> {
    let invalid = || ApiError::new(StatusCode::UNAUTHORIZED, "Invalid credentials");

    let Some(user) = state.users.get_user(&body.email).await.map_err(internal)? else {
        warn!("login rejected: unknown account");
        return Err(invalid());
    };
    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&body.password, &hash))
        .await
        .map_err(internal)?;
    if !verified {
        warn!("login rejected: wrong password");
        return Err(invalid());
    }

    let token = state.keys.issue(&user).map_err(internal)?;
    info!(role = user.role.as_str(), "user logged in");
    Ok((
        [(header::SET_COOKIE, state.keys.cookie(&token))],
        Json(json!({ "success": true, "user": UserSummary::from(&user) })),
    ))
}

pub(crate) async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, state.keys.clear_cookie())],
        Json(json!({ "success": true })),
    )
}

// ── Sessions ──────────────────────────────────────────────────────────────

pub(crate) async fn create_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(intake): Json<ClientIntake>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    intake
        .validate()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
    let session = Session::new(intake);
    state.sessions.save_session(&session).await.map_err(internal)?;
    info!(session_id = %session.id, "session created");
    Ok((StatusCode::CREATED, Json(json!({ "id": session.id }))))
}

pub(crate) async fn get_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = load_session(&state, &id).await?;
    let running = state.runs.lock().await.contains_key(&id);
    let completed: Vec<&str> = session.results.iter().map(|(step, _)| step.as_str()).collect();
    Ok(Json(json!({
        "id": session.id,
        "intake": session.intake,
        "created_at": session.created_at,
        "acknowledged_at": session.acknowledged_at,
        "completed": completed,
        "next_step": session.results.next_pending().map(StepId::as_str),
        "complete": session.results.is_complete(),
        "running": running,
        "failed": session.failed_step.is_some(),
    })))
}

pub(crate) async fn delete_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if discard_session(&state, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, "Session not found"))
    }
}

pub(crate) async fn acknowledge_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    // Held across load and save; evaluate loads under the same lock.
    let runs = state.runs.lock().await;
    if runs.contains_key(&id) {
        return Err(ApiError::new(StatusCode::CONFLICT, "Evaluation in progress"));
    }
    let mut session = load_session(&state, &id).await?;
    if session.acknowledged_at.is_none() {
        session.acknowledged_at = Some(Utc::now());
        state.sessions.save_session(&session).await.map_err(internal)?;
    }
    drop(runs);
    Ok(Json(json!({ "acknowledged_at": session.acknowledged_at })))
}

// ── Evaluation ────────────────────────────────────────────────────────────

/// Start (or resume after a reload) the six-step run in the background. The
/// PromptSet is read once here and used for the whole run. A session whose
/// run failed is refused; the client has to start a new evaluation.
pub(crate) async fn evaluate_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let prompts = current_prompts(&state).await?;

    let token = CancellationToken::new();
    let session = {
        let mut runs = state.runs.lock().await;
        if runs.contains_key(&id) {
            return Err(ApiError::new(StatusCode::CONFLICT, "Evaluation already running"));
        }
        let session = load_session(&state, &id).await?;
        if let Some(step) = session.failed_step {
            warn!(session_id = %id, step = %step, "evaluate refused for failed session");
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "Failed to generate evaluation. Please start a new evaluation.",
            ));
        }
        runs.insert(id.clone(), token.clone());
        session
    };
    // Open the progress stream before returning so a client subscribing
    // right after the 202 sees every event.
    state.pipeline.stream_manager.start(&id).await;

    let task_state = Arc::clone(&state);
    let task_id = id.clone();
    tokio::spawn(async move {
        let state = task_state;
        match state.pipeline.run(session, &prompts, &token).await {
            Ok(outcome) => match outcome.status {
                RunStatus::Completed => info!(session_id = %task_id, "evaluation finished"),
                RunStatus::Cancelled => info!(
                    session_id = %task_id,
                    completed = outcome.session.results.len(),
                    "evaluation cancelled"
                ),
            },
            Err(e) => error!(
                session_id = %task_id,
                step = e.step().map(StepId::as_str),
                "evaluation failed: {e}"
            ),
        }

        let discarded = state.runs.lock().await.remove(&task_id).is_none();
        if discarded {
            // The session was deleted mid-run; the last step may have saved it again.
            if let Err(e) = state.sessions.delete_session(&task_id).await {
                error!(session_id = %task_id, "failed to drop discarded session: {e}");
            }
            state.pipeline.stream_manager.remove(&task_id).await;
        }
    });

    info!(session_id = %id, "evaluation started");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "status": "running" })),
    ))
}

pub(crate) async fn cancel_session(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let token = state.runs.lock().await.get(&id).cloned();
    let Some(token) = token else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "No evaluation running"));
    };
    token.cancel();
    info!(session_id = %id, "cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "status": "cancelling" })),
    ))
}

/// Progress events for one session: history replay, then live tail until
/// the run ends.
pub(crate) async fn sse_session_events(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let (history, live_rx) = state.pipeline.stream_manager.subscribe(&id).await;

        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }

        if let Some(mut live_rx) = live_rx {
            loop {
                match live_rx.recv().await {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            return;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx)
        .map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

// ── Report ────────────────────────────────────────────────────────────────

pub(crate) async fn get_report(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<report::ReportView>> {
    let session = load_session(&state, &id).await?;
    let view = report::render(&session, &state.config.firm_name).map_err(report_error)?;
    Ok(Json(view))
}

/// The evaluation PDF. The session is discarded once the document is built.
pub(crate) async fn get_report_pdf(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let session = load_session(&state, &id).await?;
    if state.runs.lock().await.contains_key(&id) {
        return Err(ApiError::new(StatusCode::CONFLICT, "Evaluation in progress"));
    }

    let file_name = report::document_file_name(&session);
    let firm_name = state.config.firm_name.clone();
    let bytes = tokio::task::spawn_blocking(move || report::to_document(&session, &firm_name))
        .await
        .map_err(internal)?
        .map_err(report_error)?;
    info!(session_id = %id, pdf_len = bytes.len(), "report document built");

    discard_session(&state, &id).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

// ── Developer output view ─────────────────────────────────────────────────

pub(crate) async fn dev_outputs(
    State(state): State<Arc<AppState>>,
    _dev: DevAccess,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = load_session(&state, &id).await?;
    let steps: Vec<Value> = StepId::ALL
        .iter()
        .map(|&step| {
            let output = session.results.get(step);
            json!({
                "step": step.as_str(),
                "title": step.title(),
                "role": step.role().as_str(),
                "length": output.map_or(0, str::len),
                "output": output,
            })
        })
        .collect();
    Ok(Json(json!({
        "id": session.id,
        "client": session.intake.full_name(),
        "created_at": session.created_at,
        "steps": steps,
    })))
}

/// Every step's output in one plain-text block, in step order.
pub fn outputs_export(session: &Session) -> String {
    let rule = "=".repeat(80);
    StepId::ALL
        .iter()
        .map(|&step| {
            format!(
                "{rule}\n{}\n{rule}\n\n{}\n\n",
                step.title(),
                session.results.get(step).unwrap_or("No output")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) async fn dev_outputs_text(
    State(state): State<Arc<AppState>>,
    _dev: DevAccess,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = load_session(&state, &id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        outputs_export(&session),
    ))
}

// ── Admin: prompts ────────────────────────────────────────────────────────

pub(crate) async fn get_prompts(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<PromptSet>> {
    Ok(Json(current_prompts(&state).await?))
}

pub(crate) async fn put_prompts(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(patch): Json<PromptSetPatch>,
) -> ApiResult<Json<PromptSet>> {
    let mut prompts = current_prompts(&state).await?;
    prompts.apply(patch);
    state.prompts.save_prompts(&prompts).await.map_err(internal)?;
    info!("prompt set updated");
    Ok(Json(prompts))
}

pub(crate) async fn reset_prompts(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<PromptSet>> {
    state.prompts.clear_prompts().await.map_err(internal)?;
    info!("prompt set reset to defaults");
    Ok(Json(default_prompts()))
}

// ── Admin: users ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct CreateUserBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    organization: String,
    role: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct UpdateUserBody {
    #[serde(default)]
    email: String,
    password: Option<String>,
    organization: Option<String>,
    role: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct DeleteUserBody {
    #[serde(default)]
    email: String,
}

fn parse_role(role: Option<String>) -> ApiResult<Option<UserRole>> {
    match role.filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(r) => UserRole::parse(&r)
            .map(Some)
            .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "Unknown role")),
    }
}

async fn hash_blocking(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(internal)?
        .map_err(|e| match e {
            CredentialError::TooShort => ApiError::new(StatusCode::BAD_REQUEST, e.to_string()),
            CredentialError::Hash(_) => internal(e).into(),
        })
}

pub(crate) async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<Value>> {
    let users: Vec<UserSummary> = state
        .users
        .list_users()
        .await
        .map_err(internal)?
        .iter()
        .map(UserSummary::from)
        .collect();
    Ok(Json(json!({ "users": users })))
}

pub(crate) async fn create_user(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(body): Json<CreateUserBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if body.email.trim().is_empty() || body.password.is_empty() || body.organization.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Missing required fields"));
    }
    let role = parse_role(body.role)?.unwrap_or_default();
    let record = CredentialRecord {
        email: normalize_email(&body.email),
        organization: body.organization,
        role,
        password_hash: hash_blocking(body.password).await?,
        created_at: Utc::now(),
    };
    if !state.users.insert_user(&record).await.map_err(internal)? {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "User already exists"));
    }
    info!(role = role.as_str(), "user created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": UserSummary::from(&record) })),
    ))
}

pub(crate) async fn update_user(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(body): Json<UpdateUserBody>,
) -> ApiResult<Json<Value>> {
    if body.email.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Email required"));
    }
    let password_hash = match body.password.filter(|p| !p.is_empty()) {
        Some(p) => Some(hash_blocking(p).await?),
        None => None,
    };
    let update = UserUpdate {
        organization: body.organization.filter(|o| !o.is_empty()),
        role: parse_role(body.role)?,
        password_hash,
    };
    if !state
        .users
        .update_user(&body.email, &update)
        .await
        .map_err(internal)?
    {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "User not found"));
    }
    info!("user updated");
    Ok(Json(json!({ "success": true })))
}

pub(crate) async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(claims): AdminUser,
    Json(body): Json<DeleteUserBody>,
) -> ApiResult<Json<Value>> {
    if body.email.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Email required"));
    }
    if normalize_email(&body.email) == claims.sub {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Cannot delete your own account",
        ));
    }
    if !state.users.delete_user(&body.email).await.map_err(internal)? {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "User not found"));
    }
    info!("user deleted");
    Ok(Json(json!({ "success": true })))
}

// ── Admin: logs ───────────────────────────────────────────────────────────

pub(crate) async fn sse_logs(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    // Subscribe before snapshotting the ring so nothing falls in between
    let live_rx = state.logs.tx.subscribe();
    let history = state.logs.snapshot();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        let mut live_rx = live_rx;
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx)
        .map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}
