use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use crate::types::PipelineEvent;

use crate::{
    agent::{ModelBackend, ServiceError},
    prompt::{build_prompt, PromptError},
    store::SessionStore,
    stream::SessionStreamManager,
    types::{ClientIntake, IntakeError, PromptSet, Session, StepId},
};

/// Timing knobs for a run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Pause between a completed step and the next one.
    pub step_delay: Duration,
    /// Upper bound on a single model call.
    pub model_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(3000),
            model_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Final state of a run that was not aborted by an error.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session: Session,
    pub status: RunStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("step {step} failed: {source}")]
    GenerationFailed {
        step: StepId,
        #[source]
        source: ServiceError,
    },
    #[error(transparent)]
    MissingContext(#[from] PromptError),
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("invalid intake: {0}")]
    InvalidIntake(#[from] IntakeError),
    #[error("persisting session failed: {0:#}")]
    Persist(anyhow::Error),
    #[error("session previously failed at step {step}; start a new evaluation")]
    AlreadyFailed { step: StepId },
}

impl PipelineError {
    /// Step the run stopped on, when the failure belongs to one.
    pub fn step(&self) -> Option<StepId> {
        match self {
            Self::GenerationFailed { step, .. } => Some(*step),
            Self::MissingContext(PromptError::MissingContext { step, .. }) => Some(*step),
            Self::AlreadyFailed { step } => Some(*step),
            _ => None,
        }
    }
}

/// Runs the six-step evaluation chain for one session at a time.
///
/// Every step result is persisted before the next step starts, so a run
/// interrupted by cancellation or a client reload can be picked up by
/// [`Pipeline::resume`]. A hard failure marks the session and ends it for good.
pub struct Pipeline {
    pub store: Arc<dyn SessionStore>,
    pub backend: Arc<dyn ModelBackend>,
    pub settings: PipelineSettings,
    pub event_tx: broadcast::Sender<PipelineEvent>,
    pub stream_manager: Arc<SessionStreamManager>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn SessionStore>,
        backend: Arc<dyn ModelBackend>,
        settings: PipelineSettings,
    ) -> (Self, broadcast::Receiver<PipelineEvent>) {
        let (tx, rx) = broadcast::channel(256);
        let p = Self {
            store,
            backend,
            settings,
            event_tx: tx,
            stream_manager: SessionStreamManager::new(),
        };
        (p, rx)
    }

    async fn emit(&self, event: PipelineEvent) {
        self.stream_manager
            .push_line(event.session_id(), event.to_json())
            .await;
        if event.is_terminal() {
            self.stream_manager.end_session(event.session_id()).await;
        }
        let _ = self.event_tx.send(event);
    }

    // ── Entry points ──────────────────────────────────────────────────────

    /// Validate `intake`, persist a fresh session and run it from step 1.
    pub async fn start(
        &self,
        intake: ClientIntake,
        prompts: &PromptSet,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        intake.validate()?;
        let session = Session::new(intake);
        self.store
            .save_session(&session)
            .await
            .map_err(PipelineError::Persist)?;
        info!(session_id = %session.id, "session created");
        self.run(session, prompts, cancel).await
    }

    /// Load a stored session and continue from its first pending step.
    /// A session whose last run failed is refused with `AlreadyFailed`.
    pub async fn resume(
        &self,
        session_id: &str,
        prompts: &PromptSet,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let session = self
            .store
            .load_session(session_id)
            .await
            .map_err(PipelineError::Persist)?
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))?;
        info!(
            session_id = %session.id,
            completed = session.results.len(),
            "resuming session"
        );
        self.run(session, prompts, cancel).await
    }

    /// Execute every pending step of `session` in order.
    ///
    /// `prompts` is a snapshot taken by the caller before the run; it is not
    /// re-read between steps. Cancellation is observed before each step and
    /// during the inter-step delay. A model call already in flight is allowed
    /// to finish and its result is kept.
    pub async fn run(
        &self,
        mut session: Session,
        prompts: &PromptSet,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        if let Some(step) = session.failed_step {
            warn!(session_id = %session.id, step = %step, "refusing to continue a failed session");
            return Err(PipelineError::AlreadyFailed { step });
        }
        self.stream_manager.start(&session.id).await;

        let pending: Vec<StepId> = session.results.pending().collect();
        for (i, step) in pending.into_iter().enumerate() {
            if i > 0 && !self.settings.step_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.step_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return Ok(self.cancelled(session).await);
            }

            self.emit(PipelineEvent::StepStarted {
                session_id: session.id.clone(),
                step,
            })
            .await;
            info!(session_id = %session.id, step = %step, "step started");

            let prompt = match build_prompt(step, &session.intake, &session.results, prompts) {
                Ok(p) => p,
                Err(e) => {
                    error!(session_id = %session.id, step = %step, "prompt assembly failed: {e}");
                    self.fail(&mut session, step).await;
                    return Err(e.into());
                }
            };

            let text = match self.generate(&prompt).await {
                Ok(t) => t,
                Err(source) => {
                    error!(session_id = %session.id, step = %step, "generation failed: {source}");
                    self.fail(&mut session, step).await;
                    return Err(PipelineError::GenerationFailed { step, source });
                }
            };
            let output_len = text.len();

            if let Err(e) = session.results.record(step, text) {
                // pending() and record() agree on ordering, so this only trips
                // if the session was mutated underneath us.
                error!(session_id = %session.id, step = %step, "{e}");
                self.fail(&mut session, step).await;
                return Err(PipelineError::Persist(e.into()));
            }
            if let Err(e) = self.store.save_session(&session).await {
                error!(session_id = %session.id, step = %step, "persist failed: {e:#}");
                self.fail(&mut session, step).await;
                return Err(PipelineError::Persist(e));
            }

            info!(session_id = %session.id, step = %step, output_len, "step completed");
            self.emit(PipelineEvent::StepCompleted {
                session_id: session.id.clone(),
                step,
            })
            .await;
        }

        info!(session_id = %session.id, "evaluation finished");
        self.emit(PipelineEvent::Finished {
            session_id: session.id.clone(),
        })
        .await;
        Ok(RunOutcome {
            session,
            status: RunStatus::Completed,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let limit = self.settings.model_timeout;
        match tokio::time::timeout(limit, self.backend.generate(prompt)).await {
            Ok(res) => res,
            Err(_) => Err(ServiceError::Timeout {
                secs: limit.as_secs(),
            }),
        }
    }

    /// Mark `session` as failed at `step` and announce it. Saving the mark is
    /// best effort; the store may be what just failed.
    async fn fail(&self, session: &mut Session, step: StepId) {
        session.failed_step = Some(step);
        if let Err(e) = self.store.save_session(session).await {
            error!(session_id = %session.id, step = %step, "recording failure failed: {e:#}");
        }
        self.emit(PipelineEvent::Failed {
            session_id: session.id.clone(),
            step,
        })
        .await;
    }

    async fn cancelled(&self, session: Session) -> RunOutcome {
        let completed = session.results.len();
        warn!(session_id = %session.id, completed, "evaluation cancelled");
        self.emit(PipelineEvent::Cancelled {
            session_id: session.id.clone(),
            completed,
        })
        .await;
        RunOutcome {
            session,
            status: RunStatus::Cancelled,
        }
    }
}
