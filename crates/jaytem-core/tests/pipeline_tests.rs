use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jaytem_core::{
    agent::{ModelBackend, ServiceError},
    pipeline::{Pipeline, PipelineError, PipelineSettings, RunStatus},
    report,
    store::{MemoryStore, SessionStore},
    ClientIntake, ClientType, PipelineEvent, PromptSet, Session, StepId,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ── helpers ──────────────────────────────────────────────────────────────────

fn ana_ruiz() -> ClientIntake {
    ClientIntake {
        client_type: ClientType::Individual,
        first_name: "Ana".into(),
        last_name: "Ruiz".into(),
        email: "ana.ruiz@example.com".into(),
        phone: "555-0142".into(),
        primary_language: "Spanish".into(),
        secondary_language: None,
        narrative: "My landlord ignored a broken stair for months and I fell.".into(),
    }
}

fn prompts() -> PromptSet {
    PromptSet {
        plaintiff_persona: "You represent the plaintiff.".into(),
        plaintiff_open: "INSTR-1".into(),
        plaintiff_draft: "INSTR-2".into(),
        defense_persona: "You represent the defense.".into(),
        defense_open: "INSTR-3".into(),
        defense_strategy: "INSTR-4".into(),
        synthesis_persona: "You synthesise both sides.".into(),
        rebuttal_open: "INSTR-5".into(),
        rebuttal_final: "INSTR-6".into(),
    }
}

/// Step number encoded in the instruction line of the prompt.
fn step_of(prompt: &str) -> usize {
    let i = prompt.find("INSTR-").expect("instruction marker") + "INSTR-".len();
    prompt[i..i + 1].parse().expect("step digit")
}

enum Behaviour {
    Succeed,
    FailAt(usize),
    CancelAfter(usize, CancellationToken),
    Hang,
}

/// Answers step k with `OUT-k` and records every prompt it sees.
struct StubBackend {
    prompts: Mutex<Vec<String>>,
    behaviour: Behaviour,
}

impl StubBackend {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            behaviour,
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn steps_called(&self) -> Vec<usize> {
        self.prompts.lock().unwrap().iter().map(|p| step_of(p)).collect()
    }
}

#[async_trait]
impl ModelBackend for StubBackend {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let k = step_of(prompt);
        match &self.behaviour {
            Behaviour::FailAt(n) if *n == k => Err(ServiceError::Status {
                status: 500,
                body_len: 0,
            }),
            Behaviour::CancelAfter(n, token) if *n == k => {
                token.cancel();
                Ok(format!("OUT-{k}"))
            }
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(format!("OUT-{k}"))
            }
            _ => Ok(format!("OUT-{k}")),
        }
    }
}

fn no_delay() -> PipelineSettings {
    PipelineSettings {
        step_delay: Duration::ZERO,
        model_timeout: Duration::from_secs(30),
    }
}

fn pipeline(
    backend: Arc<StubBackend>,
    settings: PipelineSettings,
) -> (Pipeline, Arc<MemoryStore>, broadcast::Receiver<PipelineEvent>) {
    let store = Arc::new(MemoryStore::new());
    let (p, rx) = Pipeline::new(store.clone(), backend, settings);
    (p, store, rx)
}

fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut out = Vec::new();
    while let Ok(e) = rx.try_recv() {
        out.push(e);
    }
    out
}

/// A stored session with steps 1..=n already answered.
async fn seeded_session(store: &MemoryStore, n: usize) -> Session {
    let mut s = Session::new(ana_ruiz());
    for step in StepId::ALL.into_iter().take(n) {
        s.results.record(step, format!("OUT-{}", step.number())).unwrap();
    }
    store.save_session(&s).await.unwrap();
    s
}

// ── full run ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn ana_ruiz_runs_all_six_steps() {
    let backend = StubBackend::new(Behaviour::Succeed);
    let (p, store, mut rx) = pipeline(backend.clone(), PipelineSettings::default());

    let started = tokio::time::Instant::now();
    let outcome = p
        .start(ana_ruiz(), &prompts(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    for step in StepId::ALL {
        assert_eq!(
            outcome.session.results.get(step),
            Some(format!("OUT-{}", step.number()).as_str())
        );
    }
    assert_eq!(backend.steps_called(), vec![1, 2, 3, 4, 5, 6]);
    // five pauses between six steps
    assert!(started.elapsed() >= Duration::from_secs(15));

    let stored = store.load_session(&outcome.session.id).await.unwrap().unwrap();
    assert_eq!(stored, outcome.session);

    let doc = report::document_blocks(&stored, report::DEFAULT_FIRM_NAME).unwrap();
    let text: String = doc.iter().map(|b| b.text()).collect::<Vec<_>>().join("\n");
    assert!(text.contains("OUT-5"));
    assert!(text.contains("OUT-6"));
    for k in 1..=4 {
        assert!(!text.contains(&format!("OUT-{k}")), "OUT-{k} leaked into the document");
    }

    let events = drain(&mut rx);
    assert_eq!(events.len(), 13);
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));
}

#[tokio::test]
async fn progress_events_follow_step_order() {
    let backend = StubBackend::new(Behaviour::Succeed);
    let (p, _store, mut rx) = pipeline(backend, no_delay());
    let outcome = p
        .start(ana_ruiz(), &prompts(), &CancellationToken::new())
        .await
        .unwrap();
    let id = outcome.session.id.clone();

    let events = drain(&mut rx);
    let mut expected = Vec::new();
    for step in StepId::ALL {
        expected.push(PipelineEvent::StepStarted {
            session_id: id.clone(),
            step,
        });
        expected.push(PipelineEvent::StepCompleted {
            session_id: id.clone(),
            step,
        });
    }
    expected.push(PipelineEvent::Finished { session_id: id.clone() });
    assert_eq!(events, expected);

    let (history, live) = p.stream_manager.subscribe(&id).await;
    assert!(live.is_none(), "stream must be closed after the run");
    assert_eq!(history.len(), 14);
    assert!(history[0].contains("Evaluating plaintiff case..."));
    assert_eq!(history[13], r#"{"type":"stream_end"}"#);
}

#[tokio::test]
async fn invalid_intake_is_rejected_before_any_call() {
    let backend = StubBackend::new(Behaviour::Succeed);
    let (p, _store, _rx) = pipeline(backend.clone(), no_delay());
    let mut intake = ana_ruiz();
    intake.narrative = String::new();

    let err = p
        .start(intake, &prompts(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidIntake(_)));
    assert_eq!(backend.calls(), 0);
}

// ── resume ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resume_after_three_steps_calls_model_three_times() {
    let backend = StubBackend::new(Behaviour::Succeed);
    let (p, store, _rx) = pipeline(backend.clone(), no_delay());
    let seeded = seeded_session(&store, 3).await;

    let outcome = p
        .resume(&seeded.id, &prompts(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(backend.calls(), 3);
    assert_eq!(backend.steps_called(), vec![4, 5, 6]);
    assert!(outcome.session.results.is_complete());

    // step 4 builds on the stored step 2 and 3 outputs
    let first = backend.prompts.lock().unwrap()[0].clone();
    assert!(first.contains("OUT-2") && first.contains("OUT-3"));
}

#[tokio::test]
async fn resume_of_complete_session_does_nothing() {
    let backend = StubBackend::new(Behaviour::Succeed);
    let (p, store, _rx) = pipeline(backend.clone(), no_delay());
    let seeded = seeded_session(&store, 6).await;

    let outcome = p
        .resume(&seeded.id, &prompts(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(backend.calls(), 0);
    assert_eq!(outcome.session, seeded);
}

#[tokio::test]
async fn resume_unknown_session_fails() {
    let backend = StubBackend::new(Behaviour::Succeed);
    let (p, _store, _rx) = pipeline(backend, no_delay());
    let err = p
        .resume("missing", &prompts(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SessionNotFound(id) if id == "missing"));
}

// ── failure ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failure_at_step_n_persists_exactly_earlier_steps() {
    for n in 1..=6 {
        let backend = StubBackend::new(Behaviour::FailAt(n));
        let (p, store, mut rx) = pipeline(backend.clone(), no_delay());
        let session = Session::new(ana_ruiz());
        let id = session.id.clone();
        store.save_session(&session).await.unwrap();

        let err = p
            .run(session, &prompts(), &CancellationToken::new())
            .await
            .unwrap_err();
        let failed_step = StepId::from_number(n).unwrap();
        assert!(
            matches!(err, PipelineError::GenerationFailed { step, source: ServiceError::Status { status: 500, .. } } if step == failed_step)
        );
        assert_eq!(err.step(), Some(failed_step));
        // no retry and nothing after the failure
        assert_eq!(backend.calls(), n);

        let stored = store.load_session(&id).await.unwrap().unwrap();
        assert_eq!(stored.results.len(), n - 1, "failure at step {n}");
        assert_eq!(stored.results.next_pending(), Some(failed_step));
        assert_eq!(stored.failed_step, Some(failed_step));

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(PipelineEvent::Failed { step, .. }) if *step == failed_step));
    }
}

#[tokio::test(start_paused = true)]
async fn hung_model_call_times_out() {
    let backend = StubBackend::new(Behaviour::Hang);
    let settings = PipelineSettings {
        step_delay: Duration::ZERO,
        model_timeout: Duration::from_secs(5),
    };
    let (p, store, _rx) = pipeline(backend, settings);
    let session = Session::new(ana_ruiz());
    let id = session.id.clone();

    let err = p
        .run(session, &prompts(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::GenerationFailed {
            step: StepId::PlaintiffOpen,
            source: ServiceError::Timeout { secs: 5 },
        }
    ));
    let stored = store.load_session(&id).await.unwrap().unwrap();
    assert!(stored.results.is_empty());
    assert_eq!(stored.failed_step, Some(StepId::PlaintiffOpen));
}

#[tokio::test]
async fn failed_session_is_never_resumed() {
    let backend = StubBackend::new(Behaviour::FailAt(3));
    let (p, store, mut rx) = pipeline(backend.clone(), no_delay());
    let session = Session::new(ana_ruiz());
    let id = session.id.clone();
    store.save_session(&session).await.unwrap();

    p.run(session, &prompts(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(backend.calls(), 3);
    drain(&mut rx);

    let err = p
        .resume(&id, &prompts(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::AlreadyFailed {
            step: StepId::DefenseOpen
        }
    ));
    assert_eq!(err.step(), Some(StepId::DefenseOpen));
    assert_eq!(backend.calls(), 3);
    assert!(drain(&mut rx).is_empty());

    let stored = store.load_session(&id).await.unwrap().unwrap();
    assert_eq!(stored.results.len(), 2);
}

// ── cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_between_steps_keeps_completed_work() {
    for n in 1..=5 {
        let cancel = CancellationToken::new();
        let backend = StubBackend::new(Behaviour::CancelAfter(n, cancel.clone()));
        let (p, store, mut rx) = pipeline(backend.clone(), no_delay());

        let outcome = p.start(ana_ruiz(), &prompts(), &cancel).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.session.results.len(), n);
        assert_eq!(backend.calls(), n);
        let stored = store.load_session(&outcome.session.id).await.unwrap().unwrap();
        assert_eq!(stored.results.len(), n);

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Cancelled { completed, .. }) if *completed == n
        ));
    }
}

#[tokio::test]
async fn cancel_before_start_runs_nothing() {
    let backend = StubBackend::new(Behaviour::Succeed);
    let (p, store, _rx) = pipeline(backend.clone(), no_delay());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = p.start(ana_ruiz(), &prompts(), &cancel).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(outcome.session.results.is_empty());
    assert_eq!(backend.calls(), 0);
    // the fresh session itself is still stored for a later resume
    assert!(store.load_session(&outcome.session.id).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_delay_stops_without_waiting() {
    let backend = StubBackend::new(Behaviour::Succeed);
    let settings = PipelineSettings {
        step_delay: Duration::from_secs(60),
        model_timeout: Duration::from_secs(30),
    };
    let (p, store, mut rx) = pipeline(backend.clone(), settings);
    let p = Arc::new(p);
    let session = Session::new(ana_ruiz());
    store.save_session(&session).await.unwrap();

    let cancel = CancellationToken::new();
    let started = tokio::time::Instant::now();
    let run = {
        let p = Arc::clone(&p);
        let cancel = cancel.clone();
        tokio::spawn(async move { p.run(session, &prompts(), &cancel).await })
    };

    loop {
        match rx.recv().await.unwrap() {
            PipelineEvent::StepCompleted {
                step: StepId::PlaintiffDraft,
                ..
            } => break,
            _ => continue,
        }
    }
    cancel.cancel();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.session.results.len(), 2);
    assert_eq!(backend.calls(), 2);
    // one full delay after step 1, the second one cut short
    assert!(started.elapsed() < Duration::from_secs(120));
}
