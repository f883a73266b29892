use chrono::Utc;
use jaytem_core::{
    credentials::{hash_password, verify_password, CredentialError},
    store::{CredentialStore, MemoryStore, PromptStore, SessionStore},
    stream::SessionStreamManager,
    ClientIntake, CredentialRecord, PromptSet, Session, UserRole, UserSummary, UserUpdate,
};

fn record(email: &str) -> CredentialRecord {
    CredentialRecord {
        email: email.into(),
        organization: "Firm".into(),
        role: UserRole::User,
        password_hash: "hash".into(),
        created_at: Utc::now(),
    }
}

// ── sessions & prompts ──────────────────────────────────────────────────────

#[tokio::test]
async fn session_save_overwrites_and_delete_reports_presence() {
    let store = MemoryStore::new();
    let mut s = Session::new(ClientIntake {
        client_type: Default::default(),
        first_name: "Ana".into(),
        last_name: "Ruiz".into(),
        email: String::new(),
        phone: String::new(),
        primary_language: "Spanish".into(),
        secondary_language: None,
        narrative: "story".into(),
    });
    store.save_session(&s).await.unwrap();
    s.results
        .record(jaytem_core::StepId::PlaintiffOpen, "OUT-1".into())
        .unwrap();
    store.save_session(&s).await.unwrap();

    let loaded = store.load_session(&s.id).await.unwrap().unwrap();
    assert_eq!(loaded.results.len(), 1);

    assert!(store.delete_session(&s.id).await.unwrap());
    assert!(!store.delete_session(&s.id).await.unwrap());
    assert!(store.load_session(&s.id).await.unwrap().is_none());
}

#[tokio::test]
async fn prompt_set_round_trip_and_clear() {
    let store = MemoryStore::new();
    assert!(store.load_prompts().await.unwrap().is_none());
    let set = PromptSet {
        plaintiff_persona: "p".into(),
        ..Default::default()
    };
    store.save_prompts(&set).await.unwrap();
    assert_eq!(store.load_prompts().await.unwrap(), Some(set));
    store.clear_prompts().await.unwrap();
    assert!(store.load_prompts().await.unwrap().is_none());
}

// ── users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn emails_are_case_insensitive() {
    let store = MemoryStore::new();
    assert!(store.insert_user(&record("Lawyer@Firm.com ")).await.unwrap());
    assert!(!store.insert_user(&record("lawyer@firm.com")).await.unwrap());

    let u = store.get_user("LAWYER@firm.COM").await.unwrap().unwrap();
    assert_eq!(u.email, "lawyer@firm.com");
}

#[tokio::test]
async fn update_and_delete_users() {
    let store = MemoryStore::new();
    store.insert_user(&record("b@firm.com")).await.unwrap();
    store.insert_user(&record("a@firm.com")).await.unwrap();

    let changed = store
        .update_user(
            "b@firm.com",
            &UserUpdate {
                role: Some(UserRole::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(changed);
    assert!(!store
        .update_user("nobody@firm.com", &UserUpdate::default())
        .await
        .unwrap());

    let users = store.list_users().await.unwrap();
    let emails: Vec<_> = users.iter().map(|u| u.email.as_str()).collect();
    assert_eq!(emails, vec!["a@firm.com", "b@firm.com"]);
    assert_eq!(users[1].role, UserRole::Admin);
    assert_eq!(users[1].organization, "Firm");

    assert!(store.delete_user("A@firm.com").await.unwrap());
    assert!(!store.delete_user("a@firm.com").await.unwrap());
}

#[test]
fn user_summary_omits_secret() {
    let json = serde_json::to_value(UserSummary::from(&record("x@firm.com"))).unwrap();
    assert_eq!(json["role"], "user");
    assert!(json.get("password_hash").is_none());
}

// ── credentials ─────────────────────────────────────────────────────────────

#[test]
fn password_hash_verifies_only_the_right_password() {
    let hash = hash_password("correct horse").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(!hash.contains("correct horse"));
    assert!(verify_password("correct horse", &hash));
    assert!(!verify_password("wrong horse", &hash));
    assert!(!verify_password("correct horse", "not-a-phc-string"));
}

#[test]
fn short_passwords_are_rejected() {
    assert!(matches!(hash_password("short"), Err(CredentialError::TooShort)));
}

// ── progress streams ────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_replays_history_then_tails() {
    let m = SessionStreamManager::new();
    m.push_line("s1", "ignored before start".into()).await;
    m.start("s1").await;
    m.push_line("s1", "one".into()).await;

    let (history, rx) = m.subscribe("s1").await;
    assert_eq!(history, vec!["one".to_string()]);
    let mut rx = rx.unwrap();

    m.push_line("s1", "two".into()).await;
    m.end_session("s1").await;
    assert_eq!(rx.recv().await.unwrap(), "two");
    assert_eq!(rx.recv().await.unwrap(), r#"{"type":"stream_end"}"#);

    let (history, rx) = m.subscribe("s1").await;
    assert_eq!(history.len(), 3);
    assert!(rx.is_none());

    m.remove("s1").await;
    let (history, rx) = m.subscribe("s1").await;
    assert!(history.is_empty() && rx.is_none());
}

#[tokio::test]
async fn start_keeps_live_stream_and_resets_ended_one() {
    let m = SessionStreamManager::new();
    m.start("s1").await;
    let (_, rx) = m.subscribe("s1").await;
    let mut rx = rx.unwrap();

    m.start("s1").await;
    m.push_line("s1", "still attached".into()).await;
    assert_eq!(rx.recv().await.unwrap(), "still attached");

    m.end_session("s1").await;
    m.start("s1").await;
    let (history, rx) = m.subscribe("s1").await;
    assert!(history.is_empty());
    assert!(rx.is_some());
}

#[tokio::test(start_paused = true)]
async fn ended_streams_are_evicted_after_max_age() {
    let m = SessionStreamManager::new();
    m.start("old").await;
    m.end_session("old").await;
    m.start("live").await;

    tokio::time::advance(std::time::Duration::from_secs(2 * 3600)).await;
    m.start("fresh").await;
    m.end_session("fresh").await;

    let max_age = std::time::Duration::from_secs(3600);
    assert_eq!(m.evict_ended(max_age).await, 1);
    let (history, _) = m.subscribe("old").await;
    assert!(history.is_empty());
    assert!(m.subscribe("live").await.1.is_some());
    assert_eq!(m.subscribe("fresh").await.0.len(), 1);
    assert_eq!(m.evict_ended(max_age).await, 0);
}
