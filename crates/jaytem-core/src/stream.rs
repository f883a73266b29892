use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

const MAX_HISTORY_LINES: usize = 256;

struct SessionStream {
    tx: broadcast::Sender<String>,
    history: VecDeque<String>,
    ended_at: Option<Instant>,
}

/// Per-session NDJSON progress stream.
///
/// The pipeline pushes one JSON line per progress event. Clients subscribe
/// to get history replay + live tail, so a page reload mid-run still sees
/// every step that already started.
pub struct SessionStreamManager {
    streams: Mutex<HashMap<String, SessionStream>>,
}

impl SessionStreamManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(HashMap::new()),
        })
    }

    /// Begin streaming for a session. A live stream is kept as is so early
    /// subscribers stay attached; an ended one is reset.
    pub async fn start(&self, session_id: &str) {
        let mut map = self.streams.lock().await;
        if map.get(session_id).is_some_and(|s| s.ended_at.is_none()) {
            return;
        }
        let (tx, _) = broadcast::channel(64);
        map.insert(
            session_id.to_string(),
            SessionStream {
                tx,
                history: VecDeque::new(),
                ended_at: None,
            },
        );
    }

    pub async fn push_line(&self, session_id: &str, line: String) {
        let mut map = self.streams.lock().await;
        if let Some(s) = map.get_mut(session_id) {
            let _ = s.tx.send(line.clone());
            s.history.push_back(line);
            if s.history.len() > MAX_HISTORY_LINES {
                s.history.pop_front();
            }
        }
    }

    /// Mark a stream as ended (sends stream_end, keeps history).
    pub async fn end_session(&self, session_id: &str) {
        let line = r#"{"type":"stream_end"}"#.to_string();
        let mut map = self.streams.lock().await;
        if let Some(s) = map.get_mut(session_id) {
            let _ = s.tx.send(line.clone());
            s.history.push_back(line);
            s.ended_at = Some(Instant::now());
        }
    }

    /// Drop all state for a discarded session.
    pub async fn remove(&self, session_id: &str) {
        self.streams.lock().await.remove(session_id);
    }

    /// Drop streams that ended more than `max_age` ago. Live streams are
    /// never touched. Returns how many were dropped.
    pub async fn evict_ended(&self, max_age: Duration) -> usize {
        let mut map = self.streams.lock().await;
        let before = map.len();
        map.retain(|_, s| s.ended_at.map_or(true, |at| at.elapsed() <= max_age));
        before - map.len()
    }

    /// Returns (history_snapshot, live_receiver).
    /// If the stream has ended or doesn't exist, receiver is None.
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> (Vec<String>, Option<broadcast::Receiver<String>>) {
        let map = self.streams.lock().await;
        match map.get(session_id) {
            Some(s) => {
                let history: Vec<String> = s.history.iter().cloned().collect();
                let rx = if s.ended_at.is_none() { Some(s.tx.subscribe()) } else { None };
                (history, rx)
            }
            None => (Vec::new(), None),
        }
    }
}
