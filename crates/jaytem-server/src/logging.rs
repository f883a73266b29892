use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use serde_json::{Map, Value};
use tokio::sync::broadcast;

const RING_CAPACITY: usize = 500;

/// Recent log lines plus a live feed, shared between the tracing layer and
/// the admin log stream.
#[derive(Clone)]
pub struct LogFeed {
    pub tx: broadcast::Sender<String>,
    pub ring: Arc<Mutex<VecDeque<String>>>,
}

impl Default for LogFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(RING_CAPACITY))),
        }
    }

    pub fn layer(&self) -> BroadcastLayer {
        BroadcastLayer {
            feed: self.clone(),
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn publish(&self, line: String) {
        let _ = self.tx.send(line.clone());
        if let Ok(mut ring) = self.ring.lock() {
            ring.push_back(line);
            if ring.len() > RING_CAPACITY {
                ring.pop_front();
            }
        }
    }
}

pub struct BroadcastLayer {
    feed: LogFeed,
}

/// Collects the event message and its structured fields.
#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().into(), value.into());
        }
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().into(), value.into());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().into(), value.into());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().into(), value.into());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let mut text = format!("{value:?}");
        // Debug on &str adds quotes
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            text = text[1..text.len() - 1].to_string();
        }
        if field.name() == "message" {
            self.message = text;
        } else {
            self.fields.insert(field.name().into(), text.into());
        }
    }
}

fn category(target: &str) -> &'static str {
    if target.contains("pipeline") {
        "pipeline"
    } else if target.contains("agent") || target.contains("chat") {
        "agent"
    } else {
        "system"
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for BroadcastLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "err",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG => "debug",
            tracing::Level::TRACE => return,
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let ts = chrono::Utc::now().timestamp();
        let mut line = serde_json::json!({
            "ts": ts,
            "level": level,
            "message": visitor.message,
            "category": category(event.metadata().target()),
        });
        if !visitor.fields.is_empty() {
            line["fields"] = Value::Object(visitor.fields);
        }

        self.feed.publish(line.to_string());
    }
}
