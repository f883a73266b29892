use async_trait::async_trait;

/// Failure talking to the remote text-generation service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("model service returned HTTP {status} ({body_len} byte body)")]
    Status { status: u16, body_len: usize },
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model request timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Sends one prompt to a model and returns the generated text.
///
/// Implementations make exactly one request per call and never retry.
/// Prompt and result text must not be logged or persisted by the backend.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}
