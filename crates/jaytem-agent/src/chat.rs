use async_trait::async_trait;
use jaytem_core::agent::{ModelBackend, ServiceError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which chat-completions dialect to speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Azure OpenAI deployment: model chosen by the deployment, `api-key` header.
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
    /// OpenAI-compatible `/v1/chat/completions` with bearer auth.
    OpenAi { base_url: String, model: String },
}

/// Single-shot chat-completions client. One user message in, the first
/// choice's content out. Prompt and response text are never logged.
pub struct ChatCompletionsBackend {
    pub endpoint: Endpoint,
    api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl ChatCompletionsBackend {
    pub fn azure(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::new(
            Endpoint::Azure {
                endpoint: endpoint.into(),
                deployment: deployment.into(),
                api_version: api_version.into(),
            },
            api_key,
        )
    }

    pub fn openai(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::new(
            Endpoint::OpenAi {
                base_url: base_url.into(),
                model: model.into(),
            },
            api_key,
        )
    }

    fn new(endpoint: Endpoint, api_key: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_key: api_key.into(),
            temperature: 0.7,
            max_tokens: 4000,
            timeout_secs: 300,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn url(&self) -> String {
        match &self.endpoint {
            Endpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
            Endpoint::OpenAi { base_url, .. } => {
                format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
            }
        }
    }

    fn provider(&self) -> &'static str {
        match self.endpoint {
            Endpoint::Azure { .. } => "azure",
            Endpoint::OpenAi { .. } => "openai",
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of a response body.
pub fn extract_content(body: &str) -> Result<String, ServiceError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::MalformedResponse(format!("invalid JSON: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| ServiceError::MalformedResponse("no content in first choice".into()))
}

#[async_trait]
impl ModelBackend for ChatCompletionsBackend {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let model = match &self.endpoint {
            Endpoint::Azure { .. } => None,
            Endpoint::OpenAi { model, .. } => Some(model.as_str()),
        };
        let request_body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        info!(
            provider = self.provider(),
            prompt_len = prompt.len(),
            "calling chat completions API"
        );

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let request = client.post(self.url()).json(&request_body);
        let request = match self.endpoint {
            Endpoint::Azure { .. } => request.header("api-key", &self.api_key),
            Endpoint::OpenAi { .. } => request.bearer_auth(&self.api_key),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(timeout_secs = self.timeout_secs, "chat request timed out");
                return Err(ServiceError::Timeout {
                    secs: self.timeout_secs,
                });
            },
            Err(e) => {
                let e = e.without_url();
                warn!("chat request failed: {}", e);
                return Err(ServiceError::Transport(e.to_string()));
            },
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) if e.is_timeout() => {
                return Err(ServiceError::Timeout {
                    secs: self.timeout_secs,
                })
            },
            Err(e) => return Err(ServiceError::Transport(e.without_url().to_string())),
        };

        if !status.is_success() {
            warn!(status = %status, body_len = body.len(), "chat API returned non-success");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body_len: body.len(),
            });
        }

        let output = extract_content(&body).inspect_err(|e| {
            warn!(body_len = body.len(), "{e}");
        })?;

        info!(output_len = output.len(), "chat response received");
        Ok(output)
    }
}
