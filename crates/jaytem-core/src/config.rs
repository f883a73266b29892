use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::{pipeline::PipelineSettings, report::DEFAULT_FIRM_NAME};

/// Full application configuration, read from the process environment with
/// a `.env` file in the working directory as fallback.
/// Secrets (API keys, JWT secret, passwords) must never be logged.
#[derive(Clone)]
pub struct Config {
    /// Empty selects the in-memory store.
    pub database_url: String,
    pub session_max_age_hours: i64,

    // Model service
    /// "azure" (default) or "openai".
    pub model_provider: String,
    pub azure_endpoint: String,
    pub azure_api_key: String,
    pub azure_deployment: String,
    pub azure_api_version: String,
    pub openai_base_url: String,
    pub openai_api_key: String,
    pub model: String,
    pub model_temperature: f32,
    pub model_max_tokens: u32,

    // Pipeline tuning
    pub step_delay_ms: u64,
    pub model_timeout_s: u64,

    // Web
    pub web_bind: String,
    pub web_port: u16,
    pub firm_name: String,

    // Auth
    /// Empty means a random per-process secret; sessions then die on restart.
    pub jwt_secret: String,
    pub auth_session_hours: i64,
    pub cookie_secure: bool,
    /// Empty disables the developer output view entirely.
    pub dev_output_password: String,
    pub bootstrap_admin_email: String,
    pub bootstrap_admin_password: String,
}

type Vars = HashMap<String, String>;

/// `KEY=VALUE` lines; blank lines and `#` comments are skipped and
/// surrounding quotes on the value are dropped.
pub fn parse_dotenv(contents: &str) -> Vars {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .or_else(|| v.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
                .unwrap_or(v);
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

fn read_dotenv(path: &Path) -> Vars {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_dotenv(&contents),
        Err(_) => HashMap::new(),
    }
}

fn get(key: &str, env: &Vars, dotenv: &Vars) -> Option<String> {
    env.get(key).or_else(|| dotenv.get(key)).cloned()
}

fn get_str(key: &str, env: &Vars, dotenv: &Vars, default: &str) -> String {
    get(key, env, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_bool(key: &str, env: &Vars, dotenv: &Vars, default: bool) -> bool {
    match get(key, env, dotenv).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        Some(_) => default,
        None => default,
    }
}

fn get_parsed<T: std::str::FromStr>(key: &str, env: &Vars, dotenv: &Vars, default: T) -> T {
    get(key, env, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let env: Vars = std::env::vars().collect();
        let dotenv = read_dotenv(Path::new(".env"));
        Self::from_vars(&env, &dotenv)
    }

    /// Build from explicit variable maps; `env` wins over `dotenv`.
    pub fn from_vars(env: &Vars, dotenv: &Vars) -> Result<Self> {
        let model_provider = get_str("MODEL_PROVIDER", env, dotenv, "azure").to_lowercase();
        if model_provider != "azure" && model_provider != "openai" {
            bail!("MODEL_PROVIDER must be \"azure\" or \"openai\", got {model_provider:?}");
        }

        Ok(Self {
            database_url: get_str("DATABASE_URL", env, dotenv, ""),
            session_max_age_hours: get_parsed("SESSION_MAX_AGE_HOURS", env, dotenv, 72),

            model_provider,
            azure_endpoint: get_str("AZURE_OPENAI_ENDPOINT", env, dotenv, "")
                .trim_end_matches('/')
                .to_string(),
            azure_api_key: get_str("AZURE_OPENAI_API_KEY", env, dotenv, ""),
            azure_deployment: get_str("AZURE_OPENAI_DEPLOYMENT_NAME", env, dotenv, ""),
            azure_api_version: get_str(
                "AZURE_OPENAI_API_VERSION",
                env,
                dotenv,
                "2024-08-01-preview",
            ),
            openai_base_url: get_str("OPENAI_BASE_URL", env, dotenv, "https://api.openai.com")
                .trim_end_matches('/')
                .to_string(),
            openai_api_key: get_str("OPENAI_API_KEY", env, dotenv, ""),
            model: get_str("MODEL", env, dotenv, "gpt-4o"),
            model_temperature: get_parsed("MODEL_TEMPERATURE", env, dotenv, 0.7),
            model_max_tokens: get_parsed("MODEL_MAX_TOKENS", env, dotenv, 4000),

            step_delay_ms: get_parsed("STEP_DELAY_MS", env, dotenv, 3000),
            model_timeout_s: get_parsed("MODEL_TIMEOUT_S", env, dotenv, 300),

            web_bind: get_str("WEB_BIND", env, dotenv, "127.0.0.1"),
            web_port: get_parsed("WEB_PORT", env, dotenv, 3131),
            firm_name: get_str("FIRM_NAME", env, dotenv, DEFAULT_FIRM_NAME),

            jwt_secret: get_str("JWT_SECRET", env, dotenv, ""),
            auth_session_hours: get_parsed("AUTH_SESSION_HOURS", env, dotenv, 8),
            cookie_secure: get_bool("COOKIE_SECURE", env, dotenv, false),
            dev_output_password: get_str("DEV_OUTPUT_PASSWORD", env, dotenv, ""),
            bootstrap_admin_email: get_str("BOOTSTRAP_ADMIN_EMAIL", env, dotenv, ""),
            bootstrap_admin_password: get_str("BOOTSTRAP_ADMIN_PASSWORD", env, dotenv, ""),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            step_delay: Duration::from_millis(self.step_delay_ms),
            model_timeout: Duration::from_secs(self.model_timeout_s.max(1)),
        }
    }

    /// Names of required model-service settings that are still empty.
    pub fn missing_model_settings(&self) -> Vec<&'static str> {
        let required: Vec<(&'static str, &str)> = if self.model_provider == "openai" {
            vec![("OPENAI_API_KEY", self.openai_api_key.as_str())]
        } else {
            vec![
                ("AZURE_OPENAI_ENDPOINT", self.azure_endpoint.as_str()),
                ("AZURE_OPENAI_API_KEY", self.azure_api_key.as_str()),
                ("AZURE_OPENAI_DEPLOYMENT_NAME", self.azure_deployment.as_str()),
            ]
        };
        required
            .into_iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| k)
            .collect()
    }
}

/// Load a specific `.env`-style file. Missing files yield an empty map.
pub fn load_dotenv_file(path: impl AsRef<Path>) -> Vars {
    read_dotenv(path.as_ref())
}
