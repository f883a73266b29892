use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
};
use chrono::Utc;
use jaytem_core::{
    config::Config,
    credentials::hash_password,
    store::{normalize_email, CredentialStore},
    CredentialRecord, UserRole,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;

pub const SESSION_COOKIE: &str = "jt_session";
pub const DEV_PASSWORD_HEADER: &str = "x-dev-password";

/// Contents of a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Normalized email.
    pub sub: String,
    pub org: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

// ── Session tokens ───────────────────────────────────────────────────────

/// HS256 signing keys plus the cookie attributes derived from config.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
    secure: bool,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl_hours: i64, secure: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_hours,
            secure,
        }
    }

    pub fn issue(&self, user: &CredentialRecord) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.email.clone(),
            org: user.organization.clone(),
            role: user.role,
            iat: now,
            exp: now + self.ttl_hours * 3600,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Signature and expiry check. Any failure is just "not logged in".
    pub fn verify(&self, token: &str) -> Option<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .ok()
            .map(|data| data.claims)
    }

    pub fn cookie(&self, token: &str) -> String {
        self.cookie_with(token, self.ttl_hours * 3600)
    }

    pub fn clear_cookie(&self) -> String {
        self.cookie_with("", 0)
    }

    fn cookie_with(&self, value: &str, max_age: i64) -> String {
        let mut cookie =
            format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

pub fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// Bearer header first, then the session cookie.
fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if bearer.is_some() {
        return bearer;
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

// ── Extractors ───────────────────────────────────────────────────────────

/// Any logged-in user.
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        token_from_headers(&parts.headers)
            .and_then(|token| state.keys.verify(token))
            .map(AuthUser)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

pub struct AdminUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if claims.role != UserRole::Admin {
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(AdminUser(claims))
    }
}

/// Access to raw step outputs. Disabled entirely when no dev password is set.
pub struct DevAccess;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for DevAccess {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.config.dev_output_password.as_str();
        if expected.is_empty() {
            return Err(StatusCode::NOT_FOUND);
        }
        let provided = parts
            .headers
            .get(DEV_PASSWORD_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(DevAccess)
    }
}

// ── Bootstrap ────────────────────────────────────────────────────────────

/// Create the configured admin account if it does not exist yet.
pub async fn bootstrap_admin(config: &Config, users: &dyn CredentialStore) -> anyhow::Result<()> {
    if config.bootstrap_admin_email.is_empty() || config.bootstrap_admin_password.is_empty() {
        return Ok(());
    }
    if users.get_user(&config.bootstrap_admin_email).await?.is_some() {
        return Ok(());
    }
    let record = CredentialRecord {
        email: normalize_email(&config.bootstrap_admin_email),
        organization: config.firm_name.clone(),
        role: UserRole::Admin,
        password_hash: hash_password(&config.bootstrap_admin_password)?,
        created_at: Utc::now(),
    };
    if users.insert_user(&record).await? {
        info!("bootstrap admin account created");
    }
    Ok(())
}
