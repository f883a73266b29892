use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{ManagerConfig, Pool, RecyclingMethod, Runtime};
use postgres_types::Json;
use tokio_postgres::NoTls;

use crate::{
    store::{normalize_email, CredentialStore, PromptStore, SessionStore},
    types::{CredentialRecord, PromptSet, Session, UserRole, UserUpdate},
};

const SCHEMA_SQL: &str = include_str!("../../../schema.sql");

/// Name of the single PromptSet record.
const PROMPT_SET_NAME: &str = "default";

/// Postgres-backed persistence for sessions, prompts and credentials.
pub struct Db {
    pool: Pool,
}

// ── Row mappers ───────────────────────────────────────────────────────────

fn row_to_user(row: &tokio_postgres::Row) -> Result<CredentialRecord> {
    let role: String = row.try_get("role")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(CredentialRecord {
        email: row.try_get("email")?,
        organization: row.try_get("organization")?,
        role: UserRole::parse(&role).unwrap_or_default(),
        password_hash: row.try_get("password_hash")?,
        created_at,
    })
}

impl Db {
    pub fn open(url: &str) -> Result<Self> {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("create postgres pool")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        let client = self.pool.get().await.context("postgres connection")?;
        client
            .batch_execute(SCHEMA_SQL)
            .await
            .context("apply schema")?;
        Ok(())
    }

    /// Delete sessions untouched for longer than `max_age_hours` and return
    /// their ids.
    pub async fn expire_sessions(&self, max_age_hours: i64) -> Result<Vec<String>> {
        let client = self.pool.get().await?;
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        let rows = client
            .query(
                "DELETE FROM sessions WHERE updated_at < $1 RETURNING id",
                &[&cutoff],
            )
            .await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────

#[async_trait]
impl SessionStore for Db {
    async fn save_session(&self, session: &Session) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO sessions (id, data, updated_at) VALUES ($1, $2, now())
                 ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
                &[&session.id, &Json(session)],
            )
            .await
            .with_context(|| format!("save session {}", session.id))?;
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT data FROM sessions WHERE id = $1", &[&id])
            .await?;
        match row {
            Some(row) => {
                let Json(session): Json<Session> =
                    row.try_get(0).with_context(|| format!("decode session {id}"))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let n = client
            .execute("DELETE FROM sessions WHERE id = $1", &[&id])
            .await?;
        Ok(n > 0)
    }
}

// ── Prompts ───────────────────────────────────────────────────────────────

#[async_trait]
impl PromptStore for Db {
    async fn load_prompts(&self) -> Result<Option<PromptSet>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT data FROM prompt_sets WHERE name = $1",
                &[&PROMPT_SET_NAME],
            )
            .await?;
        match row {
            Some(row) => {
                let Json(prompts): Json<PromptSet> = row.try_get(0).context("decode prompt set")?;
                Ok(Some(prompts))
            }
            None => Ok(None),
        }
    }

    async fn save_prompts(&self, prompts: &PromptSet) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO prompt_sets (name, data, updated_at) VALUES ($1, $2, now())
                 ON CONFLICT (name) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
                &[&PROMPT_SET_NAME, &Json(prompts)],
            )
            .await
            .context("save prompt set")?;
        Ok(())
    }

    async fn clear_prompts(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM prompt_sets WHERE name = $1", &[&PROMPT_SET_NAME])
            .await?;
        Ok(())
    }
}

// ── Users ─────────────────────────────────────────────────────────────────

#[async_trait]
impl CredentialStore for Db {
    async fn list_users(&self) -> Result<Vec<CredentialRecord>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT email, organization, role, password_hash, created_at
                 FROM users ORDER BY email",
                &[],
            )
            .await?;
        rows.iter().map(row_to_user).collect()
    }

    async fn get_user(&self, email: &str) -> Result<Option<CredentialRecord>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT email, organization, role, password_hash, created_at
                 FROM users WHERE email = $1",
                &[&normalize_email(email)],
            )
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert_user(&self, record: &CredentialRecord) -> Result<bool> {
        let client = self.pool.get().await?;
        let n = client
            .execute(
                "INSERT INTO users (email, organization, role, password_hash, created_at)
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (email) DO NOTHING",
                &[
                    &normalize_email(&record.email),
                    &record.organization,
                    &record.role.as_str(),
                    &record.password_hash,
                    &record.created_at,
                ],
            )
            .await?;
        Ok(n == 1)
    }

    async fn update_user(&self, email: &str, update: &UserUpdate) -> Result<bool> {
        let client = self.pool.get().await?;
        let role = update.role.map(|r| r.as_str());
        let n = client
            .execute(
                "UPDATE users SET
                    organization = COALESCE($2, organization),
                    role = COALESCE($3, role),
                    password_hash = COALESCE($4, password_hash)
                 WHERE email = $1",
                &[
                    &normalize_email(email),
                    &update.organization,
                    &role,
                    &update.password_hash,
                ],
            )
            .await?;
        Ok(n > 0)
    }

    async fn delete_user(&self, email: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let n = client
            .execute("DELETE FROM users WHERE email = $1", &[&normalize_email(email)])
            .await?;
        Ok(n > 0)
    }
}
