use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{CredentialRecord, PromptSet, Session, UserUpdate};

/// Durable save/load of sessions by id. Saving overwrites the whole record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(&self, session: &Session) -> Result<()>;
    async fn load_session(&self, id: &str) -> Result<Option<Session>>;
    /// Returns false when no such session existed.
    async fn delete_session(&self, id: &str) -> Result<bool>;
}

/// The single named PromptSet record.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn load_prompts(&self) -> Result<Option<PromptSet>>;
    async fn save_prompts(&self, prompts: &PromptSet) -> Result<()>;
    async fn clear_prompts(&self) -> Result<()>;
}

/// User credentials keyed by case-insensitive email.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<CredentialRecord>>;
    async fn get_user(&self, email: &str) -> Result<Option<CredentialRecord>>;
    /// Returns false when a user with that email already exists.
    async fn insert_user(&self, record: &CredentialRecord) -> Result<bool>;
    /// Returns false when the user does not exist.
    async fn update_user(&self, email: &str, update: &UserUpdate) -> Result<bool>;
    /// Returns false when the user does not exist.
    async fn delete_user(&self, email: &str) -> Result<bool>;
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    prompts: RwLock<Option<PromptSet>>,
    users: RwLock<HashMap<String, CredentialRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl PromptStore for MemoryStore {
    async fn load_prompts(&self) -> Result<Option<PromptSet>> {
        Ok(self.prompts.read().await.clone())
    }

    async fn save_prompts(&self, prompts: &PromptSet) -> Result<()> {
        *self.prompts.write().await = Some(prompts.clone());
        Ok(())
    }

    async fn clear_prompts(&self) -> Result<()> {
        *self.prompts.write().await = None;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn list_users(&self) -> Result<Vec<CredentialRecord>> {
        let mut users: Vec<_> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn get_user(&self, email: &str) -> Result<Option<CredentialRecord>> {
        Ok(self.users.read().await.get(&normalize_email(email)).cloned())
    }

    async fn insert_user(&self, record: &CredentialRecord) -> Result<bool> {
        let key = normalize_email(&record.email);
        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            return Ok(false);
        }
        users.insert(
            key.clone(),
            CredentialRecord {
                email: key,
                ..record.clone()
            },
        );
        Ok(true)
    }

    async fn update_user(&self, email: &str, update: &UserUpdate) -> Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&normalize_email(email)) else {
            return Ok(false);
        };
        if let Some(org) = &update.organization {
            user.organization = org.clone();
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(hash) = &update.password_hash {
            user.password_hash = hash.clone();
        }
        Ok(true)
    }

    async fn delete_user(&self, email: &str) -> Result<bool> {
        Ok(self
            .users
            .write()
            .await
            .remove(&normalize_email(email))
            .is_some())
    }
}
