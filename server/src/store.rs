//! Document store for users, prediction history, chats and analyses
//!
//! Handlers only see the [`Store`] trait. [`MemoryStore`] keeps everything
//! in process and is what the server runs with.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::analysis::SkinAnalysis;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Password,
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string; absent for Google accounts
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub profile_picture: Option<String>,
    pub auth_provider: AuthProvider,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// A saved prediction with the image it was made on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub prediction: String,
    pub confidence: f64,
    pub image_base64: String,
    pub image_mime: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_email: String,
    pub title: String,
    /// Stored as sent by the client
    pub messages: Vec<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub image_path: PathBuf,
    pub analysis: SkinAnalysis,
    pub saved_manually: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, email: &str) -> StoreResult<Option<User>>;

    /// Fails with `Duplicate` when the email is taken
    async fn insert_user(&self, user: User) -> StoreResult<()>;

    /// Replace the user with the same email
    async fn update_user(&self, user: User) -> StoreResult<()>;

    async fn insert_prediction(&self, record: PredictionRecord) -> StoreResult<()>;

    /// Newest first
    async fn recent_predictions(&self, email: &str, limit: usize)
        -> StoreResult<Vec<PredictionRecord>>;

    async fn insert_chat(&self, chat: ChatSession) -> StoreResult<()>;

    /// Returns false when no chat with that id belongs to `email`
    async fn update_chat(
        &self,
        email: &str,
        id: Uuid,
        title: String,
        messages: Vec<serde_json::Value>,
    ) -> StoreResult<bool>;

    async fn find_chat(&self, email: &str, id: Uuid) -> StoreResult<Option<ChatSession>>;

    /// Newest first
    async fn list_chats(&self, email: &str) -> StoreResult<Vec<ChatSession>>;

    /// Returns the number of chats removed
    async fn delete_chats(&self, email: &str, ids: &[Uuid]) -> StoreResult<usize>;

    async fn insert_analysis(&self, record: AnalysisRecord) -> StoreResult<()>;

    /// Newest first
    async fn recent_analyses(&self, email: &str, limit: usize)
        -> StoreResult<Vec<AnalysisRecord>>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    predictions: Vec<PredictionRecord>,
    chats: Vec<ChatSession>,
    analyses: Vec<AnalysisRecord>,
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Records of `email`, newest first; later inserts win timestamp ties
fn newest_first<'a, T: Clone + 'a>(
    records: impl DoubleEndedIterator<Item = &'a T>,
    owned_by: impl Fn(&T) -> bool,
    created: impl Fn(&T) -> DateTime<Utc>,
    limit: usize,
) -> Vec<T> {
    let mut matching: Vec<T> = records.rev().filter(|r| owned_by(*r)).cloned().collect();
    matching.sort_by_key(|r| std::cmp::Reverse(created(r)));
    matching.truncate(limit);
    matching
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(email).cloned())
    }

    async fn insert_user(&self, user: User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.email) {
            return Err(StoreError::Duplicate(user.email));
        }
        tables.users.insert(user.email.clone(), user);
        Ok(())
    }

    async fn update_user(&self, user: User) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .users
            .insert(user.email.clone(), user);
        Ok(())
    }

    async fn insert_prediction(&self, record: PredictionRecord) -> StoreResult<()> {
        self.tables.write().await.predictions.push(record);
        Ok(())
    }

    async fn recent_predictions(
        &self,
        email: &str,
        limit: usize,
    ) -> StoreResult<Vec<PredictionRecord>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.predictions.iter(),
            |r| r.user_email == email,
            |r| r.created_at,
            limit,
        ))
    }

    async fn insert_chat(&self, chat: ChatSession) -> StoreResult<()> {
        self.tables.write().await.chats.push(chat);
        Ok(())
    }

    async fn update_chat(
        &self,
        email: &str,
        id: Uuid,
        title: String,
        messages: Vec<serde_json::Value>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables
            .chats
            .iter_mut()
            .find(|c| c.id == id && c.user_email == email)
        {
            Some(chat) => {
                chat.title = title;
                chat.messages = messages;
                chat.timestamp = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_chat(&self, email: &str, id: Uuid) -> StoreResult<Option<ChatSession>> {
        let tables = self.tables.read().await;
        Ok(tables
            .chats
            .iter()
            .find(|c| c.id == id && c.user_email == email)
            .cloned())
    }

    async fn list_chats(&self, email: &str) -> StoreResult<Vec<ChatSession>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.chats.iter(),
            |c| c.user_email == email,
            |c| c.timestamp,
            usize::MAX,
        ))
    }

    async fn delete_chats(&self, email: &str, ids: &[Uuid]) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;
        let before = tables.chats.len();
        tables
            .chats
            .retain(|c| !(c.user_email == email && ids.contains(&c.id)));
        Ok(before - tables.chats.len())
    }

    async fn insert_analysis(&self, record: AnalysisRecord) -> StoreResult<()> {
        self.tables.write().await.analyses.push(record);
        Ok(())
    }

    async fn recent_analyses(
        &self,
        email: &str,
        limit: usize,
    ) -> StoreResult<Vec<AnalysisRecord>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.analyses.iter(),
            |r| r.user_email == email,
            |r| r.created_at,
            limit,
        ))
    }
}
