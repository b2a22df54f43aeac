// Platform storage collaborator: persisted users, files, and sessions.
//
// The relay consults this store for side effects only; it never reads
// membership or registry state back out of it. Backed by PostgreSQL when
// `PAIRLAB_RELAY_DATABASE_URL` is configured, and by an in-memory table
// for local development and tests.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("file {0} does not exist")]
    UnknownFile(i64),
}

/// A user row as the relay sees it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub(crate) struct UserRecord {
    pub(crate) id: i64,
    pub(crate) username: String,
    pub(crate) online: bool,
    pub(crate) last_seen_at: Option<DateTime<Utc>>,
}

/// A file row under a collaborative session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FileRecord {
    pub(crate) id: i64,
    pub(crate) session_id: i64,
    pub(crate) name: String,
    pub(crate) content: String,
    pub(crate) language: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    users: HashMap<i64, UserRecord>,
    files: HashMap<i64, FileRecord>,
    next_file_id: i64,
    content_updates: Vec<(i64, String)>,
    ended_sessions: Vec<i64>,
    presence_calls: Vec<(i64, bool)>,
}

/// Storage consulted by the dispatcher after a broadcast. Fire-and-forget
/// from the relay's perspective: failures are logged by callers, never
/// retried, and never retract an already-sent broadcast.
#[derive(Clone)]
pub(crate) enum PlatformStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryState>>),
}

impl PlatformStore {
    pub(crate) fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryState::default())))
    }

    pub(crate) async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("failed to connect to the platform database")?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .context("platform database health check failed")?;

        Ok(Self::Postgres(pool))
    }

    pub(crate) async fn update_file_content(
        &self,
        file_id: i64,
        content: &str,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => {
                let result =
                    sqlx::query("UPDATE files SET content = $2, updated_at = NOW() WHERE id = $1")
                        .bind(file_id)
                        .bind(content)
                        .execute(pool)
                        .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::UnknownFile(file_id));
                }
                Ok(())
            }
            Self::Memory(state) => {
                let mut guard = state.write().await;
                guard.content_updates.push((file_id, content.to_string()));
                match guard.files.get_mut(&file_id) {
                    Some(file) => {
                        file.content = content.to_string();
                        Ok(())
                    }
                    None => Err(StoreError::UnknownFile(file_id)),
                }
            }
        }
    }

    /// Persist a new file under a session, returning its id.
    pub(crate) async fn create_file(
        &self,
        session_id: i64,
        name: &str,
        content: &str,
        language: Option<&str>,
    ) -> Result<i64, StoreError> {
        match self {
            Self::Postgres(pool) => {
                let file_id = sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO files (session_id, name, content, language)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id
                    "#,
                )
                .bind(session_id)
                .bind(name)
                .bind(content)
                .bind(language)
                .fetch_one(pool)
                .await?;

                Ok(file_id)
            }
            Self::Memory(state) => {
                let mut guard = state.write().await;
                guard.next_file_id += 1;
                let file_id = guard.next_file_id;
                guard.files.insert(
                    file_id,
                    FileRecord {
                        id: file_id,
                        session_id,
                        name: name.to_string(),
                        content: content.to_string(),
                        language: language.map(str::to_string),
                    },
                );
                Ok(file_id)
            }
        }
    }

    /// Mark a session ended. An unknown or already-ended session id is a
    /// no-op at the storage level; the relay's lifecycle reconciler is
    /// responsible for calling this at most once per session.
    pub(crate) async fn end_session(&self, session_id: i64) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query(
                    "UPDATE sessions SET active = FALSE, ended_at = NOW() \
                     WHERE id = $1 AND ended_at IS NULL",
                )
                .bind(session_id)
                .execute(pool)
                .await?;
                Ok(())
            }
            Self::Memory(state) => {
                state.write().await.ended_sessions.push(session_id);
                Ok(())
            }
        }
    }

    /// Flip a participant's presence flag. Unknown participants are a
    /// no-op.
    pub(crate) async fn set_user_online(
        &self,
        participant_id: i64,
        online: bool,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("UPDATE users SET online = $2, last_seen_at = NOW() WHERE id = $1")
                    .bind(participant_id)
                    .bind(online)
                    .execute(pool)
                    .await?;
                Ok(())
            }
            Self::Memory(state) => {
                let mut guard = state.write().await;
                guard.presence_calls.push((participant_id, online));
                if let Some(user) = guard.users.get_mut(&participant_id) {
                    user.online = online;
                    user.last_seen_at = Some(Utc::now());
                }
                Ok(())
            }
        }
    }

    pub(crate) async fn get_user(
        &self,
        participant_id: i64,
    ) -> Result<Option<UserRecord>, StoreError> {
        match self {
            Self::Postgres(pool) => {
                let user = sqlx::query_as::<_, UserRecord>(
                    "SELECT id, username, online, last_seen_at FROM users WHERE id = $1",
                )
                .bind(participant_id)
                .fetch_optional(pool)
                .await?;
                Ok(user)
            }
            Self::Memory(state) => Ok(state.read().await.users.get(&participant_id).cloned()),
        }
    }
}

#[cfg(test)]
impl PlatformStore {
    pub(crate) async fn seed_user(&self, id: i64, username: &str) {
        if let Self::Memory(state) = self {
            state.write().await.users.insert(
                id,
                UserRecord { id, username: username.to_string(), online: false, last_seen_at: None },
            );
        }
    }

    pub(crate) async fn seed_file(&self, id: i64, session_id: i64, name: &str, content: &str) {
        if let Self::Memory(state) = self {
            let mut guard = state.write().await;
            guard.next_file_id = guard.next_file_id.max(id);
            guard.files.insert(
                id,
                FileRecord {
                    id,
                    session_id,
                    name: name.to_string(),
                    content: content.to_string(),
                    language: None,
                },
            );
        }
    }

    pub(crate) async fn file(&self, id: i64) -> Option<FileRecord> {
        match self {
            Self::Memory(state) => state.read().await.files.get(&id).cloned(),
            Self::Postgres(_) => None,
        }
    }

    pub(crate) async fn content_updates(&self) -> Vec<(i64, String)> {
        match self {
            Self::Memory(state) => state.read().await.content_updates.clone(),
            Self::Postgres(_) => Vec::new(),
        }
    }

    pub(crate) async fn ended_sessions(&self) -> Vec<i64> {
        match self {
            Self::Memory(state) => state.read().await.ended_sessions.clone(),
            Self::Postgres(_) => Vec::new(),
        }
    }

    pub(crate) async fn presence_calls(&self) -> Vec<(i64, bool)> {
        match self {
            Self::Memory(state) => state.read().await.presence_calls.clone(),
            Self::Postgres(_) => Vec::new(),
        }
    }
}
