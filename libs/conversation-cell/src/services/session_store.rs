// libs/conversation-cell/src/services/session_store.rs
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::ConversationError;
use crate::session::{session_key, ConversationSession};

/// Sessions idle longer than this are forgotten.
pub const SESSION_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Durable cursor per (clinic, counterpart). Last write wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, clinic_id: Uuid, address: &str) -> Result<Option<ConversationSession>, ConversationError>;

    async fn save(&self, session: &ConversationSession) -> Result<(), ConversationError>;
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, ConversationSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Replaces a stored session as-is, e.g. to age a handoff pause in tests.
    pub async fn put(&self, session: ConversationSession) {
        self.sessions.write().await.insert(session.store_key(), session);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, clinic_id: Uuid, address: &str) -> Result<Option<ConversationSession>, ConversationError> {
        Ok(self.sessions.read().await.get(&session_key(clinic_id, address)).cloned())
    }

    async fn save(&self, session: &ConversationSession) -> Result<(), ConversationError> {
        self.sessions
            .write()
            .await
            .insert(session.store_key(), session.clone());
        Ok(())
    }
}

// ==============================================================================
// REDIS
// ==============================================================================

pub struct RedisSessionStore {
    pool: Pool,
}

impl RedisSessionStore {
    pub async fn new(config: &AppConfig) -> Result<Self, ConversationError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ConversationError::SessionStore(format!("Failed to create Redis pool: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| ConversationError::SessionStore(format!("Failed to connect to Redis: {}", e)))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        info!("Redis session store initialized successfully");

        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Connection, ConversationError> {
        self.pool
            .get()
            .await
            .map_err(|e| ConversationError::SessionStore(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, clinic_id: Uuid, address: &str) -> Result<Option<ConversationSession>, ConversationError> {
        let mut conn = self.get_connection().await?;
        let key = session_key(clinic_id, address);

        let raw: Option<String> = conn.get(&key).await.map_err(redis_error)?;
        match raw {
            Some(data) => {
                let session = serde_json::from_str(&data)
                    .map_err(|e| ConversationError::SessionStore(format!("Corrupt session {}: {}", key, e)))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &ConversationSession) -> Result<(), ConversationError> {
        let mut conn = self.get_connection().await?;
        let key = session.store_key();
        let data = serde_json::to_string(session)
            .map_err(|e| ConversationError::SessionStore(format!("Failed to serialize session: {}", e)))?;

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(data)
            .arg("EX")
            .arg(SESSION_TTL_SECONDS)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        debug!("Session {} saved in state {}", key, session.state);
        Ok(())
    }
}

fn redis_error(error: redis::RedisError) -> ConversationError {
    ConversationError::SessionStore(format!("Redis error: {}", error))
}
