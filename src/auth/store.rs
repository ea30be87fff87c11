//! Session storage
//!
//! Maps opaque tokens to the credentials needed to reopen a backend session.
//! Only the in-process store ships today; the trait keeps the broker
//! independent of where entries live.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::Credentials;

/// A stored login
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub credentials: Credentials,
    /// `None` means the session never expires
    pub expires_at: Option<Instant>,
}

impl StoredSession {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Token to session mapping
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, token: String, session: StoredSession);

    async fn get(&self, token: &str) -> Option<StoredSession>;

    /// Remove a token, returning whether it existed
    async fn remove(&self, token: &str) -> bool;

    /// Drop every session expired at `now`, returning how many went
    async fn purge_expired(&self, now: Instant) -> usize;

    async fn len(&self) -> usize;
}

/// In-process session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, token: String, session: StoredSession) {
        self.sessions.write().await.insert(token, session);
    }

    async fn get(&self, token: &str) -> Option<StoredSession> {
        self.sessions.read().await.get(token).cloned()
    }

    async fn remove(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    async fn purge_expired(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
