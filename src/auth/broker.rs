//! Token Broker
//!
//! Exchanges verified credentials for an opaque token and resolves tokens
//! back to credentials on later requests. Tokens expire after the configured
//! TTL and can be revoked early through logout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::store::{SessionStore, StoredSession};
use super::token::{extract_token, generate_token};
use crate::backend::{Credentials, SessionFactory};
use crate::error::{Error, Result};

/// A freshly issued login token
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub email: String,
}

/// Issues and resolves session tokens
pub struct TokenBroker {
    store: Arc<dyn SessionStore>,
    sessions: Arc<SessionFactory>,
    ttl: Option<Duration>,
}

impl TokenBroker {
    /// `ttl` of `None` keeps tokens until logout or restart
    pub fn new(store: Arc<dyn SessionStore>, sessions: Arc<SessionFactory>, ttl: Option<Duration>) -> Self {
        Self { store, sessions, ttl }
    }

    /// Verify credentials against the backend and issue a token.
    ///
    /// Fails with [`Error::Validation`] if either field is empty and with
    /// [`Error::InvalidCredentials`] if the backend refuses them.
    pub async fn issue(&self, identity: &str, secret: &str) -> Result<IssuedToken> {
        if identity.is_empty() || secret.is_empty() {
            return Err(Error::Validation("Email and password are required".into()));
        }

        let credentials = Credentials::new(identity, secret);
        if let Err(e) = self.sessions.authenticate(&credentials).await {
            tracing::warn!("Login failed for {}: {}", identity, e);
            return Err(Error::InvalidCredentials);
        }

        let token = generate_token();
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.store
            .insert(
                token.clone(),
                StoredSession {
                    credentials,
                    expires_at,
                },
            )
            .await;

        tracing::info!("Login successful for {}", identity);
        Ok(IssuedToken {
            token,
            email: identity.to_string(),
        })
    }

    /// Resolve the token carried by a request
    pub async fn resolve(&self, headers: &HeaderMap, query_token: Option<&str>) -> Option<Credentials> {
        match extract_token(headers, query_token) {
            Some(token) => self.resolve_token(token).await,
            None => None,
        }
    }

    /// Resolve a raw token. Expired tokens are dropped on sight.
    pub async fn resolve_token(&self, token: &str) -> Option<Credentials> {
        let session = self.store.get(token).await?;
        if session.is_expired(Instant::now()) {
            self.store.remove(token).await;
            tracing::debug!("Rejected expired token for {}", session.credentials.identity);
            return None;
        }
        Some(session.credentials)
    }

    /// Revoke the token carried by a request. Returns whether one was removed.
    pub async fn revoke(&self, headers: &HeaderMap, query_token: Option<&str>) -> bool {
        let token = match extract_token(headers, query_token) {
            Some(token) => token,
            None => return false,
        };
        let removed = self.store.remove(token).await;
        if removed {
            tracing::info!("Session revoked");
        }
        removed
    }

    /// Drop expired sessions now
    pub async fn prune_expired(&self) -> usize {
        self.store.purge_expired(Instant::now()).await
    }

    pub async fn active_sessions(&self) -> usize {
        self.store.len().await
    }

    /// Periodically purge expired sessions in the background
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = broker.prune_expired().await;
                if purged > 0 {
                    tracing::debug!("Purged {} expired sessions", purged);
                }
            }
        })
    }
}
