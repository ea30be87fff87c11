//! Per-request session establishment

use std::sync::Arc;
use std::time::Duration;

use super::{Credentials, StorageBackend, StorageSession};
use crate::error::{Error, Result};

/// Opens a fresh backend session for every logical operation.
///
/// Sessions are never pooled: a handle lives for exactly one request.
pub struct SessionFactory {
    backend: Arc<dyn StorageBackend>,
    connect_timeout: Option<Duration>,
}

impl SessionFactory {
    /// Create a factory over `backend`; `connect_timeout` of `None` waits forever
    pub fn new(backend: Arc<dyn StorageBackend>, connect_timeout: Option<Duration>) -> Self {
        Self {
            backend,
            connect_timeout,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Check credentials at login time.
    ///
    /// A backend rejection is reported as [`Error::InvalidCredentials`]; the
    /// session opened for the check is dropped straight away.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        self.connect(credentials).await.map(drop)
    }

    /// Open a session for an authenticated request.
    ///
    /// Any failure, including a rejection of credentials that were accepted
    /// at login, surfaces as a connection error.
    pub async fn open(&self, credentials: &Credentials) -> Result<Box<dyn StorageSession>> {
        self.connect(credentials).await.map_err(|e| match e {
            Error::InvalidCredentials => {
                Error::Connection(format!("credentials for {} rejected", credentials.identity))
            }
            Error::ConnectionTimeout(secs) => Error::ConnectionTimeout(secs),
            other => Error::Connection(other.to_string()),
        })
    }

    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn StorageSession>> {
        tracing::debug!(
            "Opening {} session for {}",
            self.backend.name(),
            credentials.identity
        );

        let session = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.open(credentials))
                .await
                .map_err(|_| {
                    tracing::warn!(
                        "Session for {} not ready after {:?}",
                        credentials.identity,
                        limit
                    );
                    Error::ConnectionTimeout(limit.as_secs())
                })??,
            None => self.backend.open(credentials).await?,
        };

        tracing::debug!("Connected to {} backend", self.backend.name());
        Ok(session)
    }
}
