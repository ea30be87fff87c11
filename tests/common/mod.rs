//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tempfile::TempDir;

use wolfdrive::api::{create_router, AppState};
use wolfdrive::auth::{MemorySessionStore, TokenBroker};
use wolfdrive::backend::{MemoryBackend, SessionFactory};
use wolfdrive::config::WolfDriveConfig;

pub const ALICE: &str = "alice@example.com";
pub const ALICE_PASSWORD: &str = "correct horse";
pub const BOB: &str = "bob@example.com";
pub const BOB_PASSWORD: &str = "hunter2";

/// A router over an in-memory backend with two accounts.
pub struct TestServer {
    pub router: Router,
    pub backend: Arc<MemoryBackend>,
    pub broker: Arc<TokenBroker>,
    pub staging: TempDir,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_ttl(None).await
    }

    pub async fn with_ttl(ttl: Option<Duration>) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_account(ALICE, ALICE_PASSWORD);
        backend.add_account(BOB, BOB_PASSWORD);

        let staging = TempDir::new().expect("staging dir");
        let mut config = WolfDriveConfig::default();
        config.staging.dir = staging.path().to_path_buf();

        let sessions = Arc::new(SessionFactory::new(backend.clone(), Some(Duration::from_secs(5))));
        let broker = Arc::new(TokenBroker::new(
            Arc::new(MemorySessionStore::new()),
            Arc::clone(&sessions),
            ttl,
        ));
        let state = Arc::new(AppState::new(&config, Arc::clone(&broker), sessions));
        let router = create_router(state, &config.server);

        Self {
            router,
            backend,
            broker,
            staging,
        }
    }

    /// Log in directly through the broker
    pub async fn token_for(&self, email: &str, password: &str) -> String {
        self.broker
            .issue(email, password)
            .await
            .expect("login")
            .token
    }

    /// Number of files left in the staging directory
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Build a multipart/form-data body; returns (content type, body)
pub fn multipart_body(file: Option<(&str, &[u8])>, folder_id: Option<&str>) -> (String, Vec<u8>) {
    let boundary = "wolfdrive-test-boundary";
    let mut body = Vec::new();

    if let Some(folder_id) = folder_id {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"folderId\"\r\n\r\n{}\r\n",
                boundary, folder_id
            )
            .as_bytes(),
        );
    }
    if let Some((name, content)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                boundary, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
}
