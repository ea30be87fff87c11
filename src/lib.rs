//! WolfDrive - Storage Gateway
//!
//! A session-authenticated HTTP gateway in front of a hierarchical remote
//! file store. Clients log in once, receive an opaque token, and then list
//! folders, create folders, upload and download through the gateway without
//! ever holding the storage credentials themselves.
//!
//! # Architecture
//!
//! Every request resolves its token to stored credentials and opens a fresh
//! backend session; no session is pooled or cached. Nodes are addressed by
//! opaque ids and found by walking the account's tree from the root.
//!
//! # Features
//!
//! - Token broker with expiry, logout and background sweeping
//! - Pluggable storage backends (local filesystem, in-memory)
//! - Depth-first node lookup over a lazily fetched tree
//! - Streaming downloads with per-chunk idle timeouts
//! - Disk-staged uploads with guaranteed temp-file cleanup
//! - Fail-open upload placement (unknown parents fall back to the root)

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod listing;
pub mod locator;
pub mod transfer;

pub use config::WolfDriveConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::{MemorySessionStore, SessionStore, TokenBroker};
    pub use crate::backend::{
        Credentials, Node, NodeGraph, NodeKind, SessionFactory, StorageBackend, StorageSession,
    };
    pub use crate::config::WolfDriveConfig;
    pub use crate::error::{Error, Result};
    pub use crate::listing::{project, Listing};
    pub use crate::locator::locate;
}
