//! Storage Backend Module
//!
//! Capability interface to the remote file store. The gateway never owns the
//! node graph: every request opens a fresh [`StorageSession`] through the
//! [`SessionFactory`] and borrows the graph from it until the response is done.

mod factory;
pub mod local;
pub mod memory;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, BackendKind};
use crate::error::{Error, Result};

pub use factory::SessionFactory;
pub use local::LocalBackend;
pub use memory::MemoryBackend;

/// A boxed stream of file content chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Progress callback invoked by backends while an upload is written
pub type ProgressCallback = Box<dyn FnMut(&TransferProgress) + Send>;

/// Identity and secret used to open a backend session.
///
/// Held only by the token broker; `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Kind of a node in the storage graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
        }
    }
}

/// A vertex of the backend's hierarchical graph.
///
/// Children are not carried here; they are fetched through
/// [`NodeGraph::children`] each time they are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Opaque identifier, stable across requests for the same account
    pub id: String,
    /// Display name, not unique among siblings
    pub name: String,
    pub kind: NodeKind,
    /// Byte size for files, `None` for directories
    pub size: Option<u64>,
    /// Creation time (Unix epoch seconds)
    pub created: i64,
}

impl Node {
    /// Create a file node
    pub fn file(id: impl Into<String>, name: impl Into<String>, size: u64, created: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::File,
            size: Some(size),
            created,
        }
    }

    /// Create a directory node
    pub fn directory(id: impl Into<String>, name: impl Into<String>, created: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::Directory,
            size: None,
            created,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// Progress information for an upload in flight.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Bytes written so far
    pub done: u64,
    /// Total bytes to write
    pub total: u64,
    /// Name of the file being written
    pub name: String,
}

impl TransferProgress {
    pub fn new(done: u64, total: u64, name: impl Into<String>) -> Self {
        Self {
            done,
            total,
            name: name.into(),
        }
    }

    /// Get progress as a percentage (0.0 to 100.0).
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.done as f64 / self.total as f64) * 100.0
    }
}

/// Name and declared size of an object about to be uploaded
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub size: u64,
}

/// Directory capability: list the children of a directory node.
///
/// This is all the node locator and listing projector need, so they are
/// written against this trait rather than a full session.
#[async_trait]
pub trait NodeGraph: Send + Sync {
    /// Children of `dir` in the order the backend reports them
    async fn children(&self, dir: &Node) -> Result<Vec<Node>>;
}

/// A live, per-request handle to one account's storage.
#[async_trait]
pub trait StorageSession: NodeGraph {
    /// Root directory of the account
    fn root(&self) -> &Node;

    /// Create a directory named `name` under `parent`
    async fn mkdir(&self, parent: &Node, name: &str) -> Result<Node>;

    /// Open a content stream for a file node
    async fn download(&self, file: &Node) -> Result<ByteStream>;

    /// Write `data` as a new file under `parent`, resolving once the backend
    /// has acknowledged completion
    async fn upload(
        &self,
        parent: &Node,
        request: UploadRequest,
        data: Bytes,
        progress: ProgressCallback,
    ) -> Result<Node>;
}

/// Establishes sessions against a storage provider.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Authenticate and open a session. Rejected credentials must be reported
    /// as [`Error::InvalidCredentials`].
    async fn open(&self, credentials: &Credentials) -> Result<Box<dyn StorageSession>>;
}

/// Build the backend selected in the configuration
pub fn from_config(config: &BackendConfig) -> Result<Arc<dyn StorageBackend>> {
    match config.kind {
        BackendKind::Local => Ok(Arc::new(LocalBackend::new(&config.root, &config.accounts)?)),
        BackendKind::Memory => {
            let backend = MemoryBackend::new();
            for account in &config.accounts {
                backend.add_account(&account.email, &account.password);
            }
            Ok(Arc::new(backend))
        }
    }
}

/// Reject names that cannot be a single path component
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::Validation(format!("Invalid name: \"{}\"", name)));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(Error::Validation(format!(
            "Name must not contain path separators: \"{}\"",
            name
        )));
    }
    Ok(())
}
