//! In-memory storage backend
//!
//! Keeps one node graph per account inside the process. Used by the test
//! suite and for demos; everything is lost on restart. Fault injection hooks
//! let tests exercise mid-transfer failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    validate_name, ByteStream, Credentials, Node, NodeGraph, ProgressCallback, StorageBackend,
    StorageSession, TransferProgress, UploadRequest,
};
use crate::error::{Error, Result};

/// Size of the chunks a download stream yields
const CHUNK_SIZE: usize = 64 * 1024;

struct MemoryNode {
    node: Node,
    children: Vec<String>,
    content: Bytes,
}

/// One account's node graph
struct MemoryTree {
    root_id: String,
    nodes: HashMap<String, MemoryNode>,
}

impl MemoryTree {
    fn new() -> Self {
        let root = Node::directory(new_handle(), "Cloud Drive", now());
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id.clone(),
            MemoryNode {
                node: root,
                children: Vec::new(),
                content: Bytes::new(),
            },
        );
        Self { root_id, nodes }
    }

    fn root(&self) -> Node {
        self.nodes[&self.root_id].node.clone()
    }

    fn directory_mut(&mut self, id: &str) -> Result<&mut MemoryNode> {
        match self.nodes.get_mut(id) {
            Some(entry) if entry.node.is_directory() => Ok(entry),
            Some(_) => Err(Error::NotAFolder(id.to_string())),
            None => Err(Error::Backend(format!("node {} no longer exists", id))),
        }
    }

    fn insert(&mut self, parent_id: &str, node: Node, content: Bytes) -> Result<Node> {
        self.directory_mut(parent_id)?.children.push(node.id.clone());
        self.nodes.insert(
            node.id.clone(),
            MemoryNode {
                node: node.clone(),
                children: Vec::new(),
                content,
            },
        );
        Ok(node)
    }
}

struct Account {
    password: String,
    tree: Arc<Mutex<MemoryTree>>,
}

/// Injected failures
#[derive(Default)]
struct Faults {
    /// File id -> number of bytes served before the stream errors
    download_fail_after: HashMap<String, usize>,
    /// Message every upload is rejected with
    reject_uploads: Option<String>,
}

/// In-process storage backend.
#[derive(Default)]
pub struct MemoryBackend {
    accounts: RwLock<HashMap<String, Account>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with an empty drive
    pub fn add_account(&self, email: &str, password: &str) {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                tree: Arc::new(Mutex::new(MemoryTree::new())),
            },
        );
    }

    /// Drop an account; sessions already open keep working
    pub fn remove_account(&self, email: &str) -> bool {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.remove(email).is_some()
    }

    /// Root node of an account's drive
    pub fn root(&self, email: &str) -> Result<Node> {
        let tree = self.tree(email)?;
        let tree = tree.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tree.root())
    }

    /// Create a folder directly, bypassing a session
    pub fn insert_folder(&self, email: &str, parent_id: &str, name: &str) -> Result<Node> {
        validate_name(name)?;
        let tree = self.tree(email)?;
        let mut tree = tree.lock().unwrap_or_else(|e| e.into_inner());
        tree.insert(parent_id, Node::directory(new_handle(), name, now()), Bytes::new())
    }

    /// Create a file directly, bypassing a session
    pub fn insert_file(
        &self,
        email: &str,
        parent_id: &str,
        name: &str,
        content: impl Into<Bytes>,
    ) -> Result<Node> {
        validate_name(name)?;
        let content = content.into();
        let tree = self.tree(email)?;
        let mut tree = tree.lock().unwrap_or_else(|e| e.into_inner());
        let node = Node::file(new_handle(), name, content.len() as u64, now());
        tree.insert(parent_id, node, content)
    }

    /// Stored content of a file node
    pub fn content(&self, email: &str, file_id: &str) -> Option<Bytes> {
        let tree = self.tree(email).ok()?;
        let tree = tree.lock().unwrap_or_else(|e| e.into_inner());
        tree.nodes
            .get(file_id)
            .filter(|entry| entry.node.is_file())
            .map(|entry| entry.content.clone())
    }

    /// Make downloads of `file_id` fail after `bytes` bytes have been served
    pub fn fail_download_after(&self, file_id: &str, bytes: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.download_fail_after.insert(file_id.to_string(), bytes);
    }

    /// Make every upload fail with `message`
    pub fn reject_uploads(&self, message: &str) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.reject_uploads = Some(message.to_string());
    }

    fn tree(&self, email: &str) -> Result<Arc<Mutex<MemoryTree>>> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(email)
            .map(|account| Arc::clone(&account.tree))
            .ok_or_else(|| Error::Backend(format!("unknown account {}", email)))
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, credentials: &Credentials) -> Result<Box<dyn StorageSession>> {
        let tree = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            match accounts.get(&credentials.identity) {
                Some(account) if account.password == credentials.secret => Arc::clone(&account.tree),
                _ => return Err(Error::InvalidCredentials),
            }
        };

        let root = tree.lock().unwrap_or_else(|e| e.into_inner()).root();
        Ok(Box::new(MemorySession {
            root,
            tree,
            faults: Arc::clone(&self.faults),
        }))
    }
}

/// Session over one account's in-memory tree
struct MemorySession {
    root: Node,
    tree: Arc<Mutex<MemoryTree>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemorySession {
    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NodeGraph for MemorySession {
    async fn children(&self, dir: &Node) -> Result<Vec<Node>> {
        let tree = self.lock();
        let entry = tree
            .nodes
            .get(&dir.id)
            .ok_or_else(|| Error::Backend(format!("node {} no longer exists", dir.id)))?;
        Ok(entry
            .children
            .iter()
            .filter_map(|id| tree.nodes.get(id))
            .map(|child| child.node.clone())
            .collect())
    }
}

#[async_trait]
impl StorageSession for MemorySession {
    fn root(&self) -> &Node {
        &self.root
    }

    async fn mkdir(&self, parent: &Node, name: &str) -> Result<Node> {
        validate_name(name)?;
        let mut tree = self.lock();
        tree.insert(&parent.id, Node::directory(new_handle(), name, now()), Bytes::new())
    }

    async fn download(&self, file: &Node) -> Result<ByteStream> {
        let content = {
            let tree = self.lock();
            match tree.nodes.get(&file.id) {
                Some(entry) if entry.node.is_file() => entry.content.clone(),
                Some(_) => return Err(Error::NotAFile(file.id.clone())),
                None => return Err(Error::Backend(format!("node {} no longer exists", file.id))),
            }
        };

        let fail_after = {
            let faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
            faults.download_fail_after.get(&file.id).copied()
        };

        let mut chunks: Vec<Result<Bytes>> = Vec::new();
        let served = match fail_after {
            Some(limit) => content.slice(..limit.min(content.len())),
            None => content.clone(),
        };
        let mut offset = 0;
        while offset < served.len() {
            let end = (offset + CHUNK_SIZE).min(served.len());
            chunks.push(Ok(served.slice(offset..end)));
            offset = end;
        }
        if fail_after.is_some() {
            chunks.push(Err(Error::Backend("download stream interrupted".to_string())));
            // Anything after the error must never reach the client
            chunks.push(Ok(Bytes::from_static(b"<after-error>")));
        }

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn upload(
        &self,
        parent: &Node,
        request: UploadRequest,
        data: Bytes,
        mut progress: ProgressCallback,
    ) -> Result<Node> {
        validate_name(&request.name)?;

        if let Some(message) = self
            .faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reject_uploads
            .clone()
        {
            return Err(Error::Backend(message));
        }

        if data.len() as u64 != request.size {
            return Err(Error::Backend(format!(
                "declared size {} does not match {} bytes received",
                request.size,
                data.len()
            )));
        }

        let mut done = 0u64;
        for chunk in data.chunks(CHUNK_SIZE) {
            done += chunk.len() as u64;
            progress(&TransferProgress::new(done, request.size, &request.name));
        }

        let node = Node::file(new_handle(), &request.name, request.size, now());
        let mut tree = self.lock();
        tree.insert(&parent.id, node, data)
    }
}

fn new_handle() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
