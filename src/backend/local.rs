//! Local filesystem storage backend
//!
//! Every configured account owns one directory under the backend root. Node
//! ids are derived from the path relative to that directory, so they stay
//! stable across requests without any index on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::{
    validate_name, ByteStream, Credentials, Node, NodeGraph, ProgressCallback, StorageBackend,
    StorageSession, TransferProgress, UploadRequest,
};
use crate::config::AccountConfig;
use crate::error::{Error, Result};

/// Size of each write while storing an upload
const WRITE_CHUNK: usize = 1024 * 1024;

/// Prefix of in-progress upload files; hidden from listings
const PARTIAL_PREFIX: &str = ".wolfdrive-part-";

/// Filesystem-backed storage.
pub struct LocalBackend {
    root: PathBuf,
    /// Lower-cased email -> (email as configured, password)
    accounts: HashMap<String, (String, String)>,
}

impl LocalBackend {
    /// Create a backend rooted at `root` that accepts `accounts`
    pub fn new(root: &Path, accounts: &[AccountConfig]) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let accounts = accounts
            .iter()
            .map(|a| {
                (
                    a.email.to_lowercase(),
                    (a.email.clone(), a.password.clone()),
                )
            })
            .collect();

        Ok(Self {
            root: root.to_path_buf(),
            accounts,
        })
    }

    /// Directory holding an account's drive, named by the sha256 of the
    /// lower-cased email so distinct accounts never share one
    pub fn account_dir(&self, email: &str) -> PathBuf {
        let digest = Sha256::digest(email.to_lowercase().as_bytes());
        self.root.join(hex::encode(digest))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn open(&self, credentials: &Credentials) -> Result<Box<dyn StorageSession>> {
        let email = match self.accounts.get(&credentials.identity.to_lowercase()) {
            Some((email, password)) if *password == credentials.secret => email.clone(),
            _ => return Err(Error::InvalidCredentials),
        };

        let base = self.account_dir(&email);
        tokio::fs::create_dir_all(&base).await?;
        let metadata = tokio::fs::metadata(&base).await?;

        let root = Node::directory(node_id(Path::new("")), "Cloud Drive", created_secs(&metadata));
        let mut paths = HashMap::new();
        paths.insert(root.id.clone(), PathBuf::new());

        Ok(Box::new(LocalSession {
            base,
            root,
            paths: Mutex::new(paths),
        }))
    }
}

/// Session over one account directory.
///
/// `paths` maps ids to relative paths for nodes this session has already
/// seen; it starts with the root and grows as directories are listed.
struct LocalSession {
    base: PathBuf,
    root: Node,
    paths: Mutex<HashMap<String, PathBuf>>,
}

impl LocalSession {
    fn relative_path(&self, node: &Node) -> Result<PathBuf> {
        let paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        paths
            .get(&node.id)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("node {} has not been resolved", node.id)))
    }

    fn remember(&self, id: &str, relative: PathBuf) {
        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        paths.insert(id.to_string(), relative);
    }
}

#[async_trait]
impl NodeGraph for LocalSession {
    async fn children(&self, dir: &Node) -> Result<Vec<Node>> {
        if !dir.is_directory() {
            return Ok(Vec::new());
        }

        let relative = self.relative_path(dir)?;
        let mut entries = tokio::fs::read_dir(self.base.join(&relative)).await?;
        let mut children = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().map(str::to_owned) else {
                tracing::warn!("Skipping non UTF-8 entry {}", entry.path().display());
                continue;
            };
            if name.starts_with(PARTIAL_PREFIX) {
                continue;
            }

            // Symlinks could point outside the account directory
            let metadata = tokio::fs::symlink_metadata(entry.path()).await?;
            let child_path = relative.join(&name);
            let id = node_id(&child_path);
            let node = if metadata.is_dir() {
                Node::directory(id, name, created_secs(&metadata))
            } else if metadata.is_file() {
                Node::file(id, name, metadata.len(), created_secs(&metadata))
            } else {
                continue;
            };

            self.remember(&node.id, child_path);
            children.push(node);
        }

        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }
}

#[async_trait]
impl StorageSession for LocalSession {
    fn root(&self) -> &Node {
        &self.root
    }

    async fn mkdir(&self, parent: &Node, name: &str) -> Result<Node> {
        validate_name(name)?;
        let relative = self.relative_path(parent)?.join(name);

        tokio::fs::create_dir(self.base.join(&relative))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    Error::Backend(format!("\"{}\" already exists", name))
                }
                _ => Error::Io(e),
            })?;

        let metadata = tokio::fs::metadata(self.base.join(&relative)).await?;
        let node = Node::directory(node_id(&relative), name, created_secs(&metadata));
        self.remember(&node.id, relative);
        Ok(node)
    }

    async fn download(&self, file: &Node) -> Result<ByteStream> {
        if !file.is_file() {
            return Err(Error::NotAFile(file.id.clone()));
        }

        let path = self.base.join(self.relative_path(file)?);
        let handle = tokio::fs::File::open(&path).await?;
        let stream = ReaderStream::new(handle).map(|chunk| chunk.map_err(Error::from));
        Ok(Box::pin(stream))
    }

    async fn upload(
        &self,
        parent: &Node,
        request: UploadRequest,
        data: Bytes,
        mut progress: ProgressCallback,
    ) -> Result<Node> {
        validate_name(&request.name)?;
        if data.len() as u64 != request.size {
            return Err(Error::Backend(format!(
                "declared size {} does not match {} bytes received",
                request.size,
                data.len()
            )));
        }

        let parent_path = self.relative_path(parent)?;
        let relative = parent_path.join(&request.name);
        let target = self.base.join(&relative);
        let partial = self.base.join(&parent_path).join(format!(
            "{}{}",
            PARTIAL_PREFIX,
            uuid::Uuid::new_v4().simple()
        ));

        let written = write_partial(&partial, &request, &data, &mut progress).await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        let metadata = tokio::fs::metadata(&target).await?;
        let node = Node::file(node_id(&relative), &request.name, metadata.len(), created_secs(&metadata));
        self.remember(&node.id, relative);
        Ok(node)
    }
}

async fn write_partial(
    path: &Path,
    request: &UploadRequest,
    data: &Bytes,
    progress: &mut ProgressCallback,
) -> Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut done = 0u64;
    for chunk in data.chunks(WRITE_CHUNK) {
        file.write_all(chunk).await?;
        done += chunk.len() as u64;
        progress(&TransferProgress::new(done, request.size, &request.name));
    }
    file.sync_all().await?;
    Ok(())
}

/// Stable node id for a path relative to the account directory
fn node_id(relative: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative.to_string_lossy().as_bytes());
    hex::encode(&hasher.finalize()[..12])
}

fn created_secs(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .unwrap_or(SystemTime::now())
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
