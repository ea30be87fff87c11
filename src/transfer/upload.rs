//! Staged uploads
//!
//! The staged file is read into memory whole, because the backend needs the
//! size up front, and handed to the backend in one upload. Placement fails
//! open: a parent that cannot be used sends the file to the root instead of
//! failing the request, and the reason is kept in the outcome.

use std::time::Duration;

use bytes::Bytes;

use super::StagedFile;
use crate::backend::{Node, NodeGraph, ProgressCallback, StorageSession, TransferProgress, UploadRequest};
use crate::error::{Error, Result};
use crate::locator::locate;

/// Why an upload was redirected to the root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No node has the requested parent id
    ParentNotFound(String),
    /// The requested parent is a file
    ParentNotAFolder(String),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::ParentNotFound(id) => write!(f, "folder {} not found", id),
            FallbackReason::ParentNotAFolder(id) => write!(f, "node {} is not a folder", id),
        }
    }
}

/// Where an upload will be placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentResolution {
    Resolved(Node),
    FallbackToRoot(FallbackReason),
}

impl ParentResolution {
    /// The folder to upload into
    pub fn target<'a>(&'a self, root: &'a Node) -> &'a Node {
        match self {
            ParentResolution::Resolved(node) => node,
            ParentResolution::FallbackToRoot(_) => root,
        }
    }
}

/// Result of a completed upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// The node the backend created
    pub node: Node,
    pub placement: ParentResolution,
}

/// Resolve the upload destination. No id, or an empty one, means the root.
pub async fn resolve_parent<G>(graph: &G, root: &Node, parent_id: Option<&str>) -> Result<ParentResolution>
where
    G: NodeGraph + ?Sized,
{
    let parent_id = match parent_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return Ok(ParentResolution::Resolved(root.clone())),
    };

    Ok(match locate(graph, root, parent_id).await? {
        Some(node) if node.is_directory() => ParentResolution::Resolved(node),
        Some(_) => ParentResolution::FallbackToRoot(FallbackReason::ParentNotAFolder(parent_id.to_string())),
        None => ParentResolution::FallbackToRoot(FallbackReason::ParentNotFound(parent_id.to_string())),
    })
}

/// Send a staged file to the backend.
///
/// The staged file is removed once the attempt is over, whatever the result.
/// `timeout` bounds the wait for the backend to acknowledge completion.
pub async fn stream_up(
    session: &dyn StorageSession,
    parent_id: Option<&str>,
    staged: StagedFile,
    timeout: Option<Duration>,
) -> Result<UploadOutcome> {
    let result = send_staged(session, parent_id, &staged, timeout).await;
    staged.discard().await;

    match &result {
        Ok(outcome) => tracing::info!(
            "File uploaded successfully: {} ({})",
            outcome.node.name,
            outcome.node.id
        ),
        Err(e) => tracing::error!("Upload error: {}", e),
    }
    result
}

async fn send_staged(
    session: &dyn StorageSession,
    parent_id: Option<&str>,
    staged: &StagedFile,
    timeout: Option<Duration>,
) -> Result<UploadOutcome> {
    let root = session.root().clone();
    let placement = resolve_parent(session, &root, parent_id).await?;
    if let ParentResolution::FallbackToRoot(reason) = &placement {
        tracing::warn!("Specified {}, uploading {} to root", reason, staged.file_name());
    }
    let parent = placement.target(&root).clone();

    let size = tokio::fs::metadata(staged.path()).await?.len();
    let data = Bytes::from(tokio::fs::read(staged.path()).await?);
    tracing::info!(
        "Uploading {} ({} bytes) into {}",
        staged.file_name(),
        size,
        parent.name
    );

    let progress: ProgressCallback = Box::new(|p: &TransferProgress| {
        tracing::debug!(
            "Upload progress for {}: {}/{} bytes ({:.1}%)",
            p.name,
            p.done,
            p.total,
            p.percent()
        );
    });
    let request = UploadRequest {
        name: staged.file_name().to_string(),
        size,
    };

    let upload = session.upload(&parent, request, data, progress);
    let node = match timeout {
        Some(limit) => tokio::time::timeout(limit, upload)
            .await
            .map_err(|_| Error::TransferTimeout(limit.as_secs()))??,
        None => upload.await?,
    };

    Ok(UploadOutcome { node, placement })
}
