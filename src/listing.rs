//! Listing Projector
//!
//! Shapes the immediate children of a directory into the listing the web
//! client renders: files and folders kept apart, backend order preserved.

use serde::Serialize;

use crate::backend::{Node, NodeGraph};
use crate::error::{Error, Result};

/// Path prefix of the download endpoint
pub const DOWNLOAD_PATH: &str = "/api/download";

/// A file row in a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub size: u64,
    pub created: i64,
    pub download_url: String,
}

/// A folder row in a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Always `null` on the wire
    pub size: Option<u64>,
    pub created: i64,
}

/// One level of a directory, split by node kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub files: Vec<FileEntry>,
    pub folders: Vec<FolderEntry>,
}

/// Download URL for a file node. Carries the id only, never credentials.
pub fn download_url(id: &str) -> String {
    format!("{}/{}", DOWNLOAD_PATH, id)
}

/// Project the immediate children of `dir`.
///
/// Fails with [`Error::NotAFolder`] if `dir` is a file. Children are fetched
/// once and not descended into.
pub async fn project<G>(graph: &G, dir: &Node) -> Result<Listing>
where
    G: NodeGraph + ?Sized,
{
    if !dir.is_directory() {
        return Err(Error::NotAFolder(dir.id.clone()));
    }

    let mut listing = Listing::default();
    for child in graph.children(dir).await? {
        if child.is_directory() {
            listing.folders.push(FolderEntry {
                name: child.name,
                id: child.id,
                kind: "folder",
                size: None,
                created: child.created,
            });
        } else {
            listing.files.push(FileEntry {
                download_url: download_url(&child.id),
                name: child.name,
                id: child.id,
                kind: "file",
                size: child.size.unwrap_or(0),
                created: child.created,
            });
        }
    }

    Ok(listing)
}
