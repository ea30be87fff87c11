//! Node Locator
//!
//! Resolves an opaque node id against a node graph that is fetched lazily
//! through a [`NodeGraph`]. There is no id index: child lists are fetched
//! fresh per request, so the search walks the tree depth-first.

use futures::future::{BoxFuture, FutureExt};

use crate::backend::{Node, NodeGraph};
use crate::error::Result;

/// Find the node with id `target_id` at or below `root`.
///
/// The root itself is checked first. Then each child is checked in backend
/// order, and directories are descended into as they are met, so the first
/// match in depth-first order wins. Returns `Ok(None)` if nothing matches.
pub async fn locate<G>(graph: &G, root: &Node, target_id: &str) -> Result<Option<Node>>
where
    G: NodeGraph + ?Sized,
{
    if root.id == target_id {
        return Ok(Some(root.clone()));
    }
    if !root.is_directory() {
        return Ok(None);
    }
    search_children(graph, root.clone(), target_id).await
}

fn search_children<'a, G>(
    graph: &'a G,
    dir: Node,
    target_id: &'a str,
) -> BoxFuture<'a, Result<Option<Node>>>
where
    G: NodeGraph + ?Sized,
{
    async move {
        for child in graph.children(&dir).await? {
            if child.id == target_id {
                return Ok(Some(child));
            }
            if child.is_directory() {
                if let Some(found) = search_children(graph, child, target_id).await? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }
    .boxed()
}
