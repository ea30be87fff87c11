//! Streaming downloads
//!
//! Backend chunks are forwarded to the client as they arrive; nothing is
//! buffered beyond the chunk in flight. Once the response has started its
//! status can no longer change, so a backend failure mid-stream is logged and
//! the body simply ends. The declared `Content-Length` lets the client see
//! the truncation.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::backend::{ByteStream, Node, StorageSession};
use crate::error::{Error, Result};

/// Response body stream handed to the HTTP layer
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// A file download ready to be written to the client
pub struct Download {
    pub file_name: String,
    /// Value for `Content-Length`
    pub size: u64,
    /// Value for `Content-Disposition`
    pub content_disposition: String,
    pub body: BodyStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("file_name", &self.file_name)
            .field("size", &self.size)
            .field("content_disposition", &self.content_disposition)
            .finish_non_exhaustive()
    }
}

/// Open a download of `file`.
///
/// `idle_timeout` bounds the wait for each chunk; a stall ends the body the
/// same way a backend error does.
pub async fn stream_down(
    session: &dyn StorageSession,
    file: &Node,
    idle_timeout: Option<Duration>,
) -> Result<Download> {
    if !file.is_file() {
        return Err(Error::NotAFile(file.id.clone()));
    }

    let size = file.size.unwrap_or(0);
    let inner = session.download(file).await?;
    tracing::info!("Streaming {} ({} bytes)", file.name, size);

    Ok(Download {
        file_name: file.name.clone(),
        size,
        content_disposition: content_disposition(&file.name),
        body: guard_body(inner, file.name.clone(), idle_timeout),
    })
}

struct BodyState {
    inner: ByteStream,
    name: String,
    sent: u64,
}

/// Wrap a backend stream so the first error or stall ends it cleanly
pub(crate) fn guard_body(inner: ByteStream, name: String, idle_timeout: Option<Duration>) -> BodyStream {
    let inner: ByteStream = match idle_timeout {
        Some(limit) => Box::pin(tokio_stream::StreamExt::timeout(inner, limit).map(
            move |item| match item {
                Ok(chunk) => chunk,
                Err(_) => Err(Error::TransferTimeout(limit.as_secs())),
            },
        )),
        None => inner,
    };

    let state = BodyState {
        inner,
        name,
        sent: 0,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        match state.inner.next().await {
            Some(Ok(chunk)) => {
                state.sent += chunk.len() as u64;
                Some((Ok::<Bytes, std::io::Error>(chunk), state))
            }
            Some(Err(e)) => {
                tracing::error!(
                    "Download error for {} after {} bytes: {}",
                    state.name,
                    state.sent,
                    e
                );
                None
            }
            None => {
                tracing::debug!("Download of {} complete ({} bytes)", state.name, state.sent);
                None
            }
        }
    }))
}

/// `Content-Disposition` value for an attachment named `name`.
///
/// The quoted `filename` is an ASCII fallback with quotes, backslashes and
/// control characters replaced; `filename*` carries the exact name.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let fallback = if fallback.trim().is_empty() {
        "download".to_string()
    } else {
        fallback
    };

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(name, NON_ALPHANUMERIC)
    )
}
