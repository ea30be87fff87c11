//! Transfer Orchestrator
//!
//! Moves whole objects between HTTP clients and the storage backend:
//! streaming downloads and staged uploads.

mod download;
mod staging;
mod upload;

pub use download::{content_disposition, stream_down, BodyStream, Download};
pub use staging::StagedFile;
pub use upload::{resolve_parent, stream_up, FallbackReason, ParentResolution, UploadOutcome};
