//! HTTP API Module
//!
//! Provides the REST API the web client talks to.

mod error;
mod http;

pub use error::{ApiError, ApiResult, ErrorResponse, TextError};
pub use http::{create_router, AppState, HttpServer};
