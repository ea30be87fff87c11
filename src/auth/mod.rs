//! Authentication for WolfDrive
//!
//! Login issues an opaque token; every later request carries it either as a
//! bearer header or, for downloads, a `token` query parameter.

mod broker;
mod store;
mod token;

pub use broker::{IssuedToken, TokenBroker};
pub use store::{MemorySessionStore, SessionStore, StoredSession};
pub use token::{bearer_token, extract_token, generate_token};
