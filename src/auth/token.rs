//! Session token generation and extraction

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use rand::RngCore;

/// Random bytes per token
pub const TOKEN_BYTES: usize = 24;

/// Generate a fresh opaque token (hex encoded)
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Extract a bearer token from the Authorization header.
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() > 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
        .filter(|token| !token.is_empty())
}

/// Token for a request: the Authorization header wins, the `token` query
/// parameter is the fallback for plain navigations such as downloads.
pub fn extract_token<'a>(headers: &'a HeaderMap, query_token: Option<&'a str>) -> Option<&'a str> {
    bearer_token(headers).or_else(|| query_token.filter(|token| !token.is_empty()))
}
