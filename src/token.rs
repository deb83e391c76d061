//! Navigation token carried in the URL across stage transitions.
//!
//! The token only provides continuity between pages. It is not checked
//! locally and grants nothing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

const MAX_TOKEN_LEN: usize = 32;

/// Derive a fresh URL-safe token from a timestamp.
pub fn navigation_token(at: DateTime<Utc>) -> String {
    let stamp = format!("{}{:09}", at.timestamp(), at.timestamp_subsec_nanos());
    URL_SAFE_NO_PAD
        .encode(stamp)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_TOKEN_LEN)
        .collect()
}
