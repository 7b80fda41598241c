//! Notification authentication.
//!
//! Two schemes are accepted, checked in this order:
//!
//! 1. `X-Hub-Signature-256: sha256=<hex>`: HMAC-SHA256 of the raw body keyed
//!    with the shared secret, compared in constant time.
//! 2. `X-Gitlab-Token: <secret>`: the shared secret itself.
//!
//! An empty secret disables authentication entirely.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const TOKEN_HEADER: &str = "x-gitlab-token";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Decide whether a notification may trigger an update.
///
/// `body` must be the exact bytes received; the handler keeps them for
/// downstream use.
pub fn validate(headers: &HeaderMap, body: &[u8], secret: &str) -> bool {
    if secret.is_empty() {
        return true;
    }

    if let Some(signature) = headers.get(SIGNATURE_HEADER) {
        let Ok(signature) = signature.to_str() else {
            tracing::warn!("signature header is not valid ascii");
            return false;
        };
        let valid = verify_signature(signature, body, secret);
        if !valid {
            tracing::warn!("signature mismatch");
        }
        return valid;
    }

    if let Some(token) = headers.get(TOKEN_HEADER) {
        let valid = token.as_bytes() == secret.as_bytes();
        if !valid {
            tracing::warn!("token mismatch");
        }
        return valid;
    }

    tracing::warn!("notification carries neither a signature nor a token");
    false
}

/// Check a `sha256=<hex>` header value against `body`.
pub fn verify_signature(header_value: &str, body: &[u8], secret: &str) -> bool {
    let Some(digest_hex) = header_value.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Header value a sender would attach for `body`.
pub fn sign(body: &[u8], secret: &str) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex::encode(digest(body, secret)))
}

fn digest(body: &[u8], secret: &str) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}
