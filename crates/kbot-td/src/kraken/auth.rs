//! Kraken private REST request signing.
//!
//! `API-Sign = base64(HMAC-SHA512(base64_decode(secret), uri_path + SHA256(nonce + post_data)))`
//!
//! The nonce must be strictly increasing per API key; the gateway uses the
//! current time in milliseconds.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::error::OrderError;

type HmacSha512 = Hmac<Sha512>;

/// Compute the `API-Sign` header value.
///
/// Fails only if `secret_b64` is not valid base64.
pub fn sign_request(secret_b64: &str, uri_path: &str, nonce: &str, post_data: &str) -> Result<String, OrderError> {
    let secret = STANDARD
        .decode(secret_b64.trim())
        .map_err(|e| OrderError::Auth(format!("API secret is not valid base64: {e}")))?;

    let mut sha = Sha256::new();
    sha.update(nonce.as_bytes());
    sha.update(post_data.as_bytes());
    let digest = sha.finalize();

    let mut mac = HmacSha512::new_from_slice(&secret).expect("HMAC accepts any key length");
    mac.update(uri_path.as_bytes());
    mac.update(&digest);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// URL-encode `params` as a form body, in the given order.
pub fn encode_form(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
