//! Opaque signed tracking tokens.
//!
//! A token is `base64url(payload_json) . base64url(hmac_sha256(payload))`.
//! The payload carries campaign, owner and a one-way hash of the address,
//! so a leaked token identifies the send without exposing the recipient.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Hex chars kept from the address hash. 128 bits is plenty to correlate
/// a tracking hit back to one recipient row.
const HASH_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPayload {
    /// Campaign id.
    pub c: String,
    /// Truncated hex sha256 of the lowercased recipient address.
    pub e: String,
    /// Owner id.
    pub u: String,
    /// Random nonce, so two tokens for the same recipient never collide.
    pub n: String,
    /// Mint time, unix seconds.
    pub t: i64,
}

/// One-way correlation hash of an address. Also stored on the recipient
/// row at creation so tracking hits can be joined back without the token
/// ever containing the address.
pub fn hash_email(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    let mut hex = String::with_capacity(HASH_LEN);
    for byte in digest.iter() {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
        if hex.len() >= HASH_LEN {
            break;
        }
    }
    hex
}

pub fn mint(key: &[u8], campaign_id: &str, email: &str, owner_id: &str) -> String {
    let payload = TokenPayload {
        c: campaign_id.to_string(),
        e: hash_email(email),
        u: owner_id.to_string(),
        n: format!("{:016x}", rand::rng().random::<u64>()),
        t: chrono::Utc::now().timestamp(),
    };
    // Serializing a struct of strings and an i64 cannot fail.
    let body = serde_json::to_vec(&payload).unwrap_or_default();
    let encoded = URL_SAFE_NO_PAD.encode(&body);

    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(encoded.as_bytes());
    let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{encoded}.{tag}")
}

/// Verify a token and recover its payload.
///
/// Tracking is best-effort: a malformed token, missing separator or tag
/// mismatch is `None`, never an error. Tag comparison happens inside
/// `Mac::verify_slice`, which is constant-time.
pub fn verify(key: &[u8], token: &str) -> Option<TokenPayload> {
    let (encoded, tag_part) = token.split_once('.')?;
    let tag = URL_SAFE_NO_PAD.decode(tag_part).ok()?;

    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(encoded.as_bytes());
    mac.verify_slice(&tag).ok()?;

    let body = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    serde_json::from_slice(&body).ok()
}
