//! API key generation and hashing
//!
//! Keys are `bk_` followed by 32 hex characters. Only the SHA-256 hash and a
//! short prefix are stored; the plain key is shown once at creation.

use rand::RngCore;
use sha2::{Digest, Sha256};

const KEY_PREFIX: &str = "bk_";
const DISPLAY_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    pub plain: String,
    pub prefix: String,
    pub hash: String,
}

/// Generate a new random key with its storage hash.
pub fn generate_api_key() -> GeneratedApiKey {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let body: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    let plain = format!("{}{}", KEY_PREFIX, body);

    GeneratedApiKey {
        prefix: plain.chars().take(DISPLAY_PREFIX_LEN).collect(),
        hash: hash_api_key(&plain),
        plain,
    }
}

/// SHA-256 hex digest used for lookups.
pub fn hash_api_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.trim().as_bytes()))
}
