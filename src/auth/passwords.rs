//! Password hashing with bcrypt

use anyhow::{Context, Result};

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// Returns false for malformed hashes instead of erroring.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
