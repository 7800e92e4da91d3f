//! Default credential hashing
//!
//! New student accounts are provisioned with a default credential derived
//! from the student's surname. The hash is a lowercase hex SHA-256 digest,
//! the same shape the rest of the platform stores for chosen passwords.

use sha2::{Digest, Sha256};

/// Hash the default credential for a newly provisioned student account.
///
/// The surname is lower-cased before hashing so that "DOE", "Doe" and
/// "doe" produce the same credential.
pub fn hash_default_credential(surname: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(surname.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_case_insensitive() {
        assert_eq!(hash_default_credential("DOE"), hash_default_credential("doe"));
        assert_eq!(hash_default_credential(" Doe "), hash_default_credential("doe"));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = hash_default_credential("doe");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // Known digest of "doe"
        assert_eq!(
            hash,
            "799ef92a11af918e3fb741df42934f3b568ed2d93ac1df74f1b8d41a27932a6f"
        );
    }
}
