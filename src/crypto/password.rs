use argon2::Argon2;
use crate::error::AppError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; 32] {
    rand::thread_rng().gen()
}

/// Hash a secret with Argon2id using the provided salt
pub fn hash_password(password: &str, salt: &[u8]) -> Result<[u8; 32], AppError> {
    let argon2 = Argon2::default();
    let mut hash = [0u8; 32];

    argon2
        .hash_password_into(password.as_bytes(), salt, &mut hash)
        .map_err(|e| AppError::Crypto(format!("Password hashing failed: {}", e)))?;

    Ok(hash)
}

/// Verify a secret against a stored hash and salt
pub fn verify_password(password: &str, stored_hash: &[u8; 32], salt: &[u8]) -> Result<bool, AppError> {
    let computed_hash = hash_password(password, salt)?;
    Ok(computed_hash == *stored_hash)
}

/// A salted digest kept inside a user record, base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "Salt")]
    pub salt: String,
}

impl Digest {
    pub fn new(secret: &str) -> Result<Self, AppError> {
        let salt = generate_salt();
        let hash = hash_password(secret, &salt)?;
        Ok(Digest {
            hash: base64_simd::STANDARD.encode_to_string(hash),
            salt: base64_simd::STANDARD.encode_to_string(salt),
        })
    }

    pub fn verify(&self, secret: &str) -> Result<bool, AppError> {
        let salt = base64_simd::STANDARD
            .decode_to_vec(&self.salt)
            .map_err(|e| AppError::Crypto(format!("Invalid stored salt: {}", e)))?;
        let hash: [u8; 32] = base64_simd::STANDARD
            .decode_to_vec(&self.hash)
            .map_err(|e| AppError::Crypto(format!("Invalid stored hash: {}", e)))?
            .try_into()
            .map_err(|_| AppError::Crypto("Invalid stored hash length".to_string()))?;
        verify_password(secret, &hash, &salt)
    }
}

/// Security answers are compared trimmed and case-insensitively.
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verify() {
        let password = "test_password_123";
        let salt = generate_salt();

        let hash = hash_password(password, &salt).unwrap();
        assert!(verify_password(password, &hash, &salt).unwrap());
        assert!(!verify_password("wrong_password", &hash, &salt).unwrap());
    }

    #[test]
    fn digest_round_trips_through_base64() {
        let digest = Digest::new("hunter22").unwrap();
        assert!(digest.verify("hunter22").unwrap());
        assert!(!digest.verify("hunter23").unwrap());

        let corrupt = Digest { hash: "not base64!".into(), salt: digest.salt.clone() };
        assert!(corrupt.verify("hunter22").is_err());
    }
}
