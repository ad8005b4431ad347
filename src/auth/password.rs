use super::error::AuthError;

/// bcrypt with a fixed work factor. The work runs on the blocking pool so a
/// burst of sign-ins doesn't stall the async workers.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_owned();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// `Ok(false)` for any mismatch, malformed hashes included. Only a failed
    /// worker thread is an error.
    pub async fn verify(&self, hash: &str, password: &str) -> Result<bool, AuthError> {
        let hash = hash.to_owned();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || match bcrypt::verify(password, &hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::debug!("bcrypt verify rejected stored hash: {}", e);
                false
            }
        })
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // lowest cost bcrypt accepts, keeps the tests quick
    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    #[tokio::test]
    async fn test_hash_is_salted_and_not_plaintext() {
        let h = hasher();
        let hash1 = h.hash("secret1").await.unwrap();
        let hash2 = h.hash("secret1").await.unwrap();

        assert!(hash1.starts_with("$2"));
        assert_ne!(hash1, "secret1");
        assert_ne!(hash1, hash2);
    }

    #[tokio::test]
    async fn test_verify_correct_and_incorrect() {
        let h = hasher();
        let hash = h.hash("secret1").await.unwrap();

        assert!(h.verify(&hash, "secret1").await.unwrap());
        assert!(!h.verify(&hash, "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_malformed_hash_is_false_not_error() {
        let h = hasher();
        assert!(!h.verify("not-a-bcrypt-hash", "secret1").await.unwrap());
        assert!(!h.verify("", "").await.unwrap());
    }
}
