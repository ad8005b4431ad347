use crate::models::PkceChallenge;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const METHOD_S256: &str = "S256";

/// base64url(sha256(verifier)), no padding
pub fn s256_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Only `S256` is actually checked. Any other method, including none at
/// all, passes: clients that never sent a challenge still have to work.
/// That also lets a stored challenge through when its method was blank or
/// mistyped, so that case gets logged.
pub fn verify(code_challenge: Option<&str>, method: Option<&str>, code_verifier: &str) -> bool {
    match method {
        Some(METHOD_S256) => {
            let expected = s256_challenge(code_verifier);
            let stored = code_challenge.unwrap_or_default();
            expected.as_bytes().ct_eq(stored.as_bytes()).into()
        }
        other => {
            if code_challenge.is_some_and(|c| !c.is_empty()) {
                tracing::warn!(
                    "code challenge stored with unsupported method {:?}, skipping PKCE check",
                    other
                );
            }
            true
        }
    }
}

impl PkceChallenge {
    #[cfg(test)]
    pub fn s256(code_verifier: &str) -> Self {
        Self {
            code_challenge: Some(s256_challenge(code_verifier)),
            code_challenge_method: Some(METHOD_S256.to_string()),
        }
    }

    pub fn verify(&self, code_verifier: &str) -> bool {
        verify(
            self.code_challenge.as_deref(),
            self.code_challenge_method.as_deref(),
            code_verifier,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            s256_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_s256_accepts_matching_verifier_only() {
        let pkce = PkceChallenge::s256("my-verifier");
        assert!(pkce.verify("my-verifier"));
        assert!(!pkce.verify("my-verifieR"));
        assert!(!pkce.verify(""));
    }

    #[test]
    fn test_s256_without_stored_challenge_fails() {
        assert!(!verify(None, Some(METHOD_S256), "anything"));
    }

    #[test]
    fn test_missing_method_accepts_anything() {
        let pkce = PkceChallenge::default();
        assert!(pkce.verify(""));
        assert!(pkce.verify("whatever"));
    }

    #[test]
    fn test_unknown_method_is_permissive_even_with_challenge() {
        let challenge = s256_challenge("v");
        assert!(verify(Some(&challenge), Some("plain"), "not-v"));
        assert!(verify(Some(&challenge), Some(""), "not-v"));
        // method comparison is exact
        assert!(verify(Some(&challenge), Some("s256"), "not-v"));
    }
}
