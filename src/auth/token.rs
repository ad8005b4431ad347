use super::error::AuthError;
use super::types::{Claims, IdentityProjection, SentinelClaims};
use crate::models::Client;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use std::collections::BTreeMap;

/// Mints HS256 tokens signed with the client's own secret, so a token is
/// only ever valid for the client it was issued to.
#[derive(Debug, Clone)]
pub struct JwtTokenMinter {
    issuer: String,
    audience: String,
}

impl JwtTokenMinter {
    pub fn new(issuer: String, audience: String) -> Self {
        Self { issuer, audience }
    }

    pub fn mint_access_token(
        &self,
        client: &Client,
        identity: &IdentityProjection,
        scopes: &[String],
        auth_time: i64,
        ttl_seconds: i64,
    ) -> Result<String, AuthError> {
        let mut claims = self.claims(
            client,
            identity,
            self.audience.clone(),
            auth_time,
            ttl_seconds,
        );
        claims.scopes = Some(scopes.to_vec());
        sign(client, &claims)
    }

    /// ID tokens are addressed to the client itself.
    pub fn mint_id_token(
        &self,
        client: &Client,
        identity: &IdentityProjection,
        auth_time: i64,
        ttl_seconds: i64,
    ) -> Result<String, AuthError> {
        let claims = self.claims(client, identity, client.id.clone(), auth_time, ttl_seconds);
        sign(client, &claims)
    }

    /// access + id token sharing one subject and clock reading
    pub fn mint_pair(
        &self,
        client: &Client,
        identity: &IdentityProjection,
        scopes: &[String],
        auth_time: i64,
        ttl_seconds: i64,
    ) -> Result<(String, String), AuthError> {
        let access_token =
            self.mint_access_token(client, identity, scopes, auth_time, ttl_seconds)?;
        let id_token = self.mint_id_token(client, identity, auth_time, ttl_seconds)?;
        Ok((access_token, id_token))
    }

    fn claims(
        &self,
        client: &Client,
        identity: &IdentityProjection,
        audience: String,
        auth_time: i64,
        ttl_seconds: i64,
    ) -> Claims {
        let mut identities = BTreeMap::new();
        identities.insert(
            identity.provider_option_id.clone(),
            vec![identity.provider_sub.clone()],
        );

        Claims {
            iss: self.issuer.clone(),
            sub: identity.user_id.clone(),
            aud: audience,
            iat: auth_time,
            exp: auth_time.saturating_add(ttl_seconds),
            kid: client.id.clone(),
            auth_time,
            scopes: None,
            sentinel: SentinelClaims {
                identities,
                attributes: identity.attributes.clone(),
                sign_in_provider: identity.provider_option_id.clone(),
            },
        }
    }
}

fn sign(client: &Client, claims: &Claims) -> Result<String, AuthError> {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(client.id.clone());

    encode(
        &header,
        claims,
        &EncodingKey::from_secret(client.secret.as_bytes()),
    )
    .map_err(AuthError::Signing)
}

#[derive(Debug, Clone)]
pub struct JwtTokenVerifier {
    validation: Validation,
}

impl JwtTokenVerifier {
    pub fn new(issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // HMAC family only. anything else (RS*, ES*, "none") is rejected
        // before the signature is even looked at
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        // access and id tokens carry different audiences
        validation.validate_aud = false;
        validation.validate_exp = true;

        Self { validation }
    }

    /// Only accepts tokens addressed to `audience`, which rules out ID
    /// tokens (those carry the client id as `aud`).
    pub fn for_access_tokens(issuer: &str, audience: &str) -> Self {
        let mut verifier = Self::new(issuer);
        verifier.validation.validate_aud = true;
        verifier.validation.set_audience(&[audience]);
        verifier
    }

    pub fn verify(&self, client: &Client, token: &str) -> Result<Claims, AuthError> {
        let key = DecodingKey::from_secret(client.secret.as_bytes());
        decode::<Claims>(token, &key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(client_id = %client.id, "token verification failed: {}", e);
                AuthError::VerificationFailed
            })
    }

    /// Reads the unverified `kid` header so the caller knows whose secret to
    /// verify with. Never trust anything else from an unverified header.
    pub fn key_id(token: &str) -> Result<String, AuthError> {
        decode_header(token)
            .ok()
            .and_then(|header| header.kid)
            .ok_or(AuthError::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JsonDictionary;
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::Utc;

    const ISSUER: &str = "sentinel-test";

    fn client(secret: &str) -> Client {
        Client::new("app".to_string(), secret.to_string(), vec![])
    }

    fn identity() -> IdentityProjection {
        let mut attributes = JsonDictionary::new();
        attributes.insert("plan".to_string(), serde_json::json!("pro"));
        IdentityProjection {
            user_id: "user_123".to_string(),
            provider_option_id: "email".to_string(),
            provider_sub: "a@b.com".to_string(),
            attributes,
        }
    }

    fn minter() -> JwtTokenMinter {
        JwtTokenMinter::new(ISSUER.to_string(), "sentinel".to_string())
    }

    #[test]
    fn test_access_token_round_trip() {
        let client = client("s3cret");
        let now = Utc::now().timestamp();
        let token = minter()
            .mint_access_token(&client, &identity(), &["profile".to_string()], now, 3600)
            .unwrap();

        assert_eq!(token.split('.').count(), 3);

        let claims = JwtTokenVerifier::new(ISSUER).verify(&client, &token).unwrap();
        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.kid, client.id);
        assert_eq!(claims.aud, "sentinel");
        assert_eq!(claims.auth_time, now);
        assert_eq!(claims.scopes, Some(vec!["profile".to_string()]));
        assert_eq!(claims.sentinel.sign_in_provider, "email");
        assert_eq!(
            claims.sentinel.identities.get("email"),
            Some(&vec!["a@b.com".to_string()])
        );
        assert_eq!(claims.sentinel.attributes["plan"], "pro");
    }

    #[test]
    fn test_id_token_is_addressed_to_client() {
        let client = client("s3cret");
        let now = Utc::now().timestamp();
        let token = minter()
            .mint_id_token(&client, &identity(), now, 3600)
            .unwrap();

        let claims = JwtTokenVerifier::new(ISSUER).verify(&client, &token).unwrap();
        assert_eq!(claims.aud, client.id);
        assert!(claims.scopes.is_none());
    }

    #[test]
    fn test_claims_are_deterministic() {
        let client = client("s3cret");
        let a = minter()
            .mint_id_token(&client, &identity(), 1_700_000_000, 60)
            .unwrap();
        let b = minter()
            .mint_id_token(&client, &identity(), 1_700_000_000, 60)
            .unwrap();
        // same claims + same key -> same MAC
        assert_eq!(a, b);
    }

    #[test]
    fn test_other_clients_secret_fails() {
        let issuer = client("secret-one");
        let other = client("secret-two");
        let token = minter()
            .mint_access_token(&issuer, &identity(), &[], Utc::now().timestamp(), 3600)
            .unwrap();

        assert!(matches!(
            JwtTokenVerifier::new(ISSUER).verify(&other, &token),
            Err(AuthError::VerificationFailed)
        ));
    }

    #[test]
    fn test_expired_token_fails() {
        let client = client("s3cret");
        let long_ago = Utc::now().timestamp() - 7200;
        let token = minter()
            .mint_access_token(&client, &identity(), &[], long_ago, 3600)
            .unwrap();

        assert!(JwtTokenVerifier::new(ISSUER).verify(&client, &token).is_err());
    }

    #[test]
    fn test_wrong_issuer_fails() {
        let client = client("s3cret");
        let token = JwtTokenMinter::new("someone-else".to_string(), "sentinel".to_string())
            .mint_access_token(&client, &identity(), &[], Utc::now().timestamp(), 3600)
            .unwrap();

        assert!(JwtTokenVerifier::new(ISSUER).verify(&client, &token).is_err());
    }

    #[test]
    fn test_alg_none_is_rejected() {
        let client = client("s3cret");
        let token = minter()
            .mint_access_token(&client, &identity(), &[], Utc::now().timestamp(), 3600)
            .unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let forged = format!("{}.{}.", header, payload);

        assert!(JwtTokenVerifier::new(ISSUER).verify(&client, &forged).is_err());
    }

    #[test]
    fn test_garbage_fails() {
        let client = client("s3cret");
        let verifier = JwtTokenVerifier::new(ISSUER);
        assert!(verifier.verify(&client, "").is_err());
        assert!(verifier.verify(&client, "a.b.c").is_err());
    }

    #[test]
    fn test_access_verifier_refuses_id_tokens() {
        let client = client("s3cret");
        let now = Utc::now().timestamp();
        let (access, id) = minter()
            .mint_pair(&client, &identity(), &["profile".to_string()], now, 3600)
            .unwrap();

        let verifier = JwtTokenVerifier::for_access_tokens(ISSUER, "sentinel");
        assert!(verifier.verify(&client, &access).is_ok());
        assert!(matches!(
            verifier.verify(&client, &id),
            Err(AuthError::VerificationFailed)
        ));
    }

    #[test]
    fn test_key_id_reads_header() {
        let client = client("s3cret");
        let token = minter()
            .mint_id_token(&client, &identity(), Utc::now().timestamp(), 60)
            .unwrap();
        assert_eq!(JwtTokenVerifier::key_id(&token).unwrap(), client.id);
        assert!(JwtTokenVerifier::key_id("nope").is_err());
    }
}
