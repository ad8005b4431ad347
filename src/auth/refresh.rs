use super::AuthConfig;
use super::error::AuthError;
use super::secret::generate_secret;
use super::token::JwtTokenMinter;
use super::types::{IdentityProjection, TokenResponse};
use crate::models::{Identity, PkceChallenge, RefreshToken};
use crate::store::AuthStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const REFRESH_TOKEN_PREFIX: &str = "RT_";

/// Long-lived refresh tokens. They are never rotated: a refresh call mints a
/// new access/ID pair and hands back nothing else.
#[derive(Clone)]
pub struct RefreshTokenManager {
    store: Arc<dyn AuthStore>,
    minter: JwtTokenMinter,
    config: AuthConfig,
}

impl RefreshTokenManager {
    pub fn new(store: Arc<dyn AuthStore>, minter: JwtTokenMinter, config: AuthConfig) -> Self {
        Self {
            store,
            minter,
            config,
        }
    }

    pub async fn issue(
        &self,
        identity: &Identity,
        pkce: PkceChallenge,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, AuthError> {
        let token = RefreshToken::new(
            format!("{}{}", REFRESH_TOKEN_PREFIX, generate_secret()),
            identity,
            pkce,
            now,
            self.config.refresh_token_lifetime(),
        );
        self.store.insert_refresh_token(token.clone()).await?;

        tracing::debug!(
            client_id = %token.client_id,
            user_id = %token.user_id,
            "refresh token issued"
        );

        Ok(token)
    }

    pub async fn refresh(
        &self,
        client_id: &str,
        token: &str,
        code_verifier: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, AuthError> {
        let stored = self
            .store
            .find_refresh_token(token)
            .await?
            .filter(|rt| rt.client_id == client_id)
            .ok_or(AuthError::InvalidToken)?;

        if !stored.is_valid(now) {
            tracing::warn!(
                client_id = %client_id,
                revoked = stored.revoked,
                "refresh attempted with a dead token"
            );
            return Err(AuthError::InvalidToken);
        }

        if !stored.pkce.verify(code_verifier) {
            tracing::warn!(client_id = %client_id, "refresh token PKCE check failed");
            return Err(AuthError::InvalidToken);
        }

        let relations = self
            .store
            .fetch_token_relations(&stored.client_id, &stored.identity_id, &stored.user_id)
            .await?;
        let subject = IdentityProjection::new(&relations.identity, &relations.user);
        let ttl = self.config.access_token_ttl_secs();

        let (access_token, id_token) = self.minter.mint_pair(
            &relations.client,
            &subject,
            &self.config.scopes,
            now.timestamp(),
            ttl,
        )?;

        Ok(TokenResponse {
            access_token,
            id_token,
            refresh_token: None,
            expires_in: ttl,
        })
    }

    /// Revokes a refresh token on behalf of its owner. Revoking twice is fine.
    pub async fn revoke(
        &self,
        client_id: &str,
        token: &str,
        user_id: &str,
    ) -> Result<(), AuthError> {
        let stored = self
            .store
            .find_refresh_token(token)
            .await?
            .filter(|rt| rt.client_id == client_id && rt.user_id == user_id)
            .ok_or(AuthError::InvalidToken)?;

        if self.store.revoke_refresh_token(&stored.id).await? == 0 {
            tracing::debug!(token_id = %stored.id, "refresh token already revoked");
        } else {
            tracing::info!(client_id = %client_id, user_id = %user_id, "refresh token revoked");
        }

        Ok(())
    }

    /// drop a token that was issued for a redemption that lost its race
    pub(crate) async fn discard(&self, token: &RefreshToken) -> Result<(), AuthError> {
        self.store.revoke_refresh_token(&token.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::JwtTokenVerifier;
    use crate::auth::pkce::s256_challenge;
    use crate::models::{
        Client, ClientProvider, EMAIL_PROVIDER, JsonDictionary, ProviderOption, User,
    };
    use crate::store::MemoryStore;
    use chrono::Duration;

    struct Fixture {
        manager: RefreshTokenManager,
        store: Arc<MemoryStore>,
        client: Client,
        identity: Identity,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let client = Client::new("C1".to_string(), "client-secret".to_string(), vec![]);
        store.insert_client(client.clone()).await.unwrap();
        store
            .upsert_provider_option(ProviderOption::email())
            .await
            .unwrap();
        let cp = ClientProvider::new(client.id.clone(), EMAIL_PROVIDER.to_string(), true);
        store.insert_client_provider(cp.clone()).await.unwrap();

        let mut metadata = JsonDictionary::new();
        metadata.insert("name".to_string(), serde_json::json!("Ada"));
        let user = User::new(client.id.clone(), "a@b.com".to_string(), metadata);
        let identity = Identity::new(&user, &cp, "a@b.com".to_string(), JsonDictionary::new());
        store
            .create_user_with_identity(user, identity.clone())
            .await
            .unwrap();

        let config = AuthConfig::default();
        let minter = JwtTokenMinter::new(config.issuer.clone(), config.audience.clone());
        Fixture {
            manager: RefreshTokenManager::new(store.clone(), minter, config),
            store,
            client,
            identity,
        }
    }

    #[tokio::test]
    async fn test_issue_prefix_and_expiry() {
        let f = fixture().await;
        let now = Utc::now();
        let token = f
            .manager
            .issue(&f.identity, PkceChallenge::default(), now)
            .await
            .unwrap();

        assert!(token.token.starts_with("RT_"));
        assert_eq!(token.token.len(), 3 + 64);
        assert!(!token.revoked);
        assert!(token.expires_at > now + Duration::days(365 * 99));
        assert!(f.store.find_refresh_token(&token.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_mints_verifiable_tokens() {
        let f = fixture().await;
        let now = Utc::now();
        let token = f
            .manager
            .issue(&f.identity, PkceChallenge::default(), now)
            .await
            .unwrap();

        let response = f
            .manager
            .refresh(&f.client.id, &token.token, "", now)
            .await
            .unwrap();
        assert!(response.refresh_token.is_none());
        assert_eq!(response.expires_in, 3600);

        let claims = JwtTokenVerifier::new("sentinel")
            .verify(&f.client, &response.access_token)
            .unwrap();
        assert_eq!(claims.sub, f.identity.user_id);
        assert_eq!(claims.sentinel.attributes["name"], "Ada");
        assert!(
            JwtTokenVerifier::new("sentinel")
                .verify(&f.client, &response.id_token)
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_refresh_rejects_dead_or_foreign_tokens() {
        let f = fixture().await;
        let now = Utc::now();
        let token = f
            .manager
            .issue(&f.identity, PkceChallenge::default(), now)
            .await
            .unwrap();

        assert!(matches!(
            f.manager.refresh(&f.client.id, "RT_nope", "", now).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            f.manager.refresh("other-client", &token.token, "", now).await,
            Err(AuthError::InvalidToken)
        ));

        let far_future = now + Duration::days(365 * 101);
        assert!(matches!(
            f.manager
                .refresh(&f.client.id, &token.token, "", far_future)
                .await,
            Err(AuthError::InvalidToken)
        ));

        f.store.revoke_refresh_token(&token.id).await.unwrap();
        assert!(matches!(
            f.manager.refresh(&f.client.id, &token.token, "", now).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rechecks_pkce() {
        let f = fixture().await;
        let now = Utc::now();
        let pkce = PkceChallenge {
            code_challenge: Some(s256_challenge("the-verifier")),
            code_challenge_method: Some("S256".to_string()),
        };
        let token = f.manager.issue(&f.identity, pkce, now).await.unwrap();

        assert!(matches!(
            f.manager.refresh(&f.client.id, &token.token, "wrong", now).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(
            f.manager
                .refresh(&f.client.id, &token.token, "the-verifier", now)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_revoke_is_owner_scoped_and_idempotent() {
        let f = fixture().await;
        let now = Utc::now();
        let token = f
            .manager
            .issue(&f.identity, PkceChallenge::default(), now)
            .await
            .unwrap();

        assert!(matches!(
            f.manager
                .revoke(&f.client.id, &token.token, "someone-else")
                .await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            f.manager
                .revoke("other-client", &token.token, &f.identity.user_id)
                .await,
            Err(AuthError::InvalidToken)
        ));

        f.manager
            .revoke(&f.client.id, &token.token, &f.identity.user_id)
            .await
            .unwrap();
        f.manager
            .revoke(&f.client.id, &token.token, &f.identity.user_id)
            .await
            .unwrap();

        assert!(matches!(
            f.manager.refresh(&f.client.id, &token.token, "", now).await,
            Err(AuthError::InvalidToken)
        ));
    }
}
