use super::AuthConfig;
use super::error::AuthError;
use super::refresh::RefreshTokenManager;
use super::secret::generate_secret;
use super::token::JwtTokenMinter;
use super::types::{AuthCodeResponse, IdentityProjection, TokenResponse};
use crate::models::{AuthorizationCode, Identity, PkceChallenge};
use crate::store::AuthStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One-time authorization codes: issued after a successful sign in, then
/// exchanged exactly once for a token set.
#[derive(Clone)]
pub struct AuthCodeManager {
    store: Arc<dyn AuthStore>,
    minter: JwtTokenMinter,
    refresh: RefreshTokenManager,
    config: AuthConfig,
}

impl AuthCodeManager {
    pub fn new(
        store: Arc<dyn AuthStore>,
        minter: JwtTokenMinter,
        refresh: RefreshTokenManager,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            minter,
            refresh,
            config,
        }
    }

    pub async fn issue(
        &self,
        identity: &Identity,
        pkce: PkceChallenge,
        now: DateTime<Utc>,
    ) -> Result<AuthCodeResponse, AuthError> {
        // codes only go out for providers the client still has switched on
        self.store
            .find_client_provider(&identity.client_id, &identity.provider_option_id)
            .await?
            .filter(|cp| cp.enabled)
            .ok_or_else(|| {
                tracing::warn!(
                    client_id = %identity.client_id,
                    provider = %identity.provider_option_id,
                    "refusing code for disabled provider"
                );
                AuthError::ProviderDisabled
            })?;

        let code = AuthorizationCode::new(
            generate_secret(),
            identity,
            pkce,
            now,
            self.config.auth_code_lifetime(),
        );
        let response = AuthCodeResponse {
            code: code.code.clone(),
            expires_in: self.config.auth_code_ttl_secs(),
        };
        self.store.insert_auth_code(code).await?;

        tracing::debug!(
            client_id = %identity.client_id,
            user_id = %identity.user_id,
            "authorization code issued"
        );

        Ok(response)
    }

    /// Exchanges a code for access, ID and refresh tokens.
    ///
    /// Tokens are minted before the code is marked redeemed, and the mark is
    /// a compare-and-set. Of two concurrent redeemers only the one whose CAS
    /// touches the row gets tokens; the other gets `InvalidCode` and its
    /// freshly issued refresh token is revoked again.
    pub async fn redeem(
        &self,
        client_id: &str,
        code: &str,
        code_verifier: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, AuthError> {
        let stored = self
            .store
            .find_auth_code(code, client_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !stored.is_redeemable(now) {
            tracing::warn!(
                client_id = %client_id,
                code_id = %stored.id,
                redeemed = stored.redeemed,
                revoked = stored.revoked,
                "attempt to redeem a dead authorization code"
            );
            return Err(AuthError::InvalidCode);
        }

        if !stored.pkce.verify(code_verifier) {
            tracing::warn!(client_id = %client_id, code_id = %stored.id, "PKCE check failed");
            return Err(AuthError::CodeChallengeFailed);
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
        let refresh_token = self
            .refresh
            .issue(&relations.identity, stored.pkce.clone(), now)
            .await?;

        let lost = match self.store.mark_code_redeemed(&stored.id).await {
            Ok(0) => {
                tracing::warn!(
                    client_id = %client_id,
                    code_id = %stored.id,
                    "authorization code redeemed concurrently"
                );
                Some(AuthError::InvalidCode)
            }
            Ok(_) => None,
            Err(e) => Some(e.into()),
        };
        if let Some(err) = lost {
            // nobody will ever see this refresh token
            if let Err(e) = self.refresh.discard(&refresh_token).await {
                tracing::error!(token_id = %refresh_token.id, "failed to revoke orphaned refresh token: {}", e);
            }
            return Err(err);
        }

        tracing::info!(
            client_id = %client_id,
            user_id = %stored.user_id,
            "authorization code redeemed"
        );

        Ok(TokenResponse {
            access_token,
            id_token,
            refresh_token: Some(refresh_token.token),
            expires_in: ttl,
        })
    }
}
