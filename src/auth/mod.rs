mod authorization_code;
mod credentials;
mod error;
mod handlers;
mod middleware;
mod password;
mod pkce;
mod refresh;
mod secret;
mod token;
mod types;
mod validators;

pub use authorization_code::AuthCodeManager;
pub use credentials::CredentialVerifier;
pub use error::AuthError;
pub use handlers::{AppState, router};
pub use password::PasswordHasher;
pub use refresh::RefreshTokenManager;
pub use secret::generate_secret;
pub use token::{JwtTokenMinter, JwtTokenVerifier};
pub use types::{AuthCodeResponse, Claims, TokenResponse, VerifyResponse};

use crate::models::{
    Client, ClientProvider, EMAIL_PROVIDER, JsonDictionary, PkceChallenge, ProviderOption,
};
use crate::store::AuthStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const ONE_HOUR: Duration = Duration::from_secs(60 * 60);
const TEN_MINUTES: Duration = Duration::from_secs(10 * 60);
const HUNDRED_YEARS: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Configuration for the auth engine
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// `iss` of every minted token
    pub issuer: String,
    /// `aud` of access tokens (ID tokens use the client id)
    pub audience: String,
    pub scopes: Vec<String>,
    pub access_token_ttl: Duration,
    pub auth_code_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "sentinel".to_string(),
            audience: "sentinel".to_string(),
            scopes: vec!["profile".to_string()],
            access_token_ttl: ONE_HOUR,
            auth_code_ttl: TEN_MINUTES,
            refresh_token_ttl: HUNDRED_YEARS,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    pub fn access_token_ttl_secs(&self) -> i64 {
        seconds(self.access_token_ttl)
    }

    pub fn auth_code_ttl_secs(&self) -> i64 {
        seconds(self.auth_code_ttl)
    }

    pub(crate) fn auth_code_lifetime(&self) -> chrono::Duration {
        lifetime(self.auth_code_ttl)
    }

    pub(crate) fn refresh_token_lifetime(&self) -> chrono::Duration {
        lifetime(self.refresh_token_ttl)
    }
}

fn seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn lifetime(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}

/// A provider a client has configured, as shown to that client's users.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderListing {
    pub id: String,
    pub enabled: bool,
    pub provider: ProviderOption,
}

/// Everything the HTTP layer needs, wired together once at startup
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    credentials: CredentialVerifier,
    codes: AuthCodeManager,
    refresh: RefreshTokenManager,
    verifier: JwtTokenVerifier,
    bearer_verifier: JwtTokenVerifier,
}

impl AuthService {
    pub fn new(store: Arc<dyn AuthStore>, config: AuthConfig) -> Self {
        let minter = JwtTokenMinter::new(config.issuer.clone(), config.audience.clone());
        let refresh = RefreshTokenManager::new(store.clone(), minter.clone(), config.clone());
        let codes = AuthCodeManager::new(store.clone(), minter, refresh.clone(), config.clone());
        let credentials =
            CredentialVerifier::new(store.clone(), PasswordHasher::new(config.bcrypt_cost));
        let verifier = JwtTokenVerifier::new(&config.issuer);
        let bearer_verifier = JwtTokenVerifier::for_access_tokens(&config.issuer, &config.audience);

        Self {
            store,
            credentials,
            codes,
            refresh,
            verifier,
            bearer_verifier,
        }
    }

    pub async fn sign_in_with_email(
        &self,
        client_id: &str,
        email: &str,
        password: &str,
        pkce: PkceChallenge,
    ) -> Result<AuthCodeResponse, AuthError> {
        let identity = self.credentials.sign_in(client_id, email, password).await?;
        self.codes.issue(&identity, pkce, Utc::now()).await
    }

    pub async fn register_with_email(
        &self,
        client_id: &str,
        email: &str,
        password: &str,
        metadata: JsonDictionary,
        pkce: PkceChallenge,
    ) -> Result<AuthCodeResponse, AuthError> {
        let (_, identity) = self
            .credentials
            .register(client_id, email, password, metadata)
            .await?;
        self.codes.issue(&identity, pkce, Utc::now()).await
    }

    pub async fn redeem_code(
        &self,
        client_id: &str,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.codes
            .redeem(client_id, code, code_verifier, Utc::now())
            .await
    }

    pub async fn refresh_tokens(
        &self,
        client_id: &str,
        refresh_token: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.refresh
            .refresh(client_id, refresh_token, code_verifier, Utc::now())
            .await
    }

    pub async fn revoke_refresh_token(
        &self,
        client_id: &str,
        refresh_token: &str,
        user_id: &str,
    ) -> Result<(), AuthError> {
        self.refresh.revoke(client_id, refresh_token, user_id).await
    }

    /// Verifies a token on behalf of a named client.
    pub async fn verify_token(
        &self,
        client_id: &str,
        token: &str,
    ) -> Result<VerifyResponse, AuthError> {
        let client = self
            .store
            .find_client(client_id)
            .await?
            .ok_or(AuthError::InvalidClient)?;
        let claims = self.verifier.verify(&client, token)?;
        Ok(VerifyResponse {
            valid: true,
            claims,
        })
    }

    /// Verifies a bearer access token, finding the signing client through
    /// `kid`. ID tokens are refused here.
    pub async fn verify_bearer(&self, token: &str) -> Result<Claims, AuthError> {
        let client_id = JwtTokenVerifier::key_id(token)?;
        let client = self
            .store
            .find_client(&client_id)
            .await?
            .ok_or(AuthError::VerificationFailed)?;
        self.bearer_verifier.verify(&client, token)
    }

    pub async fn list_providers(&self, client_id: &str) -> Result<Vec<ProviderListing>, AuthError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let providers = self
            .store
            .list_client_providers(client_id)
            .await?
            .into_iter()
            .map(|(cp, option)| ProviderListing {
                id: cp.id,
                enabled: cp.enabled,
                provider: option,
            })
            .collect();
        Ok(providers)
    }

    /// Makes sure the root client and the email provider exist. Safe to run
    /// on every start.
    pub async fn ensure_root_client(&self, redirect_uri: Option<String>) -> Result<Client, AuthError> {
        self.store
            .upsert_provider_option(ProviderOption::email())
            .await?;

        let client = match self.store.find_root_client().await? {
            Some(client) => client,
            None => {
                let mut client = Client::new(
                    "Sentinel".to_string(),
                    generate_secret(),
                    redirect_uri.into_iter().collect(),
                );
                client.is_root_client = true;
                self.store.insert_client(client.clone()).await?;
                tracing::info!(client_id = %client.id, "created root client");
                client
            }
        };

        if self
            .store
            .find_client_provider(&client.id, EMAIL_PROVIDER)
            .await?
            .is_none()
        {
            self.store
                .insert_client_provider(ClientProvider::new(
                    client.id.clone(),
                    EMAIL_PROVIDER.to_string(),
                    true,
                ))
                .await?;
        }

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> AuthService {
        let config = AuthConfig {
            bcrypt_cost: 4,
            ..AuthConfig::default()
        };
        AuthService::new(Arc::new(MemoryStore::new()), config)
    }

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.access_token_ttl_secs(), 3600);
        assert_eq!(config.auth_code_ttl_secs(), 600);
        assert!(config.refresh_token_lifetime() > chrono::Duration::days(365 * 99));
    }

    #[test]
    fn test_absurd_ttl_saturates() {
        let config = AuthConfig {
            refresh_token_ttl: Duration::MAX,
            access_token_ttl: Duration::MAX,
            ..AuthConfig::default()
        };
        assert_eq!(config.access_token_ttl_secs(), i64::MAX);
        assert_eq!(config.refresh_token_lifetime(), chrono::Duration::MAX);
    }

    #[tokio::test]
    async fn test_root_client_seeding_is_idempotent() {
        let service = service();
        let first = service
            .ensure_root_client(Some("http://localhost:3000/callback".to_string()))
            .await
            .unwrap();
        let second = service.ensure_root_client(None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.is_root_client);
        assert_eq!(first.secret.len(), 64);
        assert_eq!(first.redirect_uris, vec!["http://localhost:3000/callback"]);

        let providers = service.list_providers(&first.id).await.unwrap();
        assert_eq!(providers.len(), 1);
        assert!(providers[0].enabled);
        assert_eq!(providers[0].provider.id, EMAIL_PROVIDER);
    }

    #[tokio::test]
    async fn test_list_providers_requires_client_id() {
        assert!(matches!(
            service().list_providers("  ").await,
            Err(AuthError::MissingFields)
        ));
        assert!(service().list_providers("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_flow_through_service() {
        let service = service();
        let root = service.ensure_root_client(None).await.unwrap();

        let code = service
            .register_with_email(
                &root.id,
                "a@b.com",
                "secret1",
                JsonDictionary::new(),
                PkceChallenge::s256("v"),
            )
            .await
            .unwrap();
        let tokens = service.redeem_code(&root.id, &code.code, "v").await.unwrap();

        let verified = service
            .verify_token(&root.id, &tokens.access_token)
            .await
            .unwrap();
        assert!(verified.valid);

        // an ID token is not a bearer credential
        assert!(matches!(
            service.verify_bearer(&tokens.id_token).await,
            Err(AuthError::VerificationFailed)
        ));
        // but the client can still check it by name
        let id_claims = service
            .verify_token(&root.id, &tokens.id_token)
            .await
            .unwrap()
            .claims;
        assert_eq!(id_claims.aud, root.id);

        let claims = service.verify_bearer(&tokens.access_token).await.unwrap();
        assert_eq!(claims.aud, "sentinel");
        assert_eq!(claims.sub, verified.claims.sub);

        assert!(matches!(
            service.verify_token("nobody", &tokens.access_token).await,
            Err(AuthError::InvalidClient)
        ));

        let signed_in = service
            .sign_in_with_email(&root.id, "a@b.com", "secret1", PkceChallenge::default())
            .await
            .unwrap();
        assert_ne!(signed_in.code, code.code);

        let refresh_token = tokens.refresh_token.unwrap();
        service
            .revoke_refresh_token(&root.id, &refresh_token, &claims.sub)
            .await
            .unwrap();
        assert!(matches!(
            service.refresh_tokens(&root.id, &refresh_token, "v").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
