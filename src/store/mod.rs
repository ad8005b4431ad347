mod memory;

pub use memory::MemoryStore;

use crate::models::{
    AuthorizationCode, Client, ClientProvider, Identity, ProviderOption, RefreshToken, User,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// a uniqueness constraint was violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// a foreign key points at a row that doesn't exist
    #[error("missing related {0}")]
    MissingRelation(&'static str),
}

/// The rows needed to mint tokens for a code or refresh token.
#[derive(Debug, Clone)]
pub struct TokenRelations {
    pub client: Client,
    pub identity: Identity,
    pub user: User,
}

/// Persistence collaborator for the auth engine.
///
/// Related rows are never preloaded: callers fetch the relations an
/// operation needs explicitly (redeem needs client + identity + user, for
/// instance). Conditional updates return the number of rows they touched so
/// the caller can tell whether it won a race.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn insert_client(&self, client: Client) -> Result<(), StoreError>;
    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;
    async fn find_root_client(&self) -> Result<Option<Client>, StoreError>;

    async fn upsert_provider_option(&self, option: ProviderOption) -> Result<(), StoreError>;
    async fn insert_client_provider(&self, provider: ClientProvider) -> Result<(), StoreError>;
    async fn find_client_provider(
        &self,
        client_id: &str,
        provider_option_id: &str,
    ) -> Result<Option<ClientProvider>, StoreError>;
    /// client providers of a client joined with their provider option
    async fn list_client_providers(
        &self,
        client_id: &str,
    ) -> Result<Vec<(ClientProvider, ProviderOption)>, StoreError>;

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
    async fn find_identity(
        &self,
        client_id: &str,
        provider_option_id: &str,
        provider_sub: &str,
    ) -> Result<Option<Identity>, StoreError>;
    async fn find_identity_by_id(&self, identity_id: &str)
    -> Result<Option<Identity>, StoreError>;

    /// Inserts the user and its first identity as one unit: either both rows
    /// exist afterwards or neither does.
    async fn create_user_with_identity(
        &self,
        user: User,
        identity: Identity,
    ) -> Result<(), StoreError>;

    async fn insert_auth_code(&self, code: AuthorizationCode) -> Result<(), StoreError>;
    async fn find_auth_code(
        &self,
        code: &str,
        client_id: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError>;
    /// `redeemed = true WHERE id = ? AND redeemed = false`
    async fn mark_code_redeemed(&self, code_id: &str) -> Result<u64, StoreError>;

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError>;
    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;
    /// `revoked = true WHERE id = ? AND revoked = false`
    async fn revoke_refresh_token(&self, token_id: &str) -> Result<u64, StoreError>;

    /// Explicit join for token minting. A dangling foreign key is a server
    /// fault, not a credentials problem.
    async fn fetch_token_relations(
        &self,
        client_id: &str,
        identity_id: &str,
        user_id: &str,
    ) -> Result<TokenRelations, StoreError> {
        let client = self
            .find_client(client_id)
            .await?
            .ok_or(StoreError::MissingRelation("client"))?;
        let identity = self
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(StoreError::MissingRelation("identity"))?;
        let user = self
            .find_user(user_id)
            .await?
            .ok_or(StoreError::MissingRelation("user"))?;

        Ok(TokenRelations {
            client,
            identity,
            user,
        })
    }
}
