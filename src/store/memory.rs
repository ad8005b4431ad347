use super::{AuthStore, StoreError};
use crate::models::{
    AuthorizationCode, Client, ClientProvider, Identity, ProviderOption, RefreshToken, User,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// all rows live behind one lock so multi-row writes are atomic
#[derive(Default)]
struct Tables {
    clients: HashMap<String, Client>,
    provider_options: HashMap<String, ProviderOption>,
    client_providers: HashMap<String, ClientProvider>,
    users: HashMap<String, User>,
    identities: HashMap<String, Identity>,
    // code value -> row
    auth_codes: HashMap<String, AuthorizationCode>,
    // token value -> row
    refresh_tokens: HashMap<String, RefreshToken>,
}

/// In-memory store (doesn't persist across restarts)
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.clients.contains_key(&client.id) {
            return Err(StoreError::Conflict(format!("client {} exists", client.id)));
        }
        tables.clients.insert(client.id.clone(), client);
        Ok(())
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.tables.read().await.clients.get(client_id).cloned())
    }

    async fn find_root_client(&self) -> Result<Option<Client>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.clients.values().find(|c| c.is_root_client).cloned())
    }

    async fn upsert_provider_option(&self, option: ProviderOption) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.provider_options.insert(option.id.clone(), option);
        Ok(())
    }

    async fn insert_client_provider(&self, provider: ClientProvider) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.clients.contains_key(&provider.client_id) {
            return Err(StoreError::MissingRelation("client"));
        }
        if !tables
            .provider_options
            .contains_key(&provider.provider_option_id)
        {
            return Err(StoreError::MissingRelation("provider option"));
        }
        let duplicate = tables.client_providers.values().any(|cp| {
            cp.client_id == provider.client_id
                && cp.provider_option_id == provider.provider_option_id
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "provider {} already configured for client {}",
                provider.provider_option_id, provider.client_id
            )));
        }
        tables.client_providers.insert(provider.id.clone(), provider);
        Ok(())
    }

    async fn find_client_provider(
        &self,
        client_id: &str,
        provider_option_id: &str,
    ) -> Result<Option<ClientProvider>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .client_providers
            .values()
            .find(|cp| cp.client_id == client_id && cp.provider_option_id == provider_option_id)
            .cloned())
    }

    async fn list_client_providers(
        &self,
        client_id: &str,
    ) -> Result<Vec<(ClientProvider, ProviderOption)>, StoreError> {
        let tables = self.tables.read().await;
        let mut providers = Vec::new();
        for cp in tables
            .client_providers
            .values()
            .filter(|cp| cp.client_id == client_id)
        {
            let option = tables
                .provider_options
                .get(&cp.provider_option_id)
                .ok_or(StoreError::MissingRelation("provider option"))?;
            providers.push((cp.clone(), option.clone()));
        }
        providers.sort_by(|a, b| a.1.id.cmp(&b.1.id));
        Ok(providers)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn find_identity(
        &self,
        client_id: &str,
        provider_option_id: &str,
        provider_sub: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .identities
            .values()
            .find(|i| {
                i.client_id == client_id
                    && i.provider_option_id == provider_option_id
                    && i.provider_sub == provider_sub
            })
            .cloned())
    }

    async fn find_identity_by_id(
        &self,
        identity_id: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(self.tables.read().await.identities.get(identity_id).cloned())
    }

    async fn create_user_with_identity(
        &self,
        user: User,
        identity: Identity,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        // validate everything before touching either table
        if !tables.clients.contains_key(&user.client_id) {
            return Err(StoreError::MissingRelation("client"));
        }
        if !tables
            .client_providers
            .contains_key(&identity.client_provider_id)
        {
            return Err(StoreError::MissingRelation("client provider"));
        }
        if identity.user_id != user.id || identity.client_id != user.client_id {
            return Err(StoreError::MissingRelation("user"));
        }
        let email_taken = tables
            .users
            .values()
            .any(|u| u.client_id == user.client_id && u.email == user.email);
        if email_taken {
            return Err(StoreError::Conflict(format!(
                "user {} exists for client {}",
                user.email, user.client_id
            )));
        }
        let sub_taken = tables.identities.values().any(|i| {
            i.client_id == identity.client_id
                && i.provider_option_id == identity.provider_option_id
                && i.provider_sub == identity.provider_sub
        });
        if sub_taken {
            return Err(StoreError::Conflict(format!(
                "identity {} exists for client {}",
                identity.provider_sub, identity.client_id
            )));
        }

        tables.users.insert(user.id.clone(), user);
        tables.identities.insert(identity.id.clone(), identity);
        Ok(())
    }

    async fn insert_auth_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        // expired codes can never be redeemed again, drop them as we go
        let now = Utc::now();
        tables.auth_codes.retain(|_, c| !c.is_expired(now));
        if tables.auth_codes.contains_key(&code.code) {
            return Err(StoreError::Conflict("authorization code collision".to_string()));
        }
        tables.auth_codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn find_auth_code(
        &self,
        code: &str,
        client_id: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .auth_codes
            .get(code)
            .filter(|c| c.client_id == client_id)
            .cloned())
    }

    async fn mark_code_redeemed(&self, code_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .auth_codes
            .values_mut()
            .find(|c| c.id == code_id && !c.redeemed);
        match row {
            Some(code) => {
                code.redeemed = true;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.refresh_tokens.contains_key(&token.token) {
            return Err(StoreError::Conflict("refresh token collision".to_string()));
        }
        tables.refresh_tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.tables.read().await.refresh_tokens.get(token).cloned())
    }

    async fn revoke_refresh_token(&self, token_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .refresh_tokens
            .values_mut()
            .find(|t| t.id == token_id && !t.revoked);
        match row {
            Some(token) => {
                token.revoked = true;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
