use super::error::AuthError;
use super::password::PasswordHasher;
use super::secret::generate_secret;
use super::validators::{is_password_strong, is_valid_email, normalize_email};
use crate::models::{EMAIL_PROVIDER, Identity, JsonDictionary, PASSWORD_HASH_KEY, User};
use crate::store::{AuthStore, StoreError};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Email + password sign in and registration.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn AuthStore>,
    hasher: PasswordHasher,
    // compared against when the email is unknown so both paths cost one bcrypt verify
    dummy_hash: Arc<OnceCell<String>>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn AuthStore>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub async fn sign_in(
        &self,
        client_id: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let email = normalize_email(email);

        let Some(identity) = self
            .store
            .find_identity(client_id, EMAIL_PROVIDER, &email)
            .await?
        else {
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| async { self.hasher.hash(&generate_secret()).await })
                .await?;
            self.hasher.verify(dummy, password).await?;
            return Err(AuthError::UnknownUser);
        };

        let hash = identity
            .data
            .get(PASSWORD_HASH_KEY)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                tracing::error!(identity_id = %identity.id, "identity has no usable password hash");
                AuthError::BadIdentityData
            })?;

        if !self.hasher.verify(hash, password).await? {
            return Err(AuthError::PasswordCheckFailed);
        }

        Ok(identity)
    }

    /// Checks run in a fixed order and the first failure wins, so a given bad
    /// request always gets the same error.
    pub async fn register(
        &self,
        client_id: &str,
        email: &str,
        password: &str,
        metadata: JsonDictionary,
    ) -> Result<(User, Identity), AuthError> {
        let client_id = client_id.trim();
        let email = normalize_email(email);

        if client_id.is_empty() || email.is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingFields);
        }
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if !is_password_strong(password) {
            return Err(AuthError::WeakPassword);
        }
        if self.store.find_client(client_id).await?.is_none() {
            return Err(AuthError::InvalidClient);
        }
        if self
            .store
            .find_identity(client_id, EMAIL_PROVIDER, &email)
            .await?
            .is_some()
        {
            return Err(AuthError::EmailTaken);
        }
        let client_provider = self
            .store
            .find_client_provider(client_id, EMAIL_PROVIDER)
            .await?
            .filter(|cp| cp.enabled)
            .ok_or(AuthError::ProviderDisabled)?;

        let hash = self.hasher.hash(password).await?;
        let mut data = JsonDictionary::new();
        data.insert(PASSWORD_HASH_KEY.to_string(), serde_json::Value::String(hash));

        let user = User::new(client_id.to_string(), email.clone(), metadata);
        let identity = Identity::new(&user, &client_provider, email, data);

        match self
            .store
            .create_user_with_identity(user.clone(), identity.clone())
            .await
        {
            Ok(()) => {}
            // lost a race with a concurrent registration of the same email
            Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.id, client_id = %client_id, "user registered");

        Ok((user, identity))
    }
}
