use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// schema-less document stored alongside identities and client providers
pub type JsonDictionary = serde_json::Map<String, serde_json::Value>;

/// provider option id for email + password sign in
pub const EMAIL_PROVIDER: &str = "email";

/// key inside `Identity::data` holding the bcrypt hash
pub const PASSWORD_HASH_KEY: &str = "password_hash";

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Tenant application. The secret doubles as the HMAC key for every token
/// issued to this client, so this type is deliberately not `Serialize`.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub secret: String,
    pub logo_url: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub is_root_client: bool,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(name: String, secret: String, redirect_uris: Vec<String>) -> Self {
        Self {
            id: new_id(),
            name,
            secret,
            logo_url: None,
            redirect_uris,
            allowed_origins: Vec::new(),
            is_root_client: false,
            created_at: Utc::now(),
        }
    }
}

/// A sign-in method definition, shared by all clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOption {
    pub id: String,
    pub name: String,
    pub description: String,
    pub logo_url: Option<String>,
    #[serde(default)]
    pub mappings: JsonDictionary,
    // federated providers only
    #[serde(skip_serializing)]
    pub oauth_client_id: Option<String>,
    #[serde(skip_serializing)]
    pub oauth_client_secret: Option<String>,
    #[serde(skip_serializing)]
    pub oauth_redirect_uri: Option<String>,
}

impl ProviderOption {
    pub fn email() -> Self {
        Self {
            id: EMAIL_PROVIDER.to_string(),
            name: "Email Authentication".to_string(),
            description: "Authenticate users using email and password".to_string(),
            logo_url: None,
            mappings: JsonDictionary::new(),
            oauth_client_id: None,
            oauth_client_secret: None,
            oauth_redirect_uri: None,
        }
    }
}

/// Enables a provider option for one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProvider {
    pub id: String,
    pub client_id: String,
    pub provider_option_id: String,
    pub enabled: bool,
    #[serde(default)]
    pub data: JsonDictionary,
}

impl ClientProvider {
    pub fn new(client_id: String, provider_option_id: String, enabled: bool) -> Self {
        Self {
            id: new_id(),
            client_id,
            provider_option_id,
            enabled,
            data: JsonDictionary::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub client_id: String,
    pub email: String,
    /// free-form metadata supplied at registration, emitted as token attributes
    #[serde(default)]
    pub metadata: JsonDictionary,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(client_id: String, email: String, metadata: JsonDictionary) -> Self {
        Self {
            id: new_id(),
            client_id,
            email,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// A user's enrollment in one provider for one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    pub provider_sub: String,
    pub provider_option_id: String,
    pub client_provider_id: String,
    #[serde(default)]
    pub data: JsonDictionary,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(
        user: &User,
        client_provider: &ClientProvider,
        provider_sub: String,
        data: JsonDictionary,
    ) -> Self {
        Self {
            id: new_id(),
            client_id: user.client_id.clone(),
            user_id: user.id.clone(),
            provider_sub,
            provider_option_id: client_provider.provider_option_id.clone(),
            client_provider_id: client_provider.id.clone(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// PKCE parameters captured when the code was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub id: String,
    pub code: String,
    pub client_id: String,
    pub identity_id: String,
    pub user_id: String,
    pub pkce: PkceChallenge,
    pub redeemed: bool,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn new(
        code: String,
        identity: &Identity,
        pkce: PkceChallenge,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: new_id(),
            code,
            client_id: identity.client_id.clone(),
            identity_id: identity.id.clone(),
            user_id: identity.user_id.clone(),
            pkce,
            redeemed: false,
            revoked: false,
            expires_at: expiry(now, ttl),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// expired, redeemed and revoked all look the same from outside
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.redeemed && !self.revoked
    }
}

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: String,
    pub token: String,
    pub client_id: String,
    pub identity_id: String,
    pub user_id: String,
    pub provider_sub: String,
    pub provider_option_id: String,
    pub client_provider_id: String,
    pub pkce: PkceChallenge,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(
        token: String,
        identity: &Identity,
        pkce: PkceChallenge,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: new_id(),
            token,
            client_id: identity.client_id.clone(),
            identity_id: identity.id.clone(),
            user_id: identity.user_id.clone(),
            provider_sub: identity.provider_sub.clone(),
            provider_option_id: identity.provider_option_id.clone(),
            client_provider_id: identity.client_provider_id.clone(),
            pkce,
            revoked: false,
            expires_at: expiry(now, ttl),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.revoked
    }
}
