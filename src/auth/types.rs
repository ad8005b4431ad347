use crate::models::{Identity, JsonDictionary, User};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a token says about its subject. Built from the identity and its user
/// for each mint call; nothing here outlives the request.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityProjection {
    pub user_id: String,
    pub provider_option_id: String,
    pub provider_sub: String,
    pub attributes: JsonDictionary,
}

impl IdentityProjection {
    pub fn new(identity: &Identity, user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            provider_option_id: identity.provider_option_id.clone(),
            provider_sub: identity.provider_sub.clone(),
            attributes: user.metadata.clone(),
        }
    }
}

/// Nested extension object carried by every token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentinelClaims {
    /// provider option id -> subjects known for that provider
    #[serde(default)]
    pub identities: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub attributes: JsonDictionary,
    pub sign_in_provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// id of the client whose secret signed this token
    pub kid: String,
    pub auth_time: i64,
    // access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    pub sentinel: SentinelClaims,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeResponse {
    pub code: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    // only present when a code was redeemed, refresh calls reuse the old one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub claims: Claims,
}
