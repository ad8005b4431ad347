use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    // registration input
    #[error("missing required fields")]
    MissingFields,

    #[error("invalid email")]
    InvalidEmail,

    #[error("weak password")]
    WeakPassword,

    #[error("client does not exist")]
    InvalidClient,

    #[error("email already taken")]
    EmailTaken,

    #[error("provider not enabled for client")]
    ProviderDisabled,

    // sign in
    #[error("failed to find user")]
    UnknownUser,

    #[error("failed to verify password")]
    PasswordCheckFailed,

    #[error("identity data is malformed")]
    BadIdentityData,

    // code redemption
    #[error("failed to find code")]
    NotFound,

    #[error("invalid code")]
    InvalidCode,

    #[error("code challenge failed")]
    CodeChallengeFailed,

    // refresh tokens
    #[error("invalid refresh token")]
    InvalidToken,

    // signed token verification
    #[error("failed to verify token")]
    VerificationFailed,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How much a caller gets to know about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// malformed input, described in full
    Validation,
    /// unknown user, bad password, bad code/token: all look the same
    Credentials,
    /// our fault, cause is logged and never returned
    Server,
}

impl AuthError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AuthError::MissingFields
            | AuthError::InvalidEmail
            | AuthError::WeakPassword
            | AuthError::InvalidClient
            | AuthError::EmailTaken
            | AuthError::ProviderDisabled => ErrorClass::Validation,
            AuthError::UnknownUser
            | AuthError::PasswordCheckFailed
            | AuthError::NotFound
            | AuthError::InvalidCode
            | AuthError::CodeChallengeFailed
            | AuthError::InvalidToken
            | AuthError::VerificationFailed => ErrorClass::Credentials,
            AuthError::BadIdentityData
            | AuthError::Hashing(_)
            | AuthError::Signing(_)
            | AuthError::Store(_) => ErrorClass::Server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_sensitive_errors_share_a_class() {
        assert_eq!(AuthError::UnknownUser.class(), ErrorClass::Credentials);
        assert_eq!(AuthError::PasswordCheckFailed.class(), ErrorClass::Credentials);
        assert_eq!(AuthError::NotFound.class(), AuthError::InvalidCode.class());
    }

    #[test]
    fn test_store_errors_are_server_faults() {
        let err: AuthError = StoreError::MissingRelation("client").into();
        assert_eq!(err.class(), ErrorClass::Server);
        assert_eq!(AuthError::BadIdentityData.class(), ErrorClass::Server);
    }
}
