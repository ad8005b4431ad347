use super::error::{AuthError, ErrorClass};
use super::middleware::bearer_auth_middleware;
use super::types::Claims;
use super::AuthService;
use crate::models::{JsonDictionary, PkceChallenge};
use axum::{
    Extension, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

#[derive(Debug, Deserialize)]
pub struct ProvidersQuery {
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub metadata: JsonDictionary,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub code: String,
    /// empty when the code was issued without a challenge
    #[serde(default)]
    pub code_verifier: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub code_verifier: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// Error body shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/user/info", get(user_info_handler))
        .route("/user/revoke/refresh", post(revoke_refresh_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ));

    Router::new()
        .route("/auth/providers", get(list_providers_handler))
        .route("/auth/providers/email/register", post(register_handler))
        .route("/auth/providers/email/login", post(login_handler))
        .route("/auth/token", post(token_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/verify", post(verify_handler))
        .merge(protected)
        .with_state(state)
}

/// Handler for GET /auth/providers
pub async fn list_providers_handler(
    State(state): State<AppState>,
    Query(query): Query<ProvidersQuery>,
) -> Response {
    match state.auth.list_providers(&query.client_id).await {
        Ok(providers) => Json(providers).into_response(),
        Err(e) => auth_error_response(e),
    }
}

/// Handler for POST /auth/providers/email/register
pub async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let pkce = PkceChallenge {
        code_challenge: req.code_challenge,
        code_challenge_method: req.code_challenge_method,
    };

    match state
        .auth
        .register_with_email(&req.client_id, &req.email, &req.password, req.metadata, pkce)
        .await
    {
        Ok(code) => Json(code).into_response(),
        Err(e) => auth_error_response(e),
    }
}

/// Handler for POST /auth/providers/email/login
pub async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let pkce = PkceChallenge {
        code_challenge: req.code_challenge,
        code_challenge_method: req.code_challenge_method,
    };

    match state
        .auth
        .sign_in_with_email(&req.client_id, &req.email, &req.password, pkce)
        .await
    {
        Ok(code) => Json(code).into_response(),
        Err(e) => auth_error_response(e),
    }
}

/// Handler for POST /auth/token
pub async fn token_handler(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    if req.client_id.is_empty() || req.code.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            Some("client_id and code are required"),
        );
    }

    match state
        .auth
        .redeem_code(&req.client_id, &req.code, &req.code_verifier)
        .await
    {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => auth_error_response(e),
    }
}

/// Handler for POST /auth/refresh
pub async fn refresh_handler(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    if req.client_id.is_empty() || req.refresh_token.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            Some("client_id and refresh_token are required"),
        );
    }

    match state
        .auth
        .refresh_tokens(&req.client_id, &req.refresh_token, &req.code_verifier)
        .await
    {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => auth_error_response(e),
    }
}

/// Handler for POST /auth/verify
pub async fn verify_handler(
    State(state): State<AppState>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    match state.auth.verify_token(&req.client_id, &req.token).await {
        Ok(verified) => Json(verified).into_response(),
        Err(AuthError::InvalidClient) => error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            Some("unknown client"),
        ),
        Err(e) => auth_error_response(e),
    }
}

/// Handler for GET /user/info
pub async fn user_info_handler(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}

/// Handler for POST /user/revoke/refresh
pub async fn revoke_refresh_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<RevokeRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    match state
        .auth
        .revoke_refresh_token(&claims.kid, &req.refresh_token, &claims.sub)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => auth_error_response(e),
    }
}

/// Maps an engine error onto the wire. Credential failures all share one
/// body so callers can't tell an unknown user from a bad password.
fn auth_error_response(err: AuthError) -> Response {
    match err.class() {
        ErrorClass::Validation => match err {
            AuthError::EmailTaken => error_response(
                StatusCode::CONFLICT,
                "email_exists",
                Some(&err.to_string()),
            ),
            AuthError::InvalidClient => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_client",
                Some(&err.to_string()),
            ),
            _ => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                Some(&err.to_string()),
            ),
        },
        ErrorClass::Credentials => {
            tracing::warn!("credentials rejected: {}", err);
            match err {
                AuthError::VerificationFailed => error_response(
                    StatusCode::UNAUTHORIZED,
                    "verification_failed",
                    Some("Token verification failed"),
                ),
                _ => error_response(
                    StatusCode::UNAUTHORIZED,
                    "invalid_credentials",
                    Some("Invalid credentials"),
                ),
            }
        }
        ErrorClass::Server => {
            tracing::error!("request failed: {}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                Some("Something went wrong"),
            )
        }
    }
}

fn rejection_response(rejection: JsonRejection) -> Response {
    tracing::debug!("rejected request body: {}", rejection);
    error_response(
        StatusCode::BAD_REQUEST,
        "invalid_request",
        Some(&rejection.body_text()),
    )
}

fn error_response(status: StatusCode, error: &str, description: Option<&str>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            error_description: description.map(|s| s.to_string()),
        }),
    )
        .into_response()
}
