use super::handlers::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Bearer token middleware. The token names its client through `kid`, that
/// client's secret verifies it, and the claims land in request extensions
/// for the handler.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned);

    let Some(token) = token else {
        tracing::warn!(
            "missing or malformed Authorization header for {} {}",
            req.method(),
            req.uri().path()
        );
        return unauthorized_response(None);
    };

    match state.auth.verify_bearer(&token).await {
        Ok(claims) => {
            tracing::debug!(sub = %claims.sub, client_id = %claims.kid, "bearer token accepted");
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!("rejected bearer token: {}", e);
            unauthorized_response(Some("invalid_token"))
        }
    }
}

/// 401 with a `WWW-Authenticate: Bearer` challenge
fn unauthorized_response(error: Option<&str>) -> Response {
    let mut headers = HeaderMap::new();
    let challenge = match error {
        Some(err) => format!("Bearer realm=\"sentinel\", error=\"{}\"", err),
        None => "Bearer realm=\"sentinel\"".to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        headers.insert(header::WWW_AUTHENTICATE, value);
    }

    (StatusCode::UNAUTHORIZED, headers).into_response()
}
