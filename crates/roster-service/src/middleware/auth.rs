//! Authentication middleware for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, verifies it with
//! the shared-secret `TokenVerifier`, and injects `PlayerClaims` into request
//! extensions for downstream handlers.

use crate::auth::TokenVerifier;
use crate::errors::RosterError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Shared-secret token verifier.
    pub verifier: Arc<TokenVerifier>,
}

/// Extract Bearer token from the Authorization header.
fn extract_bearer_token(req: &Request) -> Result<&str, RosterError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "roster.middleware.auth", "Missing Authorization header");
            RosterError::InvalidToken("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "roster.middleware.auth", "Invalid Authorization header format");
        RosterError::InvalidToken("Invalid Authorization header format".to_string())
    })
}

/// Authentication middleware for player tokens.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or invalid
/// - Continues to the next handler with `PlayerClaims` in extensions otherwise
#[instrument(skip_all, name = "roster.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, RosterError> {
    let token = extract_bearer_token(&req)?;

    let claims = state.verifier.verify(token)?;

    // Store claims in request extensions for downstream handlers
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request_with_header(value: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().uri("/api/v1/stage-room-match");
        if let Some(v) = value {
            builder = builder.header("authorization", v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_bearer_token_present() {
        let req = request_with_header(Some("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        let req = request_with_header(None);
        let err = extract_bearer_token(&req).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let req = request_with_header(Some("Basic dXNlcjpwYXNz"));
        let err = extract_bearer_token(&req).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }
}
