//! Authentication middleware for SoundVault.
//!
//! Provides JWT validation and role-based access control.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use crate::error::{AppError, Result};
use crate::services::auth::Claims;
use crate::AppState;

/// Extracts the Bearer token from the Authorization header.
fn extract_bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Authentication middleware that validates JWT tokens.
///
/// Extracts the Bearer token from the Authorization header, validates it,
/// and adds the claims to the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let token = extract_bearer_token(&request).ok_or(AppError::Unauthorized)?;

    let auth_service = state.auth_service();
    let claims = auth_service.verify_token(token)?;

    // Add claims to request extensions for downstream handlers
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Authentication middleware that never rejects.
///
/// Valid Bearer tokens put their claims into the request extensions; missing
/// or invalid tokens leave the request anonymous, so the handler decides how
/// to answer.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let claims = extract_bearer_token(&request)
        .and_then(|token| state.auth_service().verify_token(token).ok());

    if let Some(claims) = claims {
        request.extensions_mut().insert(claims);
    }

    next.run(request).await
}

/// Middleware that requires admin role.
///
/// Must be used after `auth_middleware` to ensure claims are present.
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(AppError::Unauthorized)?;

    if !claims.is_admin() {
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::UserRole;
    use axum::{http::StatusCode, middleware::from_fn, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn test_extract_bearer_token_valid() {
        let request = Request::builder()
            .header(AUTHORIZATION, "Bearer my-token-123")
            .body(Body::empty())
            .unwrap();

        let token = extract_bearer_token(&request);
        assert_eq!(token, Some("my-token-123"));
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        let request = Request::builder().body(Body::empty()).unwrap();

        let token = extract_bearer_token(&request);
        assert_eq!(token, None);
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let request = Request::builder()
            .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();

        let token = extract_bearer_token(&request);
        assert_eq!(token, None);
    }

    fn with_claims(role: UserRole) -> Claims {
        Claims {
            sub: 7,
            role,
            exp: i64::MAX,
            iat: 0,
        }
    }

    async fn admin_gate_status(role: UserRole) -> StatusCode {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn(require_admin))
            .layer(from_fn(move |mut req: Request<Body>, next: Next| async move {
                req.extensions_mut().insert(with_claims(role));
                next.run(req).await
            }));

        app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_require_admin_allows_admin() {
        assert_eq!(admin_gate_status(UserRole::Admin).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_require_admin_rejects_user() {
        assert_eq!(admin_gate_status(UserRole::User).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_require_admin_without_claims() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn(require_admin));

        let status = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
