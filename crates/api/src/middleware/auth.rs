//! Bearer-token authentication middleware.
//!
//! When a verifier is configured, requests must carry a valid
//! `Authorization: Bearer` token; rejection happens before any provider is
//! contacted. When authentication is disabled, requests are served with
//! anonymous claims.

use crate::models::ErrorResponse;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use services::{TokenVerifier, UserClaims};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthState {
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl AuthState {
    pub fn enabled(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier: Some(verifier),
        }
    }

    pub fn disabled() -> Self {
        Self { verifier: None }
    }
}

/// Claims of the verified caller, injected into request extensions
#[derive(Clone)]
pub struct AuthenticatedUser(pub UserClaims);

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Some(verifier) = &state.verifier else {
        request
            .extensions_mut()
            .insert(AuthenticatedUser(UserClaims::anonymous()));
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err(unauthorized("Missing authentication token"));
    };

    match verifier.verify(token).await {
        Ok(claims) => {
            request.extensions_mut().insert(AuthenticatedUser(claims));
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!(error = %e, "token verification failed");
            Err(unauthorized("Invalid authentication token"))
        }
    }
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(message, "unauthorized")),
    )
}
