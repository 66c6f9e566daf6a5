//! Bearer-token verification.
//!
//! Identity tokens are verified by an external collaborator; this module
//! only defines the port and a thin HTTP client for it. When no
//! verification endpoint is configured the API layer serves requests with
//! anonymous claims instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims extracted from a verified identity token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl UserClaims {
    /// Claims used when authentication is disabled
    pub fn anonymous() -> Self {
        Self {
            uid: "anonymous".to_string(),
            email: None,
            name: None,
            email_verified: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired authentication token")]
    Unauthorized,
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a bearer token, returning the caller's claims
    async fn verify(&self, token: &str) -> Result<UserClaims, AuthError>;

    /// Optional variant: `None` instead of failing when the token is
    /// missing or invalid
    async fn verify_optional(&self, token: Option<&str>) -> Option<UserClaims> {
        match token {
            Some(token) => self.verify(token).await.ok(),
            None => None,
        }
    }
}

/// Verifies tokens against an external HTTPS endpoint
pub struct RemoteTokenVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl RemoteTokenVerifier {
    pub fn new(verify_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, verify_url }
    }
}

#[async_trait]
impl TokenVerifier for RemoteTokenVerifier {
    async fn verify(&self, token: &str) -> Result<UserClaims, AuthError> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Unauthorized);
        }

        response
            .json::<UserClaims>()
            .await
            .map_err(|e| AuthError::Unavailable(format!("malformed claims response: {e}")))
    }
}

/// Accepts exactly one fixed token; everything else is rejected
pub struct MockVerifier {
    token: String,
    claims: UserClaims,
}

impl MockVerifier {
    pub fn new(token: impl Into<String>, claims: UserClaims) -> Self {
        Self {
            token: token.into(),
            claims,
        }
    }
}

#[async_trait]
impl TokenVerifier for MockVerifier {
    async fn verify(&self, token: &str) -> Result<UserClaims, AuthError> {
        if token == self.token {
            Ok(self.claims.clone())
        } else {
            Err(AuthError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_claims() -> UserClaims {
        UserClaims {
            uid: "user-1".to_string(),
            email: Some("user@example.com".to_string()),
            name: Some("Test User".to_string()),
            email_verified: true,
        }
    }

    #[tokio::test]
    async fn test_mock_verifier_accepts_configured_token() {
        let verifier = MockVerifier::new("good-token", test_claims());
        let claims = verifier.verify("good-token").await.unwrap();
        assert_eq!(claims.uid, "user-1");
    }

    #[tokio::test]
    async fn test_mock_verifier_rejects_other_tokens() {
        let verifier = MockVerifier::new("good-token", test_claims());
        assert!(matches!(
            verifier.verify("bad-token").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_verify_optional_swallows_rejection() {
        let verifier = MockVerifier::new("good-token", test_claims());
        assert!(verifier.verify_optional(Some("bad-token")).await.is_none());
        assert!(verifier.verify_optional(None).await.is_none());
        assert!(verifier.verify_optional(Some("good-token")).await.is_some());
    }
}
