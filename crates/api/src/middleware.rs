use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use campus_auth::{VerifiedClaims, resolve_principal};
use campus_core::UserId;

use crate::app::errors;
use crate::context::PrincipalContext;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("token subject is not a valid user id")]
    InvalidSubject,

    #[error("token timestamps are out of range")]
    InvalidTimestamp,
}

/// Upstream identity seam: turns a bearer token into verified claims.
pub trait ClaimsVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedClaims, TokenError>;
}

/// Wire format of the HS256 tokens issued by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Shared-secret HS256 verifier.
pub struct Hs256ClaimsVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256ClaimsVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl ClaimsVerifier for Hs256ClaimsVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedClaims, TokenError> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| TokenError::Rejected(e.to_string()))?;
        let claims = data.claims;

        let sub: UserId = claims.sub.parse().map_err(|_| TokenError::InvalidSubject)?;
        let issued_at =
            DateTime::<Utc>::from_timestamp(claims.iat, 0).ok_or(TokenError::InvalidTimestamp)?;
        let expires_at =
            DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(TokenError::InvalidTimestamp)?;

        Ok(VerifiedClaims {
            sub,
            email: claims.email,
            role: claims.role,
            issued_at,
            expires_at,
        })
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn ClaimsVerifier>,
}

/// Resolve the request principal or stop with 401.
///
/// Unauthenticated requests are not audited.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let principal = extract_bearer(req.headers())
        .ok_or_else(|| "missing bearer token".to_string())
        .and_then(|token| state.verifier.verify(token).map_err(|e| e.to_string()))
        .and_then(|claims| resolve_principal(&claims, Utc::now()).map_err(|e| e.to_string()));

    let principal = match principal {
        Ok(p) => p,
        Err(reason) => {
            tracing::debug!(path = %req.uri().path(), %reason, "authentication failed");
            return errors::json_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required",
            );
        }
    };

    req.extensions_mut().insert(PrincipalContext::new(principal));
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;

    fn mint(secret: &str, sub: &str, exp_offset: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: sub.to_string(),
            email: "prof@escola.test".to_string(),
            role: "docente".to_string(),
            iat: now - 10,
            exp: now + exp_offset,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verifies_well_formed_tokens() {
        let sub = UserId::new();
        let verifier = Hs256ClaimsVerifier::new(b"s");
        let claims = verifier.verify(&mint("s", &sub.to_string(), 600)).unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.role, "docente");
    }

    #[test]
    fn rejects_bad_signature_expiry_and_subject() {
        let verifier = Hs256ClaimsVerifier::new(b"s");
        let sub = UserId::new().to_string();
        assert!(verifier.verify(&mint("other", &sub, 600)).is_err());
        assert!(verifier.verify(&mint("s", &sub, -3600)).is_err());
        assert!(matches!(
            verifier.verify(&mint("s", "not-a-uuid", 600)),
            Err(TokenError::InvalidSubject)
        ));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer  tok "));
        assert_eq!(extract_bearer(&headers), Some("tok"));
    }
}
