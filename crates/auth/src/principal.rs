use chrono::{DateTime, Utc};
use serde::Serialize;

use campus_core::UserId;

use crate::{Role, TokenValidationError, VerifiedClaims, validate_claims};

/// The authenticated actor of a request.
///
/// Derived once per request from verified claims and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
    pub email: String,
}

impl Principal {
    pub fn new(id: UserId, role: Role, email: impl Into<String>) -> Self {
        Self {
            id,
            role,
            email: email.into(),
        }
    }
}

/// Turn verified claims into the canonical principal.
///
/// The raw role is normalized here and nowhere else. An unrecognized role is
/// not an error at this point: it resolves to [`Role::Unknown`] and fails
/// every later check.
pub fn resolve_principal(
    claims: &VerifiedClaims,
    now: DateTime<Utc>,
) -> Result<Principal, TokenValidationError> {
    validate_claims(claims, now)?;

    let email = claims.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(TokenValidationError::MissingEmail);
    }

    Ok(Principal {
        id: claims.sub,
        role: Role::normalize(&claims.role),
        email,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn claims(role: &str, email: &str) -> VerifiedClaims {
        let now = Utc::now();
        VerifiedClaims {
            sub: UserId::new(),
            email: email.to_string(),
            role: role.to_string(),
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::minutes(10),
        }
    }

    #[test]
    fn resolves_canonical_principal() {
        let c = claims("Tesoureiro", " Caixa@Escola.test ");
        let p = resolve_principal(&c, Utc::now()).unwrap();
        assert_eq!(p.id, c.sub);
        assert_eq!(p.role, Role::Treasury);
        assert_eq!(p.email, "caixa@escola.test");
    }

    #[test]
    fn unknown_role_still_resolves() {
        let p = resolve_principal(&claims("aluno", "a@escola.test"), Utc::now()).unwrap();
        assert_eq!(p.role, Role::Unknown);
    }

    #[test]
    fn blank_email_is_rejected() {
        let err = resolve_principal(&claims("admin", "   "), Utc::now()).unwrap_err();
        assert_eq!(err, TokenValidationError::MissingEmail);
    }
}
