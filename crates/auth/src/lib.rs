//! `campus-auth`: pure authorization boundary (fail closed).
//!
//! This crate is intentionally decoupled from HTTP and storage: every check is
//! a plain function over already-fetched facts. The API crate composes them and
//! performs the reads.

pub mod age;
pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod scope;

pub use age::{ADULT_AGE, age_on, birth_date_of, check_age};
pub use authorize::{
    AuthorizationExplanation, Decision, Denial, DenialCode, DenialKind, RbacRegistry, authorize,
    explain_authorization,
};
pub use claims::{TokenValidationError, VerifiedClaims, validate_claims};
pub use permissions::{Action, MatrixError, Permission, PermissionMatrix, PermissionRule, Resource};
pub use principal::{Principal, resolve_principal};
pub use roles::Role;
pub use scope::{OwnerKind, OwnershipLookup, ScopeStep, check_owner_reassignment, plan_scope};
