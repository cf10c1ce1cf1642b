use std::collections::BTreeMap;

use serde::Serialize;

use campus_core::UserId;

use crate::{Action, Permission, PermissionMatrix, Principal, Resource, Role};

/// Outcome of a single authorization check.
pub type Decision = Result<(), Denial>;

/// Fixed denial codes exposed to clients.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    InsufficientPermissions,
    ClassAccessDenied,
    StudentAccessDenied,
    WardAccessDenied,
    MinorStudentBlocked,
    MissingIdentifier,
}

impl DenialCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            DenialCode::ClassAccessDenied => "CLASS_ACCESS_DENIED",
            DenialCode::StudentAccessDenied => "STUDENT_ACCESS_DENIED",
            DenialCode::WardAccessDenied => "WARD_ACCESS_DENIED",
            DenialCode::MinorStudentBlocked => "MINOR_STUDENT_BLOCKED",
            DenialCode::MissingIdentifier => "MISSING_IDENTIFIER",
        }
    }

    /// HTTP status the API maps this code to.
    pub fn status(&self) -> u16 {
        match self {
            DenialCode::MissingIdentifier => 400,
            _ => 403,
        }
    }

    /// Client-facing message. Never names the sub-check that failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            DenialCode::InsufficientPermissions => "You do not have permission to perform this action",
            DenialCode::ClassAccessDenied => "You can only access classes you direct",
            DenialCode::StudentAccessDenied => "You can only access students in classes you direct",
            DenialCode::WardAccessDenied => "You can only access your own wards",
            DenialCode::MinorStudentBlocked => "Access is not permitted for students under 18",
            DenialCode::MissingIdentifier => "A resource identifier is required for this route",
        }
    }
}

impl core::fmt::Display for DenialCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage of the pipeline produced a denial.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    PermissionDenied,
    ScopeDenied,
    MissingIdentifier,
    AgeBlocked,
}

/// A terminal authorization failure.
///
/// `reason` is for logs and the audit trail only; clients get
/// [`DenialCode::public_message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub kind: DenialKind,
    pub code: DenialCode,
    pub reason: String,
}

impl Denial {
    pub fn permission(reason: impl Into<String>) -> Self {
        Self {
            kind: DenialKind::PermissionDenied,
            code: DenialCode::InsufficientPermissions,
            reason: reason.into(),
        }
    }

    pub fn scope(code: DenialCode, reason: impl Into<String>) -> Self {
        Self {
            kind: DenialKind::ScopeDenied,
            code,
            reason: reason.into(),
        }
    }

    pub fn missing_identifier(resource: Resource) -> Self {
        Self {
            kind: DenialKind::MissingIdentifier,
            code: DenialCode::MissingIdentifier,
            reason: format!("missing identifier for scoped {resource} route"),
        }
    }

    pub fn minor(reason: impl Into<String>) -> Self {
        Self {
            kind: DenialKind::AgeBlocked,
            code: DenialCode::MinorStudentBlocked,
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.code.status()
    }

    pub fn public_message(&self) -> &'static str {
        self.code.public_message()
    }
}

impl core::fmt::Display for Denial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code, self.reason)
    }
}

/// Check the permission matrix for `principal`.
///
/// - No IO
/// - No panics
/// - Unregistered pairs and unrecognized roles are denied
pub fn authorize(
    matrix: &PermissionMatrix,
    principal: &Principal,
    resource: Resource,
    action: Action,
) -> Decision {
    let permission = Permission::new(resource, action);

    if !principal.role.is_canonical() {
        return Err(Denial::permission(format!(
            "unrecognized role cannot '{permission}'"
        )));
    }

    let Some(rule) = matrix.rule(resource, action) else {
        return Err(Denial::permission(format!(
            "no rule configured for '{permission}'"
        )));
    };

    if rule.allows(principal.role) {
        Ok(())
    } else {
        Err(Denial::permission(format!(
            "role '{}' is not granted '{permission}'",
            principal.role
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a matrix decision, for the RBAC admin endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    /// Roles the matrix grants this permission to (empty when unregistered).
    pub granting_roles: Vec<Role>,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub recognized_role: bool,
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: ExplanationDenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationDenialKind {
    UnknownRole,
    NoRuleConfigured,
    RoleNotGranted,
}

/// Explain why the matrix allows or denies `permission` for `principal`.
///
/// Only covers the matrix stage: ownership and age checks depend on the
/// concrete record and are not part of the explanation.
pub fn explain_authorization(
    matrix: &PermissionMatrix,
    principal: &Principal,
    permission: Permission,
) -> AuthorizationExplanation {
    let required = permission.to_string();
    let rule = matrix.rule(permission.resource, permission.action);
    let granting_roles: Vec<Role> = rule
        .map(|r| r.roles.iter().copied().collect())
        .unwrap_or_default();

    let state = PrincipalState {
        user_id: principal.id,
        email: principal.email.clone(),
        role: principal.role,
        recognized_role: principal.role.is_canonical(),
        effective_permissions: matrix
            .permissions_for(principal.role)
            .iter()
            .map(Permission::to_string)
            .collect(),
    };

    let denial = match authorize(matrix, principal, permission.resource, permission.action) {
        Ok(()) => None,
        Err(_) if !principal.role.is_canonical() => Some(DenialReason {
            kind: ExplanationDenialKind::UnknownRole,
            message: "The principal's role was not recognized and is denied everywhere".to_string(),
            suggestions: vec![
                "Check the role claim issued by the identity provider".to_string(),
                format!(
                    "Use one of: {}",
                    Role::CANONICAL.map(|r| r.as_str()).join(", ")
                ),
            ],
        }),
        Err(_) if rule.is_none() => Some(DenialReason {
            kind: ExplanationDenialKind::NoRuleConfigured,
            message: format!("No rule is configured for '{required}'; unregistered pairs are denied"),
            suggestions: vec!["Register the permission in the matrix if it should exist".to_string()],
        }),
        Err(_) => Some(DenialReason {
            kind: ExplanationDenialKind::RoleNotGranted,
            message: format!("Role '{}' is not granted '{required}'", principal.role),
            suggestions: vec![format!(
                "'{required}' is granted to: {}",
                granting_roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
            )],
        }),
    };

    let reason = match &denial {
        None => format!("Role '{}' is granted '{required}'", principal.role),
        Some(d) => d.message.clone(),
    };

    AuthorizationExplanation {
        required_permission: required,
        granted: denial.is_none(),
        reason,
        principal: state,
        granting_roles,
        denial_reason: denial,
    }
}

/// Role definition with its granted permissions (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefinition {
    pub name: String,
    pub permissions: Vec<String>,
    pub description: String,
}

/// Permission definition (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct PermissionDefinition {
    pub name: String,
    pub category: String,
    pub roles: Vec<Role>,
    pub description: String,
}

/// Read-only view of the whole matrix, keyed by role and permission name.
pub struct RbacRegistry {
    pub roles: BTreeMap<String, RoleDefinition>,
    pub permissions: BTreeMap<String, PermissionDefinition>,
}

impl RbacRegistry {
    pub fn from_matrix(matrix: &PermissionMatrix) -> Self {
        let roles = Role::CANONICAL
            .into_iter()
            .map(|role| {
                let def = RoleDefinition {
                    name: role.as_str().to_string(),
                    permissions: matrix
                        .permissions_for(role)
                        .iter()
                        .map(Permission::to_string)
                        .collect(),
                    description: role.description().to_string(),
                };
                (def.name.clone(), def)
            })
            .collect();

        let permissions = matrix
            .rules()
            .into_iter()
            .map(|rule| {
                let name = rule.permission().to_string();
                let def = PermissionDefinition {
                    name: name.clone(),
                    category: rule.resource.as_str().to_string(),
                    roles: rule.roles.iter().copied().collect(),
                    description: permission_description(rule.resource, rule.action),
                };
                (name, def)
            })
            .collect();

        Self { roles, permissions }
    }
}

fn permission_description(resource: Resource, action: Action) -> String {
    let verb = match action {
        Action::Create => "Create",
        Action::Read => "View/list",
        Action::Update => "Modify",
        Action::Delete => "Delete",
    };
    format!("{verb} {} records", resource.as_str().replace('_', " "))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn matrix() -> PermissionMatrix {
        PermissionMatrix::standard().unwrap()
    }

    fn principal(role: Role) -> Principal {
        Principal::new(UserId::new(), role, "user@escola.test")
    }

    fn resource_strategy() -> impl Strategy<Value = Resource> {
        proptest::sample::select(Resource::ALL.to_vec())
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        proptest::sample::select(Action::ALL.to_vec())
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        proptest::sample::select(vec![
            Role::Admin,
            Role::Teacher,
            Role::Treasury,
            Role::Guardian,
            Role::Unknown,
        ])
    }

    proptest! {
        #[test]
        fn unregistered_pairs_are_denied_for_every_role(
            resource in resource_strategy(),
            action in action_strategy(),
            role in role_strategy(),
        ) {
            // A matrix with a single rule leaves every other pair unregistered.
            let sparse = PermissionMatrix::builder()
                .allow(Resource::Dashboard, Action::Read, Role::CANONICAL)
                .unwrap()
                .build();
            prop_assume!(!(resource == Resource::Dashboard && action == Action::Read));

            let denial = authorize(&sparse, &principal(role), resource, action).unwrap_err();
            prop_assert_eq!(denial.code, DenialCode::InsufficientPermissions);
            prop_assert_eq!(denial.kind, DenialKind::PermissionDenied);
        }

        #[test]
        fn unknown_role_is_denied_everywhere(
            resource in resource_strategy(),
            action in action_strategy(),
        ) {
            prop_assert!(authorize(&matrix(), &principal(Role::Unknown), resource, action).is_err());
        }
    }

    #[test]
    fn admin_is_allowed_every_registered_pair() {
        let matrix = matrix();
        let admin = principal(Role::Admin);
        for rule in matrix.rules() {
            assert_eq!(
                authorize(&matrix, &admin, rule.resource, rule.action),
                Ok(()),
                "admin denied {}",
                rule.permission()
            );
        }
    }

    #[test]
    fn standard_matrix_absent_pairs_are_denied() {
        let matrix = matrix();
        let admin = principal(Role::Admin);
        for (resource, action) in [
            (Resource::Dashboard, Action::Create),
            (Resource::Dashboard, Action::Delete),
            (Resource::AuditLogs, Action::Update),
            (Resource::AuditLogs, Action::Delete),
        ] {
            let denial = authorize(&matrix, &admin, resource, action).unwrap_err();
            assert!(denial.reason.contains("no rule configured"));
        }
    }

    #[test]
    fn guardian_cannot_touch_payments_writes() {
        let matrix = matrix();
        let guardian = principal(Role::Guardian);
        assert!(authorize(&matrix, &guardian, Resource::Payments, Action::Read).is_ok());
        assert!(authorize(&matrix, &guardian, Resource::Payments, Action::Update).is_err());
    }

    #[test]
    fn denial_does_not_leak_reason_to_clients() {
        let denial =
            authorize(&matrix(), &principal(Role::Teacher), Resource::Staff, Action::Read).unwrap_err();
        assert_eq!(denial.status(), 403);
        assert!(!denial.public_message().contains("teacher"));
    }

    #[test]
    fn explanation_lists_granting_roles_on_denial() {
        let matrix = matrix();
        let explanation = explain_authorization(
            &matrix,
            &principal(Role::Guardian),
            Permission::new(Resource::Grades, Action::Update),
        );
        assert!(!explanation.granted);
        assert_eq!(explanation.granting_roles, vec![Role::Admin, Role::Teacher]);
        let denial = explanation.denial_reason.unwrap();
        assert_eq!(denial.kind, ExplanationDenialKind::RoleNotGranted);
    }

    #[test]
    fn explanation_reports_unregistered_pair() {
        let explanation = explain_authorization(
            &matrix(),
            &principal(Role::Admin),
            Permission::new(Resource::AuditLogs, Action::Delete),
        );
        assert!(!explanation.granted);
        assert!(explanation.granting_roles.is_empty());
        assert_eq!(
            explanation.denial_reason.unwrap().kind,
            ExplanationDenialKind::NoRuleConfigured
        );
    }

    #[test]
    fn registry_covers_every_rule_and_role() {
        let matrix = matrix();
        let registry = RbacRegistry::from_matrix(&matrix);
        assert_eq!(registry.roles.len(), 4);
        assert_eq!(registry.permissions.len(), matrix.rules().len());
        let guardian = &registry.roles["guardian"];
        assert!(guardian.permissions.contains(&"grades.read".to_string()));
        assert!(!guardian.permissions.contains(&"grades.update".to_string()));
    }
}
