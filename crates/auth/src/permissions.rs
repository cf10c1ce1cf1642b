use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Role;

/// Resource families protected by the permission matrix.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Students,
    Guardians,
    Staff,
    Classes,
    Grades,
    Attendance,
    Payments,
    Dashboard,
    Users,
    AuditLogs,
}

impl Resource {
    pub const ALL: [Resource; 10] = [
        Resource::Students,
        Resource::Guardians,
        Resource::Staff,
        Resource::Classes,
        Resource::Grades,
        Resource::Attendance,
        Resource::Payments,
        Resource::Dashboard,
        Resource::Users,
        Resource::AuditLogs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Students => "students",
            Resource::Guardians => "guardians",
            Resource::Staff => "staff",
            Resource::Classes => "classes",
            Resource::Grades => "grades",
            Resource::Attendance => "attendance",
            Resource::Payments => "payments",
            Resource::Dashboard => "dashboard",
            Resource::Users => "users",
            Resource::AuditLogs => "audit_logs",
        }
    }

    /// Parse a resource name; also accepts the URL form (`audit-logs`).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Resource::ALL.into_iter().find(|r| r.as_str() == normalized)
    }

    /// Financial resources are the only ones where Treasury skips ownership checks.
    pub fn is_financial(&self) -> bool {
        matches!(self, Resource::Payments)
    }
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();
        Action::ALL.into_iter().find(|a| a.as_str() == normalized)
    }

    /// Map an HTTP method name to the CRUD action it performs.
    pub fn from_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "POST" => Some(Action::Create),
            "GET" | "HEAD" => Some(Action::Read),
            "PUT" | "PATCH" => Some(Action::Update),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission identifier (`resource.action`, e.g. "grades.update").
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    pub fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

impl core::str::FromStr for Permission {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, action) = s
            .rsplit_once('.')
            .ok_or_else(|| MatrixError::UnknownPermission(s.to_string()))?;
        match (Resource::parse(resource), Action::parse(action)) {
            (Some(resource), Some(action)) => Ok(Self { resource, action }),
            _ => Err(MatrixError::UnknownPermission(s.to_string())),
        }
    }
}

/// One row of the matrix: the roles allowed to perform `action` on `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionRule {
    pub resource: Resource,
    pub action: Action,
    pub roles: BTreeSet<Role>,
}

impl PermissionRule {
    pub fn permission(&self) -> Permission {
        Permission::new(self.resource, self.action)
    }

    pub fn allows(&self, role: Role) -> bool {
        role.is_canonical() && self.roles.contains(&role)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("duplicate permission rule for '{0}'")]
    DuplicateRule(Permission),

    #[error("role '{0}' cannot be granted a permission")]
    UngrantableRole(Role),

    #[error("unknown permission '{0}'")]
    UnknownPermission(String),
}

/// Static resource × action → allowed roles table.
///
/// Built once at startup and only read afterwards; share it behind an `Arc`.
/// Pairs without a rule are denied.
#[derive(Debug, Clone)]
pub struct PermissionMatrix {
    rules: HashMap<Permission, PermissionRule>,
}

impl PermissionMatrix {
    pub fn builder() -> MatrixBuilder {
        MatrixBuilder::default()
    }

    /// The school's standard policy.
    pub fn standard() -> Result<Self, MatrixError> {
        use Action::*;
        use Resource::*;
        use Role::*;

        Self::builder()
            .allow(Students, Create, [Admin])?
            .allow(Students, Read, [Admin, Teacher, Treasury, Guardian])?
            .allow(Students, Update, [Admin])?
            .allow(Students, Delete, [Admin])?
            .allow(Guardians, Create, [Admin])?
            .allow(Guardians, Read, [Admin, Treasury, Guardian])?
            .allow(Guardians, Update, [Admin])?
            .allow(Guardians, Delete, [Admin])?
            .allow(Staff, Create, [Admin])?
            .allow(Staff, Read, [Admin])?
            .allow(Staff, Update, [Admin])?
            .allow(Staff, Delete, [Admin])?
            .allow(Classes, Create, [Admin])?
            .allow(Classes, Read, [Admin, Teacher])?
            .allow(Classes, Update, [Admin, Teacher])?
            .allow(Classes, Delete, [Admin])?
            .allow(Grades, Create, [Admin, Teacher])?
            .allow(Grades, Read, [Admin, Teacher, Guardian])?
            .allow(Grades, Update, [Admin, Teacher])?
            .allow(Grades, Delete, [Admin])?
            .allow(Attendance, Create, [Admin, Teacher])?
            .allow(Attendance, Read, [Admin, Teacher, Guardian])?
            .allow(Attendance, Update, [Admin, Teacher])?
            .allow(Attendance, Delete, [Admin])?
            .allow(Payments, Create, [Admin, Treasury])?
            .allow(Payments, Read, [Admin, Treasury, Guardian])?
            .allow(Payments, Update, [Admin, Treasury])?
            .allow(Payments, Delete, [Admin])?
            .allow(Dashboard, Read, [Admin, Teacher, Treasury, Guardian])?
            .allow(Users, Create, [Admin])?
            .allow(Users, Read, [Admin])?
            .allow(Users, Update, [Admin])?
            .allow(Users, Delete, [Admin])?
            .allow(AuditLogs, Read, [Admin])
            .map(MatrixBuilder::build)
    }

    pub fn rule(&self, resource: Resource, action: Action) -> Option<&PermissionRule> {
        self.rules.get(&Permission::new(resource, action))
    }

    pub fn allows(&self, role: Role, resource: Resource, action: Action) -> bool {
        self.rule(resource, action).is_some_and(|r| r.allows(role))
    }

    /// All rules, sorted by resource then action.
    pub fn rules(&self) -> Vec<&PermissionRule> {
        let mut rules: Vec<&PermissionRule> = self.rules.values().collect();
        rules.sort_by_key(|r| r.permission());
        rules
    }

    /// Permissions granted to `role`, sorted.
    pub fn permissions_for(&self, role: Role) -> Vec<Permission> {
        self.rules()
            .into_iter()
            .filter(|r| r.allows(role))
            .map(PermissionRule::permission)
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MatrixBuilder {
    rules: HashMap<Permission, PermissionRule>,
}

impl MatrixBuilder {
    /// Register the single rule for `(resource, action)`.
    pub fn allow(
        mut self,
        resource: Resource,
        action: Action,
        roles: impl IntoIterator<Item = Role>,
    ) -> Result<Self, MatrixError> {
        let permission = Permission::new(resource, action);
        if self.rules.contains_key(&permission) {
            return Err(MatrixError::DuplicateRule(permission));
        }

        let roles: BTreeSet<Role> = roles.into_iter().collect();
        if let Some(bad) = roles.iter().find(|r| !r.is_canonical()) {
            return Err(MatrixError::UngrantableRole(*bad));
        }

        self.rules.insert(
            permission,
            PermissionRule {
                resource,
                action,
                roles,
            },
        );
        Ok(self)
    }

    pub fn build(self) -> PermissionMatrix {
        PermissionMatrix { rules: self.rules }
    }
}
