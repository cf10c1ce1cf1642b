use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use campus_auth::{Action, Principal, Role};
use campus_core::UserId;

/// What an audit entry records.
///
/// The two security tags keep their stored names so existing audit queries
/// keep matching.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "delete")]
    Delete,
    /// Request refused by the permission matrix or a scope check.
    #[serde(rename = "permissao_insuficiente")]
    PermissionDenied,
    /// Request refused because the principal is a student under 18.
    #[serde(rename = "estudante_menor_idade")]
    MinorBlocked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Read => "read",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::PermissionDenied => "permissao_insuficiente",
            AuditAction::MinorBlocked => "estudante_menor_idade",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            AuditAction::Create,
            AuditAction::Read,
            AuditAction::Update,
            AuditAction::Delete,
            AuditAction::PermissionDenied,
            AuditAction::MinorBlocked,
        ]
        .into_iter()
        .find(|a| a.as_str() == s)
    }
}

impl From<Action> for AuditAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Create => AuditAction::Create,
            Action::Read => AuditAction::Read,
            Action::Update => AuditAction::Update,
            Action::Delete => AuditAction::Delete,
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who made the request, as it was at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalSnapshot {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl From<&Principal> for PrincipalSnapshot {
    fn from(p: &Principal) -> Self {
        Self {
            user_id: p.id,
            email: p.email.clone(),
            role: p.role,
        }
    }
}

/// Row state around a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub before: Option<JsonValue>,
    pub after: Option<JsonValue>,
    pub modified_by: UserId,
    pub modified_at: DateTime<Utc>,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub principal: Option<PrincipalSnapshot>,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub http_method: String,
    pub path: String,
    pub status_code: u16,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_body: Option<JsonValue>,
    pub response_body: Option<JsonValue>,
    pub changes: Option<ChangeSet>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        resource: impl Into<String>,
        http_method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            principal: None,
            action,
            resource: resource.into(),
            resource_id: None,
            http_method: http_method.into(),
            path: path.into(),
            status_code,
            ip: None,
            user_agent: None,
            request_body: None,
            response_body: None,
            changes: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_principal(mut self, principal: &Principal) -> Self {
        self.principal = Some(PrincipalSnapshot::from(principal));
        self
    }

    pub fn with_resource_id(mut self, id: Option<String>) -> Self {
        self.resource_id = id;
        self
    }

    pub fn with_client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }

    pub fn with_bodies(mut self, request: Option<JsonValue>, response: Option<JsonValue>) -> Self {
        self.request_body = request;
        self.response_body = response;
        self
    }

    pub fn with_changes(mut self, changes: Option<ChangeSet>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_error(mut self, message: Option<String>) -> Self {
        self.error_message = message;
        self
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.principal.as_ref().map(|p| p.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_tags_keep_their_stored_names() {
        let json = serde_json::to_value(AuditAction::PermissionDenied).unwrap();
        assert_eq!(json, "permissao_insuficiente");
        let json = serde_json::to_value(AuditAction::MinorBlocked).unwrap();
        assert_eq!(json, "estudante_menor_idade");
        assert_eq!(AuditAction::parse("estudante_menor_idade"), Some(AuditAction::MinorBlocked));
    }

    #[test]
    fn entry_serializes_camel_case() {
        let principal = Principal::new(UserId::new(), Role::Teacher, "t@escola.test");
        let entry = AuditEntry::new(AuditAction::Update, "grades", "PUT", "/grades/1", 403)
            .with_principal(&principal)
            .with_error(Some("denied".to_string()));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["statusCode"], 403);
        assert_eq!(json["httpMethod"], "PUT");
        assert_eq!(json["errorMessage"], "denied");
        assert_eq!(json["principal"]["role"], "teacher");
        assert_eq!(entry.user_id(), Some(principal.id));
    }
}
