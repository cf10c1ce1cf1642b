use serde::{Deserialize, Serialize};

/// Canonical role used for RBAC.
///
/// Upstream identity providers hand us free-form role strings; they are mapped
/// exactly once, by [`Role::normalize`]. Anything unrecognized becomes
/// [`Role::Unknown`], which no permission rule ever grants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
    Treasury,
    Guardian,
    Unknown,
}

impl Role {
    /// The four roles a permission rule may grant.
    pub const CANONICAL: [Role; 4] = [Role::Admin, Role::Teacher, Role::Treasury, Role::Guardian];

    /// Total mapping from a raw role string (any case, synonyms included).
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "admin" | "administrador" | "administrator" | "diretor" | "director" => Role::Admin,
            "teacher" | "professor" | "professora" | "docente" => Role::Teacher,
            "treasury" | "tesoureiro" | "tesoureira" | "tesouraria" | "financeiro" => {
                Role::Treasury
            }
            "guardian" | "guardiao" | "guardião" | "encarregado" | "responsavel"
            | "responsável" | "parent" => Role::Guardian,
            _ => Role::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Treasury => "treasury",
            Role::Guardian => "guardian",
            Role::Unknown => "unknown",
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, Role::Unknown)
    }

    pub(crate) fn description(&self) -> &'static str {
        match self {
            Role::Admin => "School administration with full access",
            Role::Teacher => "Teaching staff, limited to the classes they direct",
            Role::Treasury => "Finance office, full access to payments",
            Role::Guardian => "Parent or guardian, limited to their own wards",
            Role::Unknown => "Unrecognized role; denied everywhere",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
