use serde::Serialize;

use campus_core::{RecordId, UserId};

use crate::{Decision, Denial, DenialCode, Principal, Resource, Role};

/// Which owner of a record an ownership lookup resolves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    /// The guardian responsible for the student the record belongs to.
    Guardian,
    /// The teacher directing the class the record belongs to.
    ClassDirector,
}

/// A single owner read still needed before the scope check can decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipLookup {
    pub resource: Resource,
    pub id: RecordId,
    pub owner_kind: OwnerKind,
    pub expected: UserId,
    pub deny_code: DenialCode,
}

impl OwnershipLookup {
    /// Allow iff the resolved owner is the requesting principal.
    ///
    /// An owner that could not be resolved is a denial.
    pub fn resolve(&self, owner: Option<UserId>) -> Decision {
        match owner {
            Some(owner) if owner == self.expected => Ok(()),
            Some(owner) => Err(Denial::scope(
                self.deny_code,
                format!(
                    "{} {} is owned by {owner}, not {}",
                    self.resource, self.id, self.expected
                ),
            )),
            None => Err(Denial::scope(
                self.deny_code,
                format!(
                    "no {:?} owner found for {} {}",
                    self.owner_kind, self.resource, self.id
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeStep {
    Bypass,
    Lookup(OwnershipLookup),
    Deny(Denial),
}

/// Decide what the ownership check for a scoped route needs.
///
/// `route_resource` is the family the route belongs to (it drives the
/// Treasury bypass); `target_resource` and `target_id` name the record whose
/// owner must match the principal.
pub fn plan_scope(
    principal: &Principal,
    route_resource: Resource,
    target_resource: Resource,
    target_id: Option<RecordId>,
) -> ScopeStep {
    if bypasses_scope(principal, route_resource) {
        return ScopeStep::Bypass;
    }

    let Some(id) = target_id else {
        return ScopeStep::Deny(Denial::missing_identifier(route_resource));
    };

    let (owner_kind, deny_code) = match principal.role {
        Role::Guardian => (OwnerKind::Guardian, DenialCode::WardAccessDenied),
        Role::Teacher if target_resource == Resource::Classes => {
            (OwnerKind::ClassDirector, DenialCode::ClassAccessDenied)
        }
        Role::Teacher => (OwnerKind::ClassDirector, DenialCode::StudentAccessDenied),
        role => {
            return ScopeStep::Deny(Denial::scope(
                family_code(target_resource),
                format!("role '{role}' has no ownership scope on {target_resource}"),
            ));
        }
    };

    ScopeStep::Lookup(OwnershipLookup {
        resource: target_resource,
        id,
        owner_kind,
        expected: principal.id,
        deny_code,
    })
}

/// Judge an update that rewrites the owning user of a record (`director_id`).
///
/// Outside the bypassing roles, a principal may only name itself as the new
/// owner; a value that is not a user id is a missing identifier.
pub fn check_owner_reassignment(
    principal: &Principal,
    route_resource: Resource,
    new_owner: Option<UserId>,
) -> Decision {
    if bypasses_scope(principal, route_resource) {
        return Ok(());
    }
    match new_owner {
        Some(owner) if owner == principal.id => Ok(()),
        Some(owner) => Err(Denial::scope(
            family_code(route_resource),
            format!("{} may not hand {route_resource} over to {owner}", principal.id),
        )),
        None => Err(Denial::missing_identifier(route_resource)),
    }
}

fn bypasses_scope(principal: &Principal, route_resource: Resource) -> bool {
    match principal.role {
        Role::Admin => true,
        Role::Treasury => route_resource.is_financial(),
        _ => false,
    }
}

fn family_code(resource: Resource) -> DenialCode {
    match resource {
        Resource::Classes => DenialCode::ClassAccessDenied,
        Resource::Guardians => DenialCode::WardAccessDenied,
        _ => DenialCode::StudentAccessDenied,
    }
}
