//! Principal model - the authenticated identity for a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;
use uuid::Uuid;

/// Staff roles. The capability matrix in `services::authz` is the single
/// source of truth for what each role may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Driver,
    Sales,
    Inventory,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
            Role::Driver => "driver",
            Role::Sales => "sales",
            Role::Inventory => "inventory",
        }
    }

    /// Admin and Manager see every branch; all other roles are confined
    /// to their memberships.
    pub fn is_managerial(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

/// The authenticated identity carried through the request gate.
///
/// A read-only view over the repository's user record; never mutated by
/// handlers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    /// Branch ids this principal belongs to. Empty means no branch scope.
    pub branch_memberships: BTreeSet<String>,
    #[serde(skip)]
    pub twofa_required: bool,
}

impl Principal {
    pub fn is_member_of(&self, branch_id: &str) -> bool {
        self.branch_memberships.contains(branch_id)
    }
}

/// Plain user record as stored by the external repository.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub branch_memberships: BTreeSet<String>,
    pub is_active: bool,
    pub is_locked: bool,
    pub failed_login_count: u32,
    pub password_changed_at: DateTime<Utc>,
    pub twofa_required: bool,
    /// Enrolled 2FA secret/code, verified through the repository. `None`
    /// when 2FA is not enrolled.
    pub twofa_code: Option<String>,
}

impl UserRecord {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            branch_memberships: self.branch_memberships.clone(),
            twofa_required: self.twofa_required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"inventory\"").unwrap(),
            Role::Inventory
        );
    }

    #[test]
    fn managerial_roles() {
        assert!(Role::Admin.is_managerial());
        assert!(Role::Manager.is_managerial());
        assert!(!Role::Staff.is_managerial());
        assert!(!Role::Driver.is_managerial());
        assert!(!Role::Sales.is_managerial());
        assert!(!Role::Inventory.is_managerial());
    }
}
