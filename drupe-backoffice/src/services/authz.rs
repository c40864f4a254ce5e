//! Pure authorization engine.
//!
//! One decision function over the role/capability matrix plus branch
//! scope. No I/O, no clocks; same inputs, same decision. Both denial
//! kinds surface as `forbidden` on the wire but are distinguished here
//! so logs can tell a capability miss from a branch-scope miss.

use crate::models::{Principal, Role};
use serde::Serialize;

/// Named operations the engine understands. Routes declare one of
/// these; handlers never re-check roles themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    UsersManage,
    ProductsManage,
    SuppliersManage,
    ProcurementManage,
    ReportsView,
    SalesVoid,
    SalesProcess,
    SalesReports,
    InventoryManage,
    DeliveriesManage,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::UsersManage => "users.manage",
            Capability::ProductsManage => "products.manage",
            Capability::SuppliersManage => "suppliers.manage",
            Capability::ProcurementManage => "procurement.manage",
            Capability::ReportsView => "reports.view",
            Capability::SalesVoid => "sales.void",
            Capability::SalesProcess => "sales.process",
            Capability::SalesReports => "sales.reports",
            Capability::InventoryManage => "inventory.manage",
            Capability::DeliveriesManage => "deliveries.manage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The role does not carry the capability.
    Capability,
    /// The capability is carried but the target branch is out of scope.
    BranchScope,
}

/// Does the role carry the capability at all, branch aside.
pub fn role_allows(role: Role, capability: Capability) -> bool {
    use Capability::*;
    match capability {
        UsersManage | SalesVoid => role == Role::Admin,
        ProductsManage | SuppliersManage | ProcurementManage | ReportsView | SalesReports => {
            role.is_managerial()
        }
        SalesProcess => matches!(role, Role::Admin | Role::Manager | Role::Staff | Role::Sales),
        InventoryManage => {
            matches!(role, Role::Admin | Role::Manager | Role::Staff | Role::Inventory)
        }
        DeliveriesManage => matches!(role, Role::Admin | Role::Manager | Role::Driver),
    }
}

/// May the principal act on the branch. Managerial roles see every
/// branch; everyone else only their memberships.
pub fn branch_allows(principal: &Principal, branch_id: &str) -> bool {
    principal.role.is_managerial() || principal.is_member_of(branch_id)
}

/// Proof that a branch passed the scope check for a principal. Minted
/// only by [`grant_branch`], so callers that record a branch selection
/// cannot skip the check.
#[derive(Debug)]
pub struct BranchGrant {
    branch_id: String,
}

impl BranchGrant {
    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    pub(crate) fn into_branch_id(self) -> String {
        self.branch_id
    }
}

/// Check branch scope and mint the grant the session registry requires.
pub fn grant_branch(principal: &Principal, branch_id: &str) -> Result<BranchGrant, Denial> {
    if branch_allows(principal, branch_id) {
        Ok(BranchGrant {
            branch_id: branch_id.to_string(),
        })
    } else {
        Err(Denial::BranchScope)
    }
}

/// Full decision: capability first, then branch scope if a target
/// branch is named.
pub fn authorize(
    principal: &Principal,
    capability: Capability,
    target_branch: Option<&str>,
) -> Result<(), Denial> {
    if !role_allows(principal.role, capability) {
        return Err(Denial::Capability);
    }
    if let Some(branch_id) = target_branch {
        if !branch_allows(principal, branch_id) {
            return Err(Denial::BranchScope);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn principal(role: Role, branches: &[&str]) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "t".into(),
            role,
            branch_memberships: branches.iter().map(|b| b.to_string()).collect::<BTreeSet<_>>(),
            twofa_required: false,
        }
    }

    const ROLES: [Role; 6] = [
        Role::Admin,
        Role::Manager,
        Role::Staff,
        Role::Driver,
        Role::Sales,
        Role::Inventory,
    ];

    #[test]
    fn capability_matrix() {
        use Capability::*;
        use Role::*;
        // (capability, roles allowed)
        let matrix: &[(Capability, &[Role])] = &[
            (UsersManage, &[Admin]),
            (ProductsManage, &[Admin, Manager]),
            (SuppliersManage, &[Admin, Manager]),
            (ProcurementManage, &[Admin, Manager]),
            (ReportsView, &[Admin, Manager]),
            (SalesReports, &[Admin, Manager]),
            (SalesVoid, &[Admin]),
            (SalesProcess, &[Admin, Manager, Staff, Sales]),
            (InventoryManage, &[Admin, Manager, Staff, Inventory]),
            (DeliveriesManage, &[Admin, Manager, Driver]),
        ];
        for (capability, allowed) in matrix {
            for role in ROLES {
                let expected = allowed.contains(&role);
                assert_eq!(
                    role_allows(role, *capability),
                    expected,
                    "{:?} x {}",
                    role,
                    capability.as_str()
                );
            }
        }
    }

    #[test]
    fn branch_scope_binds_non_managerial_roles() {
        let staff = principal(Role::Staff, &["B1"]);
        assert!(authorize(&staff, Capability::SalesProcess, Some("B1")).is_ok());
        assert_eq!(
            authorize(&staff, Capability::SalesProcess, Some("B2")),
            Err(Denial::BranchScope)
        );

        let manager = principal(Role::Manager, &["B1"]);
        assert!(authorize(&manager, Capability::SalesProcess, Some("B2")).is_ok());
        let admin = principal(Role::Admin, &[]);
        assert!(authorize(&admin, Capability::SalesProcess, Some("B2")).is_ok());
    }

    #[test]
    fn capability_deny_wins_over_branch_deny() {
        // Driver lacks sales.process entirely; the denial must name the
        // capability even though the branch would also fail.
        let driver = principal(Role::Driver, &[]);
        assert_eq!(
            authorize(&driver, Capability::SalesProcess, Some("B9")),
            Err(Denial::Capability)
        );
    }

    #[test]
    fn no_target_branch_skips_scope_check() {
        let sales = principal(Role::Sales, &[]);
        assert!(authorize(&sales, Capability::SalesProcess, None).is_ok());
    }
}
