//! In-memory repository used by the test suite and the demo deployment.

use super::{CommitTag, DeliveryRecord, RepoError, Repository, SaleLine, SaleReceipt, StockLevel};
use crate::models::{Role, UserRecord};
use crate::utils::password::{hash_password, Password};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct BranchRecord {
    name: String,
}

#[derive(Default)]
pub struct MemoryRepository {
    users: DashMap<Uuid, UserRecord>,
    branches: DashMap<String, BranchRecord>,
    stock: DashMap<(String, String), i64>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demo dataset: two branches and one account per role. Passwords are
    /// `<username without digits>123`.
    pub fn seeded() -> Self {
        let repo = Self::new();
        repo.insert_branch("B1", "Downtown");
        repo.insert_branch("B2", "Harbourside");

        repo.insert_user(make_user("admin", "admin123", Role::Admin, &[]));
        repo.insert_user(make_user("manager1", "manager123", Role::Manager, &["B1", "B2"]));
        repo.insert_user(make_user("staff1", "staff123", Role::Staff, &["B1"]));
        repo.insert_user(make_user("driver1", "driver123", Role::Driver, &["B1"]));
        repo.insert_user(make_user("sales1", "sales123", Role::Sales, &["B1"]));
        repo.insert_user(make_user("inventory1", "inventory123", Role::Inventory, &["B1"]));

        repo.set_stock("B1", "dried-mango", 120);
        repo.set_stock("B1", "dried-apricot", 45);
        repo.set_stock("B2", "dried-mango", 80);
        repo
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    pub fn insert_branch(&self, id: &str, name: &str) {
        self.branches
            .insert(id.to_string(), BranchRecord { name: name.to_string() });
    }

    pub fn set_stock(&self, branch_id: &str, product_id: &str, quantity: i64) {
        self.stock
            .insert((branch_id.to_string(), product_id.to_string()), quantity);
    }
}

pub fn make_user(username: &str, password: &str, role: Role, branches: &[&str]) -> UserRecord {
    let hash = hash_password(&Password::new(password.to_string()))
        .expect("seed password hashing cannot fail");
    UserRecord {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: hash.into_string(),
        role,
        branch_memberships: branches.iter().map(|b| b.to_string()).collect::<BTreeSet<_>>(),
        is_active: true,
        is_locked: false,
        failed_login_count: 0,
        password_changed_at: Utc::now(),
        twofa_required: false,
        twofa_code: None,
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.value().clone()))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn record_login_failure(&self, id: Uuid, lock_threshold: u32) -> Result<u32, RepoError> {
        let mut user = self.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        user.failed_login_count += 1;
        if user.failed_login_count >= lock_threshold {
            user.is_locked = true;
        }
        Ok(user.failed_login_count)
    }

    async fn clear_login_failures(&self, id: Uuid) -> Result<(), RepoError> {
        let mut user = self.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        user.failed_login_count = 0;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: String) -> Result<(), RepoError> {
        let mut user = self.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        user.password_hash = password_hash;
        user.password_changed_at = Utc::now();
        Ok(())
    }

    async fn verify_twofa_code(&self, id: Uuid, code: &str) -> Result<bool, RepoError> {
        let user = self.users.get(&id).ok_or(RepoError::NotFound)?;
        Ok(user.twofa_code.as_deref() == Some(code))
    }

    async fn branch_exists(&self, branch_id: &str) -> Result<bool, RepoError> {
        Ok(self.branches.contains_key(branch_id))
    }

    async fn branch_name(&self, branch_id: &str) -> Result<Option<String>, RepoError> {
        Ok(self.branches.get(branch_id).map(|b| b.name.clone()))
    }

    async fn record_sale(
        &self,
        branch_id: &str,
        _cashier: Uuid,
        lines: Vec<SaleLine>,
    ) -> Result<(SaleReceipt, CommitTag), RepoError> {
        if !self.branches.contains_key(branch_id) {
            return Err(RepoError::NotFound);
        }
        if lines.is_empty() {
            return Err(RepoError::Conflict("sale has no lines".to_string()));
        }
        let mut total = 0i64;
        for line in &lines {
            total += line.unit_price_cents * line.quantity as i64;
            let key = (branch_id.to_string(), line.product_id.clone());
            let mut qty = self.stock.entry(key).or_insert(0);
            *qty -= line.quantity as i64;
        }
        let receipt = SaleReceipt {
            sale_id: Uuid::new_v4(),
            branch_id: branch_id.to_string(),
            total_cents: total,
            line_count: lines.len(),
            created_at: Utc::now(),
        };
        Ok((receipt, CommitTag(())))
    }

    async fn adjust_stock(
        &self,
        branch_id: &str,
        product_id: &str,
        delta: i64,
    ) -> Result<(StockLevel, CommitTag), RepoError> {
        if !self.branches.contains_key(branch_id) {
            return Err(RepoError::NotFound);
        }
        let key = (branch_id.to_string(), product_id.to_string());
        let mut qty = self.stock.entry(key).or_insert(0);
        *qty += delta;
        let level = StockLevel {
            branch_id: branch_id.to_string(),
            product_id: product_id.to_string(),
            quantity: *qty,
        };
        Ok((level, CommitTag(())))
    }

    async fn record_delivery(
        &self,
        branch_id: &str,
        _driver: Uuid,
        reference: String,
    ) -> Result<(DeliveryRecord, CommitTag), RepoError> {
        if !self.branches.contains_key(branch_id) {
            return Err(RepoError::NotFound);
        }
        let record = DeliveryRecord {
            delivery_id: Uuid::new_v4(),
            branch_id: branch_id.to_string(),
            reference,
            created_at: Utc::now(),
        };
        Ok((record, CommitTag(())))
    }
}
