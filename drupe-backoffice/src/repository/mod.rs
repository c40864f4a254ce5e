//! Repository collaborator boundary.
//!
//! Relational persistence of domain entities is out of scope for this
//! service; handlers and services talk to a thin `Repository` trait that
//! returns plain data values. Authorization decisions never traverse
//! repository objects.

mod memory;

pub use memory::{make_user, MemoryRepository};

use crate::models::UserRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Proof that a repository mutation has committed.
///
/// `EventPublisher::publish` demands one, so an event cannot be published
/// for state that was never committed. Only repository implementations in
/// this module tree can mint it.
#[derive(Debug)]
pub struct CommitTag(());

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// One line of a sale.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SaleReceipt {
    pub sale_id: Uuid,
    pub branch_id: String,
    pub total_cents: i64,
    pub line_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockLevel {
    pub branch_id: String,
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeliveryRecord {
    pub delivery_id: Uuid,
    pub branch_id: String,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// Typed lookups and transactional mutations against the external store.
///
/// Mutations return a [`CommitTag`] alongside their result; the tag is
/// minted after the underlying transaction has committed.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    /// Record a failed login. Locks the account when the counter reaches
    /// `lock_threshold`. Returns the new counter value.
    async fn record_login_failure(&self, id: Uuid, lock_threshold: u32) -> Result<u32, RepoError>;

    /// Reset the failed-login counter after a successful authentication.
    async fn clear_login_failures(&self, id: Uuid) -> Result<(), RepoError>;

    async fn set_password_hash(&self, id: Uuid, password_hash: String) -> Result<(), RepoError>;

    /// Verify a 2FA code for the user. The OTP transport is an external
    /// concern; this only answers whether the code is currently valid.
    async fn verify_twofa_code(&self, id: Uuid, code: &str) -> Result<bool, RepoError>;

    async fn branch_exists(&self, branch_id: &str) -> Result<bool, RepoError>;

    async fn branch_name(&self, branch_id: &str) -> Result<Option<String>, RepoError>;

    async fn record_sale(
        &self,
        branch_id: &str,
        cashier: Uuid,
        lines: Vec<SaleLine>,
    ) -> Result<(SaleReceipt, CommitTag), RepoError>;

    async fn adjust_stock(
        &self,
        branch_id: &str,
        product_id: &str,
        delta: i64,
    ) -> Result<(StockLevel, CommitTag), RepoError>;

    async fn record_delivery(
        &self,
        branch_id: &str,
        driver: Uuid,
        reference: String,
    ) -> Result<(DeliveryRecord, CommitTag), RepoError>;
}

impl From<RepoError> for drupe_core::error::AppError {
    fn from(err: RepoError) -> Self {
        use drupe_core::error::AppError;
        match err {
            RepoError::NotFound => AppError::NotFound(anyhow::anyhow!("record not found")),
            RepoError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            RepoError::Storage(e) => AppError::InternalError(e),
        }
    }
}
