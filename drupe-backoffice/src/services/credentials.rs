use crate::models::{Principal, UserRecord};
use crate::repository::Repository;
use crate::services::ServiceError;
use crate::utils::password::{hash_password, verify_password, Password, PasswordHashString};
use std::sync::Arc;
use uuid::Uuid;

/// Credential store: verifies username+password against the repository
/// and enforces the failed-login lockout policy.
#[derive(Clone)]
pub struct CredentialService {
    repo: Arc<dyn Repository>,
    /// Hash compared against when the username does not exist, so that
    /// unknown-user and wrong-password paths cost the same.
    dummy_hash: PasswordHashString,
    lock_threshold: u32,
}

impl CredentialService {
    pub fn new(repo: Arc<dyn Repository>, lock_threshold: u32) -> Result<Self, anyhow::Error> {
        let dummy_hash = hash_password(&Password::new(Uuid::new_v4().to_string()))?;
        Ok(Self {
            repo,
            dummy_hash,
            lock_threshold,
        })
    }

    /// Verify credentials and return the principal.
    ///
    /// Failure modes, in order: `InvalidCredentials` for unknown users and
    /// wrong passwords (indistinguishable to the caller), `AccountLocked`,
    /// `AccountInactive`. Locked accounts are reported as locked whether
    /// or not the password matched, but only after the hash comparison has
    /// run. Each wrong password increments the failure counter; reaching
    /// the threshold locks the account. Success resets the counter.
    pub async fn verify(&self, username: &str, password: &str) -> Result<Principal, ServiceError> {
        let user = self.repo.find_user_by_username(username).await?;

        let Some(user) = user else {
            // Burn a comparison against the dummy hash to keep the
            // unknown-user timing in line with the mismatch path.
            let _ = self
                .compare_off_thread(password.to_string(), self.dummy_hash.clone())
                .await;
            return Err(ServiceError::InvalidCredentials);
        };

        let password_ok = self
            .compare_off_thread(
                password.to_string(),
                PasswordHashString::new(user.password_hash.clone()),
            )
            .await?;

        if user.is_locked {
            return Err(ServiceError::AccountLocked);
        }

        if !password_ok {
            let count = self
                .repo
                .record_login_failure(user.id, self.lock_threshold)
                .await?;
            tracing::warn!(
                username = %user.username,
                failed_login_count = count,
                "Login failed: wrong password"
            );
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(ServiceError::AccountInactive);
        }

        self.repo.clear_login_failures(user.id).await?;
        Ok(user.principal())
    }

    /// Verify a password for an already-authenticated principal (screen
    /// unlock, password change). Does not count towards lockout.
    pub async fn check_password(
        &self,
        user: &UserRecord,
        password: &str,
    ) -> Result<bool, ServiceError> {
        self.compare_off_thread(
            password.to_string(),
            PasswordHashString::new(user.password_hash.clone()),
        )
        .await
    }

    /// Run the argon2 comparison on the blocking pool. The KDF is
    /// CPU-bound and must not stall the request workers; once started it
    /// runs to completion even if the request future is dropped.
    async fn compare_off_thread(
        &self,
        password: String,
        hash: PasswordHashString,
    ) -> Result<bool, ServiceError> {
        tokio::task::spawn_blocking(move || {
            verify_password(&Password::new(password), &hash).is_ok()
        })
        .await
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("KDF task failed: {}", e)))
    }
}
