//! Session model - a principal's active working context between login and
//! logout.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub id: Uuid,
    pub principal_id: Uuid,
    /// Unset until the client selects a branch.
    pub selected_branch_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Soft lock: the session survives but requires re-auth to unlock.
    pub is_locked: bool,
    pub remember_me: bool,
    /// Advisory ip + user-agent hash; not used for authorization.
    pub client_fingerprint: String,
}

impl Session {
    pub fn new(
        principal_id: Uuid,
        client_fingerprint: String,
        remember_me: bool,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            principal_id,
            selected_branch_id: None,
            started_at: now,
            last_activity_at: now,
            expires_at: now + ttl,
            is_locked: false,
            remember_me,
            client_fingerprint,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_ttl: Duration) -> bool {
        now - self.last_activity_at > idle_ttl
    }
}

/// Advisory client fingerprint: hex sha256 over ip and user-agent.
pub fn client_fingerprint(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(user_agent.as_bytes());
    hex::encode(hasher.finalize())
}
