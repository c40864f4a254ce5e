use crate::models::Session;
use crate::services::authz::BranchGrant;
use crate::services::ServiceError;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

const STRIPES: usize = 16;

/// In-memory session registry, striped to keep lock contention off the
/// request path. Sessions live here from login to logout; a token whose
/// session is gone is dead regardless of its own expiry.
pub struct SessionRegistry {
    stripes: Vec<RwLock<HashMap<Uuid, Session>>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        let stripes = (0..STRIPES).map(|_| RwLock::new(HashMap::new())).collect();
        Self { stripes, idle_ttl }
    }

    fn stripe(&self, id: Uuid) -> &RwLock<HashMap<Uuid, Session>> {
        &self.stripes[id.as_bytes()[0] as usize % STRIPES]
    }

    fn poisoned() -> ServiceError {
        ServiceError::Internal(anyhow::anyhow!("session stripe lock poisoned"))
    }

    /// Open a session for a principal. Any existing non-remember-me
    /// session from the same client fingerprint is evicted first, so a
    /// repeat login from the same device replaces rather than accumulates.
    pub fn open(
        &self,
        principal_id: Uuid,
        client_fingerprint: String,
        remember_me: bool,
        ttl: Duration,
    ) -> Result<Session, ServiceError> {
        for stripe in &self.stripes {
            let mut map = stripe.write().map_err(|_| Self::poisoned())?;
            map.retain(|_, s| {
                s.remember_me
                    || s.principal_id != principal_id
                    || s.client_fingerprint != client_fingerprint
            });
        }

        let session = Session::new(principal_id, client_fingerprint, remember_me, ttl);
        let mut map = self.stripe(session.id).write().map_err(|_| Self::poisoned())?;
        map.insert(session.id, session.clone());
        Ok(session)
    }

    /// Look up a session on the request path. Expired and idle sessions
    /// are evicted here rather than waiting for the sweep; live ones get
    /// their activity timestamp refreshed.
    pub fn touch(&self, id: Uuid) -> Result<Session, ServiceError> {
        let mut map = self.stripe(id).write().map_err(|_| Self::poisoned())?;
        let now = Utc::now();
        let Some(session) = map.get_mut(&id) else {
            return Err(ServiceError::SessionNotFound);
        };
        if session.is_expired(now) || session.is_idle(now, self.idle_ttl) {
            map.remove(&id);
            return Err(ServiceError::SessionNotFound);
        }
        session.last_activity_at = now;
        Ok(session.clone())
    }

    /// Read a session without refreshing its activity timestamp.
    pub fn get(&self, id: Uuid) -> Result<Session, ServiceError> {
        let map = self.stripe(id).read().map_err(|_| Self::poisoned())?;
        map.get(&id).cloned().ok_or(ServiceError::SessionNotFound)
    }

    /// Record a branch selection. Takes the grant minted by the scope
    /// check so an out-of-scope branch can never land on a session.
    pub fn select_branch(&self, id: Uuid, grant: BranchGrant) -> Result<Session, ServiceError> {
        self.update(id, |s| s.selected_branch_id = Some(grant.into_branch_id()))
    }

    pub fn lock(&self, id: Uuid) -> Result<Session, ServiceError> {
        self.update(id, |s| s.is_locked = true)
    }

    pub fn unlock(&self, id: Uuid) -> Result<Session, ServiceError> {
        self.update(id, |s| s.is_locked = false)
    }

    fn update(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session),
    ) -> Result<Session, ServiceError> {
        let mut map = self.stripe(id).write().map_err(|_| Self::poisoned())?;
        let Some(session) = map.get_mut(&id) else {
            return Err(ServiceError::SessionNotFound);
        };
        f(session);
        Ok(session.clone())
    }

    /// Close one session. Returns whether it existed.
    pub fn close(&self, id: Uuid) -> Result<bool, ServiceError> {
        let mut map = self.stripe(id).write().map_err(|_| Self::poisoned())?;
        Ok(map.remove(&id).is_some())
    }

    /// Close every session for a principal (password change, admin
    /// deactivation). Returns how many were closed.
    pub fn close_all_for_principal(&self, principal_id: Uuid) -> Result<usize, ServiceError> {
        let mut closed = 0;
        for stripe in &self.stripes {
            let mut map = stripe.write().map_err(|_| Self::poisoned())?;
            let before = map.len();
            map.retain(|_, s| s.principal_id != principal_id);
            closed += before - map.len();
        }
        Ok(closed)
    }

    /// Evict expired and idle sessions. Returns how many were removed.
    pub fn sweep(&self) -> Result<usize, ServiceError> {
        let now = Utc::now();
        let mut removed = 0;
        for stripe in &self.stripes {
            let mut map = stripe.write().map_err(|_| Self::poisoned())?;
            let before = map.len();
            map.retain(|_, s| !s.is_expired(now) && !s.is_idle(now, self.idle_ttl));
            removed += before - map.len();
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.stripes
            .iter()
            .map(|s| s.read().map(|m| m.len()).unwrap_or(0))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background eviction of idle and expired sessions.
pub fn spawn_idle_sweep(registry: Arc<SessionRegistry>, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match registry.sweep() {
                Ok(removed) if removed > 0 => {
                    tracing::debug!(removed, "Session sweep evicted idle sessions");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Session sweep failed"),
            }
        }
    });
}
