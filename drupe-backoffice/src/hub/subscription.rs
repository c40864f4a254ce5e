use crate::hub::envelope::{Channel, Scope};
use crate::hub::queue::OutboundQueue;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Where a subscription's frames go. The websocket send half in
/// production; tests plug in channel-backed sinks.
#[async_trait]
pub trait ConnectionSink: Send + 'static {
    async fn send_text(&mut self, text: String) -> Result<(), anyhow::Error>;
    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Draining,
}

/// Registry record for one connected client. The queue and cancel token
/// are shared with the writer task; everything else is owned here and
/// mutated only under the registry lock.
pub struct Subscription {
    pub connection_id: Uuid,
    pub session_id: Uuid,
    pub principal_id: Uuid,
    pub channels: HashSet<Channel>,
    pub scope: Scope,
    pub state: SubscriptionState,
    pub queue: Arc<OutboundQueue>,
    pub cancel: CancellationToken,
    pub last_seen: Instant,
}

impl Subscription {
    pub fn wants(&self, channel: Channel, event_scope: &Scope) -> bool {
        if self.state != SubscriptionState::Active || !self.channels.contains(&channel) {
            return false;
        }
        match (&self.scope, event_scope) {
            // Global subscribers see everything; global events reach everyone.
            (Scope::Global(_), _) | (_, Scope::Global(_)) => true,
            (Scope::Branch { branch_id: mine }, Scope::Branch { branch_id: theirs }) => {
                mine == theirs
            }
        }
    }
}
