//! Broadcast hub: single-process one-to-many fan-out of domain events to
//! websocket subscribers.
//!
//! The registry lock covers routing decisions only. Each subscription's
//! socket is owned by exactly one writer task; every other component
//! talks to it by pushing onto its outbound queue.

pub mod envelope;
pub mod queue;
pub mod subscription;

pub use envelope::{Channel, ClientMessage, ControlMessage, Event, Outbound, Scope};
pub use queue::{DropPolicy, OutboundQueue, PushOutcome};
pub use subscription::{ConnectionSink, Subscription, SubscriptionState};

use crate::services::metrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// Ingress queue full; the publisher decides whether to coalesce or
    /// drop.
    #[error("broadcast ingress full")]
    Backpressure,
    #[error("hub is draining")]
    Draining,
}

/// Default per-channel drop policy. Stock updates are idempotent
/// snapshots so the latest wins; the rest are discrete facts that are
/// dropped rather than merged.
pub fn default_policy(channel: Channel) -> DropPolicy {
    match channel {
        Channel::StockUpdate => DropPolicy::CoalesceLatest,
        Channel::NewSale | Channel::LowStockAlert | Channel::NewDelivery => DropPolicy::DropNewest,
    }
}

struct HubShared {
    registry: Mutex<HashMap<Uuid, Subscription>>,
    draining: AtomicBool,
    max_outbound: usize,
}

impl HubShared {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Subscription>> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Route one event to every matching subscription. Policy failures
    /// that demand disconnection are applied after the enqueue pass.
    fn route(&self, event: Event) {
        let policy = default_policy(event.channel);
        let mut to_disconnect = Vec::new();
        {
            let registry = self.lock();
            for sub in registry.values() {
                if !sub.wants(event.channel, &event.scope) {
                    continue;
                }
                match sub.queue.push_event(event.clone(), policy) {
                    PushOutcome::Queued | PushOutcome::Coalesced => {}
                    PushOutcome::DroppedNewest => {
                        metrics::record_hub_drop(policy.as_str());
                        tracing::debug!(
                            connection_id = %sub.connection_id,
                            channel = event.channel.as_str(),
                            "Outbound queue full; event dropped"
                        );
                    }
                    PushOutcome::Disconnect => {
                        metrics::record_hub_drop(policy.as_str());
                        to_disconnect.push(sub.connection_id);
                    }
                }
            }
        }
        for connection_id in to_disconnect {
            tracing::warn!(%connection_id, "Slow subscriber disconnected by drop policy");
            self.remove(connection_id);
        }
    }

    fn remove(&self, connection_id: Uuid) {
        let removed = self.lock().remove(&connection_id);
        if let Some(sub) = removed {
            sub.queue.close();
            sub.cancel.cancel();
            metrics::ws_connection_closed();
            tracing::debug!(%connection_id, "Subscription removed");
        }
    }
}

pub struct BroadcastHub {
    shared: Arc<HubShared>,
    ingress: mpsc::Sender<Event>,
}

impl BroadcastHub {
    /// Build the hub and start its router and liveness tasks.
    pub fn new(ingress_capacity: usize, max_outbound: usize, ping_interval: Duration) -> Arc<Self> {
        let shared = Arc::new(HubShared {
            registry: Mutex::new(HashMap::new()),
            draining: AtomicBool::new(false),
            max_outbound,
        });

        let (tx, mut rx) = mpsc::channel::<Event>(ingress_capacity);

        let router_shared = shared.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                router_shared.route(event);
            }
        });

        let liveness_shared = shared.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ping_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let stale: Vec<Uuid> = {
                    let registry = liveness_shared.lock();
                    registry
                        .values()
                        .filter(|s| s.last_seen.elapsed() > ping_interval * 2)
                        .map(|s| s.connection_id)
                        .collect()
                };
                for connection_id in stale {
                    tracing::info!(%connection_id, "No ping within liveness window; closing");
                    liveness_shared.remove(connection_id);
                }
            }
        });

        Arc::new(Self { shared, ingress: tx })
    }

    /// Non-blocking publish onto the ingress queue. Only the event
    /// publisher calls this; it owns the commit-ordering contract.
    pub(crate) fn try_publish(&self, event: Event) -> Result<(), HubError> {
        if self.shared.draining.load(Ordering::Acquire) {
            return Err(HubError::Draining);
        }
        self.ingress.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => HubError::Draining,
        })
    }

    /// Register a new connection and start its writer task. The
    /// subscription starts with no channels; a `subscribe` frame arms it.
    pub fn register(
        &self,
        session_id: Uuid,
        principal_id: Uuid,
        sink: Box<dyn ConnectionSink>,
    ) -> Result<Uuid, HubError> {
        if self.shared.draining.load(Ordering::Acquire) {
            return Err(HubError::Draining);
        }

        let connection_id = Uuid::new_v4();
        let queue = Arc::new(OutboundQueue::new(self.shared.max_outbound));
        let cancel = CancellationToken::new();

        self.shared.lock().insert(
            connection_id,
            Subscription {
                connection_id,
                session_id,
                principal_id,
                channels: Default::default(),
                scope: Scope::global(),
                state: SubscriptionState::Active,
                queue: queue.clone(),
                cancel: cancel.clone(),
                last_seen: Instant::now(),
            },
        );
        metrics::ws_connection_opened();

        let shared = self.shared.clone();
        tokio::spawn(run_writer(connection_id, queue, sink, cancel, shared));

        Ok(connection_id)
    }

    /// Apply one inbound client frame and refresh liveness.
    pub fn handle_client_message(
        &self,
        connection_id: Uuid,
        msg: ClientMessage,
        session_branch: Option<String>,
    ) {
        let mut registry = self.shared.lock();
        let Some(sub) = registry.get_mut(&connection_id) else {
            return;
        };
        sub.last_seen = Instant::now();

        match msg {
            ClientMessage::Ping { timestamp } => {
                sub.queue.push_control(ControlMessage::Pong { timestamp });
            }
            ClientMessage::Subscribe { channels, scope } => {
                sub.channels.extend(channels.iter().copied());
                sub.scope = scope.unwrap_or_else(|| match session_branch {
                    Some(branch_id) => Scope::branch(branch_id),
                    None => Scope::global(),
                });
                sub.queue.push_control(ControlMessage::Subscribed { channels });
            }
            ClientMessage::Unsubscribe { channels } => {
                for channel in channels {
                    sub.channels.remove(&channel);
                }
            }
        }
    }

    pub fn remove(&self, connection_id: Uuid) {
        self.shared.remove(connection_id);
    }

    /// Close every session's subscriptions (logout, password change).
    pub fn remove_for_session(&self, session_id: Uuid) {
        let ids: Vec<Uuid> = {
            let registry = self.shared.lock();
            registry
                .values()
                .filter(|s| s.session_id == session_id)
                .map(|s| s.connection_id)
                .collect()
        };
        for connection_id in ids {
            self.shared.remove(connection_id);
        }
    }

    pub fn remove_for_principal(&self, principal_id: Uuid) {
        let ids: Vec<Uuid> = {
            let registry = self.shared.lock();
            registry
                .values()
                .filter(|s| s.principal_id == principal_id)
                .map(|s| s.connection_id)
                .collect()
        };
        for connection_id in ids {
            self.shared.remove(connection_id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.shared.lock().len()
    }

    /// Graceful drain: refuse new work, tell subscribers, give writers
    /// `deadline` to flush, then force-close whatever is left.
    pub async fn drain(&self, deadline: Duration) {
        self.shared.draining.store(true, Ordering::Release);
        {
            let mut registry = self.shared.lock();
            for sub in registry.values_mut() {
                sub.state = SubscriptionState::Draining;
                sub.queue.push_control(ControlMessage::ServerDraining);
                sub.queue.close();
            }
        }

        let flushed = async {
            while self.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        if tokio::time::timeout(deadline, flushed).await.is_err() {
            tracing::warn!("Drain deadline expired; force-closing subscriptions");
        }

        let ids: Vec<Uuid> = self.shared.lock().keys().copied().collect();
        for connection_id in ids {
            self.shared.remove(connection_id);
        }
    }
}

/// Single-owner writer: drains the outbound queue into the sink until
/// the queue closes, the connection fails, or the hub cancels it.
async fn run_writer(
    connection_id: Uuid,
    queue: Arc<OutboundQueue>,
    mut sink: Box<dyn ConnectionSink>,
    cancel: CancellationToken,
    shared: Arc<HubShared>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = queue.pop() => {
                let Some(item) = item else { break };
                if let Err(e) = sink.send_text(item.to_json()).await {
                    tracing::debug!(%connection_id, error = %e, "Socket write failed");
                    break;
                }
            }
        }
    }
    sink.close().await;
    shared.remove(connection_id);
}
