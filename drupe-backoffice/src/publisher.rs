//! Publish side of the broadcast path.
//!
//! `publish` takes a [`CommitTag`] reference, so a handler can only emit
//! events for repository work that has already committed. Backpressure
//! from the hub is absorbed here: stock updates coalesce into a pending
//! map and are retried by a flush task; discrete events are dropped with
//! a warning.

use crate::hub::{BroadcastHub, Channel, Event, HubError, Scope};
use crate::repository::CommitTag;
use crate::services::metrics;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const FLUSH_PERIOD: Duration = Duration::from_millis(250);

type PendingMap = HashMap<(String, String), Event>;

#[derive(Clone)]
pub struct EventPublisher {
    hub: Arc<BroadcastHub>,
    pending: Arc<Mutex<PendingMap>>,
}

impl EventPublisher {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        let publisher = Self {
            hub,
            pending: Arc::new(Mutex::new(HashMap::new())),
        };
        publisher.spawn_flush_task();
        publisher
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingMap> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publish an event for committed repository state. Never fails the
    /// caller; hub trouble degrades to coalescing or dropping.
    pub fn publish(&self, _commit: &CommitTag, event: Event) {
        match self.hub.try_publish(event.clone()) {
            Ok(()) => {}
            Err(HubError::Backpressure) => match event.coalesce_key() {
                Some(key) => {
                    // Latest value wins for a given (branch, product).
                    self.lock_pending().insert(key, event);
                }
                None => {
                    tracing::warn!(
                        channel = event.channel.as_str(),
                        "Broadcast ingress full; event dropped"
                    );
                    metrics::record_hub_drop("ingress");
                }
            },
            Err(HubError::Draining) => {
                tracing::debug!("Event discarded; hub is draining");
            }
        }
    }

    fn spawn_flush_task(&self) {
        let hub = self.hub.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FLUSH_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let held: Vec<Event> = {
                    let mut map = match pending.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    map.drain().map(|(_, event)| event).collect()
                };
                for event in held {
                    match hub.try_publish(event.clone()) {
                        Ok(()) | Err(HubError::Draining) => {}
                        Err(HubError::Backpressure) => {
                            if let Some(key) = event.coalesce_key() {
                                let mut map = match pending.lock() {
                                    Ok(guard) => guard,
                                    Err(poisoned) => poisoned.into_inner(),
                                };
                                // A newer value may have arrived meanwhile.
                                map.entry(key).or_insert(event);
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Synthetic stock updates for demos and load testing. Off in
/// production configuration; events still respect channel filtering
/// because they flow through the normal hub path.
pub fn spawn_demo_emitter(hub: Arc<BroadcastHub>, interval: Duration) {
    const BRANCHES: [&str; 2] = ["B1", "B2"];
    const PRODUCTS: [&str; 3] = ["dried-mango", "dried-fig", "dried-apricot"];

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut step: usize = 0;
        loop {
            ticker.tick().await;
            let branch = BRANCHES[step % BRANCHES.len()];
            let product = PRODUCTS[step % PRODUCTS.len()];
            let quantity = 40 + ((step * 17) % 100) as i64;
            let event = Event::new(
                Channel::StockUpdate,
                Scope::branch(branch),
                json!({ "product_id": product, "quantity": quantity, "synthetic": true }),
            );
            if let Err(e) = hub.try_publish(event) {
                tracing::debug!(error = %e, "Demo emitter publish skipped");
            }
            step = step.wrapping_add(1);
        }
    });
}
