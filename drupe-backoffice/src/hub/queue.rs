//! Bounded per-subscription outbound queue.
//!
//! Enqueue is always non-blocking; when the queue is full the caller's
//! drop policy decides what gives. A single writer task consumes the
//! queue, so pop never races with another consumer.

use crate::hub::envelope::{Event, Outbound};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// What to do with a new event when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPolicy {
    /// Replace a queued event with the same coalescing key, keeping its
    /// queue position.
    CoalesceLatest,
    /// Discard the incoming event.
    DropNewest,
    /// Give up on the subscription entirely.
    Disconnect,
}

impl DropPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropPolicy::CoalesceLatest => "coalesce_latest",
            DropPolicy::DropNewest => "drop_newest",
            DropPolicy::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// An older queued event with the same key was replaced.
    Coalesced,
    /// The incoming event was discarded.
    DroppedNewest,
    /// The policy demands the subscription be terminated.
    Disconnect,
}

pub struct OutboundQueue {
    inner: Mutex<VecDeque<Outbound>>,
    notify: Notify,
    max: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn new(max: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(max)),
            notify: Notify::new(),
            max,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Outbound>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enqueue a domain event. Below capacity every event appends in
    /// order; `policy` only decides what gives once the queue is full.
    pub fn push_event(&self, event: Event, policy: DropPolicy) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::DroppedNewest;
        }
        let mut queue = self.lock();

        if queue.len() < self.max {
            queue.push_back(Outbound::Event(event));
            drop(queue);
            self.notify.notify_one();
            return PushOutcome::Queued;
        }

        match policy {
            DropPolicy::CoalesceLatest => {
                if let Some(key) = event.coalesce_key() {
                    let slot = queue.iter_mut().find(|item| match item {
                        Outbound::Event(queued) => queued.coalesce_key().as_ref() == Some(&key),
                        Outbound::Control(_) => false,
                    });
                    if let Some(slot) = slot {
                        *slot = Outbound::Event(event);
                        drop(queue);
                        self.notify.notify_one();
                        return PushOutcome::Coalesced;
                    }
                }
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::DroppedNewest
            }
            DropPolicy::DropNewest => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::DroppedNewest
            }
            DropPolicy::Disconnect => PushOutcome::Disconnect,
        }
    }

    /// Control frames are small and protocol-bounded; they bypass the
    /// event capacity so a full queue cannot starve pongs.
    pub fn push_control(&self, msg: crate::hub::envelope::ControlMessage) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.lock().push_back(Outbound::Control(msg));
        self.notify.notify_one();
    }

    /// Wait for the next item. Returns `None` once the queue is closed
    /// and drained.
    pub async fn pop(&self) -> Option<Outbound> {
        loop {
            if let Some(item) = self.lock().pop_front() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue; the writer drains what is queued and exits.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::envelope::{Channel, ControlMessage, Scope};
    use serde_json::json;

    fn stock(product: &str, quantity: i64) -> Event {
        Event::new(
            Channel::StockUpdate,
            Scope::branch("B1"),
            json!({ "product_id": product, "quantity": quantity }),
        )
    }

    fn sale(id: &str) -> Event {
        Event::new(Channel::NewSale, Scope::branch("B1"), json!({ "sale_id": id }))
    }

    fn queued_quantity(item: &Outbound) -> i64 {
        match item {
            Outbound::Event(e) => e.payload["quantity"].as_i64().unwrap(),
            Outbound::Control(_) => panic!("expected event"),
        }
    }

    #[tokio::test]
    async fn fifo_below_capacity() {
        let queue = OutboundQueue::new(8);
        assert_eq!(queue.push_event(sale("a"), DropPolicy::DropNewest), PushOutcome::Queued);
        assert_eq!(queue.push_event(sale("b"), DropPolicy::DropNewest), PushOutcome::Queued);

        let first = queue.pop().await.unwrap();
        let second = queue.pop().await.unwrap();
        match (first, second) {
            (Outbound::Event(a), Outbound::Event(b)) => {
                assert_eq!(a.payload["sale_id"], "a");
                assert_eq!(b.payload["sale_id"], "b");
            }
            other => panic!("unexpected items: {:?}", other),
        }
    }

    #[tokio::test]
    async fn below_capacity_keeps_every_update() {
        let queue = OutboundQueue::new(8);
        assert_eq!(queue.push_event(stock("mango", 10), DropPolicy::CoalesceLatest), PushOutcome::Queued);
        assert_eq!(queue.push_event(stock("fig", 3), DropPolicy::CoalesceLatest), PushOutcome::Queued);
        assert_eq!(queue.push_event(stock("mango", 7), DropPolicy::CoalesceLatest), PushOutcome::Queued);
        assert_eq!(queue.len(), 3);

        // A reader that keeps up sees both mango updates in order.
        assert_eq!(queued_quantity(&queue.pop().await.unwrap()), 10);
        queue.pop().await.unwrap();
        assert_eq!(queued_quantity(&queue.pop().await.unwrap()), 7);
    }

    #[tokio::test]
    async fn coalesce_replaces_in_place_when_full() {
        let queue = OutboundQueue::new(2);
        queue.push_event(stock("mango", 10), DropPolicy::CoalesceLatest);
        queue.push_event(stock("fig", 3), DropPolicy::CoalesceLatest);
        let outcome = queue.push_event(stock("mango", 7), DropPolicy::CoalesceLatest);
        assert_eq!(outcome, PushOutcome::Coalesced);
        assert_eq!(queue.len(), 2);

        // Mango kept its original position with the latest value.
        let first = queue.pop().await.unwrap();
        assert_eq!(queued_quantity(&first), 7);
    }

    #[tokio::test]
    async fn coalesce_drops_when_full_without_matching_key() {
        let queue = OutboundQueue::new(2);
        queue.push_event(stock("mango", 10), DropPolicy::CoalesceLatest);
        queue.push_event(stock("fig", 3), DropPolicy::CoalesceLatest);
        let outcome = queue.push_event(stock("date", 5), DropPolicy::CoalesceLatest);
        assert_eq!(outcome, PushOutcome::DroppedNewest);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn drop_newest_when_full() {
        let queue = OutboundQueue::new(2);
        queue.push_event(sale("a"), DropPolicy::DropNewest);
        queue.push_event(sale("b"), DropPolicy::DropNewest);
        let outcome = queue.push_event(sale("c"), DropPolicy::DropNewest);
        assert_eq!(outcome, PushOutcome::DroppedNewest);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn disconnect_policy_reports_without_enqueue() {
        let queue = OutboundQueue::new(1);
        queue.push_event(sale("a"), DropPolicy::Disconnect);
        let outcome = queue.push_event(sale("b"), DropPolicy::Disconnect);
        assert_eq!(outcome, PushOutcome::Disconnect);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn controls_bypass_event_capacity() {
        let queue = OutboundQueue::new(1);
        queue.push_event(sale("a"), DropPolicy::DropNewest);
        queue.push_control(ControlMessage::Pong { timestamp: 1.0 });
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = OutboundQueue::new(4);
        queue.push_event(sale("a"), DropPolicy::DropNewest);
        queue.close();
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
    }
}
