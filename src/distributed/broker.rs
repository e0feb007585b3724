//! The broker port for distributed crawling.
//!
//! Two logical topics (`tasks` and `results`) with at-least-once
//! delivery: a consumed message must be acked before its visibility
//! timeout expires, or it is requeued for another consumer. The bundled
//! in-memory implementation serves single-process deployments and tests;
//! production deployments implement [`Broker`] over their queue of
//! choice.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Logical message streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Tasks,
    Results,
}

/// A consumed, not-yet-acked message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: u64,
    pub topic: Topic,
    pub payload: serde_json::Value,
}

/// Message transport between the coordinator and workers.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: Topic, payload: serde_json::Value) -> Result<()>;

    /// Take the next message from `topic`, waiting up to `wait`; `None`
    /// on timeout. The delivery must be acked before the broker's
    /// visibility timeout or it will be redelivered.
    async fn consume(&self, topic: Topic, wait: Duration) -> Result<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}

struct Pending {
    topic: Topic,
    payload: serde_json::Value,
    deadline: Instant,
}

struct BrokerState {
    queues: HashMap<Topic, VecDeque<(u64, serde_json::Value)>>,
    pending: HashMap<u64, Pending>,
}

/// Single-process broker with visibility-timeout requeue semantics.
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    next_id: AtomicU64,
    visibility_timeout: Duration,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BrokerState {
                queues: HashMap::new(),
                pending: HashMap::new(),
            }),
            notify: Notify::new(),
            next_id: AtomicU64::new(0),
            visibility_timeout,
        }
    }

    /// Move expired un-acked deliveries back onto their queues.
    fn requeue_expired(&self, state: &mut BrokerState) {
        let now = Instant::now();
        let expired: Vec<u64> = state
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(pending) = state.pending.remove(&id) {
                debug!("redelivering message {id} after visibility timeout");
                state
                    .queues
                    .entry(pending.topic)
                    .or_default()
                    .push_back((id, pending.payload));
            }
        }
    }

    #[must_use]
    pub fn depth(&self, topic: Topic) -> usize {
        self.state
            .lock()
            .queues
            .get(&topic)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: Topic, payload: serde_json::Value) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state
            .lock()
            .queues
            .entry(topic)
            .or_default()
            .push_back((id, payload));
        self.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&self, topic: Topic, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            {
                let mut state = self.state.lock();
                self.requeue_expired(&mut state);
                if let Some((id, payload)) = state.queues.entry(topic).or_default().pop_front() {
                    state.pending.insert(
                        id,
                        Pending {
                            topic,
                            payload: payload.clone(),
                            deadline: Instant::now() + self.visibility_timeout,
                        },
                    );
                    return Ok(Some(Delivery { id, topic, payload }));
                }
            }

            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.state.lock().pending.remove(&delivery.id);
        Ok(())
    }
}
