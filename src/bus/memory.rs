//! In-process message bus
//!
//! Each (subject, group) pair owns one work queue. Members of the group pull
//! from that queue in turn, so a message is taken by exactly one member and
//! an idle member is always preferred over a busy one. Every group on a
//! subject receives its own copy of each published message. Messages
//! published while a subject has no groups are discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BusError, Delivery, DeliverySource, MessageBus, Subscription};

type Receiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>>;

struct GroupQueue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Receiver,
    members: usize,
}

impl GroupQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            members: 0,
        }
    }
}

/// subject -> group -> queue
type Topics = HashMap<String, HashMap<String, GroupQueue>>;

#[derive(Default)]
struct Shared {
    topics: Mutex<Topics>,
    published: AtomicU64,
    discarded: AtomicU64,
}

impl Shared {
    fn topics(&self) -> MutexGuard<'_, Topics> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process [`MessageBus`] with queue-group semantics
#[derive(Clone, Default)]
pub struct MemoryBus {
    shared: Arc<Shared>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live members in a queue group
    pub fn member_count(&self, subject: &str, group: &str) -> usize {
        self.shared
            .topics()
            .get(subject)
            .and_then(|groups| groups.get(group))
            .map(|queue| queue.members)
            .unwrap_or(0)
    }

    /// Total messages accepted by `publish`
    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    /// Messages dropped because nobody was subscribed
    pub fn discarded_count(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }

    /// Drop every group; pending `next()` calls return `None`
    pub fn close(&self) {
        self.shared.topics().clear();
        tracing::debug!("Memory bus closed");
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.shared.published.fetch_add(1, Ordering::Relaxed);

        let topics = self.shared.topics();
        let Some(groups) = topics.get(subject).filter(|groups| !groups.is_empty()) else {
            self.shared.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(subject, "No subscribers, message discarded");
            return Ok(());
        };

        for (group, queue) in groups {
            if queue
                .tx
                .send(Delivery::new(subject, payload.clone()))
                .is_err()
            {
                return Err(BusError::Publish {
                    subject: subject.to_string(),
                    reason: format!("queue for group '{group}' is closed"),
                });
            }
        }

        Ok(())
    }

    async fn queue_subscribe(&self, subject: &str, group: &str) -> Result<Subscription, BusError> {
        let rx = {
            let mut topics = self.shared.topics();
            let queue = topics
                .entry(subject.to_string())
                .or_default()
                .entry(group.to_string())
                .or_insert_with(GroupQueue::new);
            queue.members += 1;
            queue.rx.clone()
        };

        tracing::debug!(subject, group, "Joined queue group");

        let source = MemorySource {
            rx,
            membership: Membership {
                shared: self.shared.clone(),
                subject: subject.to_string(),
                group: group.to_string(),
            },
        };

        Ok(Subscription::new(subject, group, Box::new(source)))
    }
}

/// Leaves the group on drop; the last member takes the queue with it
struct Membership {
    shared: Arc<Shared>,
    subject: String,
    group: String,
}

impl Drop for Membership {
    fn drop(&mut self) {
        let mut topics = self.shared.topics();
        let Some(groups) = topics.get_mut(&self.subject) else {
            return;
        };

        let now_empty = match groups.get_mut(&self.group) {
            Some(queue) => {
                queue.members = queue.members.saturating_sub(1);
                queue.members == 0
            }
            None => false,
        };

        if now_empty {
            groups.remove(&self.group);
            if groups.is_empty() {
                topics.remove(&self.subject);
            }
        }
    }
}

struct MemorySource {
    rx: Receiver,
    #[allow(dead_code)]
    membership: Membership,
}

#[async_trait]
impl DeliverySource for MemorySource {
    async fn next_delivery(&mut self) -> Option<Delivery> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
