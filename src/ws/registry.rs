use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::hub::{Hub, HubCounters};
use crate::models::ServerMessage;

pub type SharedHub = Arc<Mutex<Hub>>;

struct HubSlot {
    hub: SharedHub,
    refs: usize,
}

/// Aggregate numbers across live hubs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub hubs: usize,
    pub sessions: usize,
    pub participants: usize,
    pub delivered: u64,
    pub evicted: u64,
}

/// Maps file ids to their live hub. A hub is created by the first `acquire` for
/// a file and torn down when the matching `release` count brings it to zero.
pub struct HubRegistry {
    hubs: Mutex<HashMap<Uuid, HubSlot>>,
    queue_capacity: usize,
    counters: Arc<HubCounters>,
}

impl HubRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            hubs: Mutex::new(HashMap::new()),
            queue_capacity,
            counters: Arc::default(),
        }
    }

    /// Get the hub for `file_id`, creating it if needed, and take a reference on it
    pub async fn acquire(&self, file_id: Uuid) -> SharedHub {
        let mut map = self.hubs.lock().await;
        let slot = map.entry(file_id).or_insert_with(|| {
            info!(file_id = %file_id, "creating hub");
            HubSlot {
                hub: Arc::new(Mutex::new(Hub::new(file_id, self.queue_capacity, self.counters.clone()))),
                refs: 0,
            }
        });
        slot.refs += 1;
        debug!(file_id = %file_id, refs = slot.refs, "hub acquired");
        slot.hub.clone()
    }

    /// Drop a reference taken by `acquire`. Releasing an unknown hub is a no-op.
    pub async fn release(&self, file_id: Uuid) {
        let mut map = self.hubs.lock().await;
        let Some(slot) = map.get_mut(&file_id) else {
            return;
        };
        slot.refs = slot.refs.saturating_sub(1);
        debug!(file_id = %file_id, refs = slot.refs, "hub released");
        if slot.refs == 0 {
            map.remove(&file_id);
            info!(file_id = %file_id, "hub torn down after last session left");
        }
    }

    /// Live hub for a file, without creating one
    pub async fn get(&self, file_id: Uuid) -> Option<SharedHub> {
        self.hubs.lock().await.get(&file_id).map(|slot| slot.hub.clone())
    }

    pub async fn hub_count(&self) -> usize {
        self.hubs.lock().await.len()
    }

    /// Sessions currently registered on a file's hub
    pub async fn active_sessions(&self, file_id: Uuid) -> usize {
        match self.get(file_id).await {
            Some(hub) => hub.lock().await.session_count(),
            None => 0,
        }
    }

    /// Broadcast a server-originated message to every session of a file, if it has a hub
    pub async fn publish(&self, file_id: Uuid, msg: ServerMessage) -> usize {
        let Some(hub) = self.get(file_id).await else {
            return 0;
        };
        let delivered = hub.lock().await.broadcast(None, msg);
        debug!(file_id = %file_id, delivered, "published to hub");
        delivered
    }

    pub async fn stats(&self) -> RegistryStats {
        let hubs: Vec<SharedHub> = self.hubs.lock().await.values().map(|slot| slot.hub.clone()).collect();
        let mut stats = RegistryStats {
            hubs: hubs.len(),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            ..RegistryStats::default()
        };
        for hub in hubs {
            let h = hub.lock().await;
            stats.sessions += h.session_count();
            stats.participants += h.participant_count();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hub_lives_while_referenced() {
        let registry = HubRegistry::new(8);
        let file = Uuid::new_v4();

        let first = registry.acquire(file).await;
        let second = registry.acquire(file).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.hub_count().await, 1);

        registry.release(file).await;
        assert!(registry.get(file).await.is_some());
        registry.release(file).await;
        assert!(registry.get(file).await.is_none());

        // releasing a destroyed hub does nothing
        registry.release(file).await;
        assert_eq!(registry.hub_count().await, 0);
    }

    #[tokio::test]
    async fn recreated_hub_starts_empty() {
        let registry = HubRegistry::new(8);
        let file = Uuid::new_v4();

        let hub = registry.acquire(file).await;
        let _mailbox = hub.lock().await.join(1, Some("alice".into()), None);
        hub.lock().await.leave(1);
        registry.release(file).await;

        let fresh = registry.acquire(file).await;
        assert!(!Arc::ptr_eq(&hub, &fresh));
        let h = fresh.lock().await;
        assert_eq!(h.session_count(), 0);
        assert_eq!(h.participant_count(), 0);
    }

    #[tokio::test]
    async fn files_get_separate_hubs() {
        let registry = HubRegistry::new(8);
        let a = registry.acquire(Uuid::new_v4()).await;
        let b = registry.acquire(Uuid::new_v4()).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.hub_count().await, 2);
    }

    #[tokio::test]
    async fn concurrent_acquire_and_release_balance_out() {
        let registry = Arc::new(HubRegistry::new(8));
        let file = Uuid::new_v4();
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.acquire(file).await;
                tokio::task::yield_now().await;
                registry.release(file).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.hub_count().await, 0);
    }

    #[tokio::test]
    async fn publish_reaches_every_session_and_skips_missing_hubs() {
        let registry = HubRegistry::new(8);
        let file = Uuid::new_v4();
        assert_eq!(registry.publish(file, ServerMessage::ContentUpdate { content: "x".into() }).await, 0);
        assert_eq!(registry.hub_count().await, 0);

        let hub = registry.acquire(file).await;
        let mut a = hub.lock().await.join(1, None, None);
        let mut b = hub.lock().await.join(2, None, None);
        let msg = ServerMessage::ContentUpdate { content: "restored".into() };
        assert_eq!(registry.publish(file, msg.clone()).await, 2);
        assert_eq!(a.drain(), vec![msg.clone()]);
        assert_eq!(b.drain(), vec![msg]);

        let stats = registry.stats().await;
        assert_eq!(stats.hubs, 1);
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(registry.active_sessions(file).await, 2);
    }
}
