//! Per-subscription serialization
//!
//! Orders read-modify-write updates against the same subscription within one
//! process. Requests for different subscriptions never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use billing_processor::SubscriptionId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-subscription async locks
#[derive(Default)]
pub struct SubscriptionLocks {
    locks: Mutex<HashMap<SubscriptionId, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one update; dropping it releases the subscription
pub struct SubscriptionGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SubscriptionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `subscription`
    pub async fn acquire(&self, subscription: &SubscriptionId) -> SubscriptionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only the registry references are idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(subscription.clone()).or_default())
        };

        SubscriptionGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Subscriptions with a live or pending holder
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_subscription_waits() {
        let locks = Arc::new(SubscriptionLocks::new());
        let sub = SubscriptionId::from_string("sub_1");

        let guard = locks.acquire(&sub).await;

        let contender = {
            let locks = Arc::clone(&locks);
            let sub = sub.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&sub).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_subscriptions_independent() {
        let locks = SubscriptionLocks::new();
        let _a = locks.acquire(&SubscriptionId::from_string("sub_a")).await;
        let _b = locks.acquire(&SubscriptionId::from_string("sub_b")).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_pruned() {
        let locks = SubscriptionLocks::new();
        drop(locks.acquire(&SubscriptionId::from_string("sub_a")).await);
        assert!(locks.is_empty());

        let _b = locks.acquire(&SubscriptionId::from_string("sub_b")).await;
        assert_eq!(locks.locks.lock().unwrap().len(), 1);
    }
}
