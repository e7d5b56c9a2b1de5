//! Usage: Per-(user, provider) async lock registry so concurrent refreshes collapse into one.

use crate::shared::mutex_ext::MutexExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type FlightKey = (i64, &'static str);

#[derive(Debug, Default)]
pub(crate) struct RefreshFlights {
    inner: Mutex<HashMap<FlightKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Holds the per-key lock; the registry entry is pruned on drop once unused.
pub(crate) struct FlightGuard<'a> {
    registry: &'a RefreshFlights,
    key: FlightKey,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RefreshFlights {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(&self, user_id: i64, provider: &'static str) -> FlightGuard<'_> {
        let key = (user_id, provider);
        let lock = {
            let mut map = self.inner.lock_or_recover();
            Arc::clone(map.entry(key).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        FlightGuard {
            registry: self,
            key,
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock_or_recover().len()
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.registry.inner.lock_or_recover();
        let unused = map
            .get(&self.key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2);
        if unused {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entry_is_pruned_after_last_holder() {
        let flights = RefreshFlights::new();
        {
            let _guard = flights.acquire(1, "youtube").await;
            assert_eq!(flights.len(), 1);
        }
        assert_eq!(flights.len(), 0);
    }

    #[tokio::test]
    async fn same_key_is_serialized_and_other_keys_are_not() {
        let flights = Arc::new(RefreshFlights::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let flights = Arc::clone(&flights);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            tasks.spawn(async move {
                let _guard = flights.acquire(9, "youtube").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }

        let other = flights.acquire(10, "youtube").await;
        assert!(flights.len() >= 1);
        drop(other);

        while let Some(res) = tasks.join_next().await {
            res.expect("task");
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(flights.len(), 0);
    }
}
