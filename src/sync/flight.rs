//! Single-flight slots.
//!
//! A slot is claimed with [`SingleFlight::try_begin`]; a second claim for
//! the same key while the first is held is refused rather than queued. The
//! returned [`FlightGuard`] releases the key when dropped, so the slot is
//! freed on every exit path, including early returns and cancelled futures.
//! Callers that need a fresh attempt can wait for a refused key with
//! [`settled`](SingleFlight::settled) and then claim it again.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Guard flags for operations that may only run once at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Busy {
    LoadingSessions,
    CreatingSession,
    Sending,
    SavingTitle,
    Deleting,
    Uploading,
}

/// Set of keys with an operation in flight.
pub struct SingleFlight<K> {
    active: Arc<Mutex<HashSet<K>>>,
    released: Arc<Notify>,
}

impl<K> fmt::Debug for SingleFlight<K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("active", &*lock(&self.active))
            .finish()
    }
}

impl<K> Default for SingleFlight<K> {
    fn default() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashSet::new())),
            released: Arc::new(Notify::new()),
        }
    }
}

impl<K> SingleFlight<K>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if it is already in flight.
    pub fn try_begin(&self, key: K) -> Option<FlightGuard<K>> {
        let inserted = lock(&self.active).insert(key.clone());
        inserted.then(|| FlightGuard {
            active: Arc::clone(&self.active),
            released: Arc::clone(&self.released),
            key,
        })
    }

    /// Wait until `key` is no longer in flight.
    pub async fn settled(&self, key: &K) {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed.
            released.as_mut().enable();
            if !self.is_active(key) {
                return;
            }
            released.await;
        }
    }

    pub fn is_active(&self, key: &K) -> bool {
        lock(&self.active).contains(key)
    }

    /// Keys currently in flight, in no particular order.
    pub fn active(&self) -> Vec<K> {
        lock(&self.active).iter().cloned().collect()
    }
}

/// Holds a claimed key; releases it on drop.
pub struct FlightGuard<K>
where
    K: Eq + Hash,
{
    active: Arc<Mutex<HashSet<K>>>,
    released: Arc<Notify>,
    key: K,
}

impl<K> fmt::Debug for FlightGuard<K>
where
    K: Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightGuard").field("key", &self.key).finish()
    }
}

impl<K> Drop for FlightGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        lock(&self.active).remove(&self.key);
        self.released.notify_waiters();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_refused() {
        let flights = SingleFlight::new();
        let guard = flights.try_begin(Busy::Sending);
        assert!(guard.is_some());
        assert!(flights.try_begin(Busy::Sending).is_none());
        assert!(flights.try_begin(Busy::Uploading).is_some());
    }

    #[test]
    fn test_drop_releases_key() {
        let flights = SingleFlight::new();
        {
            let _guard = flights.try_begin("m1".to_string()).unwrap();
            assert!(flights.is_active(&"m1".to_string()));
        }
        assert!(!flights.is_active(&"m1".to_string()));
        assert!(flights.try_begin("m1".to_string()).is_some());
    }

    #[tokio::test]
    async fn test_cancelled_future_releases_key() {
        let flights = Arc::new(SingleFlight::new());
        let task = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                let _guard = flights.try_begin(Busy::Deleting).unwrap();
                std::future::pending::<()>().await;
            })
        };
        tokio::task::yield_now().await;
        assert!(flights.is_active(&Busy::Deleting));

        task.abort();
        let _ = task.await;
        assert!(!flights.is_active(&Busy::Deleting));
    }

    #[tokio::test]
    async fn test_settled_waits_for_release() {
        let flights = Arc::new(SingleFlight::new());
        let guard = flights.try_begin(Busy::Uploading).unwrap();

        let waiter = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move { flights.settled(&Busy::Uploading).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(flights.try_begin(Busy::Uploading).is_some());

        // Nothing in flight: returns at once.
        flights.settled(&Busy::Sending).await;
    }
}
