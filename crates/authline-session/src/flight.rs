//! Single-flight coordination: at most one run of an operation per key,
//! with every concurrent caller receiving the same result.
//!
//! ```text
//! caller A ── join(Refresh) ──→ Leader ── does the work ── finish(v) ─┐
//! caller B ── join(Refresh) ──→ Follower ── wait() ───────────────────┼─→ v
//! caller C ── join(Refresh) ──→ Follower ── wait() ───────────────────┘
//! ```
//!
//! The registry holds a `watch` receiver per running flight. Followers
//! clone it; the leader owns the sender. `finish` removes the entry and
//! publishes the value under the same lock, so a caller either joins the
//! running flight and sees its value, or arrives afterwards and starts a
//! new one. Nobody can join a flight that has already published.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

type Registry<K, T> = Arc<Mutex<HashMap<K, watch::Receiver<Option<T>>>>>;

/// A registry of in-flight operations keyed by `K`, each producing a `T`.
///
/// Cheap to clone; clones share the registry.
pub struct SingleFlight<K, T> {
    flights: Registry<K, T>,
}

impl<K, T> Clone for SingleFlight<K, T> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> fmt::Debug for SingleFlight<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &lock(&self.flights).len())
            .finish()
    }
}

/// The outcome of [`SingleFlight::join`].
#[derive(Debug)]
pub enum Join<K: Eq + Hash, T> {
    /// Nobody was running this operation; the caller must run it and
    /// call [`FlightLeader::finish`].
    Leader(FlightLeader<K, T>),
    /// Someone else is running it; [`Flight::wait`] for their result.
    Follower(Flight<T>),
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the flight for `key`, starting it if none is running.
    pub fn join(&self, key: K) -> Join<K, T> {
        let mut flights = lock(&self.flights);
        if let Some(rx) = flights.get(&key) {
            return Join::Follower(Flight { rx: rx.clone() });
        }

        let (tx, rx) = watch::channel(None);
        flights.insert(key.clone(), rx);
        Join::Leader(FlightLeader {
            key: Some(key),
            tx,
            flights: Arc::clone(&self.flights),
        })
    }

    /// Returns `true` if a flight for `key` is currently running.
    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.flights).contains_key(key)
    }
}

// ---------------------------------------------------------------------------
// FlightLeader
// ---------------------------------------------------------------------------

/// The caller responsible for running a flight.
///
/// Dropping the leader without calling [`finish`](Self::finish) (a panic,
/// a cancelled task) still ends the flight: its followers wake up with
/// `None` and the key is free for a new leader.
pub struct FlightLeader<K: Eq + Hash, T> {
    /// `None` once finished, so `Drop` knows there is nothing to clean up.
    key: Option<K>,
    tx: watch::Sender<Option<T>>,
    flights: Registry<K, T>,
}

impl<K: Eq + Hash, T> FlightLeader<K, T> {
    /// Publishes `value` to every follower and closes the flight.
    pub fn finish(mut self, value: T) {
        if let Some(key) = self.key.take() {
            let mut flights = lock(&self.flights);
            flights.remove(&key);
            self.tx.send_replace(Some(value));
        }
    }
}

impl<K: Eq + Hash, T> Drop for FlightLeader<K, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.flights).remove(&key);
            // The sender drops right after this, which wakes followers.
        }
    }
}

impl<K: Eq + Hash, T> fmt::Debug for FlightLeader<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightLeader")
            .field("finished", &self.key.is_none())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Flight
// ---------------------------------------------------------------------------

/// A follower's handle on someone else's flight.
pub struct Flight<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Flight<T> {
    /// Waits for the leader's value. `None` means the leader went away
    /// without finishing.
    pub async fn wait(mut self) -> Option<T> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => Option::clone(&value),
            Err(_) => None,
        }
    }
}

impl<T> fmt::Debug for Flight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flight").finish_non_exhaustive()
    }
}

fn lock<K, T>(
    flights: &Registry<K, T>,
) -> MutexGuard<'_, HashMap<K, watch::Receiver<Option<T>>>> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OperationKind;

    fn registry() -> SingleFlight<OperationKind, u32> {
        SingleFlight::new()
    }

    fn leader(join: Join<OperationKind, u32>) -> FlightLeader<OperationKind, u32> {
        match join {
            Join::Leader(leader) => leader,
            Join::Follower(_) => panic!("expected to lead"),
        }
    }

    fn follower(join: Join<OperationKind, u32>) -> Flight<u32> {
        match join {
            Join::Follower(flight) => flight,
            Join::Leader(_) => panic!("expected to follow"),
        }
    }

    #[tokio::test]
    async fn test_join_first_caller_leads_rest_follow() {
        let flights = registry();

        let lead = leader(flights.join(OperationKind::Refresh));
        let a = follower(flights.join(OperationKind::Refresh));
        let b = follower(flights.join(OperationKind::Refresh));
        assert!(flights.is_in_flight(&OperationKind::Refresh));

        lead.finish(7);

        assert_eq!(a.wait().await, Some(7));
        assert_eq!(b.wait().await, Some(7));
        assert!(!flights.is_in_flight(&OperationKind::Refresh));
    }

    #[tokio::test]
    async fn test_join_different_keys_are_independent() {
        let flights = registry();
        let _login = leader(flights.join(OperationKind::Login));
        // A running login does not make a refresh caller follow it.
        let _refresh = leader(flights.join(OperationKind::Refresh));
    }

    #[tokio::test]
    async fn test_join_after_finish_starts_new_flight() {
        let flights = registry();
        leader(flights.join(OperationKind::Refresh)).finish(1);

        let second = leader(flights.join(OperationKind::Refresh));
        let waiter = follower(flights.join(OperationKind::Refresh));
        second.finish(2);

        assert_eq!(waiter.wait().await, Some(2));
    }

    #[tokio::test]
    async fn test_leader_dropped_followers_see_none() {
        let flights = registry();
        let lead = leader(flights.join(OperationKind::Login));
        let waiter = follower(flights.join(OperationKind::Login));

        drop(lead);

        assert_eq!(waiter.wait().await, None);
        assert!(!flights.is_in_flight(&OperationKind::Login));
    }

    #[tokio::test]
    async fn test_wait_across_tasks_receives_value() {
        let flights = registry();
        let lead = leader(flights.join(OperationKind::Refresh));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let flight = follower(flights.join(OperationKind::Refresh));
            handles.push(tokio::spawn(flight.wait()));
        }
        tokio::task::yield_now().await;
        lead.finish(42);

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(42));
        }
    }
}
