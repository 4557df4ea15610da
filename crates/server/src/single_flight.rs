//! Request collapsing.
//!
//! Concurrent callers with the same key share one computation: the first
//! caller runs it, the rest wait for its result. The key is forgotten once
//! the computation finishes, so later callers start fresh.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Whether the caller ran the computation or waited on someone else's
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    Leader,
    Follower,
}

pub struct SingleFlight<T> {
    in_flight: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` under `key`, or wait for the run already in progress.
    ///
    /// If the leader is cancelled before finishing, one of the waiters takes
    /// over with its own `work`.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> (T, FlightRole)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let mut role = FlightRole::Follower;
        let value = cell
            .get_or_init(|| {
                role = FlightRole::Leader;
                work()
            })
            .await
            .clone();

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if in_flight
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(key);
            }
        }

        (value, role)
    }

    /// Keys with a computation in progress
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .map(|in_flight| in_flight.len())
            .unwrap_or(0)
    }
}
