//! Single-Flight Module
//!
//! Collapses concurrent executions for the same key into one shared run.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};

type Flight<T> = Shared<BoxFuture<'static, Result<T>>>;
type FlightMap<K, T> = Mutex<HashMap<K, FlightSlot<T>>>;

// == Flight Slot ==
/// An operation in progress, tagged with the generation that created it.
struct FlightSlot<T> {
    generation: u64,
    flight: Flight<T>,
}

// == Release Guard ==
/// Removes a flight from the map when dropped.
///
/// Owned by the task driving the operation, so the slot is released on
/// success, failure and panic alike. The generation check keeps a late
/// release from evicting a newer flight registered under the same key.
struct ReleaseGuard<K: Eq + Hash, T> {
    flights: Weak<FlightMap<K, T>>,
    key: Option<K>,
    generation: u64,
}

impl<K: Eq + Hash, T> Drop for ReleaseGuard<K, T> {
    fn drop(&mut self) {
        let (Some(flights), Some(key)) = (self.flights.upgrade(), self.key.take()) else {
            return;
        };
        let mut flights = flights.lock();
        if flights
            .get(&key)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            flights.remove(&key);
        }
    }
}

// == Single Flight ==
/// Map from key to the operation currently running for it.
pub struct SingleFlight<K, T> {
    flights: Arc<FlightMap<K, T>>,
    next_generation: AtomicU64,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    // == Run ==
    /// Joins the flight running for `key`, or starts one with `start`.
    ///
    /// `start` is only called when no flight exists. The started operation
    /// runs on its own task, so it settles (and releases its slot) even if
    /// every caller stops waiting.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (flight, launch) = {
            let mut flights = self.flights.lock();
            match flights.get(&key) {
                Some(slot) => {
                    debug!(generation = slot.generation, "Joining in-flight operation");
                    (slot.flight.clone(), None)
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = oneshot::channel::<Result<T>>();
                    let flight = async move {
                        rx.await.unwrap_or_else(|_| {
                            Err(Error::Aborted(
                                "operation dropped before settling".to_string(),
                            ))
                        })
                    }
                    .boxed()
                    .shared();
                    flights.insert(
                        key.clone(),
                        FlightSlot {
                            generation,
                            flight: flight.clone(),
                        },
                    );
                    (flight, Some((tx, generation)))
                }
            }
        };

        if let Some((tx, generation)) = launch {
            let release = ReleaseGuard {
                flights: Arc::downgrade(&self.flights),
                key: Some(key),
                generation,
            };
            let operation = start();
            tokio::spawn(async move {
                let outcome = operation.await;
                drop(release);
                let _ = tx.send(outcome);
            });
        }

        flight.await
    }

    /// Number of flights currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
