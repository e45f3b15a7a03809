//! Deduplication of concurrent fetches for the same key.
//!
//! A fetch is spawned as its own task and its result is shared through a
//! `Shared<oneshot::Receiver>`, so any number of callers can await the same
//! outcome, and dropping a caller never cancels the fetch.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use tracing::trace;

use crate::api::{FetchError, FetchResult};

/// A pending fetch that can be cloned and awaited by many callers.
pub type SharedFetch<V> = Shared<oneshot::Receiver<FetchResult<V>>>;

/// Identifies one registration of a key. A settling fetch only releases the
/// slot if it still carries its own generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// Implemented by the state that owns a registry and the cache its fetches
/// land in. Called under the state's lock when a fetch settles.
///
/// `outcome` is `None` when the fetch task was dropped before finishing.
pub trait Settle<K, V>: Send + 'static {
  fn settle(&mut self, key: &K, generation: Generation, outcome: Option<&FetchResult<V>>);
}

struct Slot<V> {
  generation: Generation,
  fetch: SharedFetch<V>,
}

/// At most one pending fetch per key.
pub struct InflightRegistry<K, V> {
  slots: HashMap<K, Slot<V>>,
  next_generation: u64,
}

impl<K, V> InflightRegistry<K, V>
where
  K: Eq + Hash + Clone + Send + 'static,
  V: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      slots: HashMap::new(),
      next_generation: 0,
    }
  }

  /// The pending fetch for `key`, if any.
  pub fn get(&self, key: &K) -> Option<SharedFetch<V>> {
    self.slots.get(key).map(|slot| slot.fetch.clone())
  }

  /// Join the pending fetch for `key`, or start one with `producer`.
  ///
  /// Must be called while holding the lock on `state`; the spawned fetch
  /// takes the same lock to settle, after this call has returned.
  pub fn coalesce<S, F, Fut>(&mut self, key: K, state: &Arc<Mutex<S>>, producer: F) -> SharedFetch<V>
  where
    S: Settle<K, V>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchResult<V>> + Send + 'static,
  {
    if let Some(fetch) = self.get(&key) {
      trace!("joining in-flight fetch");
      return fetch;
    }
    self.start(key, state, producer)
  }

  /// Always start a new fetch for `key`, replacing any registered one.
  ///
  /// A replaced fetch still runs to completion and settles, but can no
  /// longer release the slot.
  pub fn start<S, F, Fut>(&mut self, key: K, state: &Arc<Mutex<S>>, producer: F) -> SharedFetch<V>
  where
    S: Settle<K, V>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchResult<V>> + Send + 'static,
  {
    let future = producer();

    let generation = Generation(self.next_generation);
    self.next_generation += 1;

    let (sender, mut receiver) = oneshot::channel();
    let guard = SettleGuard {
      state: Arc::clone(state),
      key: Some(key.clone()),
      generation,
      polled: false,
      _value: PhantomData,
    };

    tokio::spawn(async move {
      let mut guard = guard;
      guard.polled = true;
      let result = future.await;
      // Settle before sending: anyone who sees the slot gone also sees the
      // cache populated.
      guard.settle(&result);
      sender.send(result).ok();
    });

    // Settling needs the lock our caller holds, so the sender can only be
    // gone already if the runtime dropped the task unrun
    if receiver.try_recv().is_err() {
      trace!("fetch task dropped before it started");
      return receiver.shared();
    }

    let fetch = receiver.shared();
    self.slots.insert(
      key,
      Slot {
        generation,
        fetch: fetch.clone(),
      },
    );
    fetch
  }

  /// Release the slot for `key` if it is still the given registration.
  pub fn release(&mut self, key: &K, generation: Generation) -> bool {
    match self.slots.get(key) {
      Some(slot) if slot.generation == generation => {
        self.slots.remove(key);
        true
      }
      _ => false,
    }
  }

  /// Forget the pending fetch for `key`. The fetch itself keeps running.
  pub fn remove(&mut self, key: &K) -> bool {
    self.slots.remove(key).is_some()
  }

  pub fn clear(&mut self) {
    self.slots.clear();
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.slots.len()
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }
}

impl<K, V> Default for InflightRegistry<K, V>
where
  K: Eq + Hash + Clone + Send + 'static,
  V: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

/// Await a shared fetch. A fetch whose task died without sending reports
/// `FetchError::Interrupted`.
pub async fn wait<V: Clone>(fetch: SharedFetch<V>) -> FetchResult<V> {
  fetch.await.unwrap_or(Err(FetchError::Interrupted))
}

/// Settles a fetch exactly once: explicitly on completion, or on drop if the
/// task is cancelled first.
struct SettleGuard<S: Settle<K, V>, K, V> {
  state: Arc<Mutex<S>>,
  key: Option<K>,
  generation: Generation,
  /// Unset until the task first runs. Before that the guard may be dropped
  /// by the registering thread, which still holds the lock.
  polled: bool,
  _value: PhantomData<fn() -> V>,
}

impl<S: Settle<K, V>, K, V> SettleGuard<S, K, V> {
  fn settle(mut self, result: &FetchResult<V>) {
    if let Some(key) = self.key.take() {
      self.state.lock().settle(&key, self.generation, Some(result));
    }
  }
}

impl<S: Settle<K, V>, K, V> Drop for SettleGuard<S, K, V> {
  fn drop(&mut self) {
    let Some(key) = self.key.take() else {
      return;
    };
    trace!("fetch dropped before settling");
    if self.polled {
      self.state.lock().settle(&key, self.generation, None);
    } else if let Some(mut state) = self.state.try_lock() {
      state.settle(&key, self.generation, None);
    }
  }
}
