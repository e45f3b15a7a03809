//! Fire-and-forget "the sketch list may have changed" notifications.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use color_eyre::Result;
use parking_lot::Mutex;
use tracing::{debug, error};

type Listener = Arc<dyn Fn() -> Result<()> + Send + Sync>;

#[derive(Default)]
struct BusInner {
  listeners: Mutex<BTreeMap<u64, Listener>>,
  next_id: AtomicU64,
}

/// Publish/subscribe channel with no payload.
///
/// Every listener is invoked synchronously on `publish`, each inside its own
/// failure boundary: an `Err` or a panic is logged and the remaining
/// listeners still run.
#[derive(Clone, Default)]
pub struct InvalidationBus {
  inner: Arc<BusInner>,
}

impl InvalidationBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a listener. It stays registered until the returned
  /// subscription is dropped or unsubscribed.
  pub fn subscribe<F>(&self, listener: F) -> Subscription
  where
    F: Fn() -> Result<()> + Send + Sync + 'static,
  {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    self.inner.listeners.lock().insert(id, Arc::new(listener));
    debug!(id, "invalidation listener subscribed");
    Subscription {
      id,
      bus: Arc::downgrade(&self.inner),
    }
  }

  /// Notify every current listener. Returns how many of them failed.
  pub fn publish(&self) -> usize {
    // Snapshot so listeners can (un)subscribe from inside their callback
    let listeners: Vec<(u64, Listener)> = self
      .inner
      .listeners
      .lock()
      .iter()
      .map(|(id, listener)| (*id, Arc::clone(listener)))
      .collect();

    let mut failures = 0;
    for (id, listener) in listeners {
      match catch_unwind(AssertUnwindSafe(|| listener())) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
          failures += 1;
          error!(id, error = %err, "sketch list listener failed");
        }
        Err(panic) => {
          failures += 1;
          error!(id, panic = panic_message(&*panic), "sketch list listener panicked");
        }
      }
    }
    failures
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.inner.listeners.lock().len()
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
  panic
    .downcast_ref::<&str>()
    .copied()
    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
    .unwrap_or("<non-string panic>")
}

/// Handle to a registered listener; removes it on drop.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
  id: u64,
  bus: Weak<BusInner>,
}

impl Subscription {
  /// Remove the listener now rather than at the end of scope.
  pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(bus) = self.bus.upgrade() {
      bus.listeners.lock().remove(&self.id);
      debug!(id = self.id, "invalidation listener unsubscribed");
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription").field("id", &self.id).finish()
  }
}
