//! Poll-based adapters that expose store state to views.
//!
//! A binding starts fetches as spawned tasks; their results come back over a
//! channel and are applied by `poll()` on every UI tick:
//!
//! ```ignore
//! let mut sketches = SketchListBinding::new(store.clone(), ListOptions::default());
//! sketches.activate();
//!
//! // In event loop tick
//! if sketches.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match (sketches.data(), sketches.error()) {
//!     (_, Some(e)) => render_error(e),
//!     (Some(list), _) => render_list(list),
//!     (None, None) => render_spinner(),
//! }
//! ```

mod detail;
mod list;

pub use detail::SketchDetailBinding;
pub use list::{ListOptions, SketchListBinding};

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::api::{FetchError, FetchResult};

/// What a binding has to show: the last data it received, whether a fetch is
/// outstanding, and the last failure.
#[derive(Debug, Clone)]
pub struct BindingState<T> {
  data: Option<T>,
  pending: usize,
  error: Option<FetchError>,
}

impl<T> Default for BindingState<T> {
  fn default() -> Self {
    Self {
      data: None,
      pending: 0,
      error: None,
    }
  }
}

impl<T> BindingState<T> {
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.pending > 0
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.error.as_ref()
  }

  fn begin(&mut self) {
    self.pending += 1;
  }

  /// Success replaces the data and clears the error. Failure keeps whatever
  /// data was already shown.
  fn apply(&mut self, result: FetchResult<T>) {
    self.pending = self.pending.saturating_sub(1);
    match result {
      Ok(data) => {
        self.data = Some(data);
        self.error = None;
      }
      Err(err) => self.error = Some(err),
    }
  }
}

/// Messages from background tasks to the binding.
#[derive(Debug)]
enum Update<T> {
  /// A fetch was started outside the UI thread (bus or timer)
  Started,
  Settled(FetchResult<T>),
}

#[derive(Debug, Default)]
struct Liveness {
  active: AtomicBool,
  epoch: AtomicU64,
}

/// A sending half that only delivers while the activation it was created in
/// is still current.
struct Sink<T> {
  liveness: Arc<Liveness>,
  epoch: u64,
  tx: mpsc::UnboundedSender<Update<T>>,
}

impl<T> Clone for Sink<T> {
  fn clone(&self) -> Self {
    Self {
      liveness: Arc::clone(&self.liveness),
      epoch: self.epoch,
      tx: self.tx.clone(),
    }
  }
}

impl<T> Sink<T> {
  fn is_alive(&self) -> bool {
    self.liveness.active.load(Ordering::SeqCst)
      && self.liveness.epoch.load(Ordering::SeqCst) == self.epoch
  }

  fn send(&self, update: Update<T>) -> bool {
    if !self.is_alive() {
      trace!("discarding update for inactive binding");
      return false;
    }
    self.tx.send(update).is_ok()
  }
}

/// Channel plumbing and state shared by both binding kinds.
struct Feed<T> {
  state: BindingState<T>,
  liveness: Arc<Liveness>,
  tx: mpsc::UnboundedSender<Update<T>>,
  rx: mpsc::UnboundedReceiver<Update<T>>,
}

impl<T: Send + 'static> Feed<T> {
  fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      state: BindingState::default(),
      liveness: Arc::default(),
      tx,
      rx,
    }
  }

  fn is_active(&self) -> bool {
    self.liveness.active.load(Ordering::SeqCst)
  }

  /// Returns false if already active.
  fn activate(&mut self) -> bool {
    !self.liveness.active.swap(true, Ordering::SeqCst)
  }

  /// Stop accepting results. Anything still queued or in flight from this
  /// activation is dropped.
  fn deactivate(&mut self) -> bool {
    if !self.liveness.active.swap(false, Ordering::SeqCst) {
      return false;
    }
    self.liveness.epoch.fetch_add(1, Ordering::SeqCst);
    while self.rx.try_recv().is_ok() {}
    self.state.pending = 0;
    true
  }

  fn sink(&self) -> Sink<T> {
    Sink {
      liveness: Arc::clone(&self.liveness),
      epoch: self.liveness.epoch.load(Ordering::SeqCst),
      tx: self.tx.clone(),
    }
  }

  fn seed(&mut self, data: T) {
    self.state.data = Some(data);
  }

  /// Run `future` in the background and feed its result back on poll.
  fn spawn<F>(&mut self, future: F)
  where
    F: Future<Output = FetchResult<T>> + Send + 'static,
  {
    self.state.begin();
    let sink = self.sink();
    tokio::spawn(async move {
      let result = future.await;
      sink.send(Update::Settled(result));
    });
  }

  /// Apply everything that arrived since the last poll. Returns `true` if
  /// the state changed.
  fn poll(&mut self) -> bool {
    if !self.is_active() {
      return false;
    }
    let mut changed = false;
    loop {
      match self.rx.try_recv() {
        Ok(Update::Started) => self.state.begin(),
        Ok(Update::Settled(result)) => self.state.apply(result),
        // The binding holds a sender itself, so the channel never closes
        Err(_) => break,
      }
      changed = true;
    }
    changed
  }
}
