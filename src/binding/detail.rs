use tracing::debug;

use super::Feed;
use crate::api::{FetchError, SketchDetail};
use crate::cache::SketchStore;

/// One sketch, keyed by an optional id. Without an id the binding is inert.
pub struct SketchDetailBinding {
  store: SketchStore,
  id: Option<String>,
  feed: Feed<SketchDetail>,
}

impl SketchDetailBinding {
  pub fn new(store: SketchStore, id: Option<String>) -> Self {
    Self {
      store,
      id,
      feed: Feed::new(),
    }
  }

  /// Serve a fresh cache entry directly. A stale entry is shown while it is
  /// refetched; with no entry at all the fetch goes straight to the network.
  pub fn activate(&mut self) {
    if !self.feed.activate() {
      return;
    }
    let Some(id) = self.id.clone() else {
      return;
    };

    match self.store.cached_detail(&id) {
      Some(cached) if cached.fresh => {
        debug!(%id, "sketch detail binding served from cache");
        self.feed.seed(cached.value);
      }
      Some(stale) => {
        self.feed.seed(stale.value);
        self.load(id, false);
      }
      None => self.load(id, true),
    }
  }

  /// Refetch from the network.
  pub fn refresh(&mut self) {
    if !self.feed.is_active() {
      return;
    }
    if let Some(id) = self.id.clone() {
      self.load(id, true);
    }
  }

  fn load(&mut self, id: String, force: bool) {
    let store = self.store.clone();
    self
      .feed
      .spawn(async move { store.get_sketch_by_id(&id, force).await });
  }

  pub fn deactivate(&mut self) {
    self.feed.deactivate();
  }

  pub fn poll(&mut self) -> bool {
    self.feed.poll()
  }

  pub fn data(&self) -> Option<&SketchDetail> {
    self.feed.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.feed.state.is_loading()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.feed.state.error()
  }
}

impl Drop for SketchDetailBinding {
  fn drop(&mut self) {
    self.deactivate();
  }
}
