//! Read-through cache for the sketch collection and individual sketches.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::bus::{InvalidationBus, Subscription};
use super::inflight::{wait, Generation, InflightRegistry, Settle};
use super::timed::TimedCache;
use crate::api::{FetchResult, SketchApi, SketchDetail, SketchSummary};

/// A snapshot of a cached value, with whether it was still within its TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<V> {
  pub value: V,
  pub fresh: bool,
}

/// Everything guarded by the store's lock. Cache reads, in-flight checks and
/// registrations all happen in one critical section.
struct StoreState {
  list: TimedCache<(), Vec<SketchSummary>>,
  details: TimedCache<String, SketchDetail>,
  list_fetches: InflightRegistry<(), Vec<SketchSummary>>,
  detail_fetches: InflightRegistry<String, SketchDetail>,
}

impl Settle<(), Vec<SketchSummary>> for StoreState {
  fn settle(
    &mut self,
    key: &(),
    generation: Generation,
    outcome: Option<&FetchResult<Vec<SketchSummary>>>,
  ) {
    // Applied even if the list was invalidated meanwhile: last write wins
    if let Some(Ok(sketches)) = outcome {
      self.list.set((), sketches.clone());
    }
    self.list_fetches.release(key, generation);
  }
}

impl Settle<String, SketchDetail> for StoreState {
  fn settle(
    &mut self,
    key: &String,
    generation: Generation,
    outcome: Option<&FetchResult<SketchDetail>>,
  ) {
    if let Some(Ok(detail)) = outcome {
      self.details.set(key.clone(), detail.clone());
    }
    self.detail_fetches.release(key, generation);
  }
}

/// Shared sketch cache in front of a `SketchApi`.
///
/// Cheap to clone; all clones share the same caches, in-flight fetches and
/// invalidation bus. Create one at startup and hand clones to every view.
#[derive(Clone)]
pub struct SketchStore {
  api: Arc<dyn SketchApi>,
  state: Arc<Mutex<StoreState>>,
  bus: InvalidationBus,
}

impl SketchStore {
  pub fn new(api: Arc<dyn SketchApi>, ttl: Duration) -> Self {
    Self {
      api,
      state: Arc::new(Mutex::new(StoreState {
        list: TimedCache::new(ttl),
        details: TimedCache::new(ttl),
        list_fetches: InflightRegistry::new(),
        detail_fetches: InflightRegistry::new(),
      })),
      bus: InvalidationBus::new(),
    }
  }

  /// The underlying API, for mutations. Callers must invalidate afterwards.
  pub fn api(&self) -> &Arc<dyn SketchApi> {
    &self.api
  }

  /// All sketches, in server order.
  ///
  /// Without `force`, a valid cached list is returned immediately and a
  /// pending list fetch is joined. With `force`, a new network read always
  /// starts. Failures are returned to every joined caller and never cached.
  pub async fn list_sketches(&self, force: bool) -> FetchResult<Vec<SketchSummary>> {
    let fetch = {
      let mut state = self.state.lock();
      if !force {
        if let Some(sketches) = state.list.get_valid(&()) {
          debug!(count = sketches.len(), "sketch list served from cache");
          return Ok(sketches.clone());
        }
      }

      let api = Arc::clone(&self.api);
      let producer = move || logged("sketch list", api.fetch_sketch_list());
      if force {
        state.list_fetches.start((), &self.state, producer)
      } else {
        state.list_fetches.coalesce((), &self.state, producer)
      }
    };

    wait(fetch).await
  }

  /// One sketch with its editing state. Same caching rules as
  /// [`list_sketches`](Self::list_sketches), keyed by `id`.
  pub async fn get_sketch_by_id(&self, id: &str, force: bool) -> FetchResult<SketchDetail> {
    let key = id.to_string();
    let fetch = {
      let mut state = self.state.lock();
      if !force {
        if let Some(detail) = state.details.get_valid(&key) {
          debug!(%id, "sketch detail served from cache");
          return Ok(detail.clone());
        }
      }

      let api = Arc::clone(&self.api);
      let producer = move || logged("sketch detail", api.fetch_sketch_detail(id));
      if force {
        state.detail_fetches.start(key, &self.state, producer)
      } else {
        state.detail_fetches.coalesce(key, &self.state, producer)
      }
    };

    wait(fetch).await
  }

  /// Drop the cached list and tell every subscriber it may have changed.
  ///
  /// A list fetch already in flight is left alone and its result is still
  /// stored when it lands.
  pub fn invalidate_list(&self) {
    self.state.lock().list.invalidate(&());
    info!("sketch list invalidated");
    self.bus.publish();
  }

  /// Drop one cached sketch (and forget its pending fetch), or all of them.
  pub fn invalidate_detail(&self, id: Option<&str>) {
    let mut state = self.state.lock();
    match id {
      Some(id) => {
        let key = id.to_string();
        state.details.invalidate(&key);
        state.detail_fetches.remove(&key);
        info!(%id, "sketch detail invalidated");
      }
      None => {
        state.details.clear();
        state.detail_fetches.clear();
        info!("all sketch details invalidated");
      }
    }
  }

  /// Be told whenever the list is invalidated.
  pub fn subscribe_to_list<F>(&self, listener: F) -> Subscription
  where
    F: Fn() -> color_eyre::Result<()> + Send + Sync + 'static,
  {
    self.bus.subscribe(listener)
  }

  /// The cached list, fresh or stale, without touching the network.
  pub fn cached_list(&self) -> Option<Cached<Vec<SketchSummary>>> {
    let state = self.state.lock();
    state.list.entry(&()).map(|entry| Cached {
      value: entry.value.clone(),
      fresh: entry.is_valid(),
    })
  }

  /// The cached sketch, fresh or stale, without touching the network.
  pub fn cached_detail(&self, id: &str) -> Option<Cached<SketchDetail>> {
    let state = self.state.lock();
    state.details.entry(&id.to_string()).map(|entry| Cached {
      value: entry.value.clone(),
      fresh: entry.is_valid(),
    })
  }
}

/// Log a network fetch once, regardless of how many callers share it.
fn logged<V: Send + 'static>(
  what: &'static str,
  fetch: BoxFuture<'static, FetchResult<V>>,
) -> BoxFuture<'static, FetchResult<V>> {
  info!("fetching {}", what);
  async move {
    let result = fetch.await;
    if let Err(err) = &result {
      warn!(error = %err, "{} fetch failed", what);
    }
    result
  }
  .boxed()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fake::{detail, sketch, FakeApi};
  use crate::api::FetchError;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::time::advance;

  const TTL: Duration = Duration::from_secs(60);

  fn store_with(api: &FakeApi) -> SketchStore {
    SketchStore::new(Arc::new(api.clone()), TTL)
  }

  fn not_found() -> FetchError {
    FetchError::Status {
      status: 404,
      message: "not found".to_string(),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_detail_requests_coalesce() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    api.set_detail("x", Ok(detail("x")));
    let store = store_with(&api);

    let results =
      futures::future::join_all((0..8).map(|_| store.get_sketch_by_id("x", false))).await;

    assert_eq!(api.detail_calls(), 1);
    assert!(results.iter().all(|r| *r == Ok(detail("x"))));
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_list_requests_coalesce() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    api.set_list(Ok(vec![sketch("a")]));
    let store = store_with(&api);

    let (a, b, c) = tokio::join!(
      store.list_sketches(false),
      store.list_sketches(false),
      store.list_sketches(false)
    );

    assert_eq!(api.list_calls(), 1);
    assert_eq!(a, b);
    assert_eq!(b, c);
  }

  #[tokio::test(start_paused = true)]
  async fn test_list_within_ttl_is_served_from_cache() {
    let api = FakeApi::new();
    api.set_list(Ok(vec![sketch("a"), sketch("b")]));
    let store = store_with(&api);

    let first = store.list_sketches(false).await.unwrap();
    assert_eq!(api.list_calls(), 1);

    advance(Duration::from_secs(30)).await;
    let second = store.list_sketches(false).await.unwrap();
    assert_eq!(api.list_calls(), 1);
    assert_eq!(first, second);
    assert_eq!(
      second.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
      vec!["a", "b"]
    );

    advance(Duration::from_secs(31)).await;
    store.list_sketches(false).await.unwrap();
    assert_eq!(api.list_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_ttl_edges() {
    let api = FakeApi::new();
    api.set_detail("x", Ok(detail("x")));
    let store = store_with(&api);

    store.get_sketch_by_id("x", false).await.unwrap();

    advance(TTL - Duration::from_millis(1)).await;
    store.get_sketch_by_id("x", false).await.unwrap();
    assert_eq!(api.detail_calls(), 1);

    advance(Duration::from_millis(2)).await;
    store.get_sketch_by_id("x", false).await.unwrap();
    assert_eq!(api.detail_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_forced_list_bypasses_and_overwrites_cache() {
    let api = FakeApi::new();
    api.set_list(Ok(vec![sketch("a")]));
    let store = store_with(&api);

    store.list_sketches(false).await.unwrap();

    api.set_list(Ok(vec![sketch("a"), sketch("c")]));
    let forced = store.list_sketches(true).await.unwrap();
    assert_eq!(api.list_calls(), 2);
    assert_eq!(forced.len(), 2);

    // The forced result now backs plain reads
    let cached = store.list_sketches(false).await.unwrap();
    assert_eq!(api.list_calls(), 2);
    assert_eq!(cached, forced);
  }

  #[tokio::test(start_paused = true)]
  async fn test_forced_fetch_does_not_join_pending() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    api.set_detail("x", Ok(detail("x")));
    let store = store_with(&api);

    let (plain, forced) = tokio::join!(
      store.get_sketch_by_id("x", false),
      store.get_sketch_by_id("x", true)
    );

    assert!(plain.is_ok() && forced.is_ok());
    assert_eq!(api.detail_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_list_refetches_and_notifies_once() {
    let api = FakeApi::new();
    api.set_list(Ok(vec![sketch("a")]));
    let store = store_with(&api);

    let notified = Arc::new(AtomicUsize::new(0));
    let n = notified.clone();
    let _sub = store.subscribe_to_list(move || {
      n.fetch_add(1, Ordering::SeqCst);
      Ok(())
    });

    store.list_sketches(false).await.unwrap();
    store.invalidate_list();
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(store.cached_list().is_none());

    store.list_sketches(false).await.unwrap();
    assert_eq!(api.list_calls(), 2);

    store.invalidate_list();
    store.invalidate_list();
    assert_eq!(notified.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failing_listener_does_not_block_others() {
    let store = store_with(&FakeApi::new());

    let _bad = store.subscribe_to_list(|| panic!("stale view"));
    let notified = Arc::new(AtomicUsize::new(0));
    let n = notified.clone();
    let _good = store.subscribe_to_list(move || {
      n.fetch_add(1, Ordering::SeqCst);
      Ok(())
    });

    store.invalidate_list();
    assert_eq!(notified.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_shared_rejection_leaves_cache_empty() {
    let api = FakeApi::new().with_delay(Duration::from_millis(50));
    api.set_detail("x", Err(not_found()));
    let store = store_with(&api);

    let (a, b) = tokio::join!(
      store.get_sketch_by_id("x", false),
      store.get_sketch_by_id("x", false)
    );

    assert_eq!(api.detail_calls(), 1);
    assert_eq!(a, Err(not_found()));
    assert_eq!(a, b);
    assert!(store.cached_detail("x").is_none());

    // Nothing poisoned: the next call goes back to the network
    api.set_detail("x", Ok(detail("x")));
    assert_eq!(store.get_sketch_by_id("x", false).await, Ok(detail("x")));
    assert_eq!(api.detail_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_refresh_keeps_previous_entry() {
    let api = FakeApi::new();
    api.set_list(Ok(vec![sketch("a")]));
    let store = store_with(&api);
    store.list_sketches(false).await.unwrap();

    api.set_list(Err(FetchError::Transport("connection reset".to_string())));
    assert!(store.list_sketches(true).await.is_err());

    // Still within TTL, so the old list is served
    assert_eq!(store.list_sketches(false).await, Ok(vec![sketch("a")]));
    assert_eq!(api.list_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_late_fetch_after_invalidation_is_applied() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    api.set_list(Ok(vec![sketch("late")]));
    let store = store_with(&api);

    let pending = tokio::spawn({
      let store = store.clone();
      async move { store.list_sketches(false).await }
    });
    tokio::task::yield_now().await;

    store.invalidate_list();
    pending.await.unwrap().unwrap();

    let cached = store.cached_list().unwrap();
    assert!(cached.fresh);
    assert_eq!(cached.value, vec![sketch("late")]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_dropped_caller_does_not_cancel_fetch() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    api.set_detail("x", Ok(detail("x")));
    let store = store_with(&api);

    let caller = tokio::spawn({
      let store = store.clone();
      async move { store.get_sketch_by_id("x", false).await }
    });
    tokio::task::yield_now().await;
    caller.abort();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(api.detail_calls(), 1);
    assert!(store.cached_detail("x").unwrap().fresh);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_single_detail() {
    let api = FakeApi::new();
    api.set_detail("x", Ok(detail("x")));
    api.set_detail("y", Ok(detail("y")));
    let store = store_with(&api);

    store.get_sketch_by_id("x", false).await.unwrap();
    store.get_sketch_by_id("y", false).await.unwrap();

    store.invalidate_detail(Some("x"));
    assert!(store.cached_detail("x").is_none());
    assert!(store.cached_detail("y").is_some());

    store.get_sketch_by_id("x", false).await.unwrap();
    store.get_sketch_by_id("y", false).await.unwrap();
    assert_eq!(api.detail_calls(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_all_details_forgets_pending() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    api.set_detail("x", Ok(detail("x")));
    let store = store_with(&api);

    let first = tokio::spawn({
      let store = store.clone();
      async move { store.get_sketch_by_id("x", false).await }
    });
    tokio::task::yield_now().await;

    store.invalidate_detail(None);

    // With the slot forgotten, a new caller starts its own fetch
    let second = store.get_sketch_by_id("x", false).await;
    assert!(second.is_ok());
    assert!(first.await.unwrap().is_ok());
    assert_eq!(api.detail_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_one_detail_forgets_only_its_pending_fetch() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    api.set_detail("x", Ok(detail("x")));
    api.set_detail("y", Ok(detail("y")));
    let store = store_with(&api);

    let pending: Vec<_> = ["x", "y"]
      .into_iter()
      .map(|id| {
        let store = store.clone();
        tokio::spawn(async move { store.get_sketch_by_id(id, false).await })
      })
      .collect();
    tokio::task::yield_now().await;
    assert_eq!(api.detail_calls(), 2);

    store.invalidate_detail(Some("x"));

    // "x" starts over, "y" still joins the fetch already running
    let (x, y) = tokio::join!(
      store.get_sketch_by_id("x", false),
      store.get_sketch_by_id("y", false)
    );
    assert_eq!(x, Ok(detail("x")));
    assert_eq!(y, Ok(detail("y")));
    assert_eq!(api.detail_calls(), 3);
    for handle in pending {
      assert!(handle.await.unwrap().is_ok());
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_entry_reported_by_cached_detail() {
    let api = FakeApi::new();
    api.set_detail("x", Ok(detail("x")));
    let store = store_with(&api);
    store.get_sketch_by_id("x", false).await.unwrap();

    assert!(store.cached_detail("x").unwrap().fresh);
    advance(TTL).await;
    let cached = store.cached_detail("x").unwrap();
    assert!(!cached.fresh);
    assert_eq!(cached.value, detail("x"));
  }
}
