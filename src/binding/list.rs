use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::eyre;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{Feed, Sink, Update};
use crate::api::{FetchError, SketchSummary};
use crate::cache::{SketchStore, Subscription};

#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
  /// Force a refresh every `refresh_interval` while active
  pub auto_refresh: bool,
  pub refresh_interval: Duration,
}

impl Default for ListOptions {
  fn default() -> Self {
    Self {
      auto_refresh: false,
      refresh_interval: Duration::from_secs(30),
    }
  }
}

/// Starts forced list refreshes on behalf of one binding.
///
/// `pending` counts refreshes in flight. Bus and timer triggers only start
/// one when none is pending; an explicit `refresh()` always does.
#[derive(Clone)]
struct Refresher {
  store: SketchStore,
  pending: Arc<AtomicUsize>,
  sink: Sink<Vec<SketchSummary>>,
}

impl Refresher {
  /// Refresh unless one is already pending. Announces the fetch through
  /// the channel since the caller is not the UI thread.
  fn schedule(&self) -> bool {
    if !self.sink.is_alive() {
      return false;
    }
    if self
      .pending
      .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!("list refresh already pending, coalescing");
      return false;
    }
    self.sink.send(Update::Started);
    self.run();
    true
  }

  /// Always refresh. The caller accounts for the loading state itself.
  fn force(&self) {
    self.pending.fetch_add(1, Ordering::SeqCst);
    self.run();
  }

  fn run(&self) {
    let this = self.clone();
    tokio::spawn(async move {
      // Our own invalidation echo sees `pending > 0` and is coalesced
      this.store.invalidate_list();
      let result = this.store.list_sketches(true).await;
      this.pending.fetch_sub(1, Ordering::SeqCst);
      this.sink.send(Update::Settled(result));
    });
  }
}

/// The sketch collection, kept current while active.
pub struct SketchListBinding {
  store: SketchStore,
  options: ListOptions,
  feed: Feed<Vec<SketchSummary>>,
  pending: Arc<AtomicUsize>,
  subscription: Option<Subscription>,
  timer: Option<JoinHandle<()>>,
}

impl SketchListBinding {
  pub fn new(store: SketchStore, options: ListOptions) -> Self {
    Self {
      store,
      options,
      feed: Feed::new(),
      pending: Arc::default(),
      subscription: None,
      timer: None,
    }
  }

  fn refresher(&self) -> Refresher {
    Refresher {
      store: self.store.clone(),
      pending: Arc::clone(&self.pending),
      sink: self.feed.sink(),
    }
  }

  /// Show whatever is cached, fetch if it is missing or stale, then follow
  /// list invalidations (and the auto-refresh timer, if enabled).
  pub fn activate(&mut self) {
    if !self.feed.activate() {
      return;
    }
    // Refreshes left over from an earlier activation must not coalesce
    // triggers that belong to this one
    self.pending = Arc::default();

    match self.store.cached_list() {
      Some(cached) if cached.fresh => self.feed.seed(cached.value),
      cached => {
        if let Some(stale) = cached {
          self.feed.seed(stale.value);
        }
        let store = self.store.clone();
        self
          .feed
          .spawn(async move { store.list_sketches(false).await });
      }
    }

    let refresher = self.refresher();
    self.subscription = Some(self.store.subscribe_to_list(move || {
      // Listeners may be invoked from outside the runtime
      tokio::runtime::Handle::try_current()
        .map_err(|e| eyre!("cannot schedule sketch list refresh: {}", e))?;
      refresher.schedule();
      Ok(())
    }));

    if self.options.auto_refresh {
      self.timer = Some(spawn_timer(self.refresher(), self.options.refresh_interval));
    }
    info!(auto_refresh = self.options.auto_refresh, "sketch list binding active");
  }

  /// Invalidate and refetch from the network, even if the cache is fresh.
  pub fn refresh(&mut self) {
    if !self.feed.is_active() {
      return;
    }
    self.feed.state.begin();
    self.refresher().force();
  }

  /// Stop following changes. Fetches already running complete and populate
  /// the store, but their results no longer reach this binding.
  pub fn deactivate(&mut self) {
    if !self.feed.deactivate() {
      return;
    }
    if let Some(timer) = self.timer.take() {
      timer.abort();
    }
    if let Some(subscription) = self.subscription.take() {
      subscription.unsubscribe();
    }
    debug!("sketch list binding inactive");
  }

  /// Apply results that arrived since the last call.
  pub fn poll(&mut self) -> bool {
    self.feed.poll()
  }

  pub fn data(&self) -> Option<&[SketchSummary]> {
    self.feed.state.data().map(Vec::as_slice)
  }

  pub fn is_loading(&self) -> bool {
    self.feed.state.is_loading()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.feed.state.error()
  }
}

impl Drop for SketchListBinding {
  fn drop(&mut self) {
    self.deactivate();
  }
}

fn spawn_timer(refresher: Refresher, period: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if !refresher.sink.is_alive() {
        break;
      }
      debug!("auto-refreshing sketch list");
      refresher.schedule();
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fake::{sketch, FakeApi};
  use tokio::time::{advance, sleep};

  fn store_with(api: &FakeApi) -> SketchStore {
    SketchStore::new(Arc::new(api.clone()), Duration::from_secs(60))
  }

  async fn settle(binding: &mut SketchListBinding) {
    sleep(Duration::from_millis(500)).await;
    binding.poll();
  }

  #[tokio::test(start_paused = true)]
  async fn test_activate_fetches_when_nothing_cached() {
    let api = FakeApi::new();
    api.set_list(Ok(vec![sketch("a")]));
    let mut binding = SketchListBinding::new(store_with(&api), ListOptions::default());

    assert!(binding.data().is_none());
    binding.activate();
    assert!(binding.is_loading());

    settle(&mut binding).await;
    assert!(!binding.is_loading());
    assert_eq!(binding.data(), Some(&[sketch("a")][..]));
    assert_eq!(api.list_calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_activate_serves_fresh_cache_without_fetch() {
    let api = FakeApi::new();
    api.set_list(Ok(vec![sketch("a")]));
    let store = store_with(&api);
    store.list_sketches(false).await.unwrap();

    let mut binding = SketchListBinding::new(store, ListOptions::default());
    binding.activate();

    assert!(!binding.is_loading());
    assert_eq!(binding.data().map(<[_]>::len), Some(1));
    settle(&mut binding).await;
    assert_eq!(api.list_calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_cache_is_shown_while_refetching() {
    let api = FakeApi::new();
    api.set_list(Ok(vec![sketch("old")]));
    let store = store_with(&api);
    store.list_sketches(false).await.unwrap();
    advance(Duration::from_secs(61)).await;

    api.set_list(Ok(vec![sketch("new")]));
    let mut binding = SketchListBinding::new(store, ListOptions::default());
    binding.activate();

    assert!(binding.is_loading());
    assert_eq!(binding.data(), Some(&[sketch("old")][..]));

    settle(&mut binding).await;
    assert_eq!(binding.data(), Some(&[sketch("new")][..]));
    assert_eq!(api.list_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_refresh_forces_network_round_trip() {
    let api = FakeApi::new();
    let store = store_with(&api);
    store.list_sketches(false).await.unwrap();

    let mut binding = SketchListBinding::new(store, ListOptions::default());
    binding.activate();
    binding.refresh();
    assert!(binding.is_loading());

    settle(&mut binding).await;
    assert!(!binding.is_loading());
    // Cached read, then the forced refresh; its own invalidation is not
    // echoed into a second fetch
    assert_eq!(api.list_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidations_while_pending_are_coalesced() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    let store = store_with(&api);
    let mut binding = SketchListBinding::new(store.clone(), ListOptions::default());
    binding.activate();
    settle(&mut binding).await;
    assert_eq!(api.list_calls(), 1);

    store.invalidate_list();
    store.invalidate_list();
    store.invalidate_list();

    settle(&mut binding).await;
    assert!(!binding.is_loading());
    assert_eq!(api.list_calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_mutation_elsewhere_reaches_every_binding() {
    let api = FakeApi::new();
    api.set_list(Ok(vec![sketch("a")]));
    let store = store_with(&api);

    let mut first = SketchListBinding::new(store.clone(), ListOptions::default());
    let mut second = SketchListBinding::new(store.clone(), ListOptions::default());
    first.activate();
    second.activate();
    settle(&mut first).await;
    second.poll();

    api.set_list(Ok(vec![sketch("a"), sketch("b")]));
    store.invalidate_list();

    settle(&mut first).await;
    second.poll();
    assert_eq!(first.data().map(<[_]>::len), Some(2));
    assert_eq!(second.data().map(<[_]>::len), Some(2));
  }

  #[tokio::test(start_paused = true)]
  async fn test_deactivated_binding_discards_result_but_store_is_populated() {
    let api = FakeApi::new().with_delay(Duration::from_millis(100));
    api.set_list(Ok(vec![sketch("a")]));
    let store = store_with(&api);

    let mut binding = SketchListBinding::new(store.clone(), ListOptions::default());
    binding.activate();
    binding.deactivate();
    assert!(!binding.is_loading());

    settle(&mut binding).await;
    assert!(binding.data().is_none());
    assert!(store.cached_list().unwrap().fresh);
  }

  #[tokio::test(start_paused = true)]
  async fn test_dropped_binding_stops_listening() {
    let api = FakeApi::new();
    let store = store_with(&api);
    {
      let mut binding = SketchListBinding::new(store.clone(), ListOptions::default());
      binding.activate();
      settle(&mut binding).await;
    }
    assert_eq!(api.list_calls(), 1);

    store.invalidate_list();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(api.list_calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reactivated_binding_follows_invalidations() {
    let api = FakeApi::new().with_delay(Duration::from_secs(1));
    api.set_list(Ok(vec![sketch("a")]));
    let store = store_with(&api);
    let mut binding = SketchListBinding::new(store.clone(), ListOptions::default());
    binding.activate();
    sleep(Duration::from_secs(2)).await;
    binding.poll();
    assert_eq!(api.list_calls(), 1);

    // Leave a refresh running across the reactivation
    binding.refresh();
    sleep(Duration::from_millis(100)).await;
    binding.deactivate();
    binding.activate();

    api.set_list(Ok(vec![sketch("a"), sketch("b")]));
    store.invalidate_list();
    sleep(Duration::from_secs(5)).await;
    binding.poll();

    assert_eq!(api.list_calls(), 3);
    assert_eq!(binding.data().map(<[_]>::len), Some(2));
    assert!(!binding.is_loading());
  }

  #[tokio::test(start_paused = true)]
  async fn test_auto_refresh_runs_on_interval() {
    let api = FakeApi::new();
    let store = store_with(&api);
    let options = ListOptions {
      auto_refresh: true,
      refresh_interval: Duration::from_secs(30),
    };
    let mut binding = SketchListBinding::new(store, options);
    binding.activate();
    settle(&mut binding).await;
    assert_eq!(api.list_calls(), 1);

    sleep(Duration::from_secs(30)).await;
    settle(&mut binding).await;
    assert_eq!(api.list_calls(), 2);

    sleep(Duration::from_secs(30)).await;
    settle(&mut binding).await;
    assert_eq!(api.list_calls(), 3);

    binding.deactivate();
    sleep(Duration::from_secs(90)).await;
    assert_eq!(api.list_calls(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_error_is_surfaced_and_retry_clears_it() {
    let api = FakeApi::new();
    api.set_list(Err(FetchError::Timeout));
    let mut binding = SketchListBinding::new(store_with(&api), ListOptions::default());
    binding.activate();
    settle(&mut binding).await;

    assert_eq!(binding.error(), Some(&FetchError::Timeout));
    assert!(!binding.is_loading());

    api.set_list(Ok(vec![sketch("a")]));
    binding.refresh();
    settle(&mut binding).await;
    assert!(binding.error().is_none());
    assert_eq!(binding.data().map(<[_]>::len), Some(1));
  }
}
