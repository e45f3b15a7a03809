//! In-memory `SketchApi` for tests: canned responses, call counters and an
//! optional response delay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

use super::{FetchError, FetchResult, SketchApi, SketchDetail, SketchSummary, SketchUpdate};

#[derive(Default)]
struct FakeState {
  list: Mutex<Option<FetchResult<Vec<SketchSummary>>>>,
  details: Mutex<HashMap<String, FetchResult<SketchDetail>>>,
  delay: Mutex<Duration>,
  list_calls: AtomicUsize,
  detail_calls: AtomicUsize,
  updates: Mutex<Vec<(String, SketchUpdate)>>,
  deletes: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct FakeApi {
  state: Arc<FakeState>,
}

impl FakeApi {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_delay(self, delay: Duration) -> Self {
    *self.state.delay.lock() = delay;
    self
  }

  pub fn set_list(&self, result: FetchResult<Vec<SketchSummary>>) {
    *self.state.list.lock() = Some(result);
  }

  pub fn set_detail(&self, id: &str, result: FetchResult<SketchDetail>) {
    self.state.details.lock().insert(id.to_string(), result);
  }

  pub fn list_calls(&self) -> usize {
    self.state.list_calls.load(Ordering::SeqCst)
  }

  pub fn detail_calls(&self) -> usize {
    self.state.detail_calls.load(Ordering::SeqCst)
  }

  pub fn updates(&self) -> Vec<(String, SketchUpdate)> {
    self.state.updates.lock().clone()
  }

  pub fn deletes(&self) -> Vec<String> {
    self.state.deletes.lock().clone()
  }

  fn delay(&self) -> Duration {
    *self.state.delay.lock()
  }
}

async fn respond<T>(delay: Duration, result: FetchResult<T>) -> FetchResult<T> {
  if !delay.is_zero() {
    tokio::time::sleep(delay).await;
  }
  result
}

impl SketchApi for FakeApi {
  fn fetch_sketch_list(&self) -> BoxFuture<'static, FetchResult<Vec<SketchSummary>>> {
    self.state.list_calls.fetch_add(1, Ordering::SeqCst);
    let result = self
      .state
      .list
      .lock()
      .clone()
      .unwrap_or_else(|| Ok(Vec::new()));
    respond(self.delay(), result).boxed()
  }

  fn fetch_sketch_detail(&self, id: &str) -> BoxFuture<'static, FetchResult<SketchDetail>> {
    self.state.detail_calls.fetch_add(1, Ordering::SeqCst);
    let result = self
      .state
      .details
      .lock()
      .get(id)
      .cloned()
      .unwrap_or_else(|| {
        Err(FetchError::Status {
          status: 404,
          message: "not found".to_string(),
        })
      });
    respond(self.delay(), result).boxed()
  }

  fn update_sketch(&self, id: &str, update: SketchUpdate) -> BoxFuture<'static, FetchResult<()>> {
    self.state.updates.lock().push((id.to_string(), update));
    respond(self.delay(), Ok(())).boxed()
  }

  fn delete_sketch(&self, id: &str) -> BoxFuture<'static, FetchResult<()>> {
    self.state.deletes.lock().push(id.to_string());
    self.state.details.lock().remove(id);
    respond(self.delay(), Ok(())).boxed()
  }
}

pub fn sketch(id: &str) -> SketchSummary {
  SketchSummary {
    id: id.to_string(),
    name: format!("Sketch {}", id),
    suspect: None,
    eyewitness: None,
    officer: None,
    date: None,
    reason: None,
    description: None,
    priority: None,
    status: None,
    image_url: None,
    created_at: None,
    updated_at: None,
  }
}

pub fn detail(id: &str) -> SketchDetail {
  SketchDetail {
    summary: sketch(id),
    sketch_state: None,
  }
}
