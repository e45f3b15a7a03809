//! Sketch mutations. Each one invalidates what it may have changed so every
//! live view refetches.

use tracing::info;

use crate::api::{FetchResult, SketchPriority, SketchStatus, SketchUpdate};
use crate::cache::SketchStore;

/// Change triage fields of one sketch.
pub async fn update_sketch(store: &SketchStore, id: &str, update: SketchUpdate) -> FetchResult<()> {
  if update.is_empty() {
    return Ok(());
  }
  store.api().update_sketch(id, update).await?;
  info!(%id, "sketch updated");
  store.invalidate_detail(Some(id));
  store.invalidate_list();
  Ok(())
}

pub async fn set_status(store: &SketchStore, id: &str, status: SketchStatus) -> FetchResult<()> {
  let update = SketchUpdate {
    status: Some(status),
    ..SketchUpdate::default()
  };
  update_sketch(store, id, update).await
}

pub async fn set_priority(
  store: &SketchStore,
  id: &str,
  priority: SketchPriority,
) -> FetchResult<()> {
  let update = SketchUpdate {
    priority: Some(priority),
    ..SketchUpdate::default()
  };
  update_sketch(store, id, update).await
}

pub async fn delete_sketch(store: &SketchStore, id: &str) -> FetchResult<()> {
  store.api().delete_sketch(id).await?;
  info!(%id, "sketch deleted");
  store.invalidate_detail(Some(id));
  store.invalidate_list();
  Ok(())
}
