//! Remote sketch API: wire types, error taxonomy and the HTTP client.

mod client;
mod error;
#[cfg(test)]
pub mod fake;
pub mod types;

use futures::future::BoxFuture;

pub use client::HttpSketchApi;
pub use error::{FetchError, FetchResult};
pub use types::{SketchDetail, SketchPriority, SketchStatus, SketchSummary, SketchUpdate};

/// The operations the rest of the app needs from the remote service.
///
/// Futures are `'static` so they can be spawned and outlive the caller.
pub trait SketchApi: Send + Sync + 'static {
  /// `GET /sketches`, in server order
  fn fetch_sketch_list(&self) -> BoxFuture<'static, FetchResult<Vec<SketchSummary>>>;

  /// `GET /sketches/{id}`
  fn fetch_sketch_detail(&self, id: &str) -> BoxFuture<'static, FetchResult<SketchDetail>>;

  /// `PUT /sketches/{id}` with the changed triage fields
  fn update_sketch(&self, id: &str, update: SketchUpdate) -> BoxFuture<'static, FetchResult<()>>;

  /// `DELETE /sketches/{id}`
  fn delete_sketch(&self, id: &str) -> BoxFuture<'static, FetchResult<()>>;
}
