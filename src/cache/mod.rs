//! In-memory caching of sketch data in front of the HTTP API.
//!
//! - `TimedCache`: per-key TTL storage
//! - `InflightRegistry`: one shared fetch per key, however many callers ask
//! - `InvalidationBus`: "the list changed" notifications to live views
//! - `SketchStore`: the read-through cache that ties them together

mod bus;
mod inflight;
mod store;
mod timed;

pub use bus::Subscription;
pub use store::SketchStore;
