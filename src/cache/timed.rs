//! Key/value cache where every entry expires a fixed TTL after it was written.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Default time-to-live for cached sketch data.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// A cached value and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
  pub value: V,
  pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
  /// An entry is valid strictly before its expiry; at `expires_at` it is stale.
  pub fn is_valid_at(&self, now: Instant) -> bool {
    now < self.expires_at
  }

  pub fn is_valid(&self) -> bool {
    self.is_valid_at(Instant::now())
  }
}

/// In-memory TTL cache. Never performs I/O and never evicts on its own; stale
/// entries stay readable until overwritten or invalidated.
#[derive(Debug)]
pub struct TimedCache<K, V> {
  entries: HashMap<K, CacheEntry<V>>,
  ttl: Duration,
}

impl<K: Eq + Hash, V> TimedCache<K, V> {
  pub fn new(ttl: Duration) -> Self {
    Self {
      entries: HashMap::new(),
      ttl,
    }
  }

  /// The stored value, fresh or not.
  #[cfg(test)]
  pub fn get(&self, key: &K) -> Option<&V> {
    self.entries.get(key).map(|entry| &entry.value)
  }

  /// The stored value only while it is still valid.
  pub fn get_valid(&self, key: &K) -> Option<&V> {
    self
      .entries
      .get(key)
      .filter(|entry| entry.is_valid())
      .map(|entry| &entry.value)
  }

  pub fn entry(&self, key: &K) -> Option<&CacheEntry<V>> {
    self.entries.get(key)
  }

  /// Store a value, replacing any previous entry and restarting its TTL.
  pub fn set(&mut self, key: K, value: V) {
    let expires_at = Instant::now() + self.ttl;
    self.entries.insert(key, CacheEntry { value, expires_at });
  }

  #[cfg(test)]
  pub fn is_valid(&self, key: &K) -> bool {
    self
      .entries
      .get(key)
      .map(CacheEntry::is_valid)
      .unwrap_or(false)
  }

  /// Remove one entry. Returns whether anything was removed.
  pub fn invalidate(&mut self, key: &K) -> bool {
    self.entries.remove(key).is_some()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }
}

impl<K: Eq + Hash, V> Default for TimedCache<K, V> {
  fn default() -> Self {
    Self::new(DEFAULT_TTL)
  }
}
