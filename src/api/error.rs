//! Normalized failure of a remote sketch request.

use thiserror::Error;

/// Everything that can go wrong fetching or mutating a sketch.
///
/// Cloneable so a single failed fetch can be handed to every caller that
/// joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  /// The request timed out in the transport
  #[error("Request timeout: Server may be starting up. Please wait a moment and try again.")]
  Timeout,

  /// No response reached us
  #[error("Network error: No response from server. The server may be starting up. ({0})")]
  Transport(String),

  /// The server answered with a non-success status
  #[error("API Error {status}: {message}")]
  Status { status: u16, message: String },

  /// The response body could not be decoded
  #[error("Failed to decode response: {0}")]
  Decode(String),

  /// The shared fetch went away before producing a result
  #[error("Request was interrupted before completing")]
  Interrupted,
}

impl FetchError {
  /// Build a status error from a response body, preferring its `message`
  /// field, then `detail`, then a generic string.
  pub fn from_status(status: u16, body: &[u8]) -> Self {
    let message = serde_json::from_slice::<serde_json::Value>(body)
      .ok()
      .and_then(|v| {
        ["message", "detail"]
          .iter()
          .find_map(|field| v.get(field).and_then(value_to_message))
      })
      .unwrap_or_else(|| "Unknown error".to_string());

    FetchError::Status { status, message }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, FetchError::Status { status: 404, .. })
  }
}

fn value_to_message(value: &serde_json::Value) -> Option<String> {
  match value {
    serde_json::Value::Null => None,
    serde_json::Value::String(s) if s.is_empty() => None,
    serde_json::Value::String(s) => Some(s.clone()),
    other => Some(other.to_string()),
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      FetchError::Timeout
    } else if err.is_decode() {
      FetchError::Decode(err.to_string())
    } else {
      FetchError::Transport(err.to_string())
    }
  }
}

impl From<serde_json::Error> for FetchError {
  fn from(err: serde_json::Error) -> Self {
    FetchError::Decode(err.to_string())
  }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
