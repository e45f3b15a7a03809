use serde::{Deserialize, Serialize};
use std::fmt;

/// Triage priority of a sketch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SketchPriority {
  Low,
  Medium,
  High,
  Urgent,
  /// Anything the server sends that we don't know about
  #[serde(untagged)]
  Other(String),
}

impl SketchPriority {
  pub const CYCLE: [SketchPriority; 4] = [
    SketchPriority::Low,
    SketchPriority::Medium,
    SketchPriority::High,
    SketchPriority::Urgent,
  ];

  pub fn as_str(&self) -> &str {
    match self {
      SketchPriority::Low => "low",
      SketchPriority::Medium => "medium",
      SketchPriority::High => "high",
      SketchPriority::Urgent => "urgent",
      SketchPriority::Other(s) => s,
    }
  }

  /// Next priority in the triage cycle, wrapping around.
  pub fn next(current: Option<&SketchPriority>) -> SketchPriority {
    next_in_cycle(&Self::CYCLE, current)
  }
}

impl fmt::Display for SketchPriority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Workflow status of a sketch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SketchStatus {
  Draft,
  InProgress,
  Review,
  Completed,
  #[serde(untagged)]
  Other(String),
}

impl SketchStatus {
  pub const CYCLE: [SketchStatus; 4] = [
    SketchStatus::Draft,
    SketchStatus::InProgress,
    SketchStatus::Review,
    SketchStatus::Completed,
  ];

  pub fn as_str(&self) -> &str {
    match self {
      SketchStatus::Draft => "draft",
      SketchStatus::InProgress => "in-progress",
      SketchStatus::Review => "review",
      SketchStatus::Completed => "completed",
      SketchStatus::Other(s) => s,
    }
  }

  /// Next status in the workflow cycle, wrapping around.
  pub fn next(current: Option<&SketchStatus>) -> SketchStatus {
    next_in_cycle(&Self::CYCLE, current)
  }
}

impl fmt::Display for SketchStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

fn next_in_cycle<T: Clone + PartialEq>(cycle: &[T], current: Option<&T>) -> T {
  let idx = current
    .and_then(|c| cycle.iter().position(|v| v == c))
    .map(|i| (i + 1) % cycle.len())
    .unwrap_or(0);
  cycle[idx].clone()
}

/// Summary of a sketch for list views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchSummary {
  #[serde(rename = "_id")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub suspect: Option<String>,
  #[serde(default)]
  pub eyewitness: Option<String>,
  #[serde(default)]
  pub officer: Option<String>,
  #[serde(default)]
  pub date: Option<String>,
  #[serde(default)]
  pub reason: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub priority: Option<SketchPriority>,
  #[serde(default)]
  pub status: Option<SketchStatus>,
  #[serde(default, rename = "cloudinary_url")]
  pub image_url: Option<String>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

impl SketchSummary {
  /// Case-insensitive match against name, suspect, officer and description.
  pub fn matches(&self, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
      return true;
    }
    [
      Some(self.name.as_str()),
      self.suspect.as_deref(),
      self.officer.as_deref(),
      self.description.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|value| value.to_lowercase().contains(&needle))
  }
}

/// Full sketch record, including the saved editing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchDetail {
  #[serde(flatten)]
  pub summary: SketchSummary,
  /// Serialized canvas state; never inspected here
  #[serde(default)]
  pub sketch_state: Option<serde_json::Value>,
}

impl SketchDetail {
  pub fn has_saved_state(&self) -> bool {
    matches!(&self.sketch_state, Some(v) if !v.is_null())
  }
}

/// Wire shape of `GET /sketches`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SketchListResponse {
  #[serde(default)]
  pub sketches: Option<Vec<SketchSummary>>,
}

impl SketchListResponse {
  pub fn into_sketches(self) -> Vec<SketchSummary> {
    self.sketches.unwrap_or_default()
  }
}

/// Fields a triage update may change. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SketchUpdate {
  pub status: Option<SketchStatus>,
  pub priority: Option<SketchPriority>,
}

impl SketchUpdate {
  pub fn is_empty(&self) -> bool {
    self.status.is_none() && self.priority.is_none()
  }

  /// Form fields to send, in a stable order.
  pub fn form_fields(&self) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if let Some(status) = &self.status {
      fields.push(("status", status.to_string()));
    }
    if let Some(priority) = &self.priority {
      fields.push(("priority", priority.to_string()));
    }
    fields
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_list_response() {
    let body = r#"{
      "sketches": [
        {"_id": "a", "name": "Harbor suspect", "status": "in-progress", "priority": "urgent",
         "cloudinary_url": "https://img/a.png"},
        {"_id": "b", "name": "Second", "status": "archived"}
      ]
    }"#;

    let response: SketchListResponse = serde_json::from_str(body).unwrap();
    let sketches = response.into_sketches();

    assert_eq!(sketches.len(), 2);
    assert_eq!(sketches[0].id, "a");
    assert_eq!(sketches[0].status, Some(SketchStatus::InProgress));
    assert_eq!(sketches[0].priority, Some(SketchPriority::Urgent));
    assert_eq!(sketches[0].image_url.as_deref(), Some("https://img/a.png"));
    assert_eq!(
      sketches[1].status,
      Some(SketchStatus::Other("archived".to_string()))
    );
  }

  #[test]
  fn test_missing_sketches_is_empty() {
    let response: SketchListResponse = serde_json::from_str("{}").unwrap();
    assert!(response.into_sketches().is_empty());

    let response: SketchListResponse = serde_json::from_str(r#"{"sketches": null}"#).unwrap();
    assert!(response.into_sketches().is_empty());
  }

  #[test]
  fn test_parse_detail_keeps_state_opaque() {
    let body = r#"{"_id": "x", "name": "Detail", "sketch_state": {"zoom": 1.5, "features": []}}"#;
    let detail: SketchDetail = serde_json::from_str(body).unwrap();

    assert_eq!(detail.summary.id, "x");
    assert!(detail.has_saved_state());
    assert_eq!(detail.sketch_state.unwrap()["zoom"], 1.5);
  }

  #[test]
  fn test_detail_without_state() {
    let detail: SketchDetail =
      serde_json::from_str(r#"{"_id": "x", "name": "n", "sketch_state": null}"#).unwrap();
    assert!(!detail.has_saved_state());
  }

  #[test]
  fn test_matches_is_case_insensitive() {
    let sketch = SketchSummary {
      id: "a".to_string(),
      name: "Harbor".to_string(),
      suspect: Some("John Doe".to_string()),
      eyewitness: None,
      officer: Some("Sgt. Vega".to_string()),
      date: None,
      reason: None,
      description: None,
      priority: None,
      status: None,
      image_url: None,
      created_at: None,
      updated_at: None,
    };

    assert!(sketch.matches("doe"));
    assert!(sketch.matches("VEGA"));
    assert!(sketch.matches("  "));
    assert!(!sketch.matches("smith"));
  }

  #[test]
  fn test_status_cycle_wraps() {
    assert_eq!(SketchStatus::next(None), SketchStatus::Draft);
    assert_eq!(
      SketchStatus::next(Some(&SketchStatus::Draft)),
      SketchStatus::InProgress
    );
    assert_eq!(
      SketchStatus::next(Some(&SketchStatus::Completed)),
      SketchStatus::Draft
    );
    assert_eq!(
      SketchPriority::next(Some(&SketchPriority::Other("x".into()))),
      SketchPriority::Low
    );
  }

  #[test]
  fn test_update_form_fields() {
    let update = SketchUpdate {
      status: Some(SketchStatus::Review),
      priority: None,
    };
    assert_eq!(update.form_fields(), vec![("status", "review".to_string())]);
    assert!(SketchUpdate::default().is_empty());
  }
}
