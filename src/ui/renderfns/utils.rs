use crate::api::{SketchPriority, SketchStatus};
use chrono::{DateTime, Local};
use ratatui::prelude::Color;

/// Truncate to `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn status_color(status: Option<&SketchStatus>) -> Color {
  match status {
    Some(SketchStatus::Completed) => Color::Green,
    Some(SketchStatus::InProgress) | Some(SketchStatus::Review) => Color::Yellow,
    Some(SketchStatus::Draft) => Color::Gray,
    _ => Color::White,
  }
}

pub fn priority_color(priority: Option<&SketchPriority>) -> Color {
  match priority {
    Some(SketchPriority::Urgent) => Color::Red,
    Some(SketchPriority::High) => Color::LightRed,
    Some(SketchPriority::Medium) => Color::Yellow,
    Some(SketchPriority::Low) => Color::DarkGray,
    _ => Color::White,
  }
}

/// Server timestamps are RFC 3339; show them in local time. Anything else is
/// shown as-is.
pub fn format_timestamp(raw: &str) -> String {
  DateTime::parse_from_rfc3339(raw)
    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|_| raw.to_string())
}
