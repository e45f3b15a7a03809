use crate::actions;
use crate::api::{FetchResult, SketchDetail, SketchPriority, SketchStatus};
use crate::binding::SketchDetailBinding;
use crate::cache::SketchStore;
use crate::ui::renderfns::{format_timestamp, priority_color, status_color};
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::sync::mpsc;
use tracing::warn;

/// Outcome of a mutation started from this view
#[derive(Debug)]
enum Mutation {
  Updated(String),
  Deleted,
  Failed(String),
}

/// One sketch with triage actions
pub struct SketchDetailView {
  id: String,
  store: SketchStore,
  binding: SketchDetailBinding,
  mutations_tx: mpsc::UnboundedSender<Mutation>,
  mutations_rx: mpsc::UnboundedReceiver<Mutation>,
  mutating: bool,
  confirm_delete: bool,
}

impl SketchDetailView {
  pub fn new(store: SketchStore, id: String) -> Self {
    let mut binding = SketchDetailBinding::new(store.clone(), Some(id.clone()));
    binding.activate();
    let (mutations_tx, mutations_rx) = mpsc::unbounded_channel();

    Self {
      id,
      store,
      binding,
      mutations_tx,
      mutations_rx,
      mutating: false,
      confirm_delete: false,
    }
  }

  /// Run a mutation in the background; its outcome is picked up in `tick`.
  fn mutate<F, Fut>(&mut self, on_success: Mutation, run: F) -> bool
  where
    F: FnOnce(SketchStore, String) -> Fut,
    Fut: std::future::Future<Output = FetchResult<()>> + Send + 'static,
  {
    if self.mutating {
      return false;
    }
    self.mutating = true;

    let future = run(self.store.clone(), self.id.clone());
    let tx = self.mutations_tx.clone();
    tokio::spawn(async move {
      let outcome = match future.await {
        Ok(()) => on_success,
        Err(e) => Mutation::Failed(e.to_string()),
      };
      tx.send(outcome).ok();
    });
    true
  }

  fn busy() -> ViewAction {
    ViewAction::Notify("Still saving the previous change...".to_string())
  }

  fn cycle_status(&mut self) -> ViewAction {
    let Some(current) = self.binding.data() else {
      return ViewAction::None;
    };
    let next = SketchStatus::next(current.summary.status.as_ref());
    let done = Mutation::Updated(format!("Status set to {}", next));
    if self.mutate(done, move |store, id| async move {
      actions::set_status(&store, &id, next).await
    }) {
      ViewAction::None
    } else {
      Self::busy()
    }
  }

  fn cycle_priority(&mut self) -> ViewAction {
    let Some(current) = self.binding.data() else {
      return ViewAction::None;
    };
    let next = SketchPriority::next(current.summary.priority.as_ref());
    let done = Mutation::Updated(format!("Priority set to {}", next));
    if self.mutate(done, move |store, id| async move {
      actions::set_priority(&store, &id, next).await
    }) {
      ViewAction::None
    } else {
      Self::busy()
    }
  }

  fn delete(&mut self) -> ViewAction {
    let started = self.mutate(Mutation::Deleted, |store, id| async move {
      actions::delete_sketch(&store, &id).await
    });
    if started {
      ViewAction::Notify("Deleting...".to_string())
    } else {
      Self::busy()
    }
  }

  fn title(&self) -> String {
    let name = self
      .binding
      .data()
      .map(|d| d.summary.name.as_str())
      .unwrap_or(self.id.as_str());
    if self.binding.is_loading() || self.mutating {
      format!(" {} (loading...) ", name)
    } else if let Some(e) = self.binding.error() {
      format!(" {} (error: {}) ", name, e)
    } else {
      format!(" {} ", name)
    }
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(detail) = self.binding.data() else {
      let (message, color) = match self.binding.error() {
        Some(e) if e.is_not_found() => (
          format!("Sketch {} no longer exists.\n\nPress 'q' to go back.", self.id),
          Color::Red,
        ),
        Some(e) =>(format!("Error: {}\n\nPress 'r' to retry.", e), Color::Red),
        None => ("Loading sketch...".to_string(), Color::DarkGray),
      };
      frame.render_widget(Paragraph::new(message).style(Style::default().fg(color)), inner);
      return;
    };

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(9), // Fields
        Constraint::Length(1), // Separator
        Constraint::Min(1),    // Description
        Constraint::Length(1), // Delete confirmation
      ])
      .split(inner);

    frame.render_widget(Paragraph::new(field_lines(detail)), chunks[0]);

    let sep = Paragraph::new("─".repeat(chunks[1].width as usize))
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(sep, chunks[1]);

    let desc = detail
      .summary
      .description
      .as_deref()
      .unwrap_or("No description");
    frame.render_widget(Paragraph::new(desc).wrap(Wrap { trim: true }), chunks[2]);

    if self.confirm_delete {
      let confirm = Paragraph::new("Delete this sketch? (y/n)")
        .style(Style::default().fg(Color::Red).bold());
      frame.render_widget(confirm, chunks[3]);
    }
  }
}

fn field_lines(detail: &SketchDetail) -> Vec<Line<'_>> {
  let sketch = &detail.summary;
  let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::DarkGray));
  let text = |value: Option<&str>| value.unwrap_or("-").to_string();

  let status = sketch.status.as_ref();
  let priority = sketch.priority.as_ref();
  let saved_state = if detail.has_saved_state() {
    Span::styled("saved", Style::default().fg(Color::Green))
  } else {
    Span::styled("none", Style::default().fg(Color::DarkGray))
  };

  vec![
    Line::from(vec![
      label("Status:    "),
      Span::styled(
        status.map_or("-".to_string(), |s| s.to_string()),
        Style::default().fg(status_color(status)),
      ),
      Span::raw("   "),
      label("Priority: "),
      Span::styled(
        priority.map_or("-".to_string(), |p| p.to_string()),
        Style::default().fg(priority_color(priority)),
      ),
    ]),
    Line::from(vec![label("Suspect:   "), Span::raw(text(sketch.suspect.as_deref()))]),
    Line::from(vec![label("Witness:   "), Span::raw(text(sketch.eyewitness.as_deref()))]),
    Line::from(vec![label("Officer:   "), Span::raw(text(sketch.officer.as_deref()))]),
    Line::from(vec![label("Date:      "), Span::raw(text(sketch.date.as_deref()))]),
    Line::from(vec![label("Reason:    "), Span::raw(text(sketch.reason.as_deref()))]),
    Line::from(vec![
      label("Updated:   "),
      Span::raw(sketch.updated_at.as_deref().map_or("-".to_string(), format_timestamp)),
    ]),
    Line::from(vec![label("Image:     "), Span::raw(text(sketch.image_url.as_deref()))]),
    Line::from(vec![label("Editor:    "), saved_state]),
  ]
}

impl View for SketchDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.confirm_delete {
      self.confirm_delete = false;
      return match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => self.delete(),
        _ => ViewAction::Notify("Delete cancelled".to_string()),
      };
    }

    match key.code {
      KeyCode::Char('r') => {
        self.binding.refresh();
        ViewAction::None
      }
      KeyCode::Char('s') => self.cycle_status(),
      KeyCode::Char('p') => self.cycle_priority(),
      KeyCode::Char('D') if self.binding.data().is_some() => {
        self.confirm_delete = true;
        ViewAction::None
      }
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    self
      .binding
      .data()
      .map(|d| d.summary.name.clone())
      .unwrap_or_else(|| self.id.clone())
  }

  fn tick(&mut self) -> ViewAction {
    self.binding.poll();

    match self.mutations_rx.try_recv() {
      Ok(Mutation::Updated(message)) => {
        self.mutating = false;
        self.binding.refresh();
        ViewAction::Notify(message)
      }
      Ok(Mutation::Deleted) => {
        self.mutating = false;
        ViewAction::Pop
      }
      Ok(Mutation::Failed(error)) => {
        self.mutating = false;
        warn!(id = %self.id, %error, "sketch mutation failed");
        ViewAction::Notify(error)
      }
      Err(_) => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    self.confirm_delete
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("r", "refresh").with_priority(10),
      Shortcut::new("s", "status").with_priority(20),
      Shortcut::new("p", "priority").with_priority(30),
      Shortcut::new("D", "delete").with_priority(40),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}
