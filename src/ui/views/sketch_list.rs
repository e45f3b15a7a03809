use crate::api::SketchSummary;
use crate::binding::{ListOptions, SketchListBinding};
use crate::cache::SketchStore;
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{priority_color, status_color, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::SketchDetailView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// All sketches, newest server order, with a `/` filter
pub struct SketchListView {
  store: SketchStore,
  binding: SketchListBinding,
  list_state: ListState,
  search: SearchInput,
  filter: String,
}

impl SketchListView {
  pub fn new(store: SketchStore, options: ListOptions) -> Self {
    let mut binding = SketchListBinding::new(store.clone(), options);
    binding.activate();

    Self {
      store,
      binding,
      list_state: ListState::default(),
      search: SearchInput::new(),
      filter: String::new(),
    }
  }

  fn visible(&self) -> Vec<&SketchSummary> {
    self
      .binding
      .data()
      .unwrap_or(&[])
      .iter()
      .filter(|sketch| sketch.matches(&self.filter))
      .collect()
  }

  fn selected_id(&self) -> Option<String> {
    let idx = self.list_state.selected()?;
    self.visible().get(idx).map(|sketch| sketch.id.clone())
  }

  fn title(&self, shown: usize) -> String {
    let total = self.binding.data().map_or(0, <[_]>::len);
    let count = if self.filter.is_empty() {
      format!("{}", total)
    } else {
      format!("{}/{} matching '{}'", shown, total, self.filter)
    };
    if self.binding.is_loading() {
      format!(" Sketches ({}) (loading...) ", count)
    } else if let Some(e) = self.binding.error() {
      format!(" Sketches ({}) (error: {}) ", count, e)
    } else {
      format!(" Sketches ({}) ", count)
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = self.visible().into_iter().map(sketch_row).collect();
    let title = self.title(items.len());

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if items.is_empty() {
      let content = if self.binding.is_loading() {
        "Loading sketches..."
      } else if self.binding.error().is_some() {
        "Failed to load sketches. Press 'r' to retry."
      } else if !self.filter.is_empty() {
        "No sketches match the filter."
      } else {
        "No sketches found."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    ensure_valid_selection(&mut self.list_state, items.len());

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

fn sketch_row(sketch: &SketchSummary) -> ListItem<'static> {
  let status = sketch.status.as_ref().map_or("-", |s| s.as_str());
  let priority = sketch.priority.as_ref().map_or("-", |p| p.as_str());

  ListItem::new(Line::from(vec![
    Span::styled(
      format!("{:<28}", truncate(&sketch.name, 28)),
      Style::default().fg(Color::Cyan),
    ),
    Span::raw(" "),
    Span::styled(
      format!("{:<12}", truncate(status, 12)),
      Style::default().fg(status_color(sketch.status.as_ref())),
    ),
    Span::raw(" "),
    Span::styled(
      format!("{:<8}", truncate(priority, 8)),
      Style::default().fg(priority_color(sketch.priority.as_ref())),
    ),
    Span::raw(" "),
    Span::raw(format!(
      "{:<20}",
      truncate(sketch.suspect.as_deref().unwrap_or("unknown suspect"), 20)
    )),
    Span::raw(" "),
    Span::styled(
      truncate(sketch.officer.as_deref().unwrap_or(""), 20),
      Style::default().fg(Color::DarkGray),
    ),
  ]))
}

impl View for SketchListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(filter)) => {
        self.filter = filter;
        self.list_state.select_first();
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Submitted) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.list_state.select_last(),
      KeyCode::Char('r') => {
        self.binding.refresh();
        return ViewAction::Notify("Refreshing sketches...".to_string());
      }
      KeyCode::Esc if !self.filter.is_empty() => {
        self.filter.clear();
      }
      KeyCode::Enter => {
        if let Some(id) = self.selected_id() {
          return ViewAction::Push(Box::new(SketchDetailView::new(self.store.clone(), id)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Sketches".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.binding.poll();
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("/", "filter").with_priority(20),
      Shortcut::new("r", "refresh").with_priority(30),
      Shortcut::new("enter", "open").with_priority(40),
      Shortcut::new("q", "quit").with_priority(90),
    ]
  }
}
