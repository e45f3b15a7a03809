use crate::api::HttpSketchApi;
use crate::binding::ListOptions;
use crate::cache::SketchStore;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::SketchListView;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::{stdout, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const TICK_RATE: Duration = Duration::from_millis(250);

/// Main application state
pub struct App {
  config: Config,

  /// Shared by every view; the only path to sketch data
  store: SketchStore,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  command: CommandInput,

  /// Last message for the footer
  status: Option<String>,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let api = HttpSketchApi::new(&config)?;
    let store = SketchStore::new(Arc::new(api), config.cache.ttl());
    Ok(Self::with_store(config, store))
  }

  /// Build around an existing store. Must be called inside the runtime since
  /// the root view starts fetching immediately.
  pub fn with_store(config: Config, store: SketchStore) -> Self {
    let root = Self::sketch_list(&config, &store);
    Self {
      config,
      store,
      view_stack: vec![root],
      command: CommandInput::new(),
      status: None,
      should_quit: false,
    }
  }

  fn sketch_list(config: &Config, store: &SketchStore) -> Box<dyn View> {
    let options = ListOptions {
      auto_refresh: config.cache.auto_refresh,
      refresh_interval: config.cache.refresh_interval(),
    };
    Box::new(SketchListView::new(store.clone(), options))
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.main_loop(&mut terminal).await;

    // Restore the terminal even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn main_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);
    info!("sketchdesk started");

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Resize) | Some(Event::Tick) => {}
        None => break,
      }
      self.tick();
    }

    info!("sketchdesk exiting");
    Ok(())
  }

  /// Poll every view so views under the top one stay current too. Only the
  /// top view may navigate.
  fn tick(&mut self) {
    let top = self.view_stack.len().saturating_sub(1);
    let mut actions = Vec::new();
    for (idx, view) in self.view_stack.iter_mut().enumerate() {
      let action = view.tick();
      if idx == top {
        actions.push(action);
      } else if let ViewAction::Notify(message) = action {
        actions.push(ViewAction::Notify(message));
      }
    }
    for action in actions {
      self.apply(action);
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let captured = self
      .view_stack
      .last()
      .map(|view| view.captures_input())
      .unwrap_or(false);

    if !captured {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => {
          self.execute_command(&cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    if let Some(view) = self.view_stack.last_mut() {
      let action = view.handle_key(key);
      self.apply(action);
    }
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => {
        debug!(view = %view.breadcrumb_label(), "push view");
        self.view_stack.push(view);
      }
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Notify(message) => self.status = Some(message),
    }
  }

  fn execute_command(&mut self, cmd: &str) {
    debug!(command = cmd, "execute command");
    match cmd {
      "sketches" => {
        self.view_stack.clear();
        self
          .view_stack
          .push(Self::sketch_list(&self.config, &self.store));
      }
      "refresh" => {
        self.store.invalidate_list();
        self.status = Some("Refreshing sketches...".to_string());
      }
      "purge" => {
        self.store.invalidate_detail(None);
        self.store.invalidate_list();
        self.status = Some("Cache purged".to_string());
      }
      "quit" => self.should_quit = true,
      "" => {}
      other => self.status = Some(format!("Unknown command: {}", other)),
    }
  }

  pub fn render_view(&mut self, frame: &mut Frame, area: Rect) {
    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, area);
    }
    self.command.render_overlay(frame, area);
  }

  pub fn title(&self) -> &str {
    self.config.display_title()
  }

  pub fn host(&self) -> &str {
    self.config.api.host()
  }

  pub fn status_message(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|view| view.shortcuts())
      .unwrap_or_default()
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }
}
