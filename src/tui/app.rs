//! UI state and key handling.
//!
//! The app owns everything the renderer reads: the last fleet snapshot, the
//! selection, the cached log viewport content, and the adaptive tick state.
//! Runners are never touched directly; every mutation goes through the
//! manager, and slow operations (stop, restart, staggered starts) are spawned
//! so the event loop keeps breathing.

use crate::manager::Manager;
use crate::service::state::ServiceSnapshot;
use crate::tui::ui;
use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::text::Line;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Row shown in the add-modal when every catalog entry is already running.
pub const ALL_RUNNING_PLACEHOLDER: &str = "(All services are already running)";

/// Per-row change fingerprint: a tick re-renders only when one of these moves.
type RowKey = (String, String, String, u32, Option<DateTime<Utc>>);

/// State of the add-service overlay.
pub struct AddModal {
    pub available: Vec<String>,
    pub cursor: usize,
    selected: HashMap<String, bool>,
}

impl AddModal {
    fn new(available: Vec<String>) -> Self {
        Self {
            available,
            cursor: 0,
            selected: HashMap::new(),
        }
    }

    pub fn is_placeholder(&self, name: &str) -> bool {
        name == ALL_RUNNING_PLACEHOLDER
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.get(name).copied().unwrap_or(false)
    }

    pub fn toggle_current(&mut self) {
        if let Some(name) = self.available.get(self.cursor) {
            if name != ALL_RUNNING_PLACEHOLDER {
                let entry = self.selected.entry(name.clone()).or_insert(false);
                *entry = !*entry;
            }
        }
    }

    pub fn chosen(&self) -> Vec<String> {
        self.available
            .iter()
            .filter(|name| self.is_selected(name))
            .cloned()
            .collect()
    }
}

pub struct App {
    manager: Arc<Manager>,
    pub services: Vec<ServiceSnapshot>,
    pub selected: usize,
    pub modal: Option<AddModal>,
    pub quitting: bool,
    /// Pre-wrapped merged log content, rebuilt only when the fleet changed.
    pub log_lines: Vec<Line<'static>>,
    /// `None` follows the bottom; `Some(n)` is a manual scroll position.
    log_scroll: Option<usize>,
    /// Viewport height as of the last draw, needed to clamp manual scrolling.
    last_log_height: Cell<usize>,
    fingerprint: Vec<RowKey>,
    tick_interval: Duration,
    last_activity: Instant,
    width: u16,
}

impl App {
    pub fn new(manager: Arc<Manager>, width: u16) -> Self {
        Self {
            manager,
            services: Vec::new(),
            selected: 0,
            modal: None,
            quitting: false,
            log_lines: Vec::new(),
            log_scroll: None,
            last_log_height: Cell::new(10),
            fingerprint: Vec::new(),
            tick_interval: Duration::from_millis(500),
            last_activity: Instant::now(),
            width,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Sample the fleet. On change, rebuild the log viewport, jump it to the
    /// bottom and reset the activity clock; otherwise the cached content is
    /// reused as-is. Either way the tick cadence adapts to idleness.
    pub fn on_tick(&mut self) {
        let snapshots = self.manager.get_states();
        let fingerprint: Vec<RowKey> = snapshots
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    s.status.to_string(),
                    s.last_error.clone(),
                    s.reconnect_count,
                    s.latest_log_time(),
                )
            })
            .collect();

        let changed = fingerprint != self.fingerprint;
        self.services = snapshots;

        if changed {
            self.fingerprint = fingerprint;
            self.rebuild_log_lines();
            self.log_scroll = None;
            self.last_activity = Instant::now();
        }

        if self.selected >= self.services.len() && !self.services.is_empty() {
            self.selected = self.services.len() - 1;
        }

        self.tick_interval = interval_for_idle(self.last_activity.elapsed());
    }

    pub fn on_resize(&mut self, width: u16, _height: u16) {
        self.width = width;
        self.rebuild_log_lines();
    }

    fn rebuild_log_lines(&mut self) {
        // Border and padding eat four columns of the viewport.
        let content_width = (self.width.saturating_sub(4) as usize).max(40);
        self.log_lines = ui::logs::render_merged(&self.services, content_width);
    }

    /// First visible log line for a viewport of `height` lines.
    pub fn log_scroll_offset(&self, height: usize) -> usize {
        self.last_log_height.set(height);
        let max = self.log_lines.len().saturating_sub(height);
        match self.log_scroll {
            None => max,
            Some(pos) => pos.min(max),
        }
    }

    fn scroll_up(&mut self) {
        let height = self.last_log_height.get();
        let current = self.log_scroll_offset(height);
        self.log_scroll = Some(current.saturating_sub(1));
    }

    fn scroll_down(&mut self) {
        let height = self.last_log_height.get();
        let max = self.log_lines.len().saturating_sub(height);
        let current = self.log_scroll_offset(height);
        let next = (current + 1).min(max);
        // Back at the bottom: resume following
        self.log_scroll = if next >= max { None } else { Some(next) };
    }

    /// Handle one keystroke. Returns `false` when the UI should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if self.modal.is_some() {
            self.handle_modal_key(key);
            return true;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.quitting = true;
                return false;
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quitting = true;
                return false;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if self.selected > 0 {
                    self.selected -= 1;
                } else {
                    self.scroll_up();
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.services.len() {
                    self.selected += 1;
                } else {
                    self.scroll_down();
                }
            }
            KeyCode::Char('r') => {
                if let Some(svc) = self.services.get(self.selected) {
                    let manager = Arc::clone(&self.manager);
                    let name = svc.name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = manager.restart(&name).await {
                            tracing::error!("restart of '{}' failed: {}", name, e);
                        }
                    });
                }
            }
            KeyCode::Char('s') => {
                if let Some(svc) = self.services.get(self.selected) {
                    let manager = Arc::clone(&self.manager);
                    let name = svc.name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = manager.stop(&name).await {
                            tracing::error!("stop of '{}' failed: {}", name, e);
                        }
                    });
                }
            }
            KeyCode::Char('a') => self.enter_add_modal(),
            _ => {}
        }
        true
    }

    fn handle_modal_key(&mut self, key: KeyEvent) {
        let Some(modal) = self.modal.as_mut() else {
            return;
        };

        match key.code {
            KeyCode::Esc => {
                self.modal = None;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if modal.cursor > 0 {
                    modal.cursor -= 1;
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if modal.cursor + 1 < modal.available.len() {
                    modal.cursor += 1;
                }
            }
            KeyCode::Char(' ') => modal.toggle_current(),
            KeyCode::Enter => {
                let chosen = modal.chosen();
                if !chosen.is_empty() {
                    let manager = Arc::clone(&self.manager);
                    tokio::spawn(async move {
                        if let Err(e) = manager.start_many(&chosen).await {
                            tracing::error!("starting selected services failed: {}", e);
                        }
                    });
                }
                self.modal = None;
            }
            _ => {}
        }
    }

    fn enter_add_modal(&mut self) {
        let available = match self.manager.available_services() {
            Ok(names) => names,
            Err(e) => {
                tracing::error!("could not list catalog services: {}", e);
                return;
            }
        };

        // Nothing registered at all: nothing to offer
        let any_registered = !available.is_empty() || !self.services.is_empty();
        if !any_registered {
            return;
        }

        let available = if available.is_empty() {
            vec![ALL_RUNNING_PLACEHOLDER.to_string()]
        } else {
            available
        };
        self.modal = Some(AddModal::new(available));
    }
}

/// Tick cadence as a function of time since the last observed change.
pub fn interval_for_idle(idle: Duration) -> Duration {
    if idle > Duration::from_secs(30) {
        Duration::from_millis(2000)
    } else if idle > Duration::from_secs(10) {
        Duration::from_millis(1000)
    } else if idle > Duration::from_secs(5) {
        Duration::from_millis(750)
    } else {
        Duration::from_millis(500)
    }
}
