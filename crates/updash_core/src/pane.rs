use std::time::Instant;

use crate::content::{Content, Page};

/// Whether a pane currently has a background content run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Running,
}

/// A caught content-provider failure, kept around after the run so it can be
/// inspected or copied to the clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub message: String,
    pub frames: Vec<String>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>, frames: Vec<String>) -> Self {
        Self {
            message: message.into(),
            frames,
        }
    }

    /// Text handed to the clipboard when the operator copies the stacktrace.
    pub fn render(&self) -> String {
        if self.frames.is_empty() {
            self.message.clone()
        } else {
            self.frames.join("\n")
        }
    }
}

/// Three-page view shown in place of a pane's content after a failed run:
/// what happened, what to do about it, and the captured frames.
pub fn diagnostic_content(report: &ErrorReport, timestamp: &str) -> Content {
    let mut overview = Page::titled("Overview");
    overview.add_row(format!("[fg=red]{}[fg=white]", report.message));
    overview.add_row("");
    overview.add_row(format!("[fg=gray]Error at {timestamp}[fg=white]"));

    let mut directions = Page::titled("Directions");
    directions.add_row("1. Press 'c' to copy the stacktrace");
    directions.add_row("2. Check the log file for provider errors");
    directions.add_row("3. Stacktrace viewable in next page");

    let mut stacktrace = Page::titled("Stacktrace");
    for frame in &report.frames {
        stacktrace.add_row(frame.clone());
    }

    vec![overview, directions, stacktrace]
}

/// Pure per-pane refresh state: current pages, page selection, last refresh
/// time, and any retained error. Transitions are driven by the scheduler.
#[derive(Debug, Default)]
pub struct PaneState {
    running: bool,
    pages: Content,
    selected_page: usize,
    last_refreshed: Option<Instant>,
    caught_error: Option<ErrorReport>,
}

impl PaneState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RefreshPhase {
        if self.running {
            RefreshPhase::Running
        } else {
            RefreshPhase::Idle
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn selected_page(&self) -> usize {
        self.selected_page
    }

    /// Rows of the currently selected page, for the render layer.
    pub fn current_page(&self) -> Option<&Page> {
        self.pages.get(self.selected_page)
    }

    pub fn last_refreshed(&self) -> Option<Instant> {
        self.last_refreshed
    }

    pub fn caught_error(&self) -> Option<&ErrorReport> {
        self.caught_error.as_ref()
    }

    /// Marks the start of a background run. Only legal from `Idle`.
    pub fn begin_run(&mut self) {
        debug_assert!(!self.running, "pane already has a run in flight");
        self.running = true;
    }

    /// Successful run: swap in the new pages wholesale and clear any error.
    pub fn apply_success(&mut self, pages: Content, now: Instant) {
        self.pages = pages;
        self.caught_error = None;
        self.clamp_selection();
        self.last_refreshed = Some(now);
        self.running = false;
    }

    /// Failed run: replace the content with the diagnostic view and keep the
    /// report for later inspection.
    pub fn apply_failure(&mut self, report: ErrorReport, timestamp: &str, now: Instant) {
        self.pages = diagnostic_content(&report, timestamp);
        self.caught_error = Some(report);
        self.clamp_selection();
        self.last_refreshed = Some(now);
        self.running = false;
    }

    /// Forget the last refresh time so the next tick refreshes unconditionally.
    pub fn clear_last_refreshed(&mut self) {
        self.last_refreshed = None;
    }

    pub fn select_next_page(&mut self) {
        if self.pages.is_empty() {
            return;
        }
        self.selected_page = (self.selected_page + 1) % self.pages.len();
    }

    pub fn select_prev_page(&mut self) {
        if self.pages.is_empty() {
            return;
        }
        self.selected_page = self
            .selected_page
            .checked_sub(1)
            .unwrap_or(self.pages.len() - 1);
    }

    fn clamp_selection(&mut self) {
        if self.selected_page >= self.pages.len() {
            self.selected_page = 0;
        }
    }
}
