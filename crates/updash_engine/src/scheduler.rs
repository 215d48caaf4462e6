use std::backtrace::BacktraceStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dash_logging::{dash_debug, dash_warn};
use updash_core::{Content, ContentBuilder, ErrorReport, Page, PaneState, RefreshPhase, Spinner};

use crate::task::TaskHandle;

/// Produces a pane's displayed data.
///
/// Runs on the pane's background thread, so it may block freely — including
/// synchronous `Dispatcher::execute` calls. Any error (or panic) becomes the
/// pane's diagnostic view instead of propagating to the render loop.
pub trait ContentProvider: Send + Sync {
    fn provide(&self, builder: &mut ContentBuilder) -> anyhow::Result<()>;
}

impl<F> ContentProvider for F
where
    F: Fn(&mut ContentBuilder) -> anyhow::Result<()> + Send + Sync,
{
    fn provide(&self, builder: &mut ContentBuilder) -> anyhow::Result<()> {
        self(builder)
    }
}

/// Typed registration for one pane's refresh behavior.
#[derive(Default)]
pub struct PaneBuilder {
    title: Option<String>,
    interval: Option<Duration>,
    show_refresh: bool,
    provider: Option<Arc<dyn ContentProvider>>,
}

impl PaneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Show the cycling refresh glyph while a run is in flight.
    pub fn show_refresh(mut self, show: bool) -> Self {
        self.show_refresh = show;
        self
    }

    pub fn provider(mut self, provider: impl ContentProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn build(self) -> PaneScheduler {
        PaneScheduler {
            title: self.title,
            interval: self.interval,
            show_refresh: self.show_refresh,
            provider: self.provider,
            state: PaneState::new(),
            task: None,
            pending_force: false,
            spinner: Spinner::new(),
        }
    }
}

/// Interval-driven refresh driver for one pane.
///
/// `tick` is called once per render-loop iteration and never blocks: it
/// starts at most one background run, polls for completion, and swaps in the
/// produced content (or the synthesized diagnostic view) when done.
pub struct PaneScheduler {
    title: Option<String>,
    interval: Option<Duration>,
    show_refresh: bool,
    provider: Option<Arc<dyn ContentProvider>>,
    state: PaneState,
    task: Option<TaskHandle<Result<Content, ErrorReport>>>,
    pending_force: bool,
    spinner: Spinner,
}

impl PaneScheduler {
    pub fn builder() -> PaneBuilder {
        PaneBuilder::new()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn phase(&self) -> RefreshPhase {
        self.state.phase()
    }

    pub fn is_running(&self) -> bool {
        self.state.phase() == RefreshPhase::Running
    }

    pub fn pages(&self) -> &[Page] {
        self.state.pages()
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.state.current_page()
    }

    pub fn selected_page(&self) -> usize {
        self.state.selected_page()
    }

    pub fn select_next_page(&mut self) {
        self.state.select_next_page();
    }

    pub fn select_prev_page(&mut self) {
        self.state.select_prev_page();
    }

    pub fn last_refreshed(&self) -> Option<Instant> {
        self.state.last_refreshed()
    }

    /// The retained failure from the most recent errored run, if any.
    pub fn caught_error(&self) -> Option<&ErrorReport> {
        self.state.caught_error()
    }

    /// True when a run should start: a provider and an interval are
    /// configured, and the pane has never refreshed or its interval elapsed.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };
        if self.provider.is_none() {
            return false;
        }
        match self.state.last_refreshed() {
            None => true,
            Some(last) => now.duration_since(last) >= interval,
        }
    }

    /// Non-blocking render-loop hook. Returns the refresh-indicator glyph to
    /// draw this frame, when enabled and a run is in flight.
    pub fn tick(&mut self, now: Instant) -> Option<char> {
        if let Some(task) = &self.task {
            let Some(outcome) = task.try_get() else {
                if self.show_refresh {
                    return Some(self.spinner.glyph(now));
                }
                return None;
            };
            self.task = None;
            self.spinner.reset();
            match outcome {
                Ok(Ok(pages)) => {
                    self.state.apply_success(pages, now);
                }
                Ok(Err(report)) => {
                    dash_warn!(
                        "pane {:?} provider failed: {}",
                        self.title.as_deref().unwrap_or("<untitled>"),
                        report.message
                    );
                    self.state.apply_failure(report, &error_timestamp(), now);
                }
                Err(panicked) => {
                    dash_warn!(
                        "pane {:?} provider panicked: {}",
                        self.title.as_deref().unwrap_or("<untitled>"),
                        panicked.message
                    );
                    let report = ErrorReport::new(panicked.to_string(), Vec::new());
                    self.state.apply_failure(report, &error_timestamp(), now);
                }
            }
            if self.pending_force {
                self.pending_force = false;
                self.state.clear_last_refreshed();
            }
            return None;
        }

        if self.needs_refresh(now) {
            self.start_run();
        }
        None
    }

    /// Clears the refresh timestamp so the next tick refreshes
    /// unconditionally. While a run is in flight this takes effect only
    /// after that run completes; a second concurrent run is never started.
    pub fn force(&mut self) {
        if self.task.is_some() {
            self.pending_force = true;
        } else {
            self.state.clear_last_refreshed();
        }
    }

    fn start_run(&mut self) {
        let Some(provider) = self.provider.as_ref().map(Arc::clone) else {
            return;
        };
        dash_debug!(
            "pane {:?} starting refresh",
            self.title.as_deref().unwrap_or("<untitled>")
        );
        self.state.begin_run();
        self.task = Some(TaskHandle::spawn(move || {
            let mut builder = ContentBuilder::new();
            match provider.provide(&mut builder) {
                Ok(()) => Ok(builder.into_pages()),
                Err(err) => Err(report_from_error(&err)),
            }
        }));
    }
}

fn error_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Flattens an error into a message plus one frame per line: the cause chain
/// first, then the captured backtrace when one exists.
fn report_from_error(err: &anyhow::Error) -> ErrorReport {
    let mut frames: Vec<String> = err
        .chain()
        .skip(1)
        .map(|cause| format!("caused by: {cause}"))
        .collect();
    let backtrace = err.backtrace();
    if backtrace.status() == BacktraceStatus::Captured {
        frames.extend(
            backtrace
                .to_string()
                .lines()
                .map(|line| line.trim_end().to_string()),
        );
    }
    ErrorReport::new(err.to_string(), frames)
}
