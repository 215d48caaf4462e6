use std::time::{Duration, Instant};

/// How often the refresh indicator advances to its next glyph.
pub const SPINNER_INTERVAL: Duration = Duration::from_millis(150);

const GLYPHS: [char; 4] = ['\\', '|', '/', '|'];

/// Cycling refresh-indicator glyph shown while a pane run is in flight.
#[derive(Debug, Default)]
pub struct Spinner {
    index: usize,
    last_advance: Option<Instant>,
}

impl Spinner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the glyph for `now`, advancing at most once per interval.
    pub fn glyph(&mut self, now: Instant) -> char {
        match self.last_advance {
            None => {
                self.last_advance = Some(now);
            }
            Some(last) if now.duration_since(last) >= SPINNER_INTERVAL => {
                self.index = (self.index + 1) % GLYPHS.len();
                self.last_advance = Some(now);
            }
            Some(_) => {}
        }
        GLYPHS[self.index]
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.last_advance = None;
    }
}
