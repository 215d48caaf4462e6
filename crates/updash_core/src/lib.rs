//! Updash core: pure pane content model and refresh state.
mod content;
mod markup;
mod pane;
mod spinner;

pub use content::{Content, ContentBuilder, Page, Row};
pub use markup::{parse_markup, render_line, truncate_segments, PaneColor, Segment};
pub use pane::{diagnostic_content, ErrorReport, PaneState, RefreshPhase};
pub use spinner::{Spinner, SPINNER_INTERVAL};
