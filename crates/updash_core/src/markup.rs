/// Foreground color referenced by an inline `[fg=...]` directive.
///
/// Unknown names fall back to `White`; a bare number selects a terminal
/// color index directly. `Highlight` is the reverse-video style forced onto
/// a focused row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneColor {
    Black,
    Blue,
    Cyan,
    Green,
    Magenta,
    Red,
    White,
    Yellow,
    Gray,
    Indexed(u16),
    Highlight,
}

impl PaneColor {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "black" => PaneColor::Black,
            "blue" => PaneColor::Blue,
            "cyan" => PaneColor::Cyan,
            "green" => PaneColor::Green,
            "magenta" => PaneColor::Magenta,
            "red" => PaneColor::Red,
            "white" => PaneColor::White,
            "yellow" => PaneColor::Yellow,
            "gray" => PaneColor::Gray,
            other => match other.parse::<u16>() {
                Ok(index) => PaneColor::Indexed(index),
                Err(_) => PaneColor::White,
            },
        }
    }
}

/// A run of literal text rendered in a single color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub color: PaneColor,
    pub text: String,
}

impl Segment {
    fn new(color: PaneColor, text: impl Into<String>) -> Self {
        Self {
            color,
            text: text.into(),
        }
    }
}

const DIRECTIVE_OPEN: &str = "[fg=";

/// Splits a display string into colored segments.
///
/// Only `[fg=...]` tokens act as directives; any other bracketed text is
/// literal. A directive applies to all following text until the next
/// directive or end of line. Text before the first directive renders white.
pub fn parse_markup(line: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut color = PaneColor::White;
    let mut rest = line;

    while !rest.is_empty() {
        match rest.find(DIRECTIVE_OPEN) {
            None => {
                segments.push(Segment::new(color, rest));
                break;
            }
            Some(start) => {
                if start > 0 {
                    segments.push(Segment::new(color, &rest[..start]));
                }
                let after_open = &rest[start + DIRECTIVE_OPEN.len()..];
                match after_open.find(']') {
                    None => {
                        // Unterminated directive: keep it as literal text.
                        segments.push(Segment::new(color, &rest[start..]));
                        break;
                    }
                    Some(end) => {
                        color = PaneColor::parse(&after_open[..end]);
                        rest = &after_open[end + 1..];
                    }
                }
            }
        }
    }

    segments
}

/// Cuts parsed segments down to `width` visible characters.
///
/// Truncation happens after parsing, so a directive token can never be cut
/// in half: directives occupy zero visible columns.
pub fn truncate_segments(segments: &[Segment], width: usize) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut used = 0;

    for segment in segments {
        if used >= width {
            break;
        }
        let available = width - used;
        let length = segment.text.chars().count();
        if length <= available {
            out.push(segment.clone());
            used += length;
        } else {
            let text: String = segment.text.chars().take(available).collect();
            out.push(Segment::new(segment.color, text));
            used = width;
        }
    }

    out
}

/// Full render plan for one row: parse, truncate, and force reverse-video
/// when the row is focused (embedded directives are overridden).
pub fn render_line(line: &str, width: usize, focused: bool) -> Vec<Segment> {
    let mut segments = truncate_segments(&parse_markup(line), width);
    if focused {
        for segment in &mut segments {
            segment.color = PaneColor::Highlight;
        }
    }
    segments
}
