use serde::Serialize;
use serde_json::Value;

/// One displayed line plus the value handed to selection callbacks.
///
/// When no object is supplied the display string doubles as the object, so
/// selection handlers always receive something meaningful.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub display: String,
    pub object: Value,
}

impl Row {
    pub fn new(display: impl Into<String>) -> Self {
        let display = display.into();
        Self {
            object: Value::String(display.clone()),
            display,
        }
    }

    pub fn with_object(display: impl Into<String>, object: Value) -> Self {
        Self {
            display: display.into(),
            object,
        }
    }
}

/// A named (or untitled) group of rows within a pane.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Page {
    pub title: Option<String>,
    pub rows: Vec<Row>,
}

impl Page {
    pub fn untitled() -> Self {
        Self::default()
    }

    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, display: impl Into<String>) {
        self.rows.push(Row::new(display));
    }

    pub fn add_row_with(&mut self, display: impl Into<String>, object: Value) {
        self.rows.push(Row::with_object(display, object));
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A pane's full displayed data: an ordered list of pages.
///
/// Replaced wholesale on every refresh, never merged.
pub type Content = Vec<Page>;

/// Mutable accumulator handed to a content provider.
///
/// Rows without an explicit page land on the first (untitled) page; naming a
/// page finds it by title or appends a new one.
#[derive(Debug, Default)]
pub struct ContentBuilder {
    pages: Vec<Page>,
}

impl ContentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, display: impl Into<String>) {
        self.default_page().add_row(display);
    }

    pub fn add_row_with(&mut self, display: impl Into<String>, object: Value) {
        self.default_page().add_row_with(display, object);
    }

    pub fn add_row_on(&mut self, page_title: &str, display: impl Into<String>) {
        self.named_page(page_title).add_row(display);
    }

    pub fn add_row_on_with(&mut self, page_title: &str, display: impl Into<String>, object: Value) {
        self.named_page(page_title).add_row_with(display, object);
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|page| page.rows.is_empty())
    }

    pub fn into_pages(self) -> Content {
        self.pages
    }

    fn default_page(&mut self) -> &mut Page {
        if self.pages.is_empty() {
            self.pages.push(Page::untitled());
        }
        &mut self.pages[0]
    }

    fn named_page(&mut self, title: &str) -> &mut Page {
        let index = self
            .pages
            .iter()
            .position(|page| page.title.as_deref() == Some(title));
        match index {
            Some(index) => &mut self.pages[index],
            None => {
                self.pages.push(Page::titled(title));
                self.pages.last_mut().expect("page just appended")
            }
        }
    }
}
