//! Document-level well-formedness shared by the index and record parsers
//!
//! quick-xml checks tag nesting but accepts text and further elements around
//! the root element. [`RootTracker`] rejects both: a document has exactly one
//! root and nothing but whitespace, comments and processing instructions
//! outside it.

/// Tracks the single root element of a document
#[derive(Debug, Default)]
pub(crate) struct RootTracker {
    seen: bool,
    closed: bool,
}

impl RootTracker {
    /// An element opens at `depth` (0 for the root). `empty` for `<x/>`.
    pub(crate) fn on_open(&mut self, depth: usize, empty: bool) -> Result<(), &'static str> {
        if depth == 0 {
            if self.closed {
                return Err("junk after document element: second root element");
            }
            self.seen = true;
            self.closed = empty;
        }
        Ok(())
    }

    /// An element closed and the parser is back at `depth`
    pub(crate) fn on_close(&mut self, depth: usize) {
        if depth == 0 {
            self.closed = true;
        }
    }

    /// Text or CDATA at `depth`
    pub(crate) fn on_text(&self, depth: usize, text: &[u8]) -> Result<(), &'static str> {
        if depth > 0 || text.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        if self.seen {
            Err("junk after document element: text after the root element")
        } else {
            Err("text before the root element")
        }
    }

    pub(crate) fn seen(&self) -> bool {
        self.seen
    }
}
