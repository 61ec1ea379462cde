//! Surfaces a [`ChatFormController`](super::ChatFormController) renders into.
//!
//! A surface stands in for the page: it owns the text field the query is
//! read from and the scrollable log bubbles are appended to.

use std::io::Write;

use crate::bubble::{Bubble, Role};

/// The page elements the controller binds to.
pub trait ChatSurface: Send + 'static {
    /// Whether the chat form exists. Binding is a no-op without it.
    fn has_form(&self) -> bool {
        true
    }

    /// Current value of the query field.
    fn query_value(&self) -> String;

    /// Reset the query field to empty.
    fn clear_query(&mut self);

    /// Append a bubble to the end of the message log.
    fn append_bubble(&mut self, bubble: Bubble);

    /// Scroll the message log to its end.
    fn scroll_to_end(&mut self);
}

/// Something observable that happened to a [`MemorySurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A bubble with this role was appended.
    Appended(Role),
    /// The query field was cleared.
    Cleared,
    /// The log was scrolled to its end.
    Scrolled,
}

/// In-memory surface that records everything rendered into it.
///
/// The log is modelled as one row per bubble: `scroll_height` is the bubble
/// count and `scroll_top` is the row the view is positioned at.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    form_present: bool,
    input: String,
    bubbles: Vec<Bubble>,
    scroll_top: usize,
    events: Vec<SurfaceEvent>,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySurface {
    /// Create a surface with a chat form and an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            form_present: true,
            input: String::new(),
            bubbles: Vec::new(),
            scroll_top: 0,
            events: Vec::new(),
        }
    }

    /// Create a surface for a page that has no chat form.
    #[must_use]
    pub fn without_form() -> Self {
        Self {
            form_present: false,
            ..Self::new()
        }
    }

    /// Type text into the query field, replacing what was there.
    pub fn set_query(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Bubbles in log order.
    #[must_use]
    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    /// Bubbles of one role, in log order.
    #[must_use]
    pub fn bubbles_with_role(&self, role: Role) -> Vec<&Bubble> {
        self.bubbles.iter().filter(|b| b.role == role).collect()
    }

    /// Everything that happened to the surface, oldest first.
    #[must_use]
    pub fn events(&self) -> &[SurfaceEvent] {
        &self.events
    }

    /// Total scrollable height of the log.
    #[must_use]
    pub fn scroll_height(&self) -> usize {
        self.bubbles.len()
    }

    /// Current scroll position.
    #[must_use]
    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    /// Whether the view is at the bottom of the log.
    #[must_use]
    pub fn is_scrolled_to_end(&self) -> bool {
        self.scroll_top == self.scroll_height()
    }
}

impl ChatSurface for MemorySurface {
    fn has_form(&self) -> bool {
        self.form_present
    }

    fn query_value(&self) -> String {
        self.input.clone()
    }

    fn clear_query(&mut self) {
        self.input.clear();
        self.events.push(SurfaceEvent::Cleared);
    }

    fn append_bubble(&mut self, bubble: Bubble) {
        self.events.push(SurfaceEvent::Appended(bubble.role));
        self.bubbles.push(bubble);
    }

    fn scroll_to_end(&mut self) {
        self.scroll_top = self.scroll_height();
        self.events.push(SurfaceEvent::Scrolled);
    }
}

/// Line-oriented surface over a writer, normally stdout.
///
/// Each bubble is printed as one `<prefix>> <text>` line; scrolling to the
/// end is a flush.
#[derive(Debug)]
pub struct TerminalSurface<W> {
    input: String,
    out: W,
}

impl TerminalSurface<std::io::Stdout> {
    /// Surface printing to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> TerminalSurface<W> {
    /// Surface printing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            input: String::new(),
            out,
        }
    }

    /// Set the pending input line.
    pub fn set_query(&mut self, line: impl Into<String>) {
        self.input = line.into();
    }

    /// Borrow the underlying writer.
    pub fn writer(&self) -> &W {
        &self.out
    }

    fn prefix(role: Role) -> &'static str {
        match role {
            Role::User => "you",
            Role::Bot => "bot",
            Role::Error => "error",
        }
    }
}

impl<W: Write + Send + 'static> ChatSurface for TerminalSurface<W> {
    fn query_value(&self) -> String {
        self.input.clone()
    }

    fn clear_query(&mut self) {
        self.input.clear();
    }

    fn append_bubble(&mut self, bubble: Bubble) {
        if let Err(e) = writeln!(self.out, "{}> {}", Self::prefix(bubble.role), bubble.text) {
            tracing::warn!(name: "terminal.write.failed", error = %e, "Failed to print bubble");
        }
    }

    fn scroll_to_end(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!(name: "terminal.flush.failed", error = %e, "Failed to flush output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_surface_scroll_tracks_height() {
        let mut surface = MemorySurface::new();
        surface.append_bubble(Bubble::user("a"));
        assert!(!surface.is_scrolled_to_end());
        surface.scroll_to_end();
        assert!(surface.is_scrolled_to_end());
        assert_eq!(surface.scroll_top(), 1);
    }

    #[test]
    fn test_memory_surface_without_form() {
        assert!(!MemorySurface::without_form().has_form());
        assert!(MemorySurface::new().has_form());
    }

    #[test]
    fn test_terminal_surface_prints_prefixed_lines() {
        let mut surface = TerminalSurface::new(Vec::<u8>::new());
        surface.append_bubble(Bubble::user("hello"));
        surface.append_bubble(Bubble::bot("hi there"));
        surface.append_bubble(Bubble::error("offline"));
        surface.scroll_to_end();

        let printed = String::from_utf8(surface.writer().clone()).unwrap();
        assert_eq!(printed, "you> hello\nbot> hi there\nerror> offline\n");
    }

    #[test]
    fn test_terminal_surface_clears_input() {
        let mut surface = TerminalSurface::new(Vec::<u8>::new());
        surface.set_query("line");
        assert_eq!(surface.query_value(), "line");
        surface.clear_query();
        assert_eq!(surface.query_value(), "");
    }
}
