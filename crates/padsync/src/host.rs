//! The seam between a session and the text widget it keeps in sync.
//!
//! Widgets address text in UTF-16 code units, so every offset crossing this
//! boundary is a UTF-16 offset. The session converts to codepoints internally.

use crate::position::PositionTranslator;
use crate::presence::Decoration;

/// Replace the UTF-16 range `start..end` with `text`.
///
/// Reported by the widget for local changes (all changes of one batch refer
/// to the text before the batch) and handed to the widget for remote changes
/// (applied in order, each against the result of the previous one).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl TextEdit {
    /// Create an edit.
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Insert `text` at `at`.
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::new(at, at, text)
    }

    /// Remove the range `start..end`.
    pub fn delete(start: usize, end: usize) -> Self {
        Self::new(start, end, "")
    }

    /// Insert `text` at the end of the document, whatever its length is
    /// when the edit is processed. Offsets past the end clamp to the end.
    pub fn append(text: impl Into<String>) -> Self {
        Self::insert(usize::MAX, text)
    }
}

/// Own cursors and selections as reported by the widget, in UTF-16.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub cursors: Vec<usize>,
    pub selections: Vec<(usize, usize)>,
}

/// A text widget driven by a session.
///
/// `apply_edits` must not report the applied edits back as local changes.
pub trait EditorHost {
    /// Apply remote edits, in order.
    fn apply_edits(&mut self, edits: &[TextEdit]);

    /// Current own cursors and selections.
    fn selection_state(&self) -> SelectionState;

    /// Replace the rendered remote cursors and selections.
    fn render_decorations(&mut self, _decorations: &[Decoration]) {}
}

/// A plain string buffer with a single cursor.
///
/// Used by headless clients. Remote edits push the cursor along the way a
/// widget keeps its caret anchored to the surrounding text.
#[derive(Clone, Debug, Default)]
pub struct TextBuffer {
    text: String,
    cursor: usize,
    decorations: Vec<Decoration>,
}

impl TextBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The buffer contents.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The cursor, in UTF-16 code units.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor, clamped to the text.
    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(utf16_len(&self.text));
    }

    /// The most recently rendered decorations.
    pub fn decorations(&self) -> &[Decoration] {
        &self.decorations
    }

    fn replace(&mut self, edit: &TextEdit) {
        let translator = PositionTranslator::new(&self.text);
        let len = translator.utf16_len();
        let start = edit.start.min(len);
        let end = edit.end.clamp(start, len);
        let start_byte = translator.utf16_to_byte(start);
        let end_byte = translator.utf16_to_byte(end);
        self.text.replace_range(start_byte..end_byte, &edit.text);

        let inserted = utf16_len(&edit.text);
        if self.cursor >= end {
            self.cursor = self.cursor - (end - start) + inserted;
        } else if self.cursor > start {
            self.cursor = start + inserted;
        }
    }
}

impl EditorHost for TextBuffer {
    fn apply_edits(&mut self, edits: &[TextEdit]) {
        for edit in edits {
            self.replace(edit);
        }
    }

    fn selection_state(&self) -> SelectionState {
        SelectionState {
            cursors: vec![self.cursor],
            selections: Vec::new(),
        }
    }

    fn render_decorations(&mut self, decorations: &[Decoration]) {
        self.decorations = decorations.to_vec();
    }
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_applies_edits_in_order() {
        let mut buffer = TextBuffer::new();
        buffer.apply_edits(&[
            TextEdit::insert(0, "hello"),
            TextEdit::insert(5, " world"),
            TextEdit::new(0, 1, "H"),
        ]);
        assert_eq!(buffer.text(), "Hello world");
    }

    #[test]
    fn test_buffer_edits_use_utf16_offsets() {
        let mut buffer = TextBuffer::new();
        buffer.apply_edits(&[TextEdit::insert(0, "a😀b")]);
        // The emoji is two code units wide.
        buffer.apply_edits(&[TextEdit::delete(1, 3)]);
        assert_eq!(buffer.text(), "ab");
    }

    #[test]
    fn test_buffer_cursor_follows_edits() {
        let mut buffer = TextBuffer::new();
        buffer.apply_edits(&[TextEdit::insert(0, "abcdef")]);
        assert_eq!(buffer.cursor(), 6);

        buffer.set_cursor(3);
        buffer.apply_edits(&[TextEdit::insert(0, "xx")]);
        assert_eq!(buffer.cursor(), 5);

        buffer.apply_edits(&[TextEdit::delete(4, 6)]);
        assert_eq!(buffer.cursor(), 4);

        buffer.apply_edits(&[TextEdit::insert(6, "zz")]);
        assert_eq!(buffer.cursor(), 4);
    }

    #[test]
    fn test_append_clamps_to_end() {
        let mut buffer = TextBuffer::new();
        buffer.apply_edits(&[TextEdit::append("one"), TextEdit::append(" two")]);
        assert_eq!(buffer.text(), "one two");
    }
}
