//! Conversion between widget offsets (UTF-16 code units) and protocol
//! offsets (Unicode codepoints).
//!
//! The two counts agree for text in the Basic Multilingual Plane and drift
//! apart by one for every codepoint above it, so every conversion needs a
//! scan of the text up to the offset.

use opseq::{char_len, OperationSeq, OtResult};

use crate::host::TextEdit;

/// Codepoint offset to UTF-16 offset, clamped to the end of `text`.
pub fn codepoint_to_utf16(text: &str, offset: usize) -> usize {
    text.chars().take(offset).map(char::len_utf16).sum()
}

/// UTF-16 offset to codepoint offset, clamped to the end of `text`.
///
/// An offset pointing between the two halves of a surrogate pair rounds up
/// to the following codepoint.
pub fn utf16_to_codepoint(text: &str, position: usize) -> usize {
    let mut units = 0;
    let mut count = 0;
    for c in text.chars() {
        if units >= position {
            break;
        }
        units += c.len_utf16();
        count += 1;
    }
    count
}

/// Precomputed offset tables for converting many positions in one text.
#[derive(Clone, Debug)]
pub struct PositionTranslator {
    /// UTF-16 offset of every codepoint boundary, including the end.
    utf16: Vec<usize>,
    /// Byte offset of every codepoint boundary, including the end.
    bytes: Vec<usize>,
}

impl PositionTranslator {
    /// Scan `text` once.
    pub fn new(text: &str) -> Self {
        let mut utf16 = Vec::with_capacity(text.len() + 1);
        let mut bytes = Vec::with_capacity(text.len() + 1);
        let mut units = 0;
        for (byte, c) in text.char_indices() {
            utf16.push(units);
            bytes.push(byte);
            units += c.len_utf16();
        }
        utf16.push(units);
        bytes.push(text.len());
        Self { utf16, bytes }
    }

    /// Length of the text in codepoints.
    pub fn char_len(&self) -> usize {
        self.utf16.len() - 1
    }

    /// Length of the text in UTF-16 code units.
    pub fn utf16_len(&self) -> usize {
        self.utf16[self.char_len()]
    }

    /// Codepoint offset to UTF-16 offset.
    pub fn to_utf16(&self, offset: usize) -> usize {
        self.utf16[offset.min(self.char_len())]
    }

    /// UTF-16 offset to codepoint offset, rounding up inside surrogate pairs.
    pub fn to_codepoint(&self, position: usize) -> usize {
        self.utf16.partition_point(|&units| units < position).min(self.char_len())
    }

    /// UTF-16 offset to the byte offset of the same boundary.
    pub fn utf16_to_byte(&self, position: usize) -> usize {
        self.bytes[self.to_codepoint(position)]
    }
}

/// Turn a batch of widget changes into one operation.
///
/// All changes refer to `text` as it was before the batch. They are applied
/// from the highest offset down, so earlier offsets stay valid, and each one
/// is composed onto the result. Returns the operation and the new text.
pub fn operation_for_changes(text: &str, changes: &[TextEdit]) -> OtResult<(OperationSeq, String)> {
    let mut ordered: Vec<&TextEdit> = changes.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut current = text.to_owned();
    let mut operation = OperationSeq::new();
    operation.retain(char_len(text));

    for change in ordered {
        let translator = PositionTranslator::new(&current);
        let len = translator.char_len();
        let start = translator.to_codepoint(change.start);
        let end = translator.to_codepoint(change.end).max(start);

        let mut step = OperationSeq::with_capacity(4);
        step.retain(start);
        step.delete(end - start);
        step.insert(&change.text);
        step.retain(len - end);

        current = step.apply(&current)?;
        operation = operation.compose(&step)?;
    }

    Ok((operation, current))
}

/// Turn an operation on `text` into widget edits, applied in order.
///
/// Each edit's offsets refer to the text produced by the edits before it.
/// An insert directly followed by a delete becomes one replacement.
pub fn edits_for_operation(text: &str, operation: &OperationSeq) -> Vec<TextEdit> {
    use opseq::Operation;

    let mut edits = Vec::new();
    let mut chars = text.chars();
    let mut index = 0;
    let mut ops = operation.ops().iter().peekable();

    while let Some(op) = ops.next() {
        match op {
            Operation::Retain(n) => {
                index += chars.by_ref().take(*n).map(char::len_utf16).sum::<usize>();
            }
            Operation::Delete(n) => {
                let removed: usize = chars.by_ref().take(*n).map(char::len_utf16).sum();
                edits.push(TextEdit::delete(index, index + removed));
            }
            Operation::Insert(s) => {
                let removed: usize = match ops.peek() {
                    Some(Operation::Delete(n)) => {
                        let n = *n;
                        ops.next();
                        chars.by_ref().take(n).map(char::len_utf16).sum()
                    }
                    _ => 0,
                };
                edits.push(TextEdit::new(index, index + removed, s.clone()));
                index += s.encode_utf16().count();
            }
        }
    }

    edits
}
