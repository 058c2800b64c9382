//! Operation components and the sequence builder.
//!
//! An [`OperationSeq`] walks a base text from left to right. Every component
//! either keeps (`Retain`), removes (`Delete`) or adds (`Insert`) text at the
//! current position. All lengths are counted in Unicode codepoints.

use crate::error::{OtError, OtResult};

/// A single run in an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Skip `n` codepoints unchanged.
    Retain(usize),
    /// Insert a string at the current position.
    Insert(String),
    /// Remove `n` codepoints.
    Delete(usize),
}

impl Operation {
    /// Codepoints consumed from the base text.
    pub fn base_len(&self) -> usize {
        match self {
            Operation::Retain(n) | Operation::Delete(n) => *n,
            Operation::Insert(_) => 0,
        }
    }

    /// Codepoints produced in the target text.
    pub fn target_len(&self) -> usize {
        match self {
            Operation::Retain(n) => *n,
            Operation::Insert(s) => char_len(s),
            Operation::Delete(_) => 0,
        }
    }
}

/// A run-length encoded edit over a whole document.
///
/// Adjacent components of the same kind are always merged, and an insert is
/// never stored directly after a delete (it is moved in front of it), so two
/// sequences describing the same edit compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationSeq {
    ops: Vec<Operation>,
    base_len: usize,
    target_len: usize,
}

impl OperationSeq {
    /// Create an empty operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty operation with room for `capacity` components.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
            base_len: 0,
            target_len: 0,
        }
    }

    /// The components of this operation.
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Length of the text this operation applies to.
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Length of the text after this operation is applied.
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    // ========== Builder ==========

    /// Skip `n` codepoints.
    pub fn retain(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.base_len += n;
        self.target_len += n;
        if let Some(Operation::Retain(last)) = self.ops.last_mut() {
            *last += n;
        } else {
            self.ops.push(Operation::Retain(n));
        }
    }

    /// Delete `n` codepoints.
    pub fn delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.base_len += n;
        if let Some(Operation::Delete(last)) = self.ops.last_mut() {
            *last += n;
        } else {
            self.ops.push(Operation::Delete(n));
        }
    }

    /// Insert `s` at the current position.
    pub fn insert(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        self.target_len += char_len(s);
        let len = self.ops.len();
        match self.ops.as_mut_slice() {
            [.., Operation::Insert(last)] => last.push_str(s),
            [.., Operation::Insert(prev), Operation::Delete(_)] => prev.push_str(s),
            [.., Operation::Delete(_)] => self.ops.insert(len - 1, Operation::Insert(s.to_owned())),
            _ => self.ops.push(Operation::Insert(s.to_owned())),
        }
    }

    pub(crate) fn push(&mut self, op: Operation) {
        match op {
            Operation::Retain(n) => self.retain(n),
            Operation::Insert(s) => self.insert(&s),
            Operation::Delete(n) => self.delete(n),
        }
    }

    // ========== Queries ==========

    /// True iff applying this operation leaves any text unchanged.
    pub fn is_noop(&self) -> bool {
        matches!(self.ops.as_slice(), [] | [Operation::Retain(_)])
    }

    /// Apply this operation to `text`.
    pub fn apply(&self, text: &str) -> OtResult<String> {
        let actual = char_len(text);
        if actual != self.base_len {
            return Err(OtError::LengthMismatch {
                expected: self.base_len,
                actual,
            });
        }
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars();
        for op in &self.ops {
            match op {
                Operation::Retain(n) => out.extend(chars.by_ref().take(*n)),
                Operation::Delete(n) => chars.by_ref().take(*n).for_each(drop),
                Operation::Insert(s) => out.push_str(s),
            }
        }
        Ok(out)
    }

    /// The operation that reverts `self`, given the text `self` was applied to.
    ///
    /// `invert(text).apply(self.apply(text)?) == text` whenever `text` has the
    /// base length.
    pub fn invert(&self, text: &str) -> Self {
        let mut inverse = Self::with_capacity(self.ops.len());
        let mut chars = text.chars();
        for op in &self.ops {
            match op {
                Operation::Retain(n) => {
                    inverse.retain(*n);
                    chars.by_ref().take(*n).for_each(drop);
                }
                Operation::Insert(s) => inverse.delete(char_len(s)),
                Operation::Delete(n) => {
                    let removed: String = chars.by_ref().take(*n).collect();
                    inverse.insert(&removed);
                }
            }
        }
        inverse
    }

    /// Map a codepoint offset in the base text to the target text.
    ///
    /// Offsets inside a deleted run collapse to its start. An insertion at
    /// exactly `position` pushes the offset forward.
    pub fn transform_index(&self, position: usize) -> usize {
        let mut index = position as i64;
        let mut new_index = index;
        for op in &self.ops {
            match op {
                Operation::Retain(n) => index -= *n as i64,
                Operation::Insert(s) => new_index += char_len(s) as i64,
                Operation::Delete(n) => {
                    new_index -= index.min(*n as i64);
                    index -= *n as i64;
                }
            }
            if index < 0 {
                break;
            }
        }
        new_index.max(0) as usize
    }
}

/// Number of Unicode scalar values in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}
