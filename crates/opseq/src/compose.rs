//! Sequential composition of operations.

use std::cmp::Ordering;

use crate::error::{OtError, OtResult};
use crate::operation::{char_len, Operation, OperationSeq};

impl OperationSeq {
    /// Merge `self` followed by `other` into one operation, so that
    /// `apply(apply(S, self), other) == apply(S, self.compose(other))`.
    ///
    /// Fails unless `self.target_len() == other.base_len()`.
    pub fn compose(&self, other: &OperationSeq) -> OtResult<OperationSeq> {
        if self.target_len() != other.base_len() {
            return Err(OtError::IncompatibleLengths {
                expected: self.target_len(),
                actual: other.base_len(),
            });
        }

        let mut composed = OperationSeq::with_capacity(self.ops().len() + other.ops().len());
        let mut ops1 = self.ops().iter().cloned();
        let mut ops2 = other.ops().iter().cloned();
        let mut op1 = ops1.next();
        let mut op2 = ops2.next();

        loop {
            match (op1.take(), op2.take()) {
                (None, None) => break,
                // Text removed by the first operation is invisible to the second.
                (Some(Operation::Delete(n)), rest) => {
                    composed.delete(n);
                    op1 = ops1.next();
                    op2 = rest;
                }
                (rest, Some(Operation::Insert(s))) => {
                    composed.insert(&s);
                    op1 = rest;
                    op2 = ops2.next();
                }
                (None, Some(_)) | (Some(_), None) => {
                    return Err(OtError::IncompatibleLengths {
                        expected: self.target_len(),
                        actual: other.base_len(),
                    });
                }
                (Some(Operation::Retain(i)), Some(Operation::Retain(j))) => match i.cmp(&j) {
                    Ordering::Less => {
                        composed.retain(i);
                        op1 = ops1.next();
                        op2 = Some(Operation::Retain(j - i));
                    }
                    Ordering::Equal => {
                        composed.retain(i);
                        op1 = ops1.next();
                        op2 = ops2.next();
                    }
                    Ordering::Greater => {
                        composed.retain(j);
                        op1 = Some(Operation::Retain(i - j));
                        op2 = ops2.next();
                    }
                },
                (Some(Operation::Insert(s)), Some(Operation::Delete(j))) => {
                    let len = char_len(&s);
                    match len.cmp(&j) {
                        Ordering::Less => {
                            op1 = ops1.next();
                            op2 = Some(Operation::Delete(j - len));
                        }
                        Ordering::Equal => {
                            op1 = ops1.next();
                            op2 = ops2.next();
                        }
                        Ordering::Greater => {
                            op1 = Some(Operation::Insert(s.chars().skip(j).collect()));
                            op2 = ops2.next();
                        }
                    }
                }
                (Some(Operation::Insert(s)), Some(Operation::Retain(j))) => {
                    let len = char_len(&s);
                    match len.cmp(&j) {
                        Ordering::Less => {
                            composed.insert(&s);
                            op1 = ops1.next();
                            op2 = Some(Operation::Retain(j - len));
                        }
                        Ordering::Equal => {
                            composed.insert(&s);
                            op1 = ops1.next();
                            op2 = ops2.next();
                        }
                        Ordering::Greater => {
                            let head: String = s.chars().take(j).collect();
                            composed.insert(&head);
                            op1 = Some(Operation::Insert(s.chars().skip(j).collect()));
                            op2 = ops2.next();
                        }
                    }
                }
                (Some(Operation::Retain(i)), Some(Operation::Delete(j))) => match i.cmp(&j) {
                    Ordering::Less => {
                        composed.delete(i);
                        op1 = ops1.next();
                        op2 = Some(Operation::Delete(j - i));
                    }
                    Ordering::Equal => {
                        composed.delete(j);
                        op1 = ops1.next();
                        op2 = ops2.next();
                    }
                    Ordering::Greater => {
                        composed.delete(j);
                        op1 = Some(Operation::Retain(i - j));
                        op2 = ops2.next();
                    }
                },
            }
        }

        Ok(composed)
    }
}
