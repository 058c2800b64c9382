//! Transformation of concurrent operations.

use std::cmp::Ordering;

use crate::error::{OtError, OtResult};
use crate::operation::{char_len, Operation, OperationSeq};

impl OperationSeq {
    /// Transform two operations made concurrently against the same text into
    /// `(a', b')` with `apply(apply(S, a), b') == apply(apply(S, b), a')`.
    ///
    /// When both insert at the same position, the text inserted by `self`
    /// ends up first.
    pub fn transform(&self, other: &OperationSeq) -> OtResult<(OperationSeq, OperationSeq)> {
        if self.base_len() != other.base_len() {
            return Err(OtError::IncompatibleLengths {
                expected: self.base_len(),
                actual: other.base_len(),
            });
        }

        let mut a_prime = OperationSeq::with_capacity(self.ops().len());
        let mut b_prime = OperationSeq::with_capacity(other.ops().len());
        let mut ops1 = self.ops().iter().cloned();
        let mut ops2 = other.ops().iter().cloned();
        let mut op1 = ops1.next();
        let mut op2 = ops2.next();

        loop {
            match (op1.take(), op2.take()) {
                (None, None) => break,
                (Some(Operation::Insert(s)), rest) => {
                    b_prime.retain(char_len(&s));
                    a_prime.insert(&s);
                    op1 = ops1.next();
                    op2 = rest;
                }
                (rest, Some(Operation::Insert(s))) => {
                    a_prime.retain(char_len(&s));
                    b_prime.insert(&s);
                    op1 = rest;
                    op2 = ops2.next();
                }
                (None, Some(_)) | (Some(_), None) => {
                    return Err(OtError::IncompatibleLengths {
                        expected: self.base_len(),
                        actual: other.base_len(),
                    });
                }
                (Some(Operation::Retain(i)), Some(Operation::Retain(j))) => {
                    let min = i.min(j);
                    a_prime.retain(min);
                    b_prime.retain(min);
                    (op1, op2) = remainders(i, j, Operation::Retain, Operation::Retain);
                }
                (Some(Operation::Delete(i)), Some(Operation::Delete(j))) => {
                    (op1, op2) = remainders(i, j, Operation::Delete, Operation::Delete);
                }
                (Some(Operation::Delete(i)), Some(Operation::Retain(j))) => {
                    a_prime.delete(i.min(j));
                    (op1, op2) = remainders(i, j, Operation::Delete, Operation::Retain);
                }
                (Some(Operation::Retain(i)), Some(Operation::Delete(j))) => {
                    b_prime.delete(i.min(j));
                    (op1, op2) = remainders(i, j, Operation::Retain, Operation::Delete);
                }
            }
            if op1.is_none() {
                op1 = ops1.next();
            }
            if op2.is_none() {
                op2 = ops2.next();
            }
        }

        Ok((a_prime, b_prime))
    }
}

/// Split two overlapping runs at the shorter one, leaving what is left over.
fn remainders(
    i: usize,
    j: usize,
    left: fn(usize) -> Operation,
    right: fn(usize) -> Operation,
) -> (Option<Operation>, Option<Operation>) {
    match i.cmp(&j) {
        Ordering::Less => (None, Some(right(j - i))),
        Ordering::Equal => (None, None),
        Ordering::Greater => (Some(left(i - j)), None),
    }
}
