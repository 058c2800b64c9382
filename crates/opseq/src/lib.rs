//! Operational transformation for plain text.
//!
//! This crate provides the operation algebra used by collaborative text
//! sessions. An [`OperationSeq`] is a run-length encoded edit made of
//! retains, inserts and deletes over Unicode codepoints.
//!
//! # Modules
//!
//! - `operation`: Components, the sequence builder, `apply`, `invert`, `transform_index`
//! - `compose`: Sequential composition of two operations
//! - `transform`: Rewriting two concurrent operations so they converge
//! - `wire`: The JSON array encoding used on the socket
//! - `error`: Error types for length contract violations
//!
//! # Example
//!
//! ```
//! use opseq::OperationSeq;
//!
//! let mut a = OperationSeq::new();
//! a.retain(5);
//! a.insert(" world");
//!
//! let mut b = OperationSeq::new();
//! b.delete(1);
//! b.insert("H");
//! b.retain(4);
//!
//! let (a_prime, b_prime) = a.transform(&b).unwrap();
//! let left = b_prime.apply(&a.apply("hello").unwrap()).unwrap();
//! let right = a_prime.apply(&b.apply("hello").unwrap()).unwrap();
//! assert_eq!(left, "Hello world");
//! assert_eq!(left, right);
//! ```

pub mod compose;
pub mod error;
pub mod operation;
pub mod transform;
pub mod wire;

pub use error::{OtError, OtResult};
pub use operation::{char_len, Operation, OperationSeq};
