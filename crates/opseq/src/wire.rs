//! JSON wire form of operations.
//!
//! An operation travels as a flat array: positive integers retain, negative
//! integers delete, strings insert. `[3, "hi", -2, 1]` keeps three
//! codepoints, inserts "hi", removes two, then keeps one.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::operation::{char_len, Operation, OperationSeq};

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Operation::Retain(n) => serializer.serialize_u64(*n as u64),
            Operation::Delete(n) => serializer.serialize_i64(-(*n as i64)),
            Operation::Insert(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OperationVisitor;

        impl Visitor<'_> for OperationVisitor {
            type Value = Operation;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-zero integer or a string")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Operation, E> {
                match value {
                    0 => Err(E::invalid_value(de::Unexpected::Unsigned(0), &self)),
                    n => Ok(Operation::Retain(n as usize)),
                }
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Operation, E> {
                match value {
                    0 => Err(E::invalid_value(de::Unexpected::Signed(0), &self)),
                    n if n > 0 => Ok(Operation::Retain(n as usize)),
                    n => Ok(Operation::Delete(n.unsigned_abs() as usize)),
                }
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Operation, E> {
                Ok(Operation::Insert(value.to_owned()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<Operation, E> {
                Ok(Operation::Insert(value))
            }
        }

        deserializer.deserialize_any(OperationVisitor)
    }
}

impl Serialize for OperationSeq {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.ops().len()))?;
        for op in self.ops() {
            seq.serialize_element(op)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for OperationSeq {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OperationSeqVisitor;

        impl<'de> Visitor<'de> for OperationSeqVisitor {
            type Value = OperationSeq;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an array of operation components")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<OperationSeq, A::Error> {
                let mut seq = OperationSeq::with_capacity(access.size_hint().unwrap_or(0));
                // Both lengths bound every merged run, so checking them keeps
                // the builder's own sums in range.
                let mut base_len = 0usize;
                let mut target_len = 0usize;
                while let Some(op) = access.next_element::<Operation>()? {
                    let (consumed, produced) = match &op {
                        Operation::Retain(n) => (*n, *n),
                        Operation::Delete(n) => (*n, 0),
                        Operation::Insert(s) => (0, char_len(s)),
                    };
                    base_len = base_len
                        .checked_add(consumed)
                        .ok_or_else(|| de::Error::custom("operation base length overflows"))?;
                    target_len = target_len
                        .checked_add(produced)
                        .ok_or_else(|| de::Error::custom("operation target length overflows"))?;
                    seq.push(op);
                }
                Ok(seq)
            }
        }

        deserializer.deserialize_seq(OperationSeqVisitor)
    }
}

impl OperationSeq {
    /// Parse an operation from its JSON wire form.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Encode this operation in its JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_form() {
        let mut op = OperationSeq::new();
        op.retain(3);
        op.insert("hi");
        op.delete(2);
        op.retain(1);
        assert_eq!(serde_json::to_value(&op).unwrap(), json!([3, "hi", -2, 1]));
        assert_eq!(op.to_json().unwrap(), r#"[3,"hi",-2,1]"#);
    }

    #[test]
    fn test_parse_merges_and_reorders() {
        let op = OperationSeq::from_json(r#"[1, 1, -2, "x"]"#).unwrap();
        assert_eq!(
            op.ops(),
            &[
                Operation::Retain(2),
                Operation::Insert("x".into()),
                Operation::Delete(2),
            ]
        );
        assert_eq!(op.base_len(), 4);
        assert_eq!(op.target_len(), 3);
    }

    #[test]
    fn test_parse_rejects_invalid_components() {
        assert!(OperationSeq::from_json("[0]").is_err());
        assert!(OperationSeq::from_json("[1.5]").is_err());
        assert!(OperationSeq::from_json("[null]").is_err());
        assert!(OperationSeq::from_json(r#"{"retain": 1}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_overflowing_lengths() {
        let err = OperationSeq::from_json("[18446744073709551615, 1]").unwrap_err();
        assert!(err.to_string().contains("overflows"));
        assert!(OperationSeq::from_json("[9223372036854775807, -9223372036854775807, 2]").is_err());
        assert!(OperationSeq::from_json("[18446744073709551615]").is_ok());
    }

    #[test]
    fn test_empty_operation() {
        let op = OperationSeq::from_json("[]").unwrap();
        assert!(op.is_noop());
        assert_eq!(op.to_json().unwrap(), "[]");
    }
}
