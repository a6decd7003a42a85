/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Prefix-free key encoding of values.
//!
//! [`to_key`] flattens a value into a bitstring by streaming its structure
//! in preorder, two bits per edge: `00` leaf, `01` left, `10` right, `11`
//! branch. The encoding is self-delimiting, so two values are equal exactly
//! when their keys are equal, and [`of_key`] inverts it.

use super::{Value, EDGE_BRANCH, EDGE_LEAF, EDGE_LEFT, EDGE_RIGHT};
use crate::bits::Bits;

/// Encodes a value as a unique, prefix-free bitstring.
pub fn to_key(value: &Value) -> Bits {
    value
        .edges()
        .flat_map(|edge| [edge >> 1 & 1 == 1, edge & 1 == 1])
        .collect()
}

/// Decodes a key produced by [`to_key`]; `None` on malformed input.
pub fn of_key(key: &Bits) -> Option<Value> {
    enum Frame {
        Left,
        Right,
        /// A branch whose first component is being parsed.
        AwaitSnd,
        /// A branch with its first component done, second being parsed.
        Fst(Value),
    }

    let mut bits = key.iter();
    let mut stack: Vec<Frame> = Vec::new();
    loop {
        let hi = bits.next()?;
        let lo = bits.next()?;
        match (hi as u8) << 1 | lo as u8 {
            EDGE_LEFT => stack.push(Frame::Left),
            EDGE_RIGHT => stack.push(Frame::Right),
            EDGE_BRANCH => stack.push(Frame::AwaitSnd),
            EDGE_LEAF => {
                // A complete leaf: unwind the stack until a branch needs
                // its second component or everything is consumed.
                let mut value = Value::unit();
                loop {
                    match stack.pop() {
                        None => {
                            return if bits.next().is_none() {
                                Some(value)
                            } else {
                                None
                            };
                        }
                        Some(Frame::Left) => value = Value::left(value),
                        Some(Frame::Right) => value = Value::right(value),
                        Some(Frame::AwaitSnd) => {
                            stack.push(Frame::Fst(value));
                            break;
                        }
                        Some(Frame::Fst(fst)) => value = Value::pair(fst, value),
                    }
                }
            }
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn samples() -> Vec<Value> {
        vec![
            Value::unit(),
            Value::of_nat(0),
            Value::of_nat(12345),
            Value::symbol("word"),
            Value::variant("tag", Value::of_nat(9)),
            Value::pair(Value::of_nat(1), Value::symbol("x")),
            Value::of_list([Value::of_nat(1), Value::of_nat(2), Value::of_nat(3)]),
            Value::of_text("binary data"),
            Value::left(Value::right(Value::unit())),
        ]
    }

    #[test]
    fn test_roundtrip() {
        for v in samples() {
            let key = to_key(&v);
            let back = of_key(&key).expect("key parses");
            assert_eq!(back, v, "roundtrip of {}", v);
        }
    }

    #[test]
    fn test_key_equality_tracks_value_equality() {
        let samples = samples();
        for a in &samples {
            for b in &samples {
                assert_eq!(a == b, to_key(a) == to_key(b), "{} vs {}", a, b);
            }
        }
        // Representation does not leak into the key.
        let spine = Value::pair(Value::of_nat(4), Value::of_list([Value::of_nat(5)]));
        let rope = Value::of_list([Value::of_nat(4), Value::of_nat(5)]);
        assert_eq!(to_key(&spine), to_key(&rope));
    }

    #[test]
    fn test_malformed_keys() {
        // Truncated and oversized streams are rejected.
        assert!(of_key(&Bits::empty()).is_none());
        let key = to_key(&Value::pair(Value::unit(), Value::unit()));
        assert!(of_key(&key.take(key.len() - 2)).is_none());
        assert!(of_key(&key.append(&Bits::of_byte(0))).is_none());
    }
}
