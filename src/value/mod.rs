/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Structural values.
//!
//! A [`Value`] is a bitstring stem ending in a terminal: the unit leaf, a
//! pair of values, or a rope of list elements. Everything the program model
//! manipulates is such a value: numbers and labels are stems over the leaf,
//! sums prepend a stem bit, variants prepend a label, records are radix
//! trees over labels, lists are ropes or right spines of pairs.
//!
//! Equality, ordering and hashing are structural and representation-blind:
//! a branch whose right projection is a list is the same value as the rope
//! holding the element up front. All three are driven by one traversal,
//! [`Edges`], which streams the key-edge encoding of the normalized
//! structure (leaf `00`, left `01`, right `10`, branch `11`) using an
//! explicit work stack, so deep right spines do not recurse on the host
//! stack.

mod key;
mod record;

pub use key::{of_key, to_key};
pub use record::{record_delete, record_entries, record_insert, record_lookup};

use crate::bits::Bits;
use crate::rope::Rope;
use itertools::Itertools;
use std::fmt;
use std::rc::Rc;

/// An immutable structural value: a stem of bits over a terminal.
#[derive(Clone)]
pub struct Value {
    stem: Bits,
    term: Term,
}

#[derive(Clone)]
enum Term {
    Leaf,
    Branch(Rc<(Value, Value)>),
    List(Rope),
}

impl Value {
    /// The unit value.
    pub fn unit() -> Value {
        Value {
            stem: Bits::empty(),
            term: Term::Leaf,
        }
    }

    /// A pair of values.
    pub fn pair(fst: Value, snd: Value) -> Value {
        Value {
            stem: Bits::empty(),
            term: Term::Branch(Rc::new((fst, snd))),
        }
    }

    /// Prepends bit 0 to the stem.
    pub fn left(mut v: Value) -> Value {
        let stem = v.stem.cons(false);
        Value {
            stem,
            term: std::mem::replace(&mut v.term, Term::Leaf),
        }
    }

    /// Prepends bit 1 to the stem.
    pub fn right(mut v: Value) -> Value {
        let stem = v.stem.cons(true);
        Value {
            stem,
            term: std::mem::replace(&mut v.term, Term::Leaf),
        }
    }

    /// A bitstring value: the stem over the leaf.
    pub fn of_bits(bits: Bits) -> Value {
        Value {
            stem: bits,
            term: Term::Leaf,
        }
    }

    /// An 8-bit byte value.
    pub fn of_byte(byte: u8) -> Value {
        Value::of_bits(Bits::of_byte(byte))
    }

    /// A natural number in the canonical variable-width encoding.
    pub fn of_nat(n: u64) -> Value {
        Value::of_bits(Bits::of_nat(n))
    }

    /// Prepends `prefix` to the stem of `v`.
    pub fn with_stem(prefix: &Bits, mut v: Value) -> Value {
        let stem = prefix.append(&v.stem);
        Value {
            stem,
            term: std::mem::replace(&mut v.term, Term::Leaf),
        }
    }

    /// A labeled variant: the label bits prepended to the stem of `v`.
    pub fn variant(label: &str, v: Value) -> Value {
        Value::with_stem(&Bits::of_label(label), v)
    }

    /// A symbol: a variant of unit.
    pub fn symbol(label: &str) -> Value {
        Value::of_bits(Bits::of_label(label))
    }

    /// A list value over a rope.
    pub fn of_rope(rope: Rope) -> Value {
        Value {
            stem: Bits::empty(),
            term: Term::List(rope),
        }
    }

    /// A list of values.
    pub fn of_list(values: impl IntoIterator<Item = Value>) -> Value {
        Value::of_rope(values.into_iter().collect())
    }

    /// A binary: the list of the byte values of `bytes`.
    pub fn of_binary(bytes: &[u8]) -> Value {
        Value::of_rope(Rope::of_bytes(bytes))
    }

    /// A text: the binary of the UTF-8 bytes of `text`.
    pub fn of_text(text: &str) -> Value {
        Value::of_binary(text.as_bytes())
    }

    /// The stem bits before the terminal.
    pub fn stem(&self) -> &Bits {
        &self.stem
    }

    /// True for the unit value, in any representation.
    pub fn is_unit(&self) -> bool {
        self.stem.is_empty()
            && match &self.term {
                Term::Leaf => true,
                Term::List(rope) => rope.is_empty(),
                Term::Branch(_) => false,
            }
    }

    /// The whole value as a bitstring, if the terminal is the leaf.
    pub fn as_bits(&self) -> Option<&Bits> {
        match &self.term {
            Term::Leaf => Some(&self.stem),
            Term::List(rope) if rope.is_empty() => Some(&self.stem),
            _ => None,
        }
    }

    /// The value as a byte, if it is an 8-bit bitstring.
    pub fn to_byte(&self) -> Option<u8> {
        self.as_bits()?.to_byte()
    }

    /// The numeric reading of a bitstring value; `None` for non-bitstrings
    /// and for values beyond 64 bits.
    pub fn to_nat(&self) -> Option<u64> {
        self.as_bits()?.to_nat()
    }

    /// The normalized pair view: `None` unless the stem is empty and the
    /// terminal is a branch or a nonempty list.
    pub fn as_pair(&self) -> Option<(Value, Value)> {
        if !self.stem.is_empty() {
            return None;
        }
        match &self.term {
            Term::Leaf => None,
            Term::Branch(cell) => Some((cell.0.clone(), cell.1.clone())),
            Term::List(rope) => {
                let (head, rest) = rope.pop_first()?;
                Some((head, Value::of_rope(rest)))
            }
        }
    }

    /// The first projection of a pair.
    pub fn fst(&self) -> Option<Value> {
        self.as_pair().map(|(a, _)| a)
    }

    /// The second projection of a pair.
    pub fn snd(&self) -> Option<Value> {
        self.as_pair().map(|(_, b)| b)
    }

    /// True if the stem starts with bit 0.
    pub fn is_left(&self) -> bool {
        self.stem.first() == Some(false)
    }

    /// True if the stem starts with bit 1.
    pub fn is_right(&self) -> bool {
        self.stem.first() == Some(true)
    }

    /// The list reading of the value: the rope for list terms, the
    /// collected elements for right spines of pairs, `None` for anything
    /// else. Iterative, so arbitrarily long spines are fine.
    pub fn to_rope(&self) -> Option<Rope> {
        if !self.stem.is_empty() {
            return None;
        }
        let mut spine: Vec<Value> = Vec::new();
        let mut cur = self.clone();
        loop {
            if !cur.stem.is_empty() {
                return None;
            }
            match &cur.term {
                Term::Leaf => return Some(spine.into_iter().collect()),
                Term::List(rope) => {
                    let prefix: Rope = spine.into_iter().collect();
                    return Some(prefix.append(rope));
                }
                Term::Branch(cell) => {
                    spine.push(cell.0.clone());
                    let next = cell.1.clone();
                    cur = next;
                }
            }
        }
    }

    /// True if the value is a list.
    pub fn is_list(&self) -> bool {
        self.to_rope().is_some()
    }

    /// True if the value is a valid record: every path through it spells a
    /// null-terminated UTF-8 label. The unit value is the empty record.
    pub fn is_record(&self) -> bool {
        record_entries(self).is_some()
    }

    /// The bytes of a binary value; `None` unless the value is a list whose
    /// elements are all bytes.
    pub fn to_binary(&self) -> Option<Vec<u8>> {
        self.to_rope()?.to_bytes()
    }

    /// The text of a binary value holding UTF-8.
    pub fn to_text(&self) -> Option<String> {
        String::from_utf8(self.to_binary()?).ok()
    }

    /// Splits a leading label off the stem: the variant view.
    pub fn as_variant(&self) -> Option<(String, Value)> {
        let (label, rest) = self.stem.take_label()?;
        Some((
            label,
            Value {
                stem: rest,
                term: self.term.clone(),
            },
        ))
    }

    /// The value with the first `n` stem bits removed.
    pub(crate) fn drop_stem(&self, n: usize) -> Value {
        Value {
            stem: self.stem.drop_first(n),
            term: self.term.clone(),
        }
    }

    /// Streams the key-edge encoding of the normalized structure.
    pub(crate) fn edges(&self) -> Edges {
        Edges {
            cur: Some((self.clone(), 0)),
            stack: Vec::new(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::unit()
    }
}

impl Drop for Value {
    /// Right spines of pairs can be arbitrarily deep; the derived drop
    /// would recurse once per level. Tear uniquely-owned branches down
    /// iteratively instead. List elements go through this same drop one
    /// element at a time, so rope teardown stays shallow too.
    fn drop(&mut self) {
        if matches!(self.term, Term::Leaf) {
            return;
        }
        let mut stack = vec![std::mem::replace(&mut self.term, Term::Leaf)];
        while let Some(term) = stack.pop() {
            if let Term::Branch(cell) = term {
                if let Ok((mut fst, mut snd)) = Rc::try_unwrap(cell) {
                    stack.push(std::mem::replace(&mut fst.term, Term::Leaf));
                    stack.push(std::mem::replace(&mut snd.term, Term::Leaf));
                }
            }
        }
    }
}

pub(crate) const EDGE_LEAF: u8 = 0b00;
pub(crate) const EDGE_LEFT: u8 = 0b01;
pub(crate) const EDGE_RIGHT: u8 = 0b10;
pub(crate) const EDGE_BRANCH: u8 = 0b11;

/// Iterator over the key edges of a value in preorder.
///
/// One edge per stem bit (`01`/`10`), then the terminal: `00` for unit,
/// `11` for a pair followed by both components. Lists stream as their pair
/// unfolding, which is what makes equality and ordering representation
/// blind.
pub(crate) struct Edges {
    /// The value being walked and the position inside its stem.
    cur: Option<(Value, usize)>,
    /// Values whose traversal is pending (right components, list tails).
    stack: Vec<Value>,
}

impl Iterator for Edges {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            let (value, pos) = match self.cur.take() {
                Some(cur) => cur,
                None => (self.stack.pop()?, 0),
            };
            if pos < value.stem.len() {
                let edge = if value.stem.get(pos) {
                    EDGE_RIGHT
                } else {
                    EDGE_LEFT
                };
                self.cur = Some((value, pos + 1));
                return Some(edge);
            }
            match &value.term {
                Term::Leaf => return Some(EDGE_LEAF),
                Term::List(rope) => match rope.pop_first() {
                    None => return Some(EDGE_LEAF),
                    Some((head, rest)) => {
                        self.stack.push(Value::of_rope(rest));
                        self.cur = Some((head, 0));
                        return Some(EDGE_BRANCH);
                    }
                },
                Term::Branch(cell) => {
                    self.stack.push(cell.1.clone());
                    self.cur = Some((cell.0.clone(), 0));
                    return Some(EDGE_BRANCH);
                }
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.edges().eq(other.edges())
    }
}

impl Eq for Value {}

impl Ord for Value {
    /// Total order, lexicographic on the key-edge stream: unit sorts before
    /// left, left before right, right before pair. Consistent with equality
    /// across list representations.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.edges().cmp(other.edges())
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for edge in self.edges() {
            state.write_u8(edge);
        }
    }
}

fn printable(bytes: &[u8]) -> bool {
    !bytes.is_empty()
        && bytes
            .iter()
            .all(|&b| (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\')
}

impl fmt::Display for Value {
    /// A deterministic debugging rendering: `()` for unit, decimals for
    /// canonical naturals, `'label` for symbols, `label:V` for variants,
    /// `"text"` for printable binaries, `[…]` for lists, `(a, b)` for
    /// pairs, `0b…` for other bitstrings and `0b….(V)` for other stems.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(bits) = self.as_bits() {
            if bits.is_empty() {
                return write!(f, "()");
            }
            if let Some(label) = bits.to_label() {
                return write!(f, "'{}", label);
            }
            if bits.first() == Some(true) {
                if let Some(n) = bits.to_nat() {
                    return write!(f, "{}", n);
                }
            }
            return write!(f, "{}", bits);
        }
        if self.stem.is_empty() {
            if let Some(rope) = self.to_rope() {
                if let Some(bytes) = rope.to_bytes() {
                    if printable(&bytes) {
                        // UTF-8 by construction: printable ASCII only.
                        return write!(f, "\"{}\"", String::from_utf8_lossy(&bytes));
                    }
                }
                return write!(f, "[{}]", rope.iter().format(", "));
            }
            let (a, b) = self.as_pair().expect("non-list, non-bits, empty stem");
            return write!(f, "({}, {})", a, b);
        }
        if let Some((label, inner)) = self.as_variant() {
            return write!(f, "{}:{}", label, inner);
        }
        let inner = Value {
            stem: Bits::empty(),
            term: self.term.clone(),
        };
        write!(f, "{}.({})", self.stem, inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unit_representations() {
        let unit = Value::unit();
        let empty_list = Value::of_list([]);
        assert!(unit.is_unit());
        assert!(empty_list.is_unit());
        assert_eq!(unit, empty_list);
        assert!(unit.as_bits().unwrap().is_empty());
    }

    #[test]
    fn test_pair_list_equivalence() {
        // A branch whose right spine ends in unit is the same value as the
        // rope-backed list.
        let spine = Value::pair(
            Value::of_nat(1),
            Value::pair(Value::of_nat(2), Value::pair(Value::of_nat(3), Value::unit())),
        );
        let rope = Value::of_list([Value::of_nat(1), Value::of_nat(2), Value::of_nat(3)]);
        assert_eq!(spine, rope);
        assert_eq!(spine.cmp(&rope), std::cmp::Ordering::Equal);
        assert_eq!(spine.to_rope().unwrap(), rope.to_rope().unwrap());
        // And a mixed form: pair onto a rope tail.
        let mixed = Value::pair(
            Value::of_nat(1),
            Value::of_list([Value::of_nat(2), Value::of_nat(3)]),
        );
        assert_eq!(mixed, rope);
    }

    #[test]
    fn test_sums_and_variants() {
        let v = Value::of_nat(5);
        assert!(Value::left(v.clone()).is_left());
        assert!(Value::right(v.clone()).is_right());
        let var = Value::variant("count", v.clone());
        let (label, inner) = var.as_variant().unwrap();
        assert_eq!(label, "count");
        assert_eq!(inner, v);
        assert_eq!(Value::symbol("go").as_variant().unwrap().0, "go");
    }

    #[test]
    fn test_binary_text() {
        let v = Value::of_text("hello");
        assert_eq!(v.to_binary().unwrap(), b"hello");
        assert_eq!(v.to_text().unwrap(), "hello");
        assert!(v.is_list());
        assert!(Value::of_nat(3).to_binary().is_none());
    }

    #[test]
    fn test_order_is_total_and_consistent() {
        let values = [
            Value::unit(),
            Value::of_nat(1),
            Value::of_nat(2),
            Value::symbol("a"),
            Value::pair(Value::unit(), Value::unit()),
            Value::of_list([Value::of_nat(7)]),
            Value::left(Value::unit()),
            Value::right(Value::unit()),
        ];
        for a in &values {
            for b in &values {
                let ord = a.cmp(b);
                assert_eq!(ord == std::cmp::Ordering::Equal, a == b);
                assert_eq!(b.cmp(a), ord.reverse());
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::unit().to_string(), "()");
        assert_eq!(Value::of_nat(42).to_string(), "42");
        assert_eq!(Value::symbol("go").to_string(), "'go");
        assert_eq!(Value::of_text("hi").to_string(), "\"hi\"");
        assert_eq!(
            Value::variant("count", Value::of_nat(3)).to_string(),
            "count:3"
        );
        assert_eq!(
            Value::of_list([Value::of_nat(1), Value::of_nat(300)]).to_string(),
            "[1, 300]"
        );
        assert_eq!(
            Value::pair(Value::of_nat(1), Value::of_nat(2)).to_string(),
            "(1, 2)"
        );
    }
}
