/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Records as radix trees over bitstring keys.
//!
//! A record is an ordinary value read as a radix tree: lookup follows the
//! key bit by bit through stem matches and branch selection (0 left, 1
//! right), insertion may split a stem into a branch, and deletion prunes
//! emptied branches back into stems. The unit value is the empty record.
//!
//! Keys are arbitrary bitstrings here; valid records use null-terminated
//! UTF-8 labels, whose self-delimiting byte alignment keeps entries from
//! shadowing one another.

use super::Value;
use crate::bits::Bits;

/// The value stored under `key`, or `None` if the path does not exist.
/// O(key length).
pub fn record_lookup(key: &Bits, record: &Value) -> Option<Value> {
    let mut key = key.clone();
    let mut cur = record.clone();
    loop {
        let n = Bits::shared_prefix_len(&key, cur.stem());
        if n == key.len() {
            // The key ends inside (or at the end of) the stem.
            return Some(cur.drop_stem(n));
        }
        if n < cur.stem().len() {
            // Mismatching stem bit.
            return None;
        }
        // The stem is consumed: select a branch with the next key bit.
        let (l, r) = cur.drop_stem(n).as_pair()?;
        let bit = key.get(n);
        key = key.drop_first(n + 1);
        cur = if bit { r } else { l };
    }
}

/// Replaces the subtree under `key` with `value`, preserving the sharing of
/// unrelated subtrees.
pub fn record_insert(key: &Bits, value: Value, record: &Value) -> Value {
    let stem = record.stem();
    let n = Bits::shared_prefix_len(key, stem);
    if n == key.len() {
        // Everything below the key is replaced.
        return Value::with_stem(key, value);
    }
    if n == stem.len() {
        let below = record.drop_stem(n);
        let bit = key.get(n);
        let rest = key.drop_first(n + 1);
        return match below.as_pair() {
            None => {
                // Unit below: graft a single fresh path.
                Value::with_stem(stem, Value::with_stem(&key.drop_first(n), value))
            }
            Some((l, r)) => {
                let below = if bit {
                    Value::pair(l, record_insert(&rest, value, &r))
                } else {
                    Value::pair(record_insert(&rest, value, &l), r)
                };
                Value::with_stem(stem, below)
            }
        };
    }
    // The stems diverge at bit n: split into a branch.
    let common = key.take(n);
    let old_below = record.drop_stem(n + 1);
    let new_below = Value::with_stem(&key.drop_first(n + 1), value);
    let below = if key.get(n) {
        Value::pair(old_below, new_below)
    } else {
        Value::pair(new_below, old_below)
    };
    Value::with_stem(&common, below)
}

/// Removes the subtree under `key`, collapsing emptied branches back into
/// stems. Returns the record unchanged if the path does not exist.
pub fn record_delete(key: &Bits, record: &Value) -> Value {
    delete(key, record).unwrap_or_else(|| record.clone())
}

/// `None` when there is nothing under `key` and the record is unchanged.
fn delete(key: &Bits, record: &Value) -> Option<Value> {
    let stem = record.stem();
    let n = Bits::shared_prefix_len(key, stem);
    if n == key.len() {
        // The record's whole content lies under the key.
        return if record.is_unit() {
            None
        } else {
            Some(Value::unit())
        };
    }
    if n < stem.len() {
        return None;
    }
    let below = record.drop_stem(n);
    let (l, r) = below.as_pair()?;
    let bit = key.get(n);
    let rest = key.drop_first(n + 1);
    let pruned = if rest.is_empty() {
        // The key ends exactly at this branch side: drop the side and
        // collapse the branch into a stem bit.
        if bit {
            Value::left(l)
        } else {
            Value::right(r)
        }
    } else {
        let sub = if bit { &r } else { &l };
        let sub = delete(&rest, sub)?;
        if sub.is_unit() {
            // The side emptied out: collapse.
            if bit {
                Value::left(l)
            } else {
                Value::right(r)
            }
        } else if bit {
            Value::pair(l, sub)
        } else {
            Value::pair(sub, r)
        }
    };
    Some(Value::with_stem(stem, pruned))
}

/// Enumerates the labeled entries of a valid record in label order;
/// `None` if some path through the tree is not a null-terminated UTF-8
/// label.
pub fn record_entries(record: &Value) -> Option<Vec<(String, Value)>> {
    fn walk(cur: &Value, path: &mut Vec<bool>, out: &mut Vec<(String, Value)>) -> Option<()> {
        let stem = cur.stem().clone();
        for i in 0..stem.len() {
            path.push(stem.get(i));
            if path.len() % 8 == 0 && byte_at(path, path.len() / 8 - 1) == 0 {
                // The label just completed: the rest of this subtree is the
                // entry's value.
                let label = decode_label(path)?;
                out.push((label, cur.drop_stem(i + 1)));
                path.truncate(path.len() - (i + 1));
                return Some(());
            }
        }
        let below = cur.drop_stem(stem.len());
        if below.is_unit() {
            // A dead end before a label completed is only fine at the root
            // (the empty record).
            return if path.is_empty() { Some(()) } else { None };
        }
        let (l, r) = below.as_pair()?;
        path.push(false);
        walk(&l, path, out)?;
        path.pop();
        path.push(true);
        walk(&r, path, out)?;
        path.pop();
        path.truncate(path.len() - stem.len());
        Some(())
    }

    fn byte_at(path: &[bool], i: usize) -> u8 {
        path[i * 8..(i + 1) * 8]
            .iter()
            .fold(0, |acc, &bit| acc << 1 | bit as u8)
    }

    fn decode_label(path: &[bool]) -> Option<String> {
        let bytes: Vec<u8> = (0..path.len() / 8 - 1).map(|i| byte_at(path, i)).collect();
        if bytes.is_empty() || bytes.contains(&0) {
            return None;
        }
        String::from_utf8(bytes).ok()
    }

    let mut out = Vec::new();
    walk(record, &mut Vec::new(), &mut out)?;
    Some(out)
}
