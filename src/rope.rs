/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Finger-tree ropes backing the list representation of values.
//!
//! A [`Rope`] is a persistent 2-3 finger tree whose leaves are chunks:
//! either arrays of values or, when every element is a byte, raw byte
//! arrays. Each inner node caches the number of elements below it, so
//! [`len`](Rope::len) is O(1) and indexing, splitting and concatenation are
//! O(log n).
//!
//! Chunks are coalesced on the way in: consing into a small end chunk
//! extends it in place (up to 6 values or 16 bytes), and when digits
//! overflow into the spine, adjacent chunks are joined up to 512 values or
//! 4096 bytes. The thresholds only shape the tree; any insertion order
//! yields the same semantic list.

use crate::value::Value;
use std::rc::Rc;

const SMALL_VALS: usize = 6;
const SMALL_BYTES: usize = 16;
const CHUNK_VALS: usize = 512;
const CHUNK_BYTES: usize = 4096;

/// A leaf array: values, or bytes when every element is a byte value.
#[derive(Clone)]
enum Chunk {
    Vals(Rc<Vec<Value>>),
    Bytes(Rc<Vec<u8>>),
}

impl Chunk {
    /// Builds a chunk, using the byte representation when and only when
    /// every value is a byte.
    fn of_values(values: Vec<Value>) -> Chunk {
        debug_assert!(!values.is_empty());
        match values.iter().map(|v| v.to_byte()).collect::<Option<Vec<u8>>>() {
            Some(bytes) => Chunk::Bytes(Rc::new(bytes)),
            None => Chunk::Vals(Rc::new(values)),
        }
    }

    fn of_bytes(bytes: Vec<u8>) -> Chunk {
        debug_assert!(!bytes.is_empty());
        Chunk::Bytes(Rc::new(bytes))
    }

    fn len(&self) -> usize {
        match self {
            Chunk::Vals(v) => v.len(),
            Chunk::Bytes(b) => b.len(),
        }
    }

    fn get(&self, i: usize) -> Value {
        match self {
            Chunk::Vals(v) => v[i].clone(),
            Chunk::Bytes(b) => Value::of_byte(b[i]),
        }
    }

    fn values(&self) -> Vec<Value> {
        match self {
            Chunk::Vals(v) => v.as_ref().clone(),
            Chunk::Bytes(b) => b.iter().map(|&byte| Value::of_byte(byte)).collect(),
        }
    }

    /// The coalescing limit for end-digit joins.
    fn small_limit(&self) -> usize {
        match self {
            Chunk::Vals(_) => SMALL_VALS,
            Chunk::Bytes(_) => SMALL_BYTES,
        }
    }

    fn push_first(&self, value: Value) -> Chunk {
        match (self, value.to_byte()) {
            (Chunk::Bytes(b), Some(byte)) => {
                let mut bytes = Vec::with_capacity(b.len() + 1);
                bytes.push(byte);
                bytes.extend_from_slice(b);
                Chunk::Bytes(Rc::new(bytes))
            }
            _ => {
                let mut values = Vec::with_capacity(self.len() + 1);
                values.push(value);
                values.extend(self.values());
                Chunk::of_values(values)
            }
        }
    }

    fn push_last(&self, value: Value) -> Chunk {
        match (self, value.to_byte()) {
            (Chunk::Bytes(b), Some(byte)) => {
                let mut bytes = b.as_ref().clone();
                bytes.push(byte);
                Chunk::Bytes(Rc::new(bytes))
            }
            _ => {
                let mut values = self.values();
                values.push(value);
                Chunk::of_values(values)
            }
        }
    }

    /// Splits at `k`; both parts must be nonempty.
    fn split(&self, k: usize) -> (Chunk, Chunk) {
        debug_assert!(0 < k && k < self.len());
        match self {
            Chunk::Vals(v) => (
                Chunk::of_values(v[..k].to_vec()),
                Chunk::of_values(v[k..].to_vec()),
            ),
            Chunk::Bytes(b) => (
                Chunk::of_bytes(b[..k].to_vec()),
                Chunk::of_bytes(b[k..].to_vec()),
            ),
        }
    }

    /// Joins two chunks if the result stays under the large threshold.
    fn merge(a: &Chunk, b: &Chunk) -> Option<Chunk> {
        match (a, b) {
            (Chunk::Bytes(ba), Chunk::Bytes(bb)) => {
                if ba.len() + bb.len() > CHUNK_BYTES {
                    return None;
                }
                let mut bytes = ba.as_ref().clone();
                bytes.extend_from_slice(bb);
                Some(Chunk::Bytes(Rc::new(bytes)))
            }
            _ => {
                if a.len() + b.len() > CHUNK_VALS {
                    return None;
                }
                let mut values = a.values();
                values.extend(b.values());
                Some(Chunk::of_values(values))
            }
        }
    }
}

/// A subtree reference: a leaf chunk or an inner node with a cached size.
///
/// Levels are not typed: an inner node may hold chunks directly (the result
/// of coalescing) or deeper nodes. All operations treat chunks as leaves
/// wherever they occur.
#[derive(Clone)]
enum Item {
    Chunk(Chunk),
    Node(Rc<Node>),
}

struct Node {
    size: usize,
    items: Vec<Item>,
}

impl Item {
    fn size(&self) -> usize {
        match self {
            Item::Chunk(c) => c.len(),
            Item::Node(n) => n.size,
        }
    }
}

fn node(items: Vec<Item>) -> Item {
    debug_assert!((2..=3).contains(&items.len()));
    let size = items.iter().map(Item::size).sum();
    Item::Node(Rc::new(Node { size, items }))
}

/// Groups two or three overflow items into a single spine item, joining
/// adjacent chunks that fit the large threshold.
fn node_of(items: Vec<Item>) -> Item {
    let mut items = items;
    let mut i = 0;
    while i + 1 < items.len() {
        let merged = match (&items[i], &items[i + 1]) {
            (Item::Chunk(a), Item::Chunk(b)) => Chunk::merge(a, b),
            _ => None,
        };
        match merged {
            Some(chunk) => {
                items[i] = Item::Chunk(chunk);
                items.remove(i + 1);
            }
            None => i += 1,
        }
    }
    if items.len() == 1 {
        items.pop().unwrap()
    } else {
        node(items)
    }
}

fn digit_size(items: &[Item]) -> usize {
    items.iter().map(Item::size).sum()
}

#[derive(Clone)]
enum Tree {
    Empty,
    Single(Item),
    Deep {
        size: usize,
        pr: Vec<Item>,
        mid: Rc<Tree>,
        sf: Vec<Item>,
    },
}

fn tree_size(t: &Tree) -> usize {
    match t {
        Tree::Empty => 0,
        Tree::Single(item) => item.size(),
        Tree::Deep { size, .. } => *size,
    }
}

fn deep(pr: Vec<Item>, mid: Rc<Tree>, sf: Vec<Item>) -> Tree {
    debug_assert!((1..=4).contains(&pr.len()));
    debug_assert!((1..=4).contains(&sf.len()));
    let size = digit_size(&pr) + tree_size(&mid) + digit_size(&sf);
    Tree::Deep { size, pr, mid, sf }
}

fn tree_cons(t: &Tree, item: Item) -> Tree {
    match t {
        Tree::Empty => Tree::Single(item),
        Tree::Single(b) => deep(vec![item], Rc::new(Tree::Empty), vec![b.clone()]),
        Tree::Deep { pr, mid, sf, .. } => {
            if pr.len() < 4 {
                let mut pr2 = Vec::with_capacity(pr.len() + 1);
                pr2.push(item);
                pr2.extend(pr.iter().cloned());
                deep(pr2, mid.clone(), sf.clone())
            } else {
                let overflow = node_of(pr[1..].to_vec());
                let pr2 = vec![item, pr[0].clone()];
                deep(pr2, Rc::new(tree_cons(mid, overflow)), sf.clone())
            }
        }
    }
}

fn tree_snoc(t: &Tree, item: Item) -> Tree {
    match t {
        Tree::Empty => Tree::Single(item),
        Tree::Single(b) => deep(vec![b.clone()], Rc::new(Tree::Empty), vec![item]),
        Tree::Deep { pr, mid, sf, .. } => {
            if sf.len() < 4 {
                let mut sf2 = sf.clone();
                sf2.push(item);
                deep(pr.clone(), mid.clone(), sf2)
            } else {
                let overflow = node_of(sf[..3].to_vec());
                let sf2 = vec![sf[3].clone(), item];
                deep(pr.clone(), Rc::new(tree_snoc(mid, overflow)), sf2)
            }
        }
    }
}

fn tree_of_items(items: &[Item]) -> Tree {
    let mut t = Tree::Empty;
    for item in items.iter().rev() {
        t = tree_cons(&t, item.clone());
    }
    t
}

/// The children of a spine item, viewed as a digit.
fn item_digit(item: &Item) -> Vec<Item> {
    match item {
        Item::Node(n) => n.items.clone(),
        Item::Chunk(_) => vec![item.clone()],
    }
}

fn tree_viewl(t: &Tree) -> Option<(Item, Tree)> {
    match t {
        Tree::Empty => None,
        Tree::Single(item) => Some((item.clone(), Tree::Empty)),
        Tree::Deep { pr, mid, sf, .. } => {
            let item = pr[0].clone();
            Some((item, deep_l(&pr[1..], mid, sf)))
        }
    }
}

fn tree_viewr(t: &Tree) -> Option<(Tree, Item)> {
    match t {
        Tree::Empty => None,
        Tree::Single(item) => Some((Tree::Empty, item.clone())),
        Tree::Deep { pr, mid, sf, .. } => {
            let item = sf[sf.len() - 1].clone();
            Some((deep_r(pr, mid, &sf[..sf.len() - 1]), item))
        }
    }
}

/// Rebuilds a deep tree whose left digit may have run empty.
fn deep_l(pr: &[Item], mid: &Rc<Tree>, sf: &[Item]) -> Tree {
    if !pr.is_empty() {
        return deep(pr.to_vec(), mid.clone(), sf.to_vec());
    }
    match tree_viewl(mid) {
        Some((item, mid2)) => deep(item_digit(&item), Rc::new(mid2), sf.to_vec()),
        None => tree_of_items(sf),
    }
}

fn deep_r(pr: &[Item], mid: &Rc<Tree>, sf: &[Item]) -> Tree {
    if !sf.is_empty() {
        return deep(pr.to_vec(), mid.clone(), sf.to_vec());
    }
    match tree_viewr(mid) {
        Some((mid2, item)) => deep(pr.to_vec(), Rc::new(mid2), item_digit(&item)),
        None => tree_of_items(pr),
    }
}

/// Regroups the loose items between two concatenated spines into nodes.
/// The input always holds at least two items. Chunk joining happens inside
/// [`node_of`].
fn group_nodes(items: Vec<Item>) -> Vec<Item> {
    let mut out = Vec::new();
    let mut rest = items.as_slice();
    loop {
        match rest.len() {
            0 => break,
            2 | 3 => {
                out.push(node_of(rest.to_vec()));
                break;
            }
            4 => {
                out.push(node_of(rest[..2].to_vec()));
                out.push(node_of(rest[2..].to_vec()));
                break;
            }
            _ => {
                out.push(node_of(rest[..3].to_vec()));
                rest = &rest[3..];
            }
        }
    }
    out
}

fn app3(l: &Tree, items: Vec<Item>, r: &Tree) -> Tree {
    match (l, r) {
        (Tree::Empty, _) => {
            let mut t = r.clone();
            for item in items.into_iter().rev() {
                t = tree_cons(&t, item);
            }
            t
        }
        (_, Tree::Empty) => {
            let mut t = l.clone();
            for item in items {
                t = tree_snoc(&t, item);
            }
            t
        }
        (Tree::Single(x), _) => {
            let mut t = r.clone();
            for item in items.into_iter().rev() {
                t = tree_cons(&t, item);
            }
            tree_cons(&t, x.clone())
        }
        (_, Tree::Single(y)) => {
            let mut t = l.clone();
            for item in items {
                t = tree_snoc(&t, item);
            }
            tree_snoc(&t, y.clone())
        }
        (
            Tree::Deep {
                pr: pr1,
                mid: mid1,
                sf: sf1,
                ..
            },
            Tree::Deep {
                pr: pr2,
                mid: mid2,
                sf: sf2,
                ..
            },
        ) => {
            let mut between = sf1.clone();
            between.extend(items);
            between.extend(pr2.iter().cloned());
            let mid = app3(mid1, group_nodes(between), mid2);
            deep(pr1.clone(), Rc::new(mid), sf2.clone())
        }
    }
}

/// Splits a nonempty tree around the element at index `n`: returns the tree
/// of the elements before the containing chunk, the chunk-bearing item, and
/// the tree after it, with `n` adjusted to fall inside the item.
fn split_tree(t: &Tree, n: usize) -> (Tree, Item, Tree) {
    debug_assert!(n < tree_size(t));
    match t {
        Tree::Empty => unreachable!("split of empty tree"),
        Tree::Single(item) => (Tree::Empty, item.clone(), Tree::Empty),
        Tree::Deep { pr, mid, sf, .. } => {
            let spr = digit_size(pr);
            let smid = tree_size(mid);
            if n < spr {
                let (before, item, after) = split_digit(pr, n);
                (tree_of_items(&before), item, deep_l(&after, mid, sf))
            } else if n < spr + smid {
                let (ml, mitem, mr) = split_tree(mid, n - spr);
                let children = item_digit(&mitem);
                let k = n - spr - tree_size(&ml);
                let (before, item, after) = split_digit(&children, k);
                (
                    deep_r(pr, &Rc::new(ml), &before),
                    item,
                    deep_l(&after, &Rc::new(mr), sf),
                )
            } else {
                let (before, item, after) = split_digit(sf, n - spr - smid);
                (deep_r(pr, mid, &before), item, tree_of_items(&after))
            }
        }
    }
}

/// Splits a digit around the item containing index `n`.
fn split_digit(items: &[Item], n: usize) -> (Vec<Item>, Item, Vec<Item>) {
    let mut n = n;
    for (i, item) in items.iter().enumerate() {
        if n < item.size() {
            return (items[..i].to_vec(), item.clone(), items[i + 1..].to_vec());
        }
        n -= item.size();
    }
    unreachable!("split index beyond digit size")
}

/// Descends to the chunk item containing element `n` and resolves it.
fn item_get(item: &Item, n: usize) -> Value {
    match item {
        Item::Chunk(c) => c.get(n),
        Item::Node(node) => {
            let mut n = n;
            for child in &node.items {
                if n < child.size() {
                    return item_get(child, n);
                }
                n -= child.size();
            }
            unreachable!("index beyond node size")
        }
    }
}

fn tree_get(t: &Tree, n: usize) -> Value {
    match t {
        Tree::Empty => unreachable!("index of empty tree"),
        Tree::Single(item) => item_get(item, n),
        Tree::Deep { pr, mid, sf, .. } => {
            let spr = digit_size(pr);
            let smid = tree_size(mid);
            if n < spr {
                let mut k = n;
                for it in pr {
                    if k < it.size() {
                        return item_get(it, k);
                    }
                    k -= it.size();
                }
                unreachable!()
            } else if n < spr + smid {
                tree_get(mid, n - spr)
            } else {
                let mut k = n - spr - smid;
                for it in sf {
                    if k < it.size() {
                        return item_get(it, k);
                    }
                    k -= it.size();
                }
                unreachable!()
            }
        }
    }
}

/// A persistent list of values with O(log n) index, split and append.
#[derive(Clone)]
pub struct Rope(Tree);

impl Default for Rope {
    fn default() -> Self {
        Rope::empty()
    }
}

impl Rope {
    /// The empty list.
    pub fn empty() -> Rope {
        Rope(Tree::Empty)
    }

    /// A one-element list.
    pub fn singleton(value: Value) -> Rope {
        Rope(Tree::Single(Item::Chunk(Chunk::of_values(vec![value]))))
    }

    /// A list of raw bytes.
    pub fn of_bytes(bytes: &[u8]) -> Rope {
        let mut rope = Rope::empty();
        for chunk in bytes.chunks(CHUNK_BYTES) {
            rope.0 = tree_snoc(&rope.0, Item::Chunk(Chunk::of_bytes(chunk.to_vec())));
        }
        rope
    }

    /// The number of elements. O(1).
    pub fn len(&self) -> usize {
        tree_size(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.0, Tree::Empty)
    }

    /// The element at index `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    pub fn get(&self, i: usize) -> Value {
        assert!(i < self.len(), "index {} beyond rope length {}", i, self.len());
        tree_get(&self.0, i)
    }

    /// Prepends an element, joining into a small leading chunk when it fits.
    pub fn cons(&self, value: Value) -> Rope {
        match &self.0 {
            Tree::Single(Item::Chunk(c)) if c.len() < c.small_limit() => {
                Rope(Tree::Single(Item::Chunk(c.push_first(value))))
            }
            Tree::Deep { pr, mid, sf, .. } => {
                if let Item::Chunk(c) = &pr[0] {
                    if c.len() < c.small_limit() {
                        let mut pr2 = pr.clone();
                        pr2[0] = Item::Chunk(c.push_first(value));
                        return Rope(deep(pr2, mid.clone(), sf.clone()));
                    }
                }
                Rope(tree_cons(
                    &self.0,
                    Item::Chunk(Chunk::of_values(vec![value])),
                ))
            }
            _ => Rope(tree_cons(
                &self.0,
                Item::Chunk(Chunk::of_values(vec![value])),
            )),
        }
    }

    /// Appends an element, joining into a small trailing chunk when it fits.
    pub fn snoc(&self, value: Value) -> Rope {
        match &self.0 {
            Tree::Single(Item::Chunk(c)) if c.len() < c.small_limit() => {
                Rope(Tree::Single(Item::Chunk(c.push_last(value))))
            }
            Tree::Deep { pr, mid, sf, .. } => {
                if let Item::Chunk(c) = &sf[sf.len() - 1] {
                    if c.len() < c.small_limit() {
                        let mut sf2 = sf.clone();
                        let last = sf2.len() - 1;
                        sf2[last] = Item::Chunk(c.push_last(value));
                        return Rope(deep(pr.clone(), mid.clone(), sf2));
                    }
                }
                Rope(tree_snoc(
                    &self.0,
                    Item::Chunk(Chunk::of_values(vec![value])),
                ))
            }
            _ => Rope(tree_snoc(
                &self.0,
                Item::Chunk(Chunk::of_values(vec![value])),
            )),
        }
    }

    /// Removes the first element.
    pub fn pop_first(&self) -> Option<(Value, Rope)> {
        let (item, rest) = tree_viewl(&self.0)?;
        let chunk = match item {
            Item::Chunk(c) => c,
            Item::Node(_) => unreachable!("level-0 digit holds a node"),
        };
        let value = chunk.get(0);
        let rope = if chunk.len() == 1 {
            Rope(rest)
        } else {
            Rope(tree_cons(&rest, Item::Chunk(chunk.split(1).1)))
        };
        Some((value, rope))
    }

    /// Removes the last element.
    pub fn pop_last(&self) -> Option<(Rope, Value)> {
        let (rest, item) = tree_viewr(&self.0)?;
        let chunk = match item {
            Item::Chunk(c) => c,
            Item::Node(_) => unreachable!("level-0 digit holds a node"),
        };
        let value = chunk.get(chunk.len() - 1);
        let rope = if chunk.len() == 1 {
            Rope(rest)
        } else {
            Rope(tree_snoc(&rest, Item::Chunk(chunk.split(chunk.len() - 1).0)))
        };
        Some((rope, value))
    }

    /// Concatenates two ropes. O(log n).
    pub fn append(&self, other: &Rope) -> Rope {
        Rope(app3(&self.0, vec![], &other.0))
    }

    /// Splits into the first `n` elements and the rest.
    ///
    /// # Panics
    ///
    /// Panics if `n > self.len()`.
    pub fn split(&self, n: usize) -> (Rope, Rope) {
        assert!(n <= self.len(), "split {} beyond rope length {}", n, self.len());
        if n == 0 {
            return (Rope::empty(), self.clone());
        }
        if n == self.len() {
            return (self.clone(), Rope::empty());
        }
        let (l, item, r) = split_tree(&self.0, n);
        let chunk = match item {
            Item::Chunk(c) => c,
            Item::Node(_) => unreachable!("split bottomed out on a node"),
        };
        let k = n - tree_size(&l);
        let (mut left, mut right) = (l, r);
        if k == 0 {
            right = tree_cons(&right, Item::Chunk(chunk));
        } else if k == chunk.len() {
            left = tree_snoc(&left, Item::Chunk(chunk));
        } else {
            let (ca, cb) = chunk.split(k);
            left = tree_snoc(&left, Item::Chunk(ca));
            right = tree_cons(&right, Item::Chunk(cb));
        }
        (Rope(left), Rope(right))
    }

    /// The first `n` elements.
    pub fn take(&self, n: usize) -> Rope {
        self.split(n).0
    }

    /// The elements after the first `n`.
    pub fn drop_first(&self, n: usize) -> Rope {
        self.split(n).1
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            chunks: Chunks {
                stack: vec![Frame::Tree(&self.0)],
            },
            chunk: None,
            index: 0,
        }
    }

    /// True if every element is a byte value.
    pub fn is_binary(&self) -> bool {
        // The chunk constructor canonicalizes all-byte arrays to byte
        // chunks, so checking chunk kinds suffices.
        Chunks {
            stack: vec![Frame::Tree(&self.0)],
        }
        .all(|chunk| matches!(chunk, Chunk::Bytes(_)))
    }

    /// Copies the contents into a byte vector; `None` unless every element
    /// is a byte value.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.len());
        let chunks = Chunks {
            stack: vec![Frame::Tree(&self.0)],
        };
        for chunk in chunks {
            match chunk {
                Chunk::Bytes(b) => bytes.extend_from_slice(b),
                Chunk::Vals(_) => return None,
            }
        }
        Some(bytes)
    }

    /// Copies the contents into a value vector.
    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().collect()
    }

    /// Applies `f` to every element.
    pub fn map(&self, f: impl FnMut(Value) -> Value) -> Rope {
        self.iter().map(f).collect()
    }

    /// Folds from the back of the list.
    pub fn fold_back<B>(&self, init: B, mut f: impl FnMut(Value, B) -> B) -> B {
        self.to_vec().into_iter().rfold(init, |acc, v| f(v, acc))
    }
}

impl FromIterator<Value> for Rope {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut tree = Tree::Empty;
        let mut buf: Vec<Value> = Vec::new();
        let mut all_bytes = true;
        for value in iter {
            let is_byte = value.to_byte().is_some();
            if !buf.is_empty() {
                let limit = if all_bytes && is_byte {
                    CHUNK_BYTES
                } else {
                    CHUNK_VALS
                };
                if buf.len() >= limit {
                    tree =
                        tree_snoc(&tree, Item::Chunk(Chunk::of_values(std::mem::take(&mut buf))));
                }
            }
            if buf.is_empty() {
                all_bytes = true;
            }
            all_bytes &= is_byte;
            buf.push(value);
        }
        if !buf.is_empty() {
            tree = tree_snoc(&tree, Item::Chunk(Chunk::of_values(buf)));
        }
        Rope(tree)
    }
}

impl PartialEq for Rope {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for Rope {}

impl std::fmt::Debug for Rope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

enum Frame<'a> {
    Tree(&'a Tree),
    Items(std::slice::Iter<'a, Item>),
}

/// Iterator over the leaf chunks in order.
struct Chunks<'a> {
    stack: Vec<Frame<'a>>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a Chunk;

    fn next(&mut self) -> Option<&'a Chunk> {
        loop {
            match self.stack.pop()? {
                Frame::Tree(Tree::Empty) => {}
                Frame::Tree(Tree::Single(item)) => {
                    self.stack.push(Frame::Items(std::slice::from_ref(item).iter()));
                }
                Frame::Tree(Tree::Deep { pr, mid, sf, .. }) => {
                    self.stack.push(Frame::Items(sf.iter()));
                    self.stack.push(Frame::Tree(mid.as_ref()));
                    self.stack.push(Frame::Items(pr.iter()));
                }
                Frame::Items(mut items) => match items.next() {
                    None => {}
                    Some(item) => {
                        self.stack.push(Frame::Items(items));
                        match item {
                            Item::Chunk(chunk) => return Some(chunk),
                            Item::Node(node) => {
                                self.stack.push(Frame::Items(node.items.iter()));
                            }
                        }
                    }
                },
            }
        }
    }
}

/// Iterator over the elements of a [`Rope`].
pub struct Iter<'a> {
    chunks: Chunks<'a>,
    chunk: Option<&'a Chunk>,
    index: usize,
}

impl Iterator for Iter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        loop {
            if let Some(chunk) = self.chunk {
                if self.index < chunk.len() {
                    let value = chunk.get(self.index);
                    self.index += 1;
                    return Some(value);
                }
                self.chunk = None;
            }
            self.chunk = Some(self.chunks.next()?);
            self.index = 0;
        }
    }
}
