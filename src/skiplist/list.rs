//! Arena-backed skip list.

use std::borrow::Borrow;
use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::iter::Iter;

/// Default tower height cap. Keeps expected search cost logarithmic for up to
/// 2^32 entries.
pub const DEFAULT_MAX_LEVEL: usize = 32;

/// Probability that a node present at level `k` is also present at `k + 1`.
const PROMOTION_PROBABILITY: f64 = 0.5;

/// Errors returned by [`SkipList::insert`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InsertError {
    /// The key is already present; callers wanting an upsert must search first.
    #[error("key already present")]
    DuplicateKey,
}

/// A single entry together with its forward links, one per level.
pub(super) struct Node<K, V> {
    pub(super) key: K,
    pub(super) value: V,
    pub(super) forward: Vec<Option<usize>>,
}

/// A probabilistically balanced ordered map.
///
/// Nodes live in a slab and link to each other by index. `head` holds the
/// entry point for every level; a `None` predecessor below always means the
/// head.
pub struct SkipList<K, V> {
    head: Vec<Option<usize>>,
    pub(super) nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    level: usize,
    len: usize,
    max_level: usize,
    rng: StdRng,
}

impl<K: Ord, V> SkipList<K, V> {
    /// Create an empty list seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(DEFAULT_MAX_LEVEL, StdRng::from_entropy())
    }

    /// Create an empty list with a reproducible level generator.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(DEFAULT_MAX_LEVEL, StdRng::seed_from_u64(seed))
    }

    /// Create an empty list with an explicit height cap and randomness source.
    ///
    /// `max_level` is clamped to at least 1.
    pub fn with_rng(max_level: usize, rng: StdRng) -> Self {
        let max_level = max_level.max(1);
        Self {
            head: vec![None; max_level],
            nodes: Vec::new(),
            free: Vec::new(),
            level: 0,
            len: 0,
            max_level,
            rng,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tallest tower currently in the list.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Look up `key`, returning its value if present.
    pub fn search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut pred = None;
        for level in (0..self.level).rev() {
            pred = self.advance(pred, level, key);
        }
        let candidate = self.next(pred, 0)?;
        let node = self.node(candidate);
        match node.key.borrow().cmp(key) {
            Ordering::Equal => Some(&node.value),
            _ => None,
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.search(key).is_some()
    }

    /// Insert a new entry, rejecting keys that are already present.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), InsertError> {
        let update = self.predecessors(&key);
        if let Some(existing) = self.next(update[0], 0) {
            if self.node(existing).key == key {
                return Err(InsertError::DuplicateKey);
            }
        }

        let height = self.random_level();
        // Levels above the current height start from the head.
        if height > self.level {
            self.level = height;
        }

        let forward = (0..height).map(|l| self.next(update[l], l)).collect();
        let index = self.allocate(Node {
            key,
            value,
            forward,
        });
        for (l, pred) in update.iter().enumerate().take(height) {
            self.set_next(*pred, l, Some(index));
        }

        self.len += 1;
        Ok(())
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let update = self.predecessors(key);
        let target = self.next(update[0], 0)?;
        if self.node(target).key.borrow().cmp(key) != Ordering::Equal {
            return None;
        }

        let node = self.nodes[target].take()?;
        for (l, successor) in node.forward.iter().enumerate() {
            self.set_next(update[l], l, *successor);
        }
        self.free.push(target);

        while self.level > 0 && self.head[self.level - 1].is_none() {
            self.level -= 1;
        }
        self.len -= 1;
        Some(node.value)
    }

    /// Ascending traversal over all entries.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self, self.head[0], self.len)
    }

    /// Drop every entry, keeping the randomness source.
    pub fn clear(&mut self) {
        self.head.iter_mut().for_each(|link| *link = None);
        self.nodes.clear();
        self.free.clear();
        self.level = 0;
        self.len = 0;
    }

    /// Predecessor of `key` at every level, `None` meaning the head.
    fn predecessors<Q>(&self, key: &Q) -> Vec<Option<usize>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut update = vec![None; self.max_level];
        let mut pred = None;
        for level in (0..self.level).rev() {
            pred = self.advance(pred, level, key);
            update[level] = pred;
        }
        update
    }

    /// Walk right on `level` while the next key is strictly less than `key`.
    fn advance<Q>(&self, mut pred: Option<usize>, level: usize, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        while let Some(next) = self.next(pred, level) {
            if self.node(next).key.borrow() < key {
                pred = Some(next);
            } else {
                break;
            }
        }
        pred
    }

    fn random_level(&mut self) -> usize {
        let mut height = 1;
        while height < self.max_level && self.rng.gen_bool(PROMOTION_PROBABILITY) {
            height += 1;
        }
        height
    }

    fn allocate(&mut self, node: Node<K, V>) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                index
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    pub(super) fn next(&self, pred: Option<usize>, level: usize) -> Option<usize> {
        match pred {
            None => self.head[level],
            Some(index) => self.node(index).forward.get(level).copied().flatten(),
        }
    }

    fn set_next(&mut self, pred: Option<usize>, level: usize, to: Option<usize>) {
        match pred {
            None => self.head[level] = to,
            Some(index) => {
                if let Some(node) = self.nodes[index].as_mut() {
                    node.forward[level] = to;
                }
            }
        }
    }

    /// Links only ever point at occupied slots.
    pub(super) fn node(&self, index: usize) -> &Node<K, V> {
        match &self.nodes[index] {
            Some(node) => node,
            None => unreachable!("forward link to released slot {index}"),
        }
    }
}

impl<K: Ord, V> Default for SkipList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a SkipList<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Ord + std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for SkipList<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
