//! Ascending traversal over a [`SkipList`].

use std::iter::FusedIterator;

use super::list::SkipList;

/// Lazy ascending iterator following level-0 links.
///
/// Borrows the list immutably, so the list cannot be mutated while a
/// traversal is in progress; collect keys first when entries must be removed.
pub struct Iter<'a, K, V> {
    list: &'a SkipList<K, V>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, K: Ord, V> Iter<'a, K, V> {
    pub(super) fn new(list: &'a SkipList<K, V>, start: Option<usize>, remaining: usize) -> Self {
        Self {
            list,
            cursor: start,
            remaining,
        }
    }
}

impl<'a, K: Ord, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = self.list.node(index);
        self.cursor = self.list.next(Some(index), 0);
        self.remaining = self.remaining.saturating_sub(1);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Ord, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K: Ord, V> FusedIterator for Iter<'_, K, V> {}

#[cfg(test)]
mod tests {
    use super::super::SkipList;

    #[test]
    fn test_iter_ascending() {
        let mut list = SkipList::with_seed(13);
        for key in ["delta", "alpha", "charlie", "bravo"] {
            list.insert(key.to_string(), key.len()).unwrap();
        }

        let keys: Vec<&str> = list.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "bravo", "charlie", "delta"]);
    }

    #[test]
    fn test_iter_restarts_on_fresh_call() {
        let mut list = SkipList::with_seed(17);
        for k in 1..=3u8 {
            list.insert(k, ()).unwrap();
        }

        let mut first = list.iter();
        assert_eq!(first.next().map(|(k, _)| *k), Some(1));
        assert_eq!(list.iter().len(), 3);
        assert_eq!(list.iter().next().map(|(k, _)| *k), Some(1));
    }

    #[test]
    fn test_iter_is_fused() {
        let mut list = SkipList::with_seed(19);
        list.insert(1u8, ()).unwrap();

        let mut iter = list.iter();
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_into_iter_for_reference() {
        let mut list = SkipList::with_seed(23);
        list.insert(2u8, 'b').unwrap();
        list.insert(1u8, 'a').unwrap();

        let mut seen = Vec::new();
        for (k, v) in &list {
            seen.push((*k, *v));
        }
        assert_eq!(seen, vec![(1, 'a'), (2, 'b')]);
    }
}
