//! Sort engine: bounded ordered insertion (top-K).
//!
//! Maintains an ordered buffer of at most k items. Each push binary-searches
//! the insertion position under a strictly-less comparator, so ties keep
//! input order and the whole pass is O(n log k) time, O(k) memory. The same
//! machinery sorts row ids and group nodes.

use std::cmp::Ordering;

/// Effective capacity for "no limit".
pub const UNLIMITED: usize = usize::MAX;

pub struct TopK<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    buf: Vec<T>,
    k: usize,
    cmp: F,
}

impl<T, F> TopK<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// `k == 0` is treated as unlimited, matching the view's limit
    /// convention.
    pub fn new(k: usize, cmp: F) -> Self {
        let k = if k == 0 { UNLIMITED } else { k };
        let cap = k.min(1024);
        TopK { buf: Vec::with_capacity(cap), k, cmp }
    }

    pub fn push(&mut self, item: T) {
        // first index whose element orders strictly after the new item;
        // equal elements stay in front, preserving input order
        let pos = self.buf.partition_point(|existing| (self.cmp)(existing, &item) != Ordering::Greater);
        if pos >= self.k {
            return;
        }
        self.buf.insert(pos, item);
        if self.buf.len() > self.k {
            self.buf.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The collected items in sorted order.
    pub fn into_sorted(self) -> Vec<T> {
        self.buf
    }
}

/// Sort row ids by a multi-key comparator, clipped to `limit`.
pub fn top_k_rows<F>(rows: impl Iterator<Item = u32>, limit: usize, cmp: F) -> Vec<u32>
where
    F: Fn(u32, u32) -> Ordering,
{
    let mut topk = TopK::new(limit, |a: &u32, b: &u32| cmp(*a, *b));
    for row in rows {
        topk.push(row);
    }
    topk.into_sorted()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_and_clips() {
        let data = [5u32, 3, 8, 1, 9, 2];
        let out = top_k_rows(data.iter().copied(), 3, |a, b| a.cmp(&b));
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let data = [3u32, 1, 2];
        let out = top_k_rows(data.iter().copied(), 0, |a, b| a.cmp(&b));
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_descending() {
        let data = [5u32, 3, 8, 1];
        let out = top_k_rows(data.iter().copied(), 2, |a, b| b.cmp(&a));
        assert_eq!(out, vec![8, 5]);
    }

    #[test]
    fn test_stability_on_ties() {
        // sort by value, ties keep input order (tracked by id)
        let data = [(1, 'a'), (0, 'b'), (1, 'c'), (0, 'd'), (1, 'e')];
        let mut topk = TopK::new(UNLIMITED, |x: &(i32, char), y: &(i32, char)| x.0.cmp(&y.0));
        for item in data {
            topk.push(item);
        }
        let out: Vec<char> = topk.into_sorted().into_iter().map(|x| x.1).collect();
        assert_eq!(out, vec!['b', 'd', 'a', 'c', 'e']);
    }

    #[test]
    fn test_insert_beyond_k_is_dropped() {
        let mut topk = TopK::new(2, |a: &i32, b: &i32| a.cmp(b));
        topk.push(1);
        topk.push(2);
        topk.push(3); // would land at position 2 >= k
        assert_eq!(topk.into_sorted(), vec![1, 2]);
    }

    #[test]
    fn test_multi_key_comparator() {
        let rows: Vec<u32> = (0..4).collect();
        let first = ["b", "a", "b", "a"];
        let second = [2, 9, 1, 3];
        let out = top_k_rows(rows.iter().copied(), 0, |a, b| {
            first[a as usize]
                .cmp(first[b as usize])
                .then_with(|| second[a as usize].cmp(&second[b as usize]))
        });
        assert_eq!(out, vec![3, 1, 2, 0]);
    }
}
