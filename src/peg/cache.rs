//! Position-indexed memo tables
//!
//! Every evaluation strategy memoizes results per `(key, position)`, where
//! the key is a rule (packrat, bottom-up) or an expression (pika). Rows are
//! allocated per input position up front, so a lookup is one vector index
//! plus a small hash probe, and a scan that walks positions from the end
//! only ever touches one row at a time.

use hashbrown::HashMap;
use std::hash::Hash;

/// Memo table keyed by input position, then by `K`
#[derive(Debug, Clone)]
pub struct MemoTable<K, V> {
    rows: Vec<HashMap<K, V>>,
    len: usize,
    hits: u64,
    misses: u64,
}

impl<K: Copy + Eq + Hash, V> MemoTable<K, V> {
    /// Table covering positions `0..=input_len`
    pub fn for_input(input_len: usize) -> Self {
        let mut rows = Vec::with_capacity(input_len + 1);
        rows.resize_with(input_len + 1, HashMap::new);
        Self {
            rows,
            len: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up an entry, counting the hit or miss
    #[inline]
    pub fn get(&mut self, pos: usize, key: K) -> Option<&V> {
        let found = self.rows.get(pos).and_then(|row| row.get(&key));
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Look up an entry without touching the statistics
    #[inline]
    pub fn peek(&self, pos: usize, key: K) -> Option<&V> {
        self.rows.get(pos).and_then(|row| row.get(&key))
    }

    /// Store an entry, returning the previous one
    ///
    /// # Panics
    ///
    /// Panics if `pos` is past the end of the input the table was sized for.
    #[inline]
    pub fn insert(&mut self, pos: usize, key: K, value: V) -> Option<V> {
        let previous = self.rows[pos].insert(key, value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Drop an entry, returning it
    #[inline]
    pub fn remove(&mut self, pos: usize, key: K) -> Option<V> {
        let previous = self.rows.get_mut(pos).and_then(|row| row.remove(&key));
        if previous.is_some() {
            self.len -= 1;
        }
        previous
    }

    /// Get cache statistics: (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };
        (self.hits, self.misses, hit_rate)
    }

    /// Number of stored entries
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing is stored
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memo_table_basic() {
        let mut table: MemoTable<u32, &str> = MemoTable::for_input(3);
        assert!(table.is_empty());

        assert!(table.insert(0, 7, "a").is_none());
        assert!(table.insert(3, 7, "b").is_none());
        assert_eq!(table.len(), 2);

        assert_eq!(table.get(0, 7), Some(&"a"));
        assert_eq!(table.get(3, 7), Some(&"b"));
        assert_eq!(table.get(1, 7), None);
    }

    #[test]
    fn test_memo_table_replace_keeps_len() {
        let mut table: MemoTable<u32, usize> = MemoTable::for_input(1);
        table.insert(1, 0, 10);
        assert_eq!(table.insert(1, 0, 20), Some(10));
        assert_eq!(table.len(), 1);
        assert_eq!(table.peek(1, 0), Some(&20));
    }

    #[test]
    fn test_memo_table_remove() {
        let mut table: MemoTable<u32, usize> = MemoTable::for_input(2);
        table.insert(2, 0, 1);
        assert_eq!(table.remove(2, 0), Some(1));
        assert_eq!(table.remove(2, 0), None);
        assert_eq!(table.remove(9, 0), None);
        assert!(table.is_empty());
        assert!(table.peek(2, 0).is_none());
    }

    #[test]
    fn test_memo_table_stats() {
        let mut table: MemoTable<u32, ()> = MemoTable::for_input(0);
        table.get(0, 1);
        table.insert(0, 1, ());
        table.get(0, 1);
        table.get(0, 1);
        // peek does not count
        table.peek(0, 1);

        let (hits, misses, hit_rate) = table.stats();
        assert_eq!(hits, 2);
        assert_eq!(misses, 1);
        assert!((hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_memo_table_out_of_range_lookup() {
        let mut table: MemoTable<u32, ()> = MemoTable::for_input(2);
        assert!(table.get(10, 0).is_none());
        assert!(table.peek(10, 0).is_none());
    }
}
