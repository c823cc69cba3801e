//! Key-based deduplication

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Which row survives when several share a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Keep the first occurrence in input order
    KeepFirst,
    /// Keep the last occurrence in input order
    KeepLast,
}

/// Drop rows whose key was already seen, according to `policy`
///
/// Surviving rows stay at the position of the occurrence that was kept, so
/// `KeepLast` orders the output by each key's last appearance.
pub fn dedup_by_key<T, K, F>(rows: Vec<T>, policy: DedupPolicy, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    match policy {
        DedupPolicy::KeepFirst => {
            let mut seen = HashSet::with_capacity(rows.len());
            rows.into_iter().filter(|row| seen.insert(key(row))).collect()
        }
        DedupPolicy::KeepLast => {
            let mut last: HashMap<K, usize> = HashMap::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                last.insert(key(row), index);
            }
            rows.into_iter()
                .enumerate()
                .filter(|(index, row)| last.get(&key(row)) == Some(index))
                .map(|(_, row)| row)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<(&'static str, i32)> {
        vec![("a", 1), ("b", 2), ("a", 3), ("c", 4), ("b", 5)]
    }

    #[test]
    fn test_keep_first() {
        let kept = dedup_by_key(rows(), DedupPolicy::KeepFirst, |r| r.0);
        assert_eq!(kept, vec![("a", 1), ("b", 2), ("c", 4)]);
    }

    #[test]
    fn test_keep_last() {
        let kept = dedup_by_key(rows(), DedupPolicy::KeepLast, |r| r.0);
        assert_eq!(kept, vec![("a", 3), ("c", 4), ("b", 5)]);
    }

    #[test]
    fn test_empty_input() {
        let kept: Vec<(&str, i32)> = dedup_by_key(Vec::new(), DedupPolicy::KeepLast, |r| r.0);
        assert!(kept.is_empty());
    }
}
