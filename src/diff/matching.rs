//! Sort-and-merge matching of two entry lists.
//!
//! Both sides are sorted once (`O(n log n)`), then a single linear pass splits
//! them into A-only, paired and B-only entries. [`SortedIndex`] gives
//! `O(log n)` lookups by path afterwards.

use std::cmp::Ordering;
use std::path::Path;

use crate::location::ManifestEntry;

/// Output of [`match_entries`]. All three lists are sorted by path.
#[derive(Debug, Default)]
pub struct Matched<'a> {
    pub only_a: Vec<&'a ManifestEntry>,
    pub both: Vec<(&'a ManifestEntry, &'a ManifestEntry)>,
    pub only_b: Vec<&'a ManifestEntry>,
}

/// Entries sorted by path for binary-search lookup.
#[derive(Debug)]
pub struct SortedIndex<'a> {
    entries: Vec<&'a ManifestEntry>,
}

impl<'a> SortedIndex<'a> {
    pub fn new(entries: &'a [ManifestEntry]) -> Self {
        let mut entries: Vec<&ManifestEntry> = entries.iter().collect();
        entries.sort_unstable_by(|x, y| x.path.cmp(&y.path));
        Self { entries }
    }

    pub fn get(&self, path: &Path) -> Option<&'a ManifestEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_path().cmp(path))
            .ok()
            .map(|i| self.entries[i])
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    pub fn entries(&self) -> &[&'a ManifestEntry] {
        &self.entries
    }
}

/// Split `a` and `b` by path membership.
pub fn match_entries<'a>(a: &'a [ManifestEntry], b: &'a [ManifestEntry]) -> Matched<'a> {
    let a = SortedIndex::new(a);
    let b = SortedIndex::new(b);
    let (a, b) = (a.entries(), b.entries());

    let mut out = Matched::default();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].path.cmp(&b[j].path) {
            Ordering::Less => {
                out.only_a.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.only_b.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.both.push((a[i], b[j]));
                i += 1;
                j += 1;
            }
        }
    }
    out.only_a.extend_from_slice(&a[i..]);
    out.only_b.extend_from_slice(&b[j..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(paths: &[&str]) -> Vec<ManifestEntry> {
        paths.iter().map(|p| ManifestEntry::new(*p)).collect()
    }

    fn names(list: &[&ManifestEntry]) -> Vec<String> {
        list.iter().map(|e| e.path.display().to_string()).collect()
    }

    #[test]
    fn test_match_unsorted_inputs() {
        let a = entries(&["c", "a", "b"]);
        let b = entries(&["d", "b", "a"]);
        let m = match_entries(&a, &b);
        assert_eq!(names(&m.only_a), ["c"]);
        assert_eq!(names(&m.only_b), ["d"]);
        let both: Vec<_> = m.both.iter().map(|(x, _)| x.path.display().to_string()).collect();
        assert_eq!(both, ["a", "b"]);
    }

    #[test]
    fn test_match_empty_sides() {
        let a = entries(&["x"]);
        let m = match_entries(&a, &[]);
        assert_eq!(names(&m.only_a), ["x"]);
        assert!(m.both.is_empty() && m.only_b.is_empty());
    }

    #[test]
    fn test_sorted_index_lookup() {
        let a = vec![
            ManifestEntry::with_checksum("b", "22"),
            ManifestEntry::with_checksum("a", "11"),
        ];
        let idx = SortedIndex::new(&a);
        assert_eq!(idx.get(Path::new("a")).unwrap().checksum.as_deref(), Some("11"));
        assert!(!idx.contains(Path::new("c")));
    }

    #[test]
    fn test_component_order_is_consistent() {
        // Path ordering is per component, so "a/b" sorts before "a.txt".
        let a = entries(&["a.txt", "a/b"]);
        let b = entries(&["a/b", "a.txt"]);
        let m = match_entries(&a, &b);
        assert_eq!(m.both.len(), 2);
    }
}
