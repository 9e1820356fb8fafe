//! Checksum comparison.

use super::matching::match_entries;
use super::{Category, DiffBackend, DiffMethod, DiffResult};
use crate::error::Result;
use crate::location::{Location, ManifestEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

/// A checksum, or the unknown marker of one side. Unknowns from different
/// sides never compare equal, and an unknown never equals a real hash.
#[derive(Debug, PartialEq, Eq)]
enum Fingerprint<'a> {
    Known(&'a str),
    Unknown(Side),
}

impl<'a> Fingerprint<'a> {
    fn of(entry: &'a ManifestEntry, side: Side) -> Self {
        match entry.checksum.as_deref() {
            Some(sum) => Fingerprint::Known(sum),
            None => Fingerprint::Unknown(side),
        }
    }
}

fn classify(a: &Fingerprint<'_>, b: &Fingerprint<'_>) -> Category {
    match (a, b) {
        (Fingerprint::Known(x), Fingerprint::Known(y)) if x == y => Category::Equal,
        (Fingerprint::Known(_), Fingerprint::Known(_)) => Category::Changed,
        _ => Category::Unknown,
    }
}

/// Compares the checksums already present in both locations. Entries
/// without a checksum end up in [`Category::Unknown`]; compute them first
/// with [`Location::with_computed_info`] to get a definite answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashDiff;

impl DiffBackend for HashDiff {
    fn method(&self) -> DiffMethod {
        DiffMethod::Hash
    }

    fn diff(&self, a: &Location, b: &Location) -> Result<DiffResult> {
        let matched = match_entries(a.entries(), b.entries());
        let mut out = DiffResult::builder(DiffMethod::Hash);
        for entry in matched.only_a {
            out.push(Category::OnlyInA, entry.path.clone());
        }
        for entry in matched.only_b {
            out.push(Category::OnlyInB, entry.path.clone());
        }
        for (x, y) in matched.both {
            let category = classify(&Fingerprint::of(x, Side::A), &Fingerprint::of(y, Side::B));
            out.push(category, x.path.clone());
        }
        let result = out.finish();
        tracing::debug!(
            equal = result.equal().len(),
            changed = result.changed().len(),
            unknown = result.unknown().len(),
            only_in_a = result.only_in_a().len(),
            only_in_b = result.only_in_b().len(),
            "hash diff"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Endpoint;
    use std::path::PathBuf;

    fn loc(root: &str, entries: &[(&str, Option<&str>)]) -> Location {
        Location::new(
            Endpoint::local(root),
            entries
                .iter()
                .map(|(p, sum)| match sum {
                    Some(s) => ManifestEntry::with_checksum(*p, *s),
                    None => ManifestEntry::new(*p),
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_full_match() {
        let a = loc("a", &[("foo", Some("h1")), ("bar", Some("h2"))]);
        let b = loc("b", &[("foo", Some("h1")), ("bar", Some("h2"))]);
        let d = HashDiff.diff(&a, &b).unwrap();
        assert_eq!(d.equal(), [PathBuf::from("bar"), PathBuf::from("foo")]);
        assert!(d.is_identical());
    }

    #[test]
    fn test_changed_and_one_sided() {
        let a = loc("a", &[("x", Some("1")), ("only_a", Some("2"))]);
        let b = loc("b", &[("x", Some("9")), ("only_b", None)]);
        let d = HashDiff.diff(&a, &b).unwrap();
        assert_eq!(d.changed(), [PathBuf::from("x")]);
        assert_eq!(d.only_in_a(), [PathBuf::from("only_a")]);
        assert_eq!(d.only_in_b(), [PathBuf::from("only_b")]);
    }

    #[test]
    fn test_unknown_never_equal() {
        let a = loc("a", &[("both_missing", None), ("one_missing", Some("1"))]);
        let b = loc("b", &[("both_missing", None), ("one_missing", None)]);
        let d = HashDiff.diff(&a, &b).unwrap();
        assert!(d.equal().is_empty());
        assert_eq!(
            d.unknown(),
            [PathBuf::from("both_missing"), PathBuf::from("one_missing")]
        );
    }

    #[test]
    fn test_fingerprint_sides_differ() {
        assert_ne!(Fingerprint::Unknown(Side::A), Fingerprint::Unknown(Side::B));
        assert_eq!(
            classify(&Fingerprint::Unknown(Side::A), &Fingerprint::Unknown(Side::A)),
            Category::Unknown
        );
    }
}
