//! Presence-only comparison.

use super::matching::match_entries;
use super::{Category, DiffBackend, DiffMethod, DiffResult};
use crate::error::Result;
use crate::location::Location;

/// Reads no content. A path present on both sides is [`Category::Unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistenceDiff;

impl DiffBackend for ExistenceDiff {
    fn method(&self) -> DiffMethod {
        DiffMethod::Exists
    }

    fn diff(&self, a: &Location, b: &Location) -> Result<DiffResult> {
        let matched = match_entries(a.entries(), b.entries());
        let mut out = DiffResult::builder(DiffMethod::Exists);
        for entry in matched.only_a {
            out.push(Category::OnlyInA, entry.path.clone());
        }
        for entry in matched.only_b {
            out.push(Category::OnlyInB, entry.path.clone());
        }
        for (entry, _) in matched.both {
            out.push(Category::Unknown, entry.path.clone());
        }
        Ok(out.finish())
    }
}
