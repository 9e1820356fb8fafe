//! Comparing two locations.
//!
//! Every backend partitions `paths(A) ∪ paths(B)` into the five
//! [`Category`] buckets of a [`DiffResult`]. Buckets are disjoint and sorted
//! by path, so results compare equal whenever the inputs do.
//!
//! | backend | reads content | sees destination-only files |
//! |---|---|---|
//! | [`HashDiff`] | checksums from the manifests | yes |
//! | [`RsyncDiff`] | rsync's own quick check (or `--checksum`) | no |
//! | [`ExistenceDiff`] | no | yes |

pub mod existence;
pub mod hash;
pub mod itemize;
pub mod matching;
pub mod rsync;

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::command::Tools;
use crate::error::{Result, SyncError};
use crate::location::Location;

pub use existence::ExistenceDiff;
pub use hash::HashDiff;
pub use rsync::RsyncDiff;

/// Bucket a path falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Equal,
    Changed,
    /// Present on both sides, content unknown on at least one.
    Unknown,
    OnlyInA,
    OnlyInB,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Equal,
        Category::Changed,
        Category::Unknown,
        Category::OnlyInA,
        Category::OnlyInB,
    ];

    /// Two-character marker used in tables and YAML output.
    pub fn symbol(self) -> &'static str {
        match self {
            Category::Equal => "==",
            Category::Changed => "!=",
            Category::Unknown => "?=",
            Category::OnlyInA => "->",
            Category::OnlyInB => "<-",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How two locations are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMethod {
    /// Compare manifest checksums (computing missing ones first).
    Hash,
    /// Ask `rsync -n --itemize-changes`.
    #[default]
    Rsync,
    /// Only look at which files exist.
    Exists,
}

impl fmt::Display for DiffMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiffMethod::Hash => "hash",
            DiffMethod::Rsync => "rsync",
            DiffMethod::Exists => "exists",
        })
    }
}

/// Partition of the union of two locations' paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    method: DiffMethod,
    equal: Vec<PathBuf>,
    changed: Vec<PathBuf>,
    unknown: Vec<PathBuf>,
    only_in_a: Vec<PathBuf>,
    only_in_b: Vec<PathBuf>,
    dest_only_observed: bool,
}

impl DiffResult {
    pub(crate) fn builder(method: DiffMethod) -> DiffBuilder {
        DiffBuilder {
            result: DiffResult {
                method,
                equal: Vec::new(),
                changed: Vec::new(),
                unknown: Vec::new(),
                only_in_a: Vec::new(),
                only_in_b: Vec::new(),
                dest_only_observed: true,
            },
        }
    }

    pub fn method(&self) -> DiffMethod {
        self.method
    }

    pub fn equal(&self) -> &[PathBuf] {
        &self.equal
    }

    pub fn changed(&self) -> &[PathBuf] {
        &self.changed
    }

    pub fn unknown(&self) -> &[PathBuf] {
        &self.unknown
    }

    pub fn only_in_a(&self) -> &[PathBuf] {
        &self.only_in_a
    }

    pub fn only_in_b(&self) -> &[PathBuf] {
        &self.only_in_b
    }

    /// Whether the backend could see files that exist only in B.
    ///
    /// `false` for a single rsync dry run: its `only_in_b` is empty by
    /// construction, not because B has no extra files. Combine with a
    /// swapped run through [`DiffResult::with_reverse_pass`].
    pub fn dest_only_observed(&self) -> bool {
        self.dest_only_observed
    }

    pub fn paths(&self, category: Category) -> &[PathBuf] {
        match category {
            Category::Equal => &self.equal,
            Category::Changed => &self.changed,
            Category::Unknown => &self.unknown,
            Category::OnlyInA => &self.only_in_a,
            Category::OnlyInB => &self.only_in_b,
        }
    }

    /// Category of `path`, if it is part of the result.
    pub fn category(&self, path: &Path) -> Option<Category> {
        Category::ALL.into_iter().find(|&c| {
            self.paths(c)
                .binary_search_by(|p| p.as_path().cmp(path))
                .is_ok()
        })
    }

    /// All `(category, path)` pairs, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &Path)> + '_ {
        Category::ALL
            .into_iter()
            .flat_map(move |c| self.paths(c).iter().map(move |p| (c, p.as_path())))
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|&c| self.paths(c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing changed, unknown or one-sided.
    pub fn is_identical(&self) -> bool {
        self.changed.is_empty()
            && self.unknown.is_empty()
            && self.only_in_a.is_empty()
            && self.only_in_b.is_empty()
    }

    /// The same comparison seen from B's side.
    pub fn reversed(&self) -> DiffResult {
        DiffResult {
            only_in_a: self.only_in_b.clone(),
            only_in_b: self.only_in_a.clone(),
            ..self.clone()
        }
    }

    /// Fill `only_in_b` from `reverse`, a diff of the same locations with
    /// arguments swapped. Paths already classified here keep their category.
    pub fn with_reverse_pass(&self, reverse: &DiffResult) -> DiffResult {
        let mut builder = DiffBuilder {
            result: self.clone(),
        };
        for path in reverse.only_in_a() {
            if self.category(path).is_none() {
                builder.push(Category::OnlyInB, path.clone());
            }
        }
        let mut result = builder.finish();
        result.dest_only_observed = true;
        result
    }

    fn buckets(&self) -> Buckets<'_> {
        Buckets {
            equal: &self.equal,
            changed: &self.changed,
            unknown: &self.unknown,
            only_in_a: &self.only_in_a,
            only_in_b: &self.only_in_b,
        }
    }

    /// YAML document keyed by category symbol, empty buckets omitted.
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(&self.buckets())
            .map_err(|e| SyncError::manifest(format!("cannot serialize diff: {e}")))
    }

    /// Same document as [`DiffResult::to_yaml_string`], as pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.buckets())
            .map_err(|e| SyncError::manifest(format!("cannot serialize diff: {e}")))
    }
}

fn is_empty(paths: &&[PathBuf]) -> bool {
    paths.is_empty()
}

#[derive(Serialize)]
struct Buckets<'a> {
    #[serde(rename = "==", skip_serializing_if = "is_empty")]
    equal: &'a [PathBuf],
    #[serde(rename = "!=", skip_serializing_if = "is_empty")]
    changed: &'a [PathBuf],
    #[serde(rename = "?=", skip_serializing_if = "is_empty")]
    unknown: &'a [PathBuf],
    #[serde(rename = "->", skip_serializing_if = "is_empty")]
    only_in_a: &'a [PathBuf],
    #[serde(rename = "<-", skip_serializing_if = "is_empty")]
    only_in_b: &'a [PathBuf],
}

/// Collects paths per bucket; [`DiffBuilder::finish`] sorts them.
#[derive(Debug)]
pub(crate) struct DiffBuilder {
    result: DiffResult,
}

impl DiffBuilder {
    pub(crate) fn push(&mut self, category: Category, path: PathBuf) {
        let bucket = match category {
            Category::Equal => &mut self.result.equal,
            Category::Changed => &mut self.result.changed,
            Category::Unknown => &mut self.result.unknown,
            Category::OnlyInA => &mut self.result.only_in_a,
            Category::OnlyInB => &mut self.result.only_in_b,
        };
        bucket.push(path);
    }

    pub(crate) fn dest_only_observed(&mut self, observed: bool) {
        self.result.dest_only_observed = observed;
    }

    pub(crate) fn finish(mut self) -> DiffResult {
        for bucket in [
            &mut self.result.equal,
            &mut self.result.changed,
            &mut self.result.unknown,
            &mut self.result.only_in_a,
            &mut self.result.only_in_b,
        ] {
            bucket.sort();
        }
        self.result
    }
}

/// A comparison strategy.
pub trait DiffBackend {
    fn method(&self) -> DiffMethod;

    /// Partition the paths of `a` (source) and `b` (destination).
    fn diff(&self, a: &Location, b: &Location) -> Result<DiffResult>;
}

/// The backend for `method`. `checksum` only affects rsync.
pub fn backend_for(method: DiffMethod, tools: &Tools, checksum: bool) -> Box<dyn DiffBackend> {
    match method {
        DiffMethod::Hash => Box::new(HashDiff),
        DiffMethod::Exists => Box::new(ExistenceDiff),
        DiffMethod::Rsync => Box::new(RsyncDiff::new(tools.clone()).checksum(checksum)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DiffResult {
        let mut b = DiffResult::builder(DiffMethod::Hash);
        b.push(Category::Equal, "z".into());
        b.push(Category::Equal, "a".into());
        b.push(Category::Changed, "m".into());
        b.push(Category::OnlyInA, "new".into());
        b.finish()
    }

    #[test]
    fn test_buckets_sorted() {
        let d = sample();
        assert_eq!(d.equal(), [PathBuf::from("a"), PathBuf::from("z")]);
        assert_eq!(d.len(), 4);
        assert!(!d.is_identical());
    }

    #[test]
    fn test_category_lookup() {
        let d = sample();
        assert_eq!(d.category(Path::new("z")), Some(Category::Equal));
        assert_eq!(d.category(Path::new("m")), Some(Category::Changed));
        assert_eq!(d.category(Path::new("nope")), None);
    }

    #[test]
    fn test_reversed_swaps_sides() {
        let d = sample().reversed();
        assert!(d.only_in_a().is_empty());
        assert_eq!(d.only_in_b(), [PathBuf::from("new")]);
    }

    #[test]
    fn test_with_reverse_pass() {
        let mut fwd = DiffResult::builder(DiffMethod::Rsync);
        fwd.dest_only_observed(false);
        fwd.push(Category::Equal, "a".into());
        let fwd = fwd.finish();
        assert!(!fwd.dest_only_observed());

        let mut rev = DiffResult::builder(DiffMethod::Rsync);
        rev.dest_only_observed(false);
        rev.push(Category::Equal, "a".into());
        rev.push(Category::OnlyInA, "extra".into());
        let combined = fwd.with_reverse_pass(&rev.finish());
        assert!(combined.dest_only_observed());
        assert_eq!(combined.only_in_b(), [PathBuf::from("extra")]);
    }

    #[test]
    fn test_yaml_output() {
        let yaml = sample().to_yaml_string().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let map = value.as_mapping().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(value["=="][1].as_str(), Some("z"));
        assert_eq!(value["->"][0].as_str(), Some("new"));
        assert!(value.get("<-").is_none());
    }

    #[test]
    fn test_json_output() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json_string().unwrap()).unwrap();
        assert_eq!(json["!="], serde_json::json!(["m"]));
        assert_eq!(json["=="], serde_json::json!(["a", "z"]));
        assert!(json.get("?=").is_none());
    }

    #[test]
    fn test_method_display() {
        assert_eq!(DiffMethod::Exists.to_string(), "exists");
        assert_eq!(DiffMethod::default(), DiffMethod::Rsync);
    }
}
