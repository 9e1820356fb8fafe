//! Rebuilding a location's file list from its `dump` or `search` keys.
//!
//! ```yaml
//! root: /data
//! ssh: me@cluster
//! search:
//!   - rglob: "*.h5"
//!     skip: ["tmp/"]
//!   - exec: find . -name '*.log'
//! ```
//!
//! `dump` names a manifest below the root whose file list replaces ours.
//! `search` runs each rule under the root, on the host for remote locations,
//! and keeps known metadata for paths that are still there. Skip patterns
//! are regexes anchored at the start of the relative path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Access, Location, Manifest, ManifestEntry, normalize_path};
use crate::command::{self, Tools};
use crate::error::{Result, SyncError};

/// How the file list of a location is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    /// A manifest file, relative to the root.
    Dump(PathBuf),
    Search(Vec<SearchRule>),
}

impl Listing {
    /// Every file below the root.
    pub fn all_files() -> Self {
        Listing::Search(vec![SearchRule {
            kind: SearchKind::Rglob("*".into()),
            skip: Vec::new(),
        }])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKind {
    /// Glob matched at any depth (`**/pattern`).
    Rglob(String),
    /// Glob relative to the root.
    Glob(String),
    /// Shell command run in the root; prints one path per line.
    Exec(String),
}

/// One entry of a `search` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct SearchRule {
    pub kind: SearchKind,
    pub skip: Vec<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rglob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    glob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skip: Option<OneOrMany>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<RawRule> for SearchRule {
    type Error = String;

    fn try_from(raw: RawRule) -> std::result::Result<Self, Self::Error> {
        let kind = match (raw.rglob, raw.glob, raw.exec) {
            (Some(p), None, None) => SearchKind::Rglob(p),
            (None, Some(p), None) => SearchKind::Glob(p),
            (None, None, Some(c)) => SearchKind::Exec(c),
            _ => return Err("a search rule needs exactly one of rglob, glob or exec".into()),
        };
        let skip = match raw.skip {
            None => Vec::new(),
            Some(OneOrMany::One(s)) => vec![s],
            Some(OneOrMany::Many(v)) => v,
        };
        Ok(Self { kind, skip })
    }
}

impl From<SearchRule> for RawRule {
    fn from(rule: SearchRule) -> Self {
        let (rglob, glob, exec) = match rule.kind {
            SearchKind::Rglob(p) => (Some(p), None, None),
            SearchKind::Glob(p) => (None, Some(p), None),
            SearchKind::Exec(c) => (None, None, Some(c)),
        };
        Self {
            rglob,
            glob,
            exec,
            skip: (!rule.skip.is_empty()).then_some(OneOrMany::Many(rule.skip)),
        }
    }
}

impl SearchRule {
    fn skip_patterns(&self) -> Result<Vec<Regex>> {
        self.skip
            .iter()
            .map(|s| {
                Regex::new(&format!("^(?:{s})"))
                    .map_err(|e| SyncError::manifest(format!("bad skip regex {s:?}: {e}")))
            })
            .collect()
    }

    /// Drop skipped paths from what this rule found.
    fn filter(&self, found: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        let skip = self.skip_patterns()?;
        Ok(found
            .into_iter()
            .filter(|p| {
                let text = p.to_string_lossy();
                !skip.iter().any(|r| r.is_match(&text))
            })
            .collect())
    }
}

impl Location {
    /// Re-run the `dump` or `search` listing. Without one the location is
    /// returned unchanged.
    pub fn refreshed(&self, tools: &Tools) -> Result<Location> {
        let refreshed = match &self.meta().listing {
            None => return Ok(self.clone()),
            Some(Listing::Dump(file)) => self.read_dump(file, tools)?,
            Some(Listing::Search(rules)) => {
                let kinds: Vec<&SearchKind> = rules.iter().map(|r| &r.kind).collect();
                let found = match self.access() {
                    Access::Local(local) => search_local(local.root(), &kinds)?,
                    Access::Remote(host) => {
                        crate::remote::list_files(tools, host, self.root(), &kinds)?
                    }
                };
                let mut paths = Vec::new();
                for (rule, found) in rules.iter().zip(found) {
                    paths.extend(rule.filter(found)?);
                }
                self.pruned(paths)?
            }
        };
        tracing::info!(
            location = %self.endpoint(),
            before = self.len(),
            after = refreshed.len(),
            "refreshed file list"
        );
        Ok(refreshed)
    }

    fn read_dump(&self, file: &Path, tools: &Tools) -> Result<Location> {
        let text = match self.access() {
            Access::Local(local) => {
                let path = local.join(file);
                std::fs::read_to_string(&path).map_err(|e| SyncError::io(&path, e))?
            }
            Access::Remote(host) => {
                crate::remote::read_file(tools, host, &self.endpoint().join(file))?
            }
        };
        let dump = Manifest::parse(&text).map_err(|e| e.in_file(file))?;
        self.with_entries(dump.entries())
    }

    /// Sorted `found`, reusing the metadata of entries already known.
    fn pruned(&self, mut found: Vec<PathBuf>) -> Result<Location> {
        found.sort();
        found.dedup();
        let known: HashMap<&Path, &ManifestEntry> =
            self.entries().iter().map(|e| (e.path.as_path(), e)).collect();
        let entries = found
            .into_iter()
            .map(|p| match known.get(p.as_path()) {
                Some(entry) => (*entry).clone(),
                None => ManifestEntry::new(p),
            })
            .collect();
        self.with_entries(entries)
    }
}

/// Files matched by each rule under a local root, one list per rule.
fn search_local(root: &Path, kinds: &[&SearchKind]) -> Result<Vec<Vec<PathBuf>>> {
    let base = if root.as_os_str().is_empty() {
        Path::new(".")
    } else {
        root
    };
    kinds
        .iter()
        .map(|kind| match kind {
            SearchKind::Rglob(p) => glob_files(base, &format!("**/{p}")),
            SearchKind::Glob(p) => glob_files(base, p),
            SearchKind::Exec(script) => exec_files(base, script),
        })
        .collect()
}

fn glob_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!(
        "{}/{pattern}",
        glob::Pattern::escape(&base.to_string_lossy())
    );
    let matches = glob::glob(&full)
        .map_err(|e| SyncError::manifest(format!("bad search pattern {pattern:?}: {e}")))?;
    let mut out = Vec::new();
    for entry in matches {
        let path = entry.map_err(|e| SyncError::io(e.path().to_path_buf(), e.into_error()))?;
        if path.is_file()
            && let Ok(relative) = path.strip_prefix(base)
        {
            out.push(normalize_path(relative));
        }
    }
    Ok(out)
}

fn exec_files(base: &Path, script: &str) -> Result<Vec<PathBuf>> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script).current_dir(base);
    let output = command::run(&mut cmd)?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| normalize_path(Path::new(l)))
        .collect())
}
