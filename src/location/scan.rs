//! Building locations from what is actually on disk.
//!
//! [`Location::scan`] walks a local root. [`Location::probe`] keeps only the
//! candidate paths that exist at an endpoint, which is how a plain
//! destination directory becomes a location to diff against.

use std::path::{Path, PathBuf};

use glob::Pattern;
use regex::Regex;
use walkdir::WalkDir;

use super::{Endpoint, Location};
use crate::command::Tools;
use crate::error::{Result, SyncError};

/// Filters applied by [`Location::scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Keep only paths matching at least one pattern (all paths when empty).
    pub patterns: Vec<Pattern>,
    /// Drop paths matching any of these (matched against the relative path).
    pub skip: Vec<Regex>,
    /// Follow symbolic links while walking.
    pub follow_links: bool,
}

impl ScanOptions {
    /// Compile glob patterns and skip regexes given as strings.
    pub fn parse(patterns: &[String], skip: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| SyncError::manifest(format!("bad pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let skip = skip
            .iter()
            .map(|s| {
                Regex::new(s).map_err(|e| SyncError::manifest(format!("bad regex {s:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            skip,
            follow_links: false,
        })
    }

    fn keeps(&self, relative: &Path) -> bool {
        let text = relative.to_string_lossy();
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        let matched = self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|p| p.matches_path(relative) || p.matches(&name));
        matched && !self.skip.iter().any(|r| r.is_match(&text))
    }
}

impl Location {
    /// Walk a local directory and list its regular files (sorted, relative).
    pub fn scan(root: &Path, options: &ScanOptions) -> Result<Location> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(root).follow_links(options.follow_links) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                match e.into_io_error() {
                    Some(io) => SyncError::io(path, io),
                    None => SyncError::manifest(format!("filesystem loop at {}", path.display())),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if options.keeps(relative) {
                paths.push(relative.to_path_buf());
            }
        }
        paths.sort();
        tracing::debug!(root = %root.display(), files = paths.len(), "scanned directory");
        Location::from_paths(Endpoint::local(root), paths)
    }

    /// Restrict `candidates` to those that exist as files at `endpoint`.
    ///
    /// Remote endpoints cost one ssh round-trip per candidate.
    pub fn probe<I, P>(endpoint: Endpoint, candidates: I, tools: &Tools) -> Result<Location>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut present = Vec::new();
        for candidate in candidates {
            let candidate = candidate.as_ref();
            let full = endpoint.join(candidate);
            let exists = match endpoint.host() {
                Some(host) => crate::remote::file_exists(tools, host, &full)?,
                None => full.is_file(),
            };
            if exists {
                present.push(candidate.to_path_buf());
            }
        }
        Location::from_paths(endpoint, present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub/deep")).unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join("b.h5"), "b").unwrap();
        fs::write(tmp.path().join("sub/c.txt"), "c").unwrap();
        fs::write(tmp.path().join("sub/deep/d.h5"), "d").unwrap();
        tmp
    }

    #[test]
    fn test_scan_all() {
        let tmp = tree();
        let loc = Location::scan(tmp.path(), &ScanOptions::default()).unwrap();
        assert_eq!(
            loc.files(),
            vec![
                Path::new("a.txt"),
                Path::new("b.h5"),
                Path::new("sub/c.txt"),
                Path::new("sub/deep/d.h5"),
            ]
        );
    }

    #[test]
    fn test_scan_patterns_and_skip() {
        let tmp = tree();
        let opts = ScanOptions::parse(&["*.h5".into()], &["^sub/deep".into()]).unwrap();
        let loc = Location::scan(tmp.path(), &opts).unwrap();
        assert_eq!(loc.files(), vec![Path::new("b.h5")]);
    }

    #[test]
    fn test_scan_bad_regex() {
        assert!(ScanOptions::parse(&[], &["(".into()]).is_err());
    }

    #[test]
    fn test_existing_files_local() {
        let tmp = tree();
        let loc = Location::probe(
            Endpoint::local(tmp.path()),
            ["a.txt", "missing.txt", "sub"],
            &Tools::default(),
        )
        .unwrap();
        assert_eq!(loc.files(), vec![Path::new("a.txt")]);
    }
}
