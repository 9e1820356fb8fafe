//! Comparison by an rsync dry run.
//!
//! One `rsync -n --itemize-changes --files-from=<list> A B` over the paths
//! of A. Paths rsync stays silent about are equal, itemized files are
//! changed or new. Files that exist only at B are never listed, so
//! `only_in_b` is always empty and [`DiffResult::dest_only_observed`] is
//! `false`; run the backend again with swapped arguments to see them.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;

use super::itemize::{self, Change};
use super::matching::SortedIndex;
use super::{Category, DiffBackend, DiffMethod, DiffResult};
use crate::command::{self, Tools};
use crate::error::{Result, SyncError};
use crate::location::{Endpoint, Location};

#[derive(Debug, Clone)]
pub struct RsyncDiff {
    tools: Tools,
    checksum: bool,
}

impl RsyncDiff {
    pub fn new(tools: Tools) -> Self {
        Self {
            tools,
            checksum: false,
        }
    }

    /// Compare by full checksum (`--checksum`) instead of size and mtime.
    pub fn checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    fn command(&self, files_from: &Path, a: &Endpoint, b: &Endpoint) -> Command {
        let mut cmd = Command::new(&self.tools.rsync);
        cmd.arg(if self.checksum { "-naic" } else { "-nai" });
        if a.is_remote() || b.is_remote() {
            cmd.arg("-e").arg(self.tools.rsync_shell());
        }
        cmd.arg(format!("--files-from={}", files_from.display()))
            .arg(dir_arg(a))
            .arg(dir_arg(b));
        cmd
    }
}

/// Endpoint as an rsync directory argument (trailing slash).
pub(crate) fn dir_arg(endpoint: &Endpoint) -> String {
    let mut arg = endpoint.hostpath();
    if !arg.ends_with('/') {
        arg.push('/');
    }
    arg
}

/// Newline-separated list of relative paths for `--files-from`. The file is
/// removed when the handle drops.
pub(crate) fn write_file_list<'a, I>(paths: I) -> Result<NamedTempFile>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut file = tempfile::Builder::new()
        .prefix("locsync-files-")
        .suffix(".txt")
        .tempfile()
        .map_err(|e| SyncError::io(std::env::temp_dir(), e))?;
    for path in paths {
        let line = path.to_string_lossy();
        if line.contains('\n') {
            return Err(SyncError::manifest(format!(
                "path {line:?} cannot be passed to rsync"
            )));
        }
        writeln!(file, "{line}").map_err(|e| SyncError::io(file.path(), e))?;
    }
    file.flush().map_err(|e| SyncError::io(file.path(), e))?;
    Ok(file)
}

/// Paths handed to rsync must be relative to the roots.
pub(crate) fn require_relative(location: &Location) -> Result<()> {
    if location.is_absolute() {
        return Err(SyncError::manifest(format!(
            "rsync needs paths relative to {}",
            location.endpoint()
        )));
    }
    Ok(())
}

/// rsync cannot copy between two remote hosts.
pub(crate) fn require_one_local(a: &Endpoint, b: &Endpoint) -> Result<()> {
    if a.is_remote() && b.is_remote() {
        return Err(SyncError::UnsupportedEndpoint {
            operation: "rsync".into(),
            endpoint: format!("{a} -> {b}"),
        });
    }
    Ok(())
}

impl DiffBackend for RsyncDiff {
    fn method(&self) -> DiffMethod {
        DiffMethod::Rsync
    }

    fn diff(&self, a: &Location, b: &Location) -> Result<DiffResult> {
        let mut out = DiffResult::builder(DiffMethod::Rsync);
        out.dest_only_observed(false);
        if a.is_empty() {
            return Ok(out.finish());
        }
        self.tools.require(&self.tools.rsync)?;
        require_relative(a)?;
        require_one_local(a.endpoint(), b.endpoint())?;

        let list = write_file_list(a.files())?;
        let mut cmd = self.command(list.path(), a.endpoint(), b.endpoint());
        let output = command::run(&mut cmd)?;
        drop(list);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let index = SortedIndex::new(a.entries());
        let mut verdict: Vec<(PathBuf, Change)> = Vec::new();
        for item in itemize::parse_output(&stdout)? {
            let Some(change) = item.file_change() else {
                continue;
            };
            if !index.contains(&item.path) {
                tracing::warn!(path = %item.path.display(), "rsync itemized a path outside the file list");
                continue;
            }
            verdict.push((item.path, change));
        }
        verdict.sort_by(|x, y| x.0.cmp(&y.0));

        for entry in a.entries() {
            let change = verdict
                .binary_search_by(|(p, _)| p.as_path().cmp(&entry.path))
                .map(|i| verdict[i].1)
                .unwrap_or(Change::Unchanged);
            let category = match change {
                Change::Unchanged => Category::Equal,
                Change::Updated => Category::Changed,
                Change::Created => Category::OnlyInA,
            };
            out.push(category, entry.path.clone());
        }

        let result = out.finish();
        tracing::info!(
            source = %a.endpoint(),
            dest = %b.endpoint(),
            equal = result.equal().len(),
            changed = result.changed().len(),
            create = result.only_in_a().len(),
            "rsync dry run"
        );
        Ok(result)
    }
}
