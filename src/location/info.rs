//! Content hash, size and mtime of manifested files.
//!
//! Local files are hashed in-process with SHA-256. Remote locations delegate
//! to [`crate::remote::compute_info`], which does the same work on the host in
//! a single ssh round-trip.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use super::{Access, Location, ManifestEntry};
use crate::command::Tools;
use crate::error::{Result, SyncError};

const READ_BUFFER: usize = 128 * 1024;

/// Metadata computed from a file's current content.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub sha256: String,
    pub size: u64,
    pub mtime: f64,
}

/// Outcome of [`Location::with_computed_info`].
///
/// Files that vanished are not fatal: they keep their "unknown" checksum and
/// are listed in `failures` as [`SyncError::NotFound`].
#[derive(Debug)]
pub struct ComputedInfo {
    pub location: Location,
    pub failures: Vec<SyncError>,
}

impl ComputedInfo {
    /// Paths that could not be read.
    pub fn missing(&self) -> Vec<&Path> {
        self.failures
            .iter()
            .filter_map(|e| match e {
                SyncError::NotFound { path } => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }
}

/// Size and mtime (seconds since the epoch) of a file.
pub fn file_stat(path: &Path) -> Result<(u64, f64)> {
    let meta = std::fs::metadata(path).map_err(|e| not_found_or_io(path, e))?;
    if !meta.is_file() {
        return Err(SyncError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok((meta.len(), mtime))
}

/// SHA-256 (lowercase hex), size and mtime of a local file.
pub fn file_info(path: &Path) -> Result<FileInfo> {
    let (size, mtime) = file_stat(path)?;
    let mut file = File::open(path).map_err(|e| not_found_or_io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = file.read(&mut buf).map_err(|e| SyncError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(FileInfo {
        sha256: hex::encode(hasher.finalize()),
        size,
        mtime,
    })
}

fn not_found_or_io(path: &Path, err: std::io::Error) -> SyncError {
    if err.kind() == ErrorKind::NotFound {
        SyncError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        SyncError::io(path, err)
    }
}

impl Location {
    /// Compute checksum, size and mtime for every entry that lacks a checksum.
    pub fn with_computed_info(&self, tools: &Tools) -> Result<ComputedInfo> {
        self.with_computed_info_limited(tools, None)
    }

    /// Like [`Location::with_computed_info`], but stop once the hashed bytes
    /// exceed `max_bytes`. Smallest files go first; at least one file is
    /// always hashed so repeated calls make progress.
    pub fn with_computed_info_limited(
        &self,
        tools: &Tools,
        max_bytes: Option<u64>,
    ) -> Result<ComputedInfo> {
        let mut pending: Vec<usize> = (0..self.len())
            .filter(|&i| !self.entries()[i].has_info())
            .collect();
        if pending.is_empty() {
            return Ok(ComputedInfo {
                location: self.clone(),
                failures: Vec::new(),
            });
        }

        if let Some(limit) = max_bytes {
            pending.sort_by_key(|&i| (self.entries()[i].size.unwrap_or(0), i));
            let mut total = 0u64;
            let mut keep = 0;
            for &i in &pending {
                total = total.saturating_add(self.entries()[i].size.unwrap_or(0));
                if total > limit && keep > 0 {
                    break;
                }
                keep += 1;
            }
            pending.truncate(keep);
        }

        let paths: Vec<PathBuf> = pending
            .iter()
            .map(|&i| self.entries()[i].path.clone())
            .collect();
        let infos = self.read_info(&paths, tools)?;

        let mut entries = self.entries().to_vec();
        let mut failures = Vec::new();
        for (&i, info) in pending.iter().zip(infos) {
            match info {
                Some(info) => entries[i] = entries[i].with_info(&info),
                None => {
                    let path = self.endpoint().join(&entries[i].path);
                    tracing::warn!(path = %path.display(), "file vanished before hashing");
                    entries[i] = entries[i].without_info();
                    failures.push(SyncError::NotFound { path });
                }
            }
        }

        tracing::info!(
            location = %self.endpoint(),
            hashed = paths.len() - failures.len(),
            missing = failures.len(),
            "computed file info"
        );
        Ok(ComputedInfo {
            location: self.with_entries(entries)?,
            failures,
        })
    }

    /// Drop checksums of entries whose size or mtime changed on disk and drop
    /// entries whose file is gone. Entries without a recorded size/mtime keep
    /// whatever they have.
    pub fn check_changes(&self) -> Result<Location> {
        if self.endpoint().is_remote() {
            return Err(SyncError::UnsupportedEndpoint {
                operation: "check_changes".into(),
                endpoint: self.endpoint().to_string(),
            });
        }
        let mut entries = Vec::with_capacity(self.len());
        for entry in self.entries() {
            let path = self.endpoint().join(&entry.path);
            match file_stat(&path) {
                Ok((size, mtime)) => {
                    let changed = entry.size.is_some_and(|s| s != size)
                        || entry.mtime.is_some_and(|m| m != mtime);
                    if changed {
                        tracing::debug!(path = %entry.path.display(), "stale checksum dropped");
                        entries.push(ManifestEntry {
                            size: Some(size),
                            mtime: Some(mtime),
                            ..entry.without_info()
                        });
                    } else {
                        entries.push(entry.clone());
                    }
                }
                Err(SyncError::NotFound { .. }) => {
                    tracing::debug!(path = %entry.path.display(), "dropping vanished file");
                }
                Err(e) => return Err(e),
            }
        }
        self.with_entries(entries)
    }

    fn read_info(&self, paths: &[PathBuf], tools: &Tools) -> Result<Vec<Option<FileInfo>>> {
        let local = match self.access() {
            Access::Local(local) => local,
            Access::Remote(host) => {
                return crate::remote::compute_info(tools, host, self.root(), paths);
            }
        };
        paths
            .iter()
            .map(|p| match file_info(&local.join(p)) {
                Ok(info) => Ok(Some(info)),
                Err(SyncError::NotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            })
            .collect()
    }
}
