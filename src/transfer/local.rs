//! Filesystem executor for plans between two local roots.
//!
//! Parent directories are created up front, deduplicated across the plan.
//! Single-file operations are not atomic: a copy interrupted halfway leaves a
//! partial destination file behind.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;

use super::{Executor, Operation, Progress, TransferReport, deepest_parents};
use crate::error::{Result, SyncError};
use crate::location::{Endpoint, Location};
use crate::plan::CopyPlan;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor {
    operation: Operation,
}

impl LocalExecutor {
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }
}

fn require_local(operation: &str, endpoint: &Endpoint) -> Result<()> {
    if endpoint.is_remote() {
        return Err(SyncError::UnsupportedEndpoint {
            operation: operation.into(),
            endpoint: endpoint.to_string(),
        });
    }
    Ok(())
}

/// Copy content and mtime.
fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    fs::copy(source, dest).map_err(|e| SyncError::io(source, e))?;
    let modified = fs::metadata(source)
        .and_then(|m| m.modified())
        .map_err(|e| SyncError::io(source, e))?;
    File::options()
        .write(true)
        .open(dest)
        .and_then(|f| f.set_modified(modified))
        .map_err(|e| SyncError::io(dest, e))
}

fn move_file(source: &Path, dest: &Path) -> Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            copy_file(source, dest)?;
            fs::remove_file(source).map_err(|e| SyncError::io(source, e))
        }
        Err(e) => Err(SyncError::io(source, e)),
    }
}

impl Executor for LocalExecutor {
    fn name(&self) -> &'static str {
        "local"
    }

    fn execute(
        &self,
        plan: &CopyPlan,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<TransferReport> {
        let operation = match self.operation {
            Operation::Copy => "local copy",
            Operation::Move => "local move",
        };
        require_local(operation, plan.source())?;
        require_local(operation, plan.dest())?;

        let transfers: Vec<_> = plan.transfers().collect();
        for dir in deepest_parents(transfers.iter().map(|e| e.dest.as_path())) {
            fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;
        }

        let total = transfers.len();
        let mut report = TransferReport {
            executor: self.name(),
            transferred: Vec::with_capacity(total),
            skipped: plan.skips().count(),
        };
        for (i, entry) in transfers.into_iter().enumerate() {
            let result = match self.operation {
                Operation::Copy => copy_file(&entry.source, &entry.dest),
                Operation::Move => move_file(&entry.source, &entry.dest),
            };
            if let Err(e) = result {
                tracing::warn!(
                    path = %entry.path.display(),
                    completed = i,
                    total,
                    error = %e,
                    "local transfer aborted"
                );
                return Err(e);
            }
            report.transferred.push(entry.path.clone());
            progress(Progress {
                done: i + 1,
                total,
                path: Some(&entry.path),
            });
        }
        Ok(report)
    }
}

/// Delete every file of a local location, stopping at the first failure.
pub(crate) fn remove_local(
    location: &Location,
    progress: &mut dyn FnMut(Progress<'_>),
) -> Result<TransferReport> {
    let total = location.len();
    let mut report = TransferReport {
        executor: "local",
        ..TransferReport::default()
    };
    for (i, entry) in location.entries().iter().enumerate() {
        let path = location.endpoint().join(&entry.path);
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                SyncError::NotFound { path: path.clone() }
            } else {
                SyncError::io(&path, e)
            }
        })?;
        report.transferred.push(entry.path.clone());
        progress(Progress {
            done: i + 1,
            total,
            path: Some(&entry.path),
        });
    }
    tracing::info!(root = %location.endpoint(), removed = total, "removed files");
    Ok(report)
}
