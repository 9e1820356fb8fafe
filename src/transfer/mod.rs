//! Executing a [`CopyPlan`].
//!
//! Executors only act on the plan's create and overwrite entries and never
//! look at the filesystem for more work. They run sequentially and stop at
//! the first failure; whatever completed before stays in place.
//!
//! - [`LocalExecutor`]: `std::fs` copy or move, both endpoints local.
//! - [`RsyncExecutor`]: one `rsync -a --files-from` call for the whole plan.
//! - [`ScpExecutor`]: one `scp -p` call per file.

pub mod local;
pub mod rsync;
pub mod scp;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::command::Tools;
use crate::diff::DiffMethod;
use crate::error::{Result, SyncError};
use crate::location::Location;
use crate::plan::CopyPlan;

pub use local::LocalExecutor;
pub use rsync::RsyncExecutor;
pub use scp::ScpExecutor;

/// Copy leaves the source in place, move removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Copy,
    Move,
}

/// Progress tick: `done` of `total` transfers finished.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub done: usize,
    pub total: usize,
    /// The file just finished, when the executor knows it.
    pub path: Option<&'a Path>,
}

/// What an executor did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub executor: &'static str,
    /// Paths (relative to the roots) that were transferred, in plan order.
    pub transferred: Vec<PathBuf>,
    /// Plan entries that were skipped as equal.
    pub skipped: usize,
}

pub trait Executor {
    fn name(&self) -> &'static str;

    /// Apply `plan`, calling `progress` as transfers complete.
    fn execute(&self, plan: &CopyPlan, progress: &mut dyn FnMut(Progress<'_>))
    -> Result<TransferReport>;
}

/// Run `plan` through `executor` unless it is a dry run or a no-op.
pub fn run_plan(
    executor: &dyn Executor,
    plan: &CopyPlan,
    progress: &mut dyn FnMut(Progress<'_>),
) -> Result<TransferReport> {
    if plan.policy().dry_run || plan.is_noop() {
        return Ok(TransferReport {
            executor: executor.name(),
            transferred: Vec::new(),
            skipped: plan.skips().count(),
        });
    }
    let report = executor.execute(plan, progress)?;
    tracing::info!(
        executor = report.executor,
        transferred = report.transferred.len(),
        skipped = report.skipped,
        source = %plan.source(),
        dest = %plan.dest(),
        "transfer complete"
    );
    Ok(report)
}

/// Pick the executor matching how the plan was compared.
///
/// Plans compared with rsync are executed with rsync. Otherwise local to
/// local uses the filesystem, and anything remote prefers rsync and falls
/// back to scp when rsync is not installed.
pub fn executor_for(
    plan: &CopyPlan,
    tools: &Tools,
    operation: Operation,
    show_progress: bool,
) -> Result<Box<dyn Executor>> {
    let remote = plan.source().is_remote() || plan.dest().is_remote();
    if operation == Operation::Move {
        if remote {
            let endpoint = if plan.source().is_remote() {
                plan.source()
            } else {
                plan.dest()
            };
            return Err(SyncError::UnsupportedEndpoint {
                operation: "move".into(),
                endpoint: endpoint.to_string(),
            });
        }
        return Ok(Box::new(LocalExecutor::new(Operation::Move)));
    }
    let rsync = || -> Box<dyn Executor> {
        Box::new(RsyncExecutor::new(tools.clone()).progress(show_progress))
    };
    Ok(match (plan.policy().method, remote) {
        (DiffMethod::Rsync, _) => rsync(),
        (_, false) => Box::new(LocalExecutor::new(Operation::Copy)),
        (_, true) if tools.has(&tools.rsync) => rsync(),
        (_, true) => Box::new(ScpExecutor::new(tools.clone())),
    })
}

/// Delete every file of `location`, locally or with one `ssh rm` per file.
pub fn remove(
    location: &Location,
    tools: &Tools,
    progress: &mut dyn FnMut(Progress<'_>),
) -> Result<TransferReport> {
    match location.host() {
        Some(host) => scp::remove_remote(location, host, tools, progress),
        None => local::remove_local(location, progress),
    }
}

/// Parent directories of `paths`, keeping only the deepest ones: `a/b` makes
/// `a` redundant.
pub fn deepest_parents<'a, I>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = &'a Path>,
{
    let parents: BTreeSet<PathBuf> = paths
        .into_iter()
        .filter_map(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();
    let parents: Vec<PathBuf> = parents.into_iter().collect();
    parents
        .iter()
        .enumerate()
        .filter(|&(i, dir)| {
            // descendants sort right after their ancestor
            parents
                .get(i + 1)
                .is_none_or(|next| !next.starts_with(dir))
        })
        .map(|(_, dir)| dir.clone())
        .collect()
}
