//! Per-file remote operations: `scp -p` copies and `ssh rm` removals.
//!
//! One subprocess per file. The first failure stops the loop; files done
//! before it stay done.

use std::process::Command;

use super::{Executor, Progress, TransferReport, deepest_parents};
use crate::command::{self, Tools};
use crate::error::{Result, SyncError};
use crate::location::Location;
use crate::plan::CopyPlan;
use crate::remote;

#[derive(Debug, Clone)]
pub struct ScpExecutor {
    tools: Tools,
}

impl ScpExecutor {
    pub fn new(tools: Tools) -> Self {
        Self { tools }
    }

    fn command(&self, source: &str, dest: &str) -> Command {
        let mut cmd = Command::new(&self.tools.scp);
        cmd.arg("-p")
            .args(&self.tools.ssh_options)
            .arg(source)
            .arg(dest);
        cmd
    }
}

impl Executor for ScpExecutor {
    fn name(&self) -> &'static str {
        "scp"
    }

    fn execute(
        &self,
        plan: &CopyPlan,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<TransferReport> {
        self.tools.require(&self.tools.scp)?;
        let transfers: Vec<_> = plan.transfers().collect();
        let total = transfers.len();

        let dirs = deepest_parents(transfers.iter().map(|e| e.dest.as_path()));
        match plan.dest().host() {
            Some(host) => remote::make_dirs(&self.tools, host, &dirs)?,
            None => {
                for dir in &dirs {
                    std::fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))?;
                }
            }
        }

        let mut report = TransferReport {
            executor: self.name(),
            transferred: Vec::with_capacity(total),
            skipped: plan.skips().count(),
        };
        for (i, entry) in transfers.into_iter().enumerate() {
            let mut cmd = self.command(
                &plan.source().qualified(&entry.path),
                &plan.dest().qualified(&entry.path),
            );
            if let Err(e) = command::run(&mut cmd) {
                tracing::warn!(
                    path = %entry.path.display(),
                    completed = i,
                    total,
                    "scp transfer aborted"
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

/// Delete every file of a remote location with one `ssh rm -f` per file.
pub(crate) fn remove_remote(
    location: &Location,
    host: &str,
    tools: &Tools,
    progress: &mut dyn FnMut(Progress<'_>),
) -> Result<TransferReport> {
    tools.require(&tools.ssh)?;
    let total = location.len();
    let mut report = TransferReport {
        executor: "ssh",
        ..TransferReport::default()
    };
    for (i, entry) in location.entries().iter().enumerate() {
        let path = location.endpoint().join(&entry.path);
        if let Err(e) = remote::remove_file(tools, host, &path) {
            tracing::warn!(host, path = %path.display(), completed = i, total, "remote removal aborted");
            return Err(e);
        }
        report.transferred.push(entry.path.clone());
        progress(Progress {
            done: i + 1,
            total,
            path: Some(&entry.path),
        });
    }
    tracing::info!(root = %location.endpoint(), removed = total, "removed remote files");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scp_command() {
        let exec = ScpExecutor::new(Tools {
            ssh_options: vec!["-o".into(), "ConnectTimeout=3".into()],
            ..Tools::default()
        });
        let cmd = exec.command("src/a b.txt", "host:/dest/a b.txt");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["-p", "-o", "ConnectTimeout=3", "src/a b.txt", "host:/dest/a b.txt"]
        );
    }
}
