//! Batched transfer: the whole plan in one `rsync -a --files-from` call.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Executor, Progress, TransferReport};
use crate::command::{self, Tools};
use crate::diff::rsync::{dir_arg, require_one_local, write_file_list};
use crate::error::{Result, SyncError};
use crate::plan::CopyPlan;

/// `xfr#12, to-chk=3/20)` in `--progress` output; the number counts files
/// transferred so far.
static TRANSFERRED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:xfr|xfer)#(\d+)").expect("rsync progress regex"));

#[derive(Debug, Clone)]
pub struct RsyncExecutor {
    tools: Tools,
    progress: bool,
}

impl RsyncExecutor {
    pub fn new(tools: Tools) -> Self {
        Self {
            tools,
            progress: false,
        }
    }

    /// Run with `-P` and report progress from its output.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn command(&self, plan: &CopyPlan, files_from: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.tools.rsync);
        cmd.arg("-a");
        if self.progress {
            cmd.arg("-P");
        }
        if plan.source().is_remote() || plan.dest().is_remote() {
            cmd.arg("-e").arg(self.tools.rsync_shell());
        }
        cmd.arg(format!("--files-from={}", files_from.display()))
            .arg(dir_arg(plan.source()))
            .arg(dir_arg(plan.dest()));
        cmd
    }
}

/// Number of files rsync reports as transferred on this line, if any.
pub fn parse_transferred(line: &str) -> Option<usize> {
    TRANSFERRED_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Report progress from rsync's `-P` output until it closes.
fn follow_progress(
    stdout: impl Read,
    total: usize,
    progress: &mut dyn FnMut(Progress<'_>),
) -> std::io::Result<()> {
    let mut last = 0;
    for line in BufReader::new(stdout).split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        if let Some(done) = parse_transferred(&line)
            && done > last
        {
            last = done;
            progress(Progress {
                done: done.min(total),
                total,
                path: None,
            });
        }
    }
    Ok(())
}

impl Executor for RsyncExecutor {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn execute(
        &self,
        plan: &CopyPlan,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<TransferReport> {
        self.tools.require(&self.tools.rsync)?;
        require_one_local(plan.source(), plan.dest())?;
        let transfers: Vec<_> = plan.transfers().collect();
        if let Some(entry) = transfers.iter().find(|e| e.path.is_absolute()) {
            return Err(SyncError::manifest(format!(
                "rsync needs relative paths, got {}",
                entry.path.display()
            )));
        }
        let total = transfers.len();

        // removed on drop, whichever way this function returns
        let list = write_file_list(transfers.iter().map(|e| e.path.as_path()))?;
        let mut cmd = self.command(plan, list.path());
        tracing::debug!(command = %command::render(&cmd), files = total, "starting rsync");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| command::spawn_error(&cmd, e))?;

        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        let read = match child.stdout.take() {
            Some(stdout) => follow_progress(stdout, total, progress),
            None => Ok(()),
        };
        if read.is_err() {
            let _ = child.kill();
        }
        // reap the child and the stderr reader before reporting anything
        let status = child
            .wait()
            .map_err(|e| SyncError::io(&self.tools.rsync, e))?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        read.map_err(|e| SyncError::io(&self.tools.rsync, e))?;
        drop(list);

        if !status.success() {
            let err = command::subprocess_error(&cmd, status.code(), &stderr);
            tracing::warn!(error = %err, files = total, "rsync transfer aborted");
            return Err(err);
        }
        Ok(TransferReport {
            executor: self.name(),
            transferred: transfers.iter().map(|e| e.path.clone()).collect(),
            skipped: plan.skips().count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transferred() {
        assert_eq!(
            parse_transferred("          1,234 100%    1.18MB/s    0:00:00 (xfr#3, to-chk=7/10)"),
            Some(3)
        );
        assert_eq!(
            parse_transferred("  5 100% 0.00kB/s 0:00:00 (xfer#12, to-check=0/12)"),
            Some(12)
        );
        assert_eq!(parse_transferred("sub/file.txt"), None);
    }

    #[test]
    fn test_follow_progress_stops_on_read_error() {
        struct Broken(&'static [u8]);
        impl Read for Broken {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() {
                    return Err(std::io::Error::other("pipe closed"));
                }
                let n = self.0.len().min(buf.len());
                buf[..n].copy_from_slice(&self.0[..n]);
                self.0 = &self.0[n..];
                Ok(n)
            }
        }
        let mut seen = Vec::new();
        let err = follow_progress(
            Broken(b"a (xfr#1, to-chk=1/2)\nb (xfr#2, to-chk=0/2)\n"),
            2,
            &mut |p| seen.push(p.done),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "pipe closed");
        assert_eq!(seen, [1, 2]);

        let mut seen = Vec::new();
        follow_progress(&b"x (xfr#5, to-chk=0/1)\n"[..], 1, &mut |p| seen.push(p.done)).unwrap();
        assert_eq!(seen, [1]);
    }
}
