//! Running the external tools (rsync, scp, ssh).
//!
//! Every invocation goes through [`run`] or [`run_with_input`] so failures
//! surface the same way: a missing binary is
//! [`SyncError::BackendUnavailable`], a non-zero exit is
//! [`SyncError::Subprocess`] carrying the shell-quoted command line.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use crate::error::{Result, SyncError};

/// Default ssh connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Names (or paths) of the external binaries plus the ssh options shared by
/// every remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub rsync: String,
    pub scp: String,
    pub ssh: String,
    pub ssh_options: Vec<String>,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            rsync: "rsync".into(),
            scp: "scp".into(),
            ssh: "ssh".into(),
            ssh_options: ssh_options(DEFAULT_CONNECT_TIMEOUT, true),
        }
    }
}

/// `-o` options for ssh/scp.
pub fn ssh_options(connect_timeout: u64, batch_mode: bool) -> Vec<String> {
    let mut opts = Vec::new();
    if batch_mode {
        opts.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
    }
    opts.extend([
        "-o".to_string(),
        format!("ConnectTimeout={connect_timeout}"),
    ]);
    opts
}

impl Tools {
    /// Resolve a tool on PATH, or fail with [`SyncError::BackendUnavailable`].
    pub fn require(&self, tool: &str) -> Result<PathBuf> {
        which::which(tool).map_err(|_| SyncError::BackendUnavailable {
            tool: tool.to_string(),
        })
    }

    pub fn has(&self, tool: &str) -> bool {
        self.require(tool).is_ok()
    }

    /// `ssh <options> <host> <remote command>`; the remote command is quoted
    /// for the remote shell.
    pub fn ssh_command(&self, host: &str, remote: &[&str]) -> Command {
        let mut cmd = Command::new(&self.ssh);
        cmd.args(&self.ssh_options).arg(host);
        if !remote.is_empty() {
            cmd.arg(shell_words::join(remote));
        }
        cmd
    }

    /// The `-e` argument for rsync so it uses the same ssh binary and options.
    pub fn rsync_shell(&self) -> String {
        let mut parts = vec![self.ssh.as_str()];
        parts.extend(self.ssh_options.iter().map(String::as_str));
        shell_words::join(parts)
    }
}

/// Human readable, shell-quoted command line.
pub fn render(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let args = cmd.get_args().map(|a| a.to_string_lossy().into_owned());
    shell_words::join(std::iter::once(program).chain(args))
}

/// Run to completion and fail on a non-zero exit.
pub fn run(cmd: &mut Command) -> Result<Output> {
    let output = capture(cmd, None)?;
    check_status(cmd, output)
}

/// Like [`run`], writing `input` to the child's stdin first.
pub fn run_with_input(cmd: &mut Command, input: &str) -> Result<Output> {
    let output = capture(cmd, Some(input))?;
    check_status(cmd, output)
}

/// Run to completion and return the output whatever the exit status.
pub fn capture(cmd: &mut Command, input: Option<&str>) -> Result<Output> {
    let line = render(cmd);
    tracing::debug!(command = %line, "running");
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    if input.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    let mut child = cmd.spawn().map_err(|e| spawn_error(cmd, e))?;
    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin
            .write_all(input.as_bytes())
            .map_err(|e| SyncError::io(PathBuf::from(cmd.get_program()), e))?;
    }
    child
        .wait_with_output()
        .map_err(|e| SyncError::io(PathBuf::from(cmd.get_program()), e))
}

/// Turn a finished process into an error when it failed.
pub fn check_status(cmd: &Command, output: Output) -> Result<Output> {
    if output.status.success() {
        return Ok(output);
    }
    let err = subprocess_error(cmd, output.status.code(), &output.stderr);
    tracing::warn!(error = %err, "command failed");
    Err(err)
}

pub(crate) fn subprocess_error(cmd: &Command, status: Option<i32>, stderr: &[u8]) -> SyncError {
    SyncError::Subprocess {
        command: render(cmd),
        status,
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

pub(crate) fn spawn_error(cmd: &Command, err: std::io::Error) -> SyncError {
    if err.kind() == std::io::ErrorKind::NotFound {
        SyncError::BackendUnavailable {
            tool: cmd.get_program().to_string_lossy().into_owned(),
        }
    } else {
        SyncError::io(PathBuf::from(cmd.get_program()), err)
    }
}
