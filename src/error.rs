//! Error taxonomy shared by every stage of the reconciliation pipeline.
//!
//! Location, diff and plan errors stop the pipeline before anything on disk is
//! touched. Executor errors stop the remaining transfer but never undo work
//! that already completed. Nothing here is retried automatically.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Errors that can occur while loading, comparing or transferring locations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The manifest is malformed or mixes incompatible shapes.
    #[error("Invalid manifest{}: {reason}", source_suffix(.source_file))]
    ManifestFormat {
        source_file: Option<PathBuf>,
        reason: String,
    },

    /// A location mixes relative and absolute paths.
    #[error("Specify either relative or absolute paths, not both (relative: {}, absolute: {})", .relative.display(), .absolute.display())]
    PathConsistency { relative: PathBuf, absolute: PathBuf },

    /// A required external tool is not installed.
    #[error("{tool} not found on PATH")]
    BackendUnavailable { tool: String },

    /// An external tool printed a line we do not understand.
    #[error("Unrecognized {tool} output: {line:?}")]
    UnparseableOutput { tool: String, line: String },

    /// The plan would need to copy from destination back to source.
    #[error("Cannot copy from destination to source: {} file(s) only exist at the destination (first: {})", .paths.len(), first_path(.paths))]
    WrongDirection { paths: Vec<PathBuf> },

    /// A transfer would read and write the same file.
    #[error("Source and destination are the same file: {}", .path.display())]
    SameFile { path: PathBuf },

    /// Two locations sit in different parts of the dataset.
    #[error("Locations are not in the same tree (prefix {:?} and {:?})", .a, .b)]
    PrefixMismatch { a: PathBuf, b: PathBuf },

    /// An operation that works on raw paths was given a prefixed manifest.
    #[error("{operation} does not support manifests with a prefix ({})", .prefix.display())]
    PrefixUnsupported { operation: String, prefix: PathBuf },

    /// The user declined the confirmation prompt.
    #[error("Cancelled")]
    Cancelled,

    /// An external command exited with a non-zero status.
    #[error("Command failed ({}): {command}{}", status_label(.status), stderr_suffix(.stderr))]
    Subprocess {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// A manifested file disappeared before its metadata was computed.
    #[error("File not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// The configuration file could not be read or parsed.
    #[error("Invalid configuration {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    /// An operation was asked to act on an endpoint it cannot reach.
    #[error("{operation} does not support remote location {endpoint}")]
    UnsupportedEndpoint { operation: String, endpoint: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Build a [`SyncError::ManifestFormat`] without a file context.
    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::ManifestFormat {
            source_file: None,
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the manifest file to a format error that has none yet.
    pub fn in_file(self, file: impl Into<PathBuf>) -> Self {
        match self {
            Self::ManifestFormat {
                source_file: None,
                reason,
            } => Self::ManifestFormat {
                source_file: Some(file.into()),
                reason,
            },
            other => other,
        }
    }
}

fn source_suffix(file: &Option<PathBuf>) -> String {
    file.as_ref()
        .map(|f| format!(" {}", f.display()))
        .unwrap_or_default()
}

fn first_path(paths: &[PathBuf]) -> String {
    paths
        .first()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn status_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprocess_display() {
        let err = SyncError::Subprocess {
            command: "rsync -a src dest".into(),
            status: Some(23),
            stderr: "some files vanished".into(),
        };
        assert_eq!(
            err.to_string(),
            "Command failed (exit status 23): rsync -a src dest: some files vanished"
        );
    }

    #[test]
    fn test_subprocess_display_signal() {
        let err = SyncError::Subprocess {
            command: "scp a b".into(),
            status: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "Command failed (terminated by signal): scp a b");
    }

    #[test]
    fn test_in_file_attaches_once() {
        let err = SyncError::manifest("duplicate path a.txt").in_file("dump.yaml");
        assert_eq!(
            err.to_string(),
            "Invalid manifest dump.yaml: duplicate path a.txt"
        );
        let err = err.in_file("other.yaml");
        assert!(err.to_string().contains("dump.yaml"));
    }

    #[test]
    fn test_wrong_direction_display() {
        let err = SyncError::WrongDirection {
            paths: vec![PathBuf::from("b.txt"), PathBuf::from("c.txt")],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 file(s)"));
        assert!(msg.contains("b.txt"));
    }
}
