//! Parser for rsync `--itemize-changes` lines.
//!
//! A line is `YXcstpoguax <path>`:
//!
//! | column | values |
//! |---|---|
//! | `Y` update type | `<` sent, `>` received, `c` local change/create, `h` hard link, `.` no update, `*` message follows |
//! | `X` file type | `f` file, `d` directory, `L` symlink, `D` device, `S` special |
//! | rest | attribute flags; all `+` for a newly created item |
//!
//! A `*` update type is followed by a message instead of flags
//! (`*deleting   old.txt`). Unknown update or file types are errors so a
//! changed file can never be mistaken for an unchanged one.

use std::path::PathBuf;

use crate::error::{Result, SyncError};

const TOOL: &str = "rsync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    Sent,
    Received,
    Local,
    HardLink,
    NoUpdate,
    Message,
}

impl UpdateType {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '<' => UpdateType::Sent,
            '>' => UpdateType::Received,
            'c' => UpdateType::Local,
            'h' => UpdateType::HardLink,
            '.' => UpdateType::NoUpdate,
            '*' => UpdateType::Message,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    Device,
    Special,
}

impl FileType {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'f' => FileType::File,
            'd' => FileType::Directory,
            'L' => FileType::Symlink,
            'D' => FileType::Device,
            'S' => FileType::Special,
            _ => return None,
        })
    }
}

/// What an itemized line says about a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Not present at the destination yet.
    Created,
    /// Present and would be updated.
    Updated,
    /// Present, content unchanged.
    Unchanged,
}

/// One parsed itemize line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub update: UpdateType,
    /// `None` for message lines.
    pub file_type: Option<FileType>,
    /// Attribute flags, or the message for `*` lines.
    pub flags: String,
    pub path: PathBuf,
}

impl Item {
    /// Classification for regular files; `None` for anything else.
    ///
    /// Message lines are reported as [`Change::Updated`] since rsync only
    /// prints them for items it is about to act on.
    pub fn file_change(&self) -> Option<Change> {
        match (self.update, self.file_type) {
            (UpdateType::Message, _) => Some(Change::Updated),
            (_, Some(FileType::File)) => Some(match self.update {
                UpdateType::NoUpdate => Change::Unchanged,
                _ if self.flags.starts_with('+') => Change::Created,
                _ => Change::Updated,
            }),
            _ => None,
        }
    }
}

/// Parse one line of stdout. Blank lines and `created directory ...` notices
/// yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Item>> {
    let unparseable = || SyncError::UnparseableOutput {
        tool: TOOL.into(),
        line: line.to_string(),
    };
    if line.trim().is_empty() || line.starts_with("created directory ") {
        return Ok(None);
    }
    let (code, rest) = line.split_once(' ').ok_or_else(unparseable)?;
    let mut chars = code.chars();
    let update = chars
        .next()
        .and_then(UpdateType::from_char)
        .ok_or_else(unparseable)?;

    if update == UpdateType::Message {
        let path = rest.trim_start();
        if path.is_empty() {
            return Err(unparseable());
        }
        return Ok(Some(Item {
            update,
            file_type: None,
            flags: chars.as_str().to_string(),
            path: PathBuf::from(path),
        }));
    }

    let file_type = chars
        .next()
        .and_then(FileType::from_char)
        .ok_or_else(unparseable)?;
    if rest.is_empty() {
        return Err(unparseable());
    }
    Ok(Some(Item {
        update,
        file_type: Some(file_type),
        flags: chars.as_str().to_string(),
        path: PathBuf::from(rest),
    }))
}

/// Parse a whole stdout buffer, keeping only items.
pub fn parse_output(output: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for line in output.lines() {
        if let Some(item) = parse_line(line)? {
            items.push(item);
        }
    }
    Ok(items)
}
