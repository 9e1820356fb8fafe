//! Locations: a root (local or on an ssh host) plus the files known under it.
//!
//! A [`Location`] is the unit every other stage works on. The diff backends
//! compare two of them, the plan builder turns the comparison into per-file
//! actions and the executors move bytes between their roots.
//!
//! # Invariants
//!
//! - Paths are lexically normalized (`a/./b/../c` becomes `a/c`) on entry.
//! - Paths are unique within one location.
//! - Paths are either all relative (to [`Location::root`]) or all absolute.
//!
//! Every constructor and every method returning a new location goes through
//! [`Location::new`], so a value that exists always satisfies the invariants.
//!
//! # Example
//!
//! ```rust
//! use locsync::location::{Endpoint, Location};
//!
//! let loc = Location::from_paths(Endpoint::local("data"), ["a.txt", "sub/./b.txt"]).unwrap();
//! let files: Vec<_> = loc.files().iter().map(|p| p.display().to_string()).collect();
//! assert_eq!(files, ["a.txt", "sub/b.txt"]);
//! ```

pub mod info;
pub mod listing;
pub mod manifest;
pub mod scan;

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SyncError};

pub use info::{ComputedInfo, FileInfo};
pub use listing::{Listing, SearchRule};
pub use manifest::Manifest;
pub use scan::ScanOptions;

/// Where a location lives: a root directory, optionally on a remote host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoint {
    root: PathBuf,
    host: Option<String>,
}

impl Endpoint {
    /// A root on the local filesystem. An empty root means the current directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host: None,
        }
    }

    /// A root on `host` (`[user@]host`), interpreted by the remote shell.
    pub fn remote(host: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host: Some(host.into()),
        }
    }

    /// Build from an optional host, treating an empty host as local.
    pub fn new(root: impl Into<PathBuf>, host: Option<String>) -> Self {
        Self {
            root: root.into(),
            host: host.filter(|h| !h.is_empty()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn is_remote(&self) -> bool {
        self.host.is_some()
    }

    /// Path of `path` on the endpoint's own machine (no host qualifier).
    ///
    /// Absolute paths are returned unchanged.
    pub fn join(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || self.root.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// The root as understood by rsync/scp: `host:root` or the local root.
    pub fn hostpath(&self) -> String {
        let root = if self.root.as_os_str().is_empty() {
            ".".to_string()
        } else {
            self.root.display().to_string()
        };
        match &self.host {
            Some(host) => format!("{host}:{root}"),
            None => root,
        }
    }

    /// Host-qualified form of a single file below this endpoint.
    pub fn qualified(&self, path: &Path) -> String {
        let joined = self.join(path);
        match &self.host {
            Some(host) => format!("{host}:{}", joined.display()),
            None => joined.display().to_string(),
        }
    }

    /// Same endpoint with `suffix` appended to the root.
    pub fn with_suffix(&self, suffix: &Path) -> Self {
        Self {
            root: normalize_path(&self.root.join(suffix)),
            host: self.host.clone(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hostpath())
    }
}

/// One file known to a location.
///
/// `checksum`, `size` and `mtime` are optional. A missing checksum means the
/// content is unknown, which the hash backend never treats as equal to
/// anything. `size` and `mtime` are advisory.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub checksum: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<f64>,
}

impl ManifestEntry {
    /// An entry with no metadata.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            checksum: None,
            size: None,
            mtime: None,
        }
    }

    /// An entry with a known checksum and no size/mtime.
    pub fn with_checksum(path: impl Into<PathBuf>, checksum: impl Into<String>) -> Self {
        Self {
            checksum: normalize_checksum(Some(checksum.into())),
            ..Self::new(path)
        }
    }

    pub fn has_info(&self) -> bool {
        self.checksum.is_some()
    }

    /// Copy of this entry with its metadata replaced by `info`.
    pub fn with_info(&self, info: &FileInfo) -> Self {
        Self {
            path: self.path.clone(),
            checksum: Some(info.sha256.clone()),
            size: Some(info.size),
            mtime: Some(info.mtime),
        }
    }

    /// Copy of this entry with all metadata dropped.
    pub fn without_info(&self) -> Self {
        Self::new(self.path.clone())
    }
}

/// Manifest keys that describe a location without changing where its files
/// are on disk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocationMeta {
    /// Where the root sits inside the dataset. Files still live at
    /// `root/path`; two locations with different prefixes are aligned with
    /// [`Location::align_prefixes`] before they are compared.
    pub prefix: Option<PathBuf>,
    /// Local mount point of a remote root.
    pub mount: Option<PathBuf>,
    /// How [`Location::refreshed`] rebuilds the file list.
    pub listing: Option<Listing>,
}

/// How this machine reaches a location's files.
pub(crate) enum Access<'a> {
    /// Readable here, under this endpoint.
    Local(Endpoint),
    /// Only through ssh to this host.
    Remote(&'a str),
}

/// A root plus an ordered, duplicate-free set of files.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    endpoint: Endpoint,
    entries: Vec<ManifestEntry>,
    meta: LocationMeta,
}

impl Location {
    /// Validate and build a location.
    ///
    /// Fails with [`SyncError::PathConsistency`] when relative and absolute
    /// paths are mixed, and with [`SyncError::ManifestFormat`] on duplicate or
    /// empty paths.
    pub fn new(endpoint: Endpoint, entries: Vec<ManifestEntry>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut first_relative: Option<PathBuf> = None;
        let mut first_absolute: Option<PathBuf> = None;
        let mut normalized = Vec::with_capacity(entries.len());

        for mut entry in entries {
            let path = normalize_path(&entry.path);
            if path.as_os_str().is_empty() || path == Path::new(".") {
                return Err(SyncError::manifest(format!(
                    "empty file path (given as {:?})",
                    entry.path
                )));
            }
            if path.is_absolute() {
                first_absolute.get_or_insert_with(|| path.clone());
            } else {
                first_relative.get_or_insert_with(|| path.clone());
            }
            if let (Some(relative), Some(absolute)) = (&first_relative, &first_absolute) {
                return Err(SyncError::PathConsistency {
                    relative: relative.clone(),
                    absolute: absolute.clone(),
                });
            }
            if !seen.insert(path.clone()) {
                return Err(SyncError::manifest(format!(
                    "duplicate path {}",
                    path.display()
                )));
            }
            entry.path = path;
            entry.checksum = normalize_checksum(entry.checksum.take());
            normalized.push(entry);
        }

        Ok(Self {
            endpoint,
            entries: normalized,
            meta: LocationMeta::default(),
        })
    }

    /// A location without any files.
    pub fn empty(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            entries: Vec::new(),
            meta: LocationMeta::default(),
        }
    }

    /// Same location with `meta` attached.
    pub fn with_meta(mut self, meta: LocationMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Build from bare paths (no metadata).
    pub fn from_paths<I, P>(endpoint: Endpoint, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::new(endpoint, paths.into_iter().map(ManifestEntry::new).collect())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn root(&self) -> &Path {
        self.endpoint.root()
    }

    pub fn host(&self) -> Option<&str> {
        self.endpoint.host()
    }

    pub fn meta(&self) -> &LocationMeta {
        &self.meta
    }

    pub fn prefix(&self) -> Option<&Path> {
        self.meta.prefix.as_deref()
    }

    /// Local roots are read directly, and so are remote roots that are
    /// mounted here.
    pub(crate) fn access(&self) -> Access<'_> {
        match (self.endpoint.host(), &self.meta.mount) {
            (None, _) => Access::Local(self.endpoint.clone()),
            (Some(_), Some(mount)) if mount.is_dir() => Access::Local(Endpoint::local(mount)),
            (Some(host), _) => Access::Remote(host),
        }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths in manifest order (not necessarily sorted).
    pub fn files(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.path.as_path()).collect()
    }

    /// Look up an entry by (normalized) path.
    pub fn get(&self, path: &Path) -> Option<&ManifestEntry> {
        let path = normalize_path(path);
        self.entries.iter().find(|e| e.path == path)
    }

    /// True when every path is absolute (and there is at least one).
    pub fn is_absolute(&self) -> bool {
        self.entries.first().is_some_and(|e| e.path.is_absolute())
    }

    /// True when every entry carries a checksum.
    pub fn has_info(&self) -> bool {
        self.entries.iter().all(ManifestEntry::has_info)
    }

    /// Prefix every relative path with `prefix`.
    ///
    /// A no-op when all paths are absolute.
    pub fn add_prefix(&self, prefix: &Path) -> Result<Self> {
        if self.is_absolute() || prefix.as_os_str().is_empty() {
            return Ok(self.clone());
        }
        let entries = self
            .entries
            .iter()
            .map(|e| ManifestEntry {
                path: prefix.join(&e.path),
                ..e.clone()
            })
            .collect();
        self.with_entries(entries)
    }

    /// The part of this location below `suffix`, re-rooted there.
    ///
    /// Relative paths outside `suffix` are dropped and the rest lose the
    /// `suffix` components. The prefix moves down with the root.
    pub fn descend(&self, suffix: &Path) -> Result<Self> {
        let suffix = normalize_path(suffix);
        if suffix.as_os_str().is_empty() {
            return Ok(self.clone());
        }
        let entries = if self.is_absolute() {
            self.entries.clone()
        } else {
            self.entries
                .iter()
                .filter_map(|e| {
                    let rest = e.path.strip_prefix(&suffix).ok()?;
                    (!rest.as_os_str().is_empty()).then(|| ManifestEntry {
                        path: rest.to_path_buf(),
                        ..e.clone()
                    })
                })
                .collect()
        };
        let meta = LocationMeta {
            prefix: Some(normalize_path(
                &self.prefix().unwrap_or(Path::new("")).join(&suffix),
            )),
            ..self.meta.clone()
        };
        Ok(Self::new(self.endpoint.with_suffix(&suffix), entries)?.with_meta(meta))
    }

    /// Bring two locations to the same depth in the dataset.
    ///
    /// The location with the shallower prefix descends into the difference,
    /// so afterwards both roots hold the same subtree and paths compare
    /// directly. Fails with [`SyncError::PrefixMismatch`] when neither prefix
    /// contains the other.
    pub fn align_prefixes(a: &Location, b: &Location) -> Result<(Location, Location)> {
        let pa = normalize_path(a.prefix().unwrap_or(Path::new("")));
        let pb = normalize_path(b.prefix().unwrap_or(Path::new("")));
        if let Ok(rest) = pa.strip_prefix(&pb) {
            return Ok((a.clone(), b.descend(rest)?));
        }
        if let Ok(rest) = pb.strip_prefix(&pa) {
            return Ok((a.descend(rest)?, b.clone()));
        }
        Err(SyncError::PrefixMismatch { a: pa, b: pb })
    }

    /// The same files seen from `root`, a directory above the current root
    /// on the same host. Relative paths gain the components in between.
    pub fn rebased(&self, root: &Path) -> Result<Self> {
        let current = normalize_path(self.root());
        let target = normalize_path(root);
        let Ok(between) = current.strip_prefix(&target) else {
            return Err(SyncError::manifest(format!(
                "{} is not below {}",
                self.root().display(),
                root.display()
            )));
        };
        let endpoint = Endpoint::new(target, self.host().map(str::to_string));
        let moved = Self::new(endpoint, self.entries.clone())?;
        Ok(moved.add_prefix(between)?.with_meta(self.meta.clone()))
    }

    /// Entries sorted by path.
    pub fn sorted(&self) -> Self {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            endpoint: self.endpoint.clone(),
            entries,
            meta: self.meta.clone(),
        }
    }

    /// Drop the listed paths (unknown paths are ignored).
    pub fn without<P: AsRef<Path>>(&self, paths: &[P]) -> Self {
        let drop: HashSet<PathBuf> = paths.iter().map(|p| normalize_path(p.as_ref())).collect();
        Self {
            endpoint: self.endpoint.clone(),
            entries: self
                .entries
                .iter()
                .filter(|e| !drop.contains(&e.path))
                .cloned()
                .collect(),
            meta: self.meta.clone(),
        }
    }

    /// Union of two locations sharing an endpoint. Entries of `self` win on
    /// duplicate paths.
    pub fn merge(&self, other: &Location) -> Result<Self> {
        if self.endpoint != other.endpoint {
            return Err(SyncError::manifest(format!(
                "cannot merge locations with different roots ({} and {})",
                self.endpoint, other.endpoint
            )));
        }
        let known: HashSet<&Path> = self.entries.iter().map(|e| e.path.as_path()).collect();
        let mut entries = self.entries.clone();
        entries.extend(
            other
                .entries
                .iter()
                .filter(|e| !known.contains(e.path.as_path()))
                .cloned(),
        );
        Ok(Self::new(self.endpoint.clone(), entries)?.with_meta(self.meta.clone()))
    }

    /// Replace the entries, keeping the endpoint and metadata.
    pub(crate) fn with_entries(&self, entries: Vec<ManifestEntry>) -> Result<Self> {
        Ok(Self::new(self.endpoint.clone(), entries)?.with_meta(self.meta.clone()))
    }
}

/// Lexically normalize a path: drop `.`, fold `name/..`, keep leading `..`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

fn normalize_checksum(checksum: Option<String>) -> Option<String> {
    checksum
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
}
