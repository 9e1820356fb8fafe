//! Manifest documents: the YAML shapes a [`Location`] is read from and written to.
//!
//! Three shapes are accepted, optionally wrapped in a document that carries
//! `root`, `host` (alias `ssh`), `prefix`, `mount` and one of `dump` or
//! `search` (see [`super::listing`]):
//!
//! ```yaml
//! # flat list (strings and structured entries may be mixed)
//! - a.txt
//! - path: b.txt
//!   sha256: 9f86d081...
//!   size: 4
//!   mtime: 1700000000.0
//!
//! # keyed by path
//! a.txt:
//! b.txt: {sha256: 9f86d081..., size: 4}
//!
//! # wrapped
//! root: /data
//! host: user@server
//! files: [a.txt, b.txt]
//! ```
//!
//! The shape is resolved once, in [`Manifest::from_value`]; nothing past this
//! module branches on it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::{Endpoint, Listing, Location, LocationMeta, ManifestEntry, SearchRule, normalize_path};
use crate::error::{Result, SyncError};

/// Metadata attached to a path in the keyed and structured shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<f64>,
}

/// Metadata of a keyed entry (the path is the key).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyedRecord {
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    mtime: Option<f64>,
}

/// One item of a flat list: a bare path or a structured entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManifestItem {
    Path(String),
    Entry(EntryRecord),
}

/// The file list of a manifest, in whichever shape it was written.
#[derive(Debug, Clone, PartialEq)]
pub enum FileList {
    Items(Vec<ManifestItem>),
    Keyed(Vec<EntryRecord>),
}

/// A parsed manifest, shape already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub root: Option<PathBuf>,
    pub host: Option<String>,
    pub prefix: Option<PathBuf>,
    pub mount: Option<PathBuf>,
    pub listing: Option<Listing>,
    pub files: FileList,
}

/// Wrapper keys as they appear on disk.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    root: Option<String>,
    #[serde(default, alias = "ssh")]
    host: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    mount: Option<String>,
    #[serde(default)]
    dump: Option<String>,
    #[serde(default)]
    search: Option<Vec<SearchRule>>,
    #[serde(default)]
    files: Option<Value>,
}

/// What [`Location::to_yaml`] writes.
#[derive(Debug, Serialize)]
struct DocumentOut<'a> {
    root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dump: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a [SearchRule]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: Vec<ManifestItem>,
}

impl Manifest {
    /// Parse manifest text.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| SyncError::manifest(format!("not valid YAML: {e}")))?;
        Self::from_value(value)
    }

    /// Resolve the shape of an already parsed YAML value.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::bare(FileList::Items(Vec::new()))),
            Value::Sequence(items) => Ok(Self::bare(parse_items(items)?)),
            Value::Mapping(map) => {
                let is_document = map.contains_key("files")
                    || !map.values().all(|v| v.is_mapping() || v.is_null());
                if !is_document {
                    return Ok(Self::bare(parse_keyed(map)?));
                }
                let doc: Document = serde_yaml::from_value(Value::Mapping(map))
                    .map_err(|e| SyncError::manifest(e.to_string()))?;
                let files = match doc.files {
                    None | Some(Value::Null) => FileList::Items(Vec::new()),
                    Some(Value::Sequence(items)) => parse_items(items)?,
                    Some(Value::Mapping(map)) => parse_keyed(map)?,
                    Some(other) => {
                        return Err(SyncError::manifest(format!(
                            "\"files\" must be a list or a mapping, found {}",
                            kind(&other)
                        )));
                    }
                };
                let listing = match (doc.dump, doc.search) {
                    (Some(_), Some(_)) => {
                        return Err(SyncError::manifest("use either \"dump\" or \"search\", not both"));
                    }
                    (Some(dump), None) => Some(Listing::Dump(PathBuf::from(dump))),
                    (None, Some(rules)) => Some(Listing::Search(rules)),
                    (None, None) => None,
                };
                Ok(Self {
                    root: doc.root.map(PathBuf::from),
                    host: doc.host.filter(|h| !h.is_empty()),
                    prefix: doc.prefix.map(PathBuf::from),
                    mount: doc.mount.map(PathBuf::from),
                    listing,
                    files,
                })
            }
            other => Err(SyncError::manifest(format!(
                "expected a list or a mapping, found {}",
                kind(&other)
            ))),
        }
    }

    fn bare(files: FileList) -> Self {
        Self {
            root: None,
            host: None,
            prefix: None,
            mount: None,
            listing: None,
            files,
        }
    }

    /// Canonical entries, in manifest order.
    pub fn entries(&self) -> Vec<ManifestEntry> {
        let from_record = |r: &EntryRecord| ManifestEntry {
            path: PathBuf::from(&r.path),
            checksum: r.sha256.clone(),
            size: r.size,
            mtime: r.mtime,
        };
        match &self.files {
            FileList::Items(items) => items
                .iter()
                .map(|item| match item {
                    ManifestItem::Path(p) => ManifestEntry::new(p),
                    ManifestItem::Entry(r) => from_record(r),
                })
                .collect(),
            FileList::Keyed(records) => records.iter().map(from_record).collect(),
        }
    }
}

fn parse_items(items: Vec<Value>) -> Result<FileList> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(path) => Ok(ManifestItem::Path(path)),
            Value::Mapping(_) => serde_yaml::from_value::<EntryRecord>(item)
                .map(ManifestItem::Entry)
                .map_err(|e| SyncError::manifest(format!("entry {i}: {e}"))),
            other => Err(SyncError::manifest(format!(
                "entry {i}: expected a path or an entry mapping, found {}",
                kind(&other)
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(FileList::Items)
}

fn parse_keyed(map: serde_yaml::Mapping) -> Result<FileList> {
    map.into_iter()
        .map(|(key, value)| {
            let Value::String(path) = key else {
                return Err(SyncError::manifest(format!(
                    "keys of a keyed manifest must be paths, found {}",
                    kind(&key)
                )));
            };
            let record: KeyedRecord = match value {
                Value::Null => KeyedRecord::default(),
                value => serde_yaml::from_value(value)
                    .map_err(|e| SyncError::manifest(format!("{path}: {e}")))?,
            };
            Ok(EntryRecord {
                path,
                sha256: record.sha256,
                size: record.size,
                mtime: record.mtime,
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(FileList::Keyed)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

impl Location {
    /// Build a location from a manifest. A missing root means the current
    /// directory. `prefix`, `mount` and the listing keys are kept as
    /// metadata; files always live at `root/path`.
    pub fn load(manifest: &Manifest) -> Result<Self> {
        let endpoint = Endpoint::new(
            manifest.root.clone().unwrap_or_default(),
            manifest.host.clone(),
        );
        let meta = LocationMeta {
            prefix: manifest.prefix.as_deref().map(normalize_path),
            mount: manifest.mount.clone(),
            listing: manifest.listing.clone(),
        };
        Ok(Location::new(endpoint, manifest.entries())?.with_meta(meta))
    }

    /// Read a manifest file.
    ///
    /// For local manifests the root defaults to the manifest's directory and a
    /// relative root is resolved against it. Remote roots are kept verbatim;
    /// their mount point is resolved like a local root.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
        let mut manifest = Manifest::parse(&text).map_err(|e| e.in_file(path))?;
        let base = path.parent().unwrap_or(Path::new(""));
        if let Some(mount) = manifest.mount.take() {
            manifest.mount = Some(normalize_path(&base.join(mount)));
        }
        if manifest.host.is_none() {
            let root = match manifest.root.take() {
                Some(root) if root.is_absolute() => root,
                Some(root) => normalize_path(&base.join(root)),
                None => base.to_path_buf(),
            };
            manifest.root = Some(root);
        }
        tracing::debug!(manifest = %path.display(), "loading manifest");
        Self::load(&manifest).map_err(|e| e.in_file(path))
    }

    /// Serialize as a wrapped manifest document.
    pub fn to_yaml_string(&self) -> Result<String> {
        let files = self
            .entries()
            .iter()
            .map(|e| {
                let path = e.path.display().to_string();
                if e.checksum.is_none() && e.size.is_none() && e.mtime.is_none() {
                    ManifestItem::Path(path)
                } else {
                    ManifestItem::Entry(EntryRecord {
                        path,
                        sha256: e.checksum.clone(),
                        size: e.size,
                        mtime: e.mtime,
                    })
                }
            })
            .collect();
        let meta = self.meta();
        let (dump, search) = match &meta.listing {
            Some(Listing::Dump(file)) => (Some(file.display().to_string()), None),
            Some(Listing::Search(rules)) => (None, Some(rules.as_slice())),
            None => (None, None),
        };
        let doc = DocumentOut {
            root: self.root().display().to_string(),
            host: self.host(),
            mount: meta.mount.as_ref().map(|m| m.display().to_string()),
            prefix: meta.prefix.as_ref().map(|p| p.display().to_string()),
            dump,
            search,
            files,
        };
        serde_yaml::to_string(&doc).map_err(|e| SyncError::manifest(e.to_string()))
    }

    /// Write the manifest to `path`, creating parent directories.
    pub fn to_yaml(&self, path: &Path) -> Result<()> {
        let text = self.to_yaml_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        std::fs::write(path, text).map_err(|e| SyncError::io(path, e))
    }
}
