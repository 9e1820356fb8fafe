//! Turning a [`DiffResult`] into a [`CopyPlan`].
//!
//! The mapping is fixed: `->` becomes [`Action::Create`], `!=` and `?=`
//! become [`Action::Overwrite`], `==` becomes [`Action::Skip`]. Files that
//! exist only at the destination are a [`SyncError::WrongDirection`] under
//! [`Direction::Strict`] and are left alone under [`Direction::Relaxed`].
//!
//! A transfer whose source and destination name the same file is a
//! [`SyncError::SameFile`]: absolute paths on one host, or two endpoints whose
//! roots resolve to the same directory.
//!
//! Confirmation goes through the [`Confirm`] port so the builder never talks
//! to a terminal itself.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diff::{Category, DiffMethod, DiffResult};
use crate::error::{Result, SyncError};
use crate::location::{Endpoint, normalize_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Overwrite,
    Skip,
}

impl Action {
    pub fn transfers(self) -> bool {
        !matches!(self, Action::Skip)
    }
}

/// What to do about destination-only files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Destination-only files abort plan building.
    #[default]
    Strict,
    /// Destination-only files are reported and left untouched.
    Relaxed,
}

/// Options that shape a plan. Built once from the CLI and config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Policy {
    pub method: DiffMethod,
    /// Do not ask for confirmation.
    pub force: bool,
    /// Build the plan but never confirm or execute it.
    pub dry_run: bool,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Path relative to the source root (or absolute).
    pub path: PathBuf,
    /// Full source path on the source machine.
    pub source: PathBuf,
    /// Full destination path on the destination machine.
    pub dest: PathBuf,
    pub action: Action,
}

/// An immutable, ordered list of per-file actions plus the policy used to
/// build it.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyPlan {
    source: Endpoint,
    dest: Endpoint,
    entries: Vec<PlanEntry>,
    policy: Policy,
    untouched: Vec<PathBuf>,
}

impl CopyPlan {
    pub fn source(&self) -> &Endpoint {
        &self.source
    }

    pub fn dest(&self) -> &Endpoint {
        &self.dest
    }

    /// All entries, sorted by path.
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Destination-only files a relaxed plan leaves in place.
    pub fn untouched(&self) -> &[PathBuf] {
        &self.untouched
    }

    fn with_action(&self, action: Action) -> impl Iterator<Item = &PlanEntry> + '_ {
        self.entries.iter().filter(move |e| e.action == action)
    }

    pub fn creates(&self) -> impl Iterator<Item = &PlanEntry> + '_ {
        self.with_action(Action::Create)
    }

    pub fn overwrites(&self) -> impl Iterator<Item = &PlanEntry> + '_ {
        self.with_action(Action::Overwrite)
    }

    pub fn skips(&self) -> impl Iterator<Item = &PlanEntry> + '_ {
        self.with_action(Action::Skip)
    }

    /// Entries an executor acts on (create and overwrite).
    pub fn transfers(&self) -> impl Iterator<Item = &PlanEntry> + '_ {
        self.entries.iter().filter(|e| e.action.transfers())
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers().count()
    }

    /// Nothing to create or overwrite.
    pub fn is_noop(&self) -> bool {
        self.transfer_count() == 0
    }
}

/// Asks whether a plan may be executed.
pub trait Confirm {
    fn confirm(&mut self, plan: &CopyPlan) -> bool;
}

impl<F: FnMut(&CopyPlan) -> bool> Confirm for F {
    fn confirm(&mut self, plan: &CopyPlan) -> bool {
        self(plan)
    }
}

/// Pure mapping from a diff to a plan. Applies the direction rule but never
/// asks for confirmation.
pub fn plan_actions(
    diff: &DiffResult,
    source: &Endpoint,
    dest: &Endpoint,
    policy: Policy,
) -> Result<CopyPlan> {
    let only_in_b = diff.only_in_b();
    if !only_in_b.is_empty() && policy.direction == Direction::Strict {
        return Err(SyncError::WrongDirection {
            paths: only_in_b.to_vec(),
        });
    }

    let mut entries: Vec<PlanEntry> = diff
        .iter()
        .filter_map(|(category, path)| {
            let action = match category {
                Category::OnlyInA => Action::Create,
                Category::Changed | Category::Unknown => Action::Overwrite,
                Category::Equal => Action::Skip,
                Category::OnlyInB => return None,
            };
            Some(PlanEntry {
                path: path.to_path_buf(),
                source: source.join(path),
                dest: dest.join(path),
                action,
            })
        })
        .collect();
    entries.sort_by(|x, y| x.path.cmp(&y.path));

    if source.host() == dest.host() {
        let shared_root = same_root(source, dest);
        if let Some(entry) = entries
            .iter()
            .find(|e| e.action.transfers() && (shared_root || e.path.is_absolute()))
        {
            return Err(SyncError::SameFile {
                path: entry.source.clone(),
            });
        }
    }

    Ok(CopyPlan {
        source: source.clone(),
        dest: dest.clone(),
        entries,
        policy,
        untouched: only_in_b.to_vec(),
    })
}

/// Whether two endpoints on the same host share a root. Local roots are
/// canonicalized when they exist; remote roots compare lexically.
fn same_root(a: &Endpoint, b: &Endpoint) -> bool {
    let resolve = |e: &Endpoint| -> PathBuf {
        let root = match e.root() {
            r if r.as_os_str().is_empty() => Path::new("."),
            r => r,
        };
        if e.is_remote() {
            return normalize_path(root);
        }
        root.canonicalize()
            .or_else(|_| std::path::absolute(root).map(|p| normalize_path(&p)))
            .unwrap_or_else(|_| normalize_path(root))
    };
    resolve(a) == resolve(b)
}

/// Build a plan and, unless it is forced, a dry run or a no-op, ask
/// `confirm` before returning it. Declining is [`SyncError::Cancelled`].
pub fn build_plan(
    diff: &DiffResult,
    source: &Endpoint,
    dest: &Endpoint,
    policy: Policy,
    confirm: &mut dyn Confirm,
) -> Result<CopyPlan> {
    let plan = plan_actions(diff, source, dest, policy)?;
    tracing::debug!(
        create = plan.creates().count(),
        overwrite = plan.overwrites().count(),
        skip = plan.skips().count(),
        untouched = plan.untouched().len(),
        "built copy plan"
    );
    if policy.dry_run || policy.force || plan.is_noop() {
        return Ok(plan);
    }
    if !confirm.confirm(&plan) {
        tracing::info!("plan declined");
        return Err(SyncError::Cancelled);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffBackend, HashDiff};
    use crate::location::{Location, ManifestEntry};

    fn diff(a: &[(&str, &str)], b: &[(&str, &str)]) -> DiffResult {
        let mk = |root: &str, items: &[(&str, &str)]| {
            Location::new(
                Endpoint::local(root),
                items
                    .iter()
                    .map(|(p, h)| ManifestEntry::with_checksum(*p, *h))
                    .collect(),
            )
            .unwrap()
        };
        HashDiff.diff(&mk("src", a), &mk("dst", b)).unwrap()
    }

    fn never(_: &CopyPlan) -> bool {
        panic!("confirmation must not be requested")
    }

    #[test]
    fn test_mapping() {
        let d = diff(&[("new", "1"), ("same", "2"), ("mod", "3")], &[("same", "2"), ("mod", "9")]);
        let plan = plan_actions(&d, &Endpoint::local("src"), &Endpoint::local("dst"), Policy::default()).unwrap();
        let actions: Vec<_> = plan.entries().iter().map(|e| (e.path.to_str().unwrap(), e.action)).collect();
        assert_eq!(
            actions,
            [("mod", Action::Overwrite), ("new", Action::Create), ("same", Action::Skip)]
        );
        assert_eq!(plan.entries()[1].source, PathBuf::from("src/new"));
        assert_eq!(plan.entries()[1].dest, PathBuf::from("dst/new"));
        assert_eq!(plan.transfer_count(), 2);
    }

    #[test]
    fn test_wrong_direction() {
        let d = diff(&[("a", "1")], &[("a", "1"), ("extra", "2")]);
        let err = build_plan(&d, &Endpoint::local("s"), &Endpoint::local("d"), Policy::default(), &mut never)
            .unwrap_err();
        assert!(matches!(err, SyncError::WrongDirection { ref paths } if paths == &[PathBuf::from("extra")]));
    }

    #[test]
    fn test_relaxed_leaves_dest_only() {
        let d = diff(&[("a", "1")], &[("a", "1"), ("extra", "2")]);
        let policy = Policy {
            direction: Direction::Relaxed,
            ..Policy::default()
        };
        let plan = build_plan(&d, &Endpoint::local("s"), &Endpoint::local("d"), policy, &mut never).unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.untouched(), [PathBuf::from("extra")]);
    }

    #[test]
    fn test_confirmation_paths() {
        let d = diff(&[("a", "1")], &[]);
        let (s, t) = (Endpoint::local("s"), Endpoint::local("d"));

        let mut asked = 0;
        let mut yes = |_: &CopyPlan| {
            asked += 1;
            true
        };
        build_plan(&d, &s, &t, Policy::default(), &mut yes).unwrap();
        assert_eq!(asked, 1);

        let mut no = |_: &CopyPlan| false;
        assert!(matches!(
            build_plan(&d, &s, &t, Policy::default(), &mut no),
            Err(SyncError::Cancelled)
        ));

        let forced = Policy { force: true, ..Policy::default() };
        build_plan(&d, &s, &t, forced, &mut never).unwrap();

        let dry = Policy { dry_run: true, ..Policy::default() };
        let plan = build_plan(&d, &s, &t, dry, &mut never).unwrap();
        assert_eq!(plan.transfer_count(), 1);
    }

    #[test]
    fn test_noop_skips_confirmation() {
        let d = diff(&[("a", "1")], &[("a", "1")]);
        let plan = build_plan(&d, &Endpoint::local("s"), &Endpoint::local("d"), Policy::default(), &mut never)
            .unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.skips().count(), 1);
    }

    #[test]
    fn test_same_root_refused() {
        let d = diff(&[("a", "1")], &[("a", "2")]);
        let err = plan_actions(&d, &Endpoint::local("d"), &Endpoint::local("./d"), Policy::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::SameFile { ref path } if path == Path::new("d/a")));

        let remote = |root: &str| Endpoint::remote("box", root);
        assert!(matches!(
            plan_actions(&d, &remote("/x"), &remote("/x/"), Policy::default()),
            Err(SyncError::SameFile { .. })
        ));
    }

    #[test]
    fn test_absolute_paths_on_one_host_refused() {
        let d = diff(&[("/data/a", "1")], &[("/data/a", "2")]);
        let err = plan_actions(&d, &Endpoint::local("s"), &Endpoint::local("t"), Policy::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::SameFile { ref path } if path == Path::new("/data/a")));

        // same absolute path on another machine is a real copy
        let plan = plan_actions(&d, &Endpoint::local("s"), &Endpoint::remote("box", "t"), Policy::default())
            .unwrap();
        assert_eq!(plan.entries()[0].dest, PathBuf::from("/data/a"));

        // nothing to transfer, nothing to refuse
        let d = diff(&[("/data/a", "1")], &[("/data/a", "1")]);
        assert!(plan_actions(&d, &Endpoint::local("s"), &Endpoint::local("t"), Policy::default()).is_ok());
    }

    #[test]
    fn test_copy_onto_itself_keeps_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("precious.txt");
        std::fs::write(&file, "keep me\n").unwrap();
        let loc = Location::from_paths(Endpoint::local(tmp.path()), ["precious.txt"]).unwrap();
        let d = crate::diff::ExistenceDiff.diff(&loc, &loc).unwrap();
        let forced = Policy { force: true, ..Policy::default() };

        let err = build_plan(&d, loc.endpoint(), loc.endpoint(), forced, &mut never).unwrap_err();
        assert!(matches!(err, SyncError::SameFile { .. }));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "keep me\n");
    }

    #[test]
    fn test_plan_is_deterministic() {
        let d = diff(&[("b", "1"), ("a", "2")], &[("a", "3")]);
        let (s, t) = (Endpoint::local("s"), Endpoint::local("d"));
        let first = plan_actions(&d, &s, &t, Policy::default()).unwrap();
        let second = plan_actions(&d, &s, &t, Policy::default()).unwrap();
        assert_eq!(first, second);
    }
}
