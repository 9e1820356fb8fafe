//! End to end against an installed rsync; skipped when there is none.

mod util;

use std::path::PathBuf;

use locsync::command::Tools;
use locsync::diff::{DiffBackend, DiffMethod, RsyncDiff};
use locsync::location::{Endpoint, Location, ScanOptions};
use locsync::plan::{Policy, plan_actions};
use locsync::transfer::{RsyncExecutor, run_plan};
use tempfile::TempDir;

use util::write_tree;

fn rsync_tools() -> Option<Tools> {
    let tools = Tools::default();
    if tools.has(&tools.rsync) {
        Some(tools)
    } else {
        eprintln!("rsync not installed, skipping");
        None
    }
}

#[test]
fn dry_run_then_copy_then_nothing_left() {
    let Some(tools) = rsync_tools() else {
        return;
    };
    let tmp = TempDir::new().unwrap();
    let (src, dst) = (tmp.path().join("src"), tmp.path().join("dst"));
    write_tree(
        &src,
        &[("a.txt", "alpha"), ("nested/dir/b.txt", "beta"), ("c.txt", "gamma")],
    );
    write_tree(&dst, &[("a.txt", "an older alpha"), ("only-here.txt", "x")]);

    let source = Location::scan(&src, &ScanOptions::default()).unwrap();
    let dest = Location::empty(Endpoint::local(&dst));
    let backend = RsyncDiff::new(tools.clone()).checksum(true);

    let diff = backend.diff(&source, &dest).unwrap();
    assert_eq!(diff.changed(), [PathBuf::from("a.txt")]);
    assert_eq!(
        diff.only_in_a(),
        [PathBuf::from("c.txt"), PathBuf::from("nested/dir/b.txt")]
    );
    // a single dry run cannot see only-here.txt
    assert!(diff.only_in_b().is_empty());
    assert!(!diff.dest_only_observed());

    let policy = Policy {
        method: DiffMethod::Rsync,
        force: true,
        ..Policy::default()
    };
    let plan = plan_actions(&diff, source.endpoint(), dest.endpoint(), policy).unwrap();
    let report = run_plan(&RsyncExecutor::new(tools.clone()), &plan, &mut |_| {}).unwrap();
    assert_eq!(report.transferred.len(), 3);
    assert_eq!(std::fs::read_to_string(dst.join("nested/dir/b.txt")).unwrap(), "beta");
    assert!(dst.join("only-here.txt").exists());

    let rerun = backend.diff(&source, &dest).unwrap();
    assert_eq!(rerun.equal().len(), 3);
    assert!(rerun.is_identical());

    // the swapped run finds what the forward run could not
    let dest_files = Location::scan(&dst, &ScanOptions::default()).unwrap();
    let reverse = backend
        .diff(&dest_files, &Location::empty(Endpoint::local(&src)))
        .unwrap();
    let combined = rerun.with_reverse_pass(&reverse);
    assert_eq!(combined.only_in_b(), [PathBuf::from("only-here.txt")]);
    assert!(combined.dest_only_observed());
}
