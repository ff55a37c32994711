use std::collections::BTreeMap;
use std::fs;
use std::io::Read;

use flate2::read::GzDecoder;
use volclean::actions::{
    read_manifest, ActionStatus, ExecuteError, ExecuteOptions, ExecutionMode, ExecutionReport,
};
use volclean::plan::{ActionKind, ActionPlan, Disposition, PurposeRules, RuleSpec};

use super::common::Volumes;

/// Master `{A: x.bin}`; external root of ten files where `file1` repeats
/// A and `file2` is new content.
fn worked_example() -> (Volumes, ActionPlan) {
    let vols = Volumes::new();
    vols.master_file("x.bin", "hash A content");
    vols.external_file("file1", "hash A content");
    vols.external_file("file2", "hash C content");
    for i in 3..=10 {
        vols.external_file(&format!("filler{i:02}"), &format!("filler {i}"));
    }
    let index = vols.build_index();
    let summary = vols.scan(&index, 1000);
    assert_eq!(summary.total_files, 10);

    let plan = vols.plan(&PurposeRules::default());
    plan.save(&vols.layout().plan_path(&plan.id)).unwrap();
    (vols, plan)
}

fn status_of(report: &ExecutionReport, name: &str) -> ActionStatus {
    report
        .outcomes
        .iter()
        .find(|o| o.source.file_name().is_some_and(|n| n == name))
        .unwrap()
        .status
}

#[test]
fn test_worked_example_plan() {
    let (vols, plan) = worked_example();
    let root = vols.external_root();

    let delete = &plan.actions[0];
    assert_eq!(delete.kind, ActionKind::Delete);
    assert_eq!(delete.source, root.join("file1"));
    assert_eq!(
        delete.duplicate_of,
        Some(vols.master.path().join("x.bin").canonicalize().unwrap())
    );

    let file2 = plan
        .actions
        .iter()
        .find(|a| a.source == root.join("file2"))
        .unwrap();
    assert_eq!(file2.kind, ActionKind::Keep);
    assert_eq!(plan.counts_by_kind()[&ActionKind::Keep], 9);
}

#[test]
fn test_worked_example_rerun_reports_missing() {
    let (vols, plan) = worked_example();
    let root = vols.external_root();
    let executor = vols.executor(ExecuteOptions::default());

    let (first, _) = executor.execute(&plan, ExecutionMode::Live).unwrap();
    assert_eq!(status_of(&first, "file1"), ActionStatus::Completed);
    assert_eq!(status_of(&first, "file2"), ActionStatus::Unchanged);
    assert_eq!(first.summary.files_deleted, 1);
    assert_eq!(first.summary.bytes_reclaimed, 14);
    assert!(!root.join("file1").exists());
    assert!(root.join("file2").exists());
    assert!(vols.master.path().join("x.bin").exists());

    let reloaded = ActionPlan::load(&vols.layout().plan_path(&plan.id)).unwrap();
    let (second, second_path) = executor.execute(&reloaded, ExecutionMode::Live).unwrap();
    assert_eq!(status_of(&second, "file1"), ActionStatus::SkippedMissing);
    assert_eq!(second.summary.failed(), 0);
    assert_eq!(second.summary.files_deleted, 0);
    assert_ne!(first.id, second.id);
    assert_eq!(ExecutionReport::load(&second_path).unwrap(), second);
}

#[test]
fn test_dry_run_reports_without_mutating() {
    let (vols, plan) = worked_example();
    let root = vols.external_root();

    let (report, _) = vols
        .executor(ExecuteOptions::default())
        .execute(&plan, ExecutionMode::DryRun)
        .unwrap();
    assert_eq!(status_of(&report, "file1"), ActionStatus::Reported);
    assert!(report.backup.is_none());
    assert!(root.join("file1").exists());
    assert!(!vols.layout().backups_dir().exists());
}

#[test]
fn test_backup_holds_sources_before_deletion() {
    let (vols, plan) = worked_example();
    let (report, _) = vols
        .executor(ExecuteOptions::default())
        .execute(&plan, ExecutionMode::Live)
        .unwrap();

    let backup = report.backup.expect("live run with a DELETE makes a backup");
    let manifest = read_manifest(&backup).unwrap();
    assert_eq!(manifest.plan_id, plan.id);
    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.entries[0].original_path, vols.external_root().join("file1"));

    let mut archive = tar::Archive::new(GzDecoder::new(fs::File::open(&backup).unwrap()));
    let mut entry = archive
        .entries()
        .unwrap()
        .map(Result::unwrap)
        .find(|e| e.path().unwrap().to_string_lossy() == manifest.entries[0].archive_path)
        .unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    assert_eq!(content, "hash A content");
}

#[test]
fn test_backup_failure_changes_nothing() {
    let (vols, plan) = worked_example();
    // A file where the backups directory should be
    fs::write(vols.layout().backups_dir(), "not a directory").unwrap();

    let err = vols
        .executor(ExecuteOptions::default())
        .execute(&plan, ExecutionMode::Live)
        .unwrap_err();
    assert!(matches!(err, ExecuteError::Backup(_)));
    assert!(vols.external_root().join("file1").exists());
    assert!(!vols.layout().reports_dir().exists());
}

#[test]
fn test_relocate_then_rerun_skips_existing() {
    let vols = Volumes::new();
    let store = tempfile::TempDir::new().unwrap();
    vols.external_file("inbox/Holiday Song.mp3", "tune");
    vols.external_file("inbox/readme.md", "words");
    let index = vols.build_index();
    vols.scan(&index, 10);

    let rules = PurposeRules::compile(&[RuleSpec {
        category: "music".into(),
        disposition: Disposition::Relocate,
        extensions: vec!["mp3".into()],
        ..RuleSpec::default()
    }])
    .unwrap();
    let plan = vols.plan(&rules);
    let options = ExecuteOptions {
        use_trash: false,
        stores: BTreeMap::from([("music".to_string(), store.path().to_path_buf())]),
    };
    let executor = vols.executor(options);

    let (first, _) = executor.execute(&plan, ExecutionMode::Live).unwrap();
    assert_eq!(first.summary.files_relocated, 1);
    let moved = store.path().join("music-holiday-song.mp3");
    assert_eq!(fs::read_to_string(&moved).unwrap(), "tune");
    assert!(!vols.external_root().join("inbox/Holiday Song.mp3").exists());

    let (second, _) = executor.execute(&plan, ExecutionMode::Live).unwrap();
    assert_eq!(status_of(&second, "Holiday Song.mp3"), ActionStatus::SkippedExists);
    assert_eq!(status_of(&second, "readme.md"), ActionStatus::Unchanged);
    assert_eq!(fs::read_to_string(&moved).unwrap(), "tune");
}
