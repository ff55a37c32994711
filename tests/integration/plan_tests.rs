use std::collections::HashSet;
use std::fs;

use volclean::artifact;
use volclean::batch::RunRequest;
use volclean::plan::{
    build_plan_from_reports, ActionKind, ActionPlan, Destination, Disposition, PlanError,
    PurposeRules, RuleSpec, SaveOutcome,
};

use super::common::Volumes;

fn doc_rules() -> PurposeRules {
    PurposeRules::compile(&[RuleSpec {
        category: "doc".into(),
        extensions: vec!["txt".into()],
        ..RuleSpec::default()
    }])
    .unwrap()
}

#[test]
fn test_plan_is_byte_identical_across_builds() {
    let vols = Volumes::new();
    vols.master_file("x.bin", "payload A");
    vols.external_file("file1", "payload A");
    vols.external_file("notes.txt", "meeting notes");
    vols.external_file("file2", "payload C");
    let index = vols.build_index();
    vols.scan(&index, 2);

    let rules = doc_rules();
    let first = vols.plan(&rules);
    let second = vols.plan(&rules);
    assert_eq!(first, second);
    assert_eq!(
        artifact::to_json(&first).unwrap(),
        artifact::to_json(&second).unwrap()
    );

    let path = vols.layout().plan_path(&first.id);
    assert_eq!(first.save(&path).unwrap(), SaveOutcome::Written);
    let bytes = fs::read(&path).unwrap();
    assert_eq!(second.save(&path).unwrap(), SaveOutcome::AlreadyPresent);
    assert_eq!(fs::read(&path).unwrap(), bytes);
    assert_eq!(ActionPlan::load(&path).unwrap(), first);
}

#[test]
fn test_rescan_of_unchanged_tree_reproduces_stored_plan() {
    let vols = Volumes::new();
    vols.master_file("x.bin", "payload A");
    vols.external_file("file1", "payload A");
    vols.external_file("notes.txt", "meeting notes");
    vols.external_file("file2", "payload C");
    let index = vols.build_index();
    vols.scan(&index, 2);

    let rules = doc_rules();
    let first = vols.plan(&rules);
    let path = vols.layout().plan_path(&first.id);
    assert_eq!(first.save(&path).unwrap(), SaveOutcome::Written);
    let bytes = fs::read(&path).unwrap();

    let restart = RunRequest {
        restart: true,
        ..RunRequest::resume(2)
    };
    let summary = vols
        .coordinator()
        .run(vols.external.path(), &index, &restart)
        .unwrap();
    assert!(summary.completed);

    let second = vols.plan(&rules);
    assert_eq!(second, first);
    assert_eq!(artifact::to_json(&second).unwrap(), artifact::to_json(&first).unwrap());
    assert_eq!(second.save(&path).unwrap(), SaveOutcome::AlreadyPresent);
    assert_eq!(fs::read(&path).unwrap(), bytes);
}

#[test]
fn test_plan_orders_delete_then_moves_then_keep() {
    let vols = Volumes::new();
    vols.master_file("x.bin", "payload A");
    vols.external_file("a_unique.bin", "payload C");
    vols.external_file("b_notes.txt", "notes");
    vols.external_file("c_dup.bin", "payload A");
    let index = vols.build_index();
    vols.scan(&index, 10);

    let plan = vols.plan(&doc_rules());
    let kinds: Vec<ActionKind> = plan.actions.iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![ActionKind::Delete, ActionKind::Rename, ActionKind::Keep]
    );
    assert_eq!(plan.reclaimable_bytes(), 9);
    assert_eq!(plan.source_batch_ids, vec!["batch_00001".to_string()]);
}

#[test]
fn test_rename_collisions_resolve_across_batches_and_disk() {
    let vols = Volumes::new();
    vols.external_file("docs/Notes.TXT", "first notes");
    vols.external_file("docs/doc-notes.txt", "already named");
    vols.external_file("docs/notes.txt", "second notes");
    let index = vols.build_index();
    // One file per batch: the allocator still sees every claim
    let summary = vols.scan(&index, 1);
    assert_eq!(summary.batches.len(), 3);

    let plan = vols.plan(&doc_rules());
    let docs = vols.external_root().join("docs");
    let renames: Vec<_> = plan
        .actions
        .iter()
        .filter(|a| a.kind == ActionKind::Rename)
        .map(|a| {
            (
                a.source.file_name().unwrap().to_string_lossy().into_owned(),
                a.destination.clone().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        renames,
        vec![
            (
                "Notes.TXT".to_string(),
                Destination::Path {
                    path: docs.join("doc-notes_1.txt")
                }
            ),
            (
                "notes.txt".to_string(),
                Destination::Path {
                    path: docs.join("doc-notes_2.txt")
                }
            ),
        ]
    );

    let keep = plan
        .actions
        .iter()
        .find(|a| a.kind == ActionKind::Keep)
        .unwrap();
    assert_eq!(keep.source, docs.join("doc-notes.txt"));
}

#[test]
fn test_relocate_names_are_unique_per_store() {
    let vols = Volumes::new();
    vols.external_file("a/track.mp3", "tune one");
    vols.external_file("b/track.mp3", "tune two");
    vols.external_file("c/Track.MP3", "tune three");
    let index = vols.build_index();
    vols.scan(&index, 2);

    let rules = PurposeRules::compile(&[RuleSpec {
        category: "music".into(),
        disposition: Disposition::Relocate,
        extensions: vec!["mp3".into()],
        ..RuleSpec::default()
    }])
    .unwrap();
    let plan = vols.plan(&rules);

    let names: Vec<String> = plan
        .actions
        .iter()
        .filter_map(|a| match a.destination {
            Some(Destination::Store { ref file_name, .. }) => Some(file_name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        names,
        vec!["music-track.mp3", "music-track_1.mp3", "music-track_2.mp3"]
    );
    let unique: HashSet<_> = plan.actions.iter().filter_map(|a| a.destination.as_ref()).collect();
    assert_eq!(unique.len(), 3);
}

#[test]
fn test_no_reports_is_an_error() {
    let err = build_plan_from_reports(&[], &PurposeRules::default()).unwrap_err();
    assert!(matches!(err, PlanError::NoReports));
}
