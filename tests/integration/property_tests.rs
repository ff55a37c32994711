use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use volclean::duplicates::{Classification, ClassifiedFile};
use volclean::plan::{build_plan, Disposition, PlanContext, PurposeRules, RuleSpec};
use volclean::scanner::{FileRecord, Fingerprint, Hasher};

fn rules() -> PurposeRules {
    PurposeRules::compile(&[
        RuleSpec {
            category: "music".into(),
            disposition: Disposition::Relocate,
            extensions: vec!["mp3".into()],
            ..RuleSpec::default()
        },
        RuleSpec {
            category: "doc".into(),
            extensions: vec!["txt".into()],
            ..RuleSpec::default()
        },
    ])
    .unwrap()
}

fn unique(path: PathBuf) -> ClassifiedFile {
    ClassifiedFile::new(
        FileRecord::new(path, 1, Utc.timestamp_opt(0, 0).unwrap(), 0),
        Fingerprint::quick_only([0u8; 32]),
        Classification::Unique,
    )
}

fn context() -> PlanContext {
    PlanContext {
        root: "/nonexistent-volume".into(),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        source_batch_ids: vec!["batch_00001".into()],
    }
}

fn file_name() -> impl Strategy<Value = String> {
    // A tiny alphabet so derived names collide often
    (
        prop::sample::select(vec!["Notes", "notes", "copy of notes", "notes_v2", "Song", "song (1)"]),
        prop::sample::select(vec!["txt", "TXT", "mp3", "bin"]),
    )
        .prop_map(|(stem, ext)| format!("{stem}.{ext}"))
}

proptest! {
    #[test]
    fn test_full_hash_is_blake3_of_content(content in prop::collection::vec(any::<u8>(), 0..20_000)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.bin");
        fs::write(&path, &content).unwrap();

        let hasher = Hasher::new().with_chunk_size(4096);
        let full = hasher.full_hash(&path).unwrap();
        prop_assert_eq!(full, *blake3::hash(&content).as_bytes());
    }

    #[test]
    fn test_fingerprints_follow_content(
        a in prop::collection::vec(any::<u8>(), 1..9000),
        b in prop::collection::vec(any::<u8>(), 1..9000),
    ) {
        let dir = TempDir::new().unwrap();
        let pa = dir.path().join("a");
        let pa_copy = dir.path().join("a_copy");
        let pb = dir.path().join("b");
        fs::write(&pa, &a).unwrap();
        fs::write(&pa_copy, &a).unwrap();
        fs::write(&pb, &b).unwrap();

        let hasher = Hasher::new();
        prop_assert_eq!(hasher.quick_signature(&pa).unwrap(), hasher.quick_signature(&pa_copy).unwrap());
        prop_assert_eq!(hasher.full_hash(&pa).unwrap(), hasher.full_hash(&pa_copy).unwrap());
        if a != b {
            prop_assert_ne!(hasher.full_hash(&pa).unwrap(), hasher.full_hash(&pb).unwrap());
        }
    }

    #[test]
    fn test_plan_destinations_never_collide(
        files in prop::collection::vec(
            (prop::sample::select(vec!["a", "b", "a/deep"]), file_name()),
            1..40,
        )
    ) {
        let root = Path::new("/nonexistent-volume");
        let classified: Vec<ClassifiedFile> = files
            .iter()
            .map(|(dir, name)| unique(root.join(dir).join(name)))
            .collect();

        let plan = build_plan(&classified, &rules(), context()).unwrap();

        let sources: HashSet<&Path> = plan.actions.iter().map(|a| a.source.as_path()).collect();
        let mut destinations = HashSet::new();
        for action in &plan.actions {
            if let Some(ref destination) = action.destination {
                prop_assert!(destinations.insert(destination.clone()), "duplicate {}", destination);
                if let Some(path) = destination.path() {
                    prop_assert!(!sources.contains(path));
                }
            }
        }

        // Same input, same plan
        let again = build_plan(&classified, &rules(), context()).unwrap();
        prop_assert_eq!(plan, again);
    }
}
