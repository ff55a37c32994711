use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use volclean::batch::{BatchError, BatchReport, RunRequest, ScanProgress};
use volclean::progress::ProgressCallback;

use super::common::Volumes;

/// Requests shutdown when the `trip_at`-th quick-signature phase starts.
struct TripWire {
    flag: Arc<AtomicBool>,
    quick_phases: AtomicUsize,
    trip_at: usize,
}

impl ProgressCallback for TripWire {
    fn on_phase_start(&self, phase: &str, _total: usize) {
        if phase == "quick" && self.quick_phases.fetch_add(1, Ordering::SeqCst) + 1 == self.trip_at {
            self.flag.store(true, Ordering::SeqCst);
        }
    }

    fn on_progress(&self, _current: usize, _path: &str) {}

    fn on_phase_end(&self, _phase: &str) {}
}

fn populate(vols: &Volumes) {
    vols.master_file("a.dat", "alpha");
    vols.master_file("b.dat", "bravo");
    for i in 0..9 {
        // Every third file repeats master content
        let content = match i % 3 {
            0 => "alpha".to_string(),
            1 => format!("unique {i}"),
            _ => "bravo".to_string(),
        };
        vols.external_file(&format!("f{i:02}.dat"), &content);
    }
}

/// (duplicate, kept copy) file names; the volumes differ between runs.
fn duplicate_set(reports: &[BatchReport]) -> BTreeSet<(String, String)> {
    reports
        .iter()
        .flat_map(|r| r.duplicates())
        .map(|f| {
            let kept = f.classification.duplicate_of().and_then(Path::file_name);
            (
                f.record.file_name(),
                kept.map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            )
        })
        .collect()
}

#[test]
fn test_interrupted_scan_resumes_to_same_result() {
    let straight = Volumes::new();
    populate(&straight);
    let index = straight.build_index();
    let summary = straight.scan(&index, 2);
    assert!(summary.completed);
    assert_eq!(summary.batches.len(), 5);

    let interrupted = Volumes::new();
    populate(&interrupted);
    let index = interrupted.build_index();
    let flag = Arc::new(AtomicBool::new(false));
    let wire = Arc::new(TripWire {
        flag: Arc::clone(&flag),
        quick_phases: AtomicUsize::new(0),
        trip_at: 3,
    });

    let first = interrupted
        .coordinator()
        .with_shutdown_flag(Arc::clone(&flag))
        .with_progress_callback(wire)
        .run(interrupted.external.path(), &index, &RunRequest::resume(2))
        .unwrap();
    assert!(first.interrupted);
    assert!(!first.completed);
    // Batch 3 was abandoned mid-fingerprinting: nothing written for it
    assert_eq!(first.batches.len(), 2);
    assert_eq!(first.next_start_index, 4);
    let root = interrupted.external_root();
    assert!(!interrupted.layout().batch_report_path(&root, 3).exists());
    let checkpoint = ScanProgress::load(&interrupted.layout().progress_path(&root))
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.next_start_index, 4);
    assert_eq!(checkpoint.last_batch_number, 2);

    // A new process picks up at batch 3
    let second = interrupted.scan(&index, 2);
    assert!(second.completed);
    assert_eq!(second.batches.first().map(|b| b.batch_number), Some(3));
    assert_eq!(second.batches.len(), 3);

    let expected = duplicate_set(&straight.reports());
    assert_eq!(expected.len(), 6);
    assert_eq!(duplicate_set(&interrupted.reports()), expected);
}

#[test]
fn test_shutdown_before_first_batch_writes_nothing() {
    let vols = Volumes::new();
    populate(&vols);
    let index = vols.build_index();
    let flag = Arc::new(AtomicBool::new(true));

    let err = vols
        .coordinator()
        .with_shutdown_flag(flag)
        .run(vols.external.path(), &index, &RunRequest::resume(2))
        .unwrap_err();
    assert!(matches!(err, BatchError::Interrupted));
    assert!(vols.reports().is_empty());
    assert!(!vols.layout().progress_path(&vols.external_root()).exists());
}

#[test]
fn test_explicit_batch_reprocesses_without_moving_checkpoint() {
    let vols = Volumes::new();
    populate(&vols);
    let index = vols.build_index();
    vols.coordinator()
        .run(
            vols.external.path(),
            &index,
            &RunRequest {
                count: Some(2),
                ..RunRequest::resume(2)
            },
        )
        .unwrap();

    let again = vols
        .coordinator()
        .run(
            vols.external.path(),
            &index,
            &RunRequest {
                start_batch: Some(1),
                count: Some(1),
                ..RunRequest::resume(2)
            },
        )
        .unwrap();
    assert_eq!(again.batches[0].batch_number, 1);

    let checkpoint = ScanProgress::load(&vols.layout().progress_path(&vols.external_root()))
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.next_start_index, 4);
}
