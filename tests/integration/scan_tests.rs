use std::fs;

use filetime::FileTime;
use volclean::duplicates::Classification;
use volclean::scanner::{ScanConfig, Walker};

use super::common::Volumes;

#[test]
fn test_scan_classifies_against_master_and_batch() {
    let vols = Volumes::new();
    let kept = vols.master_file("photos/beach.jpg", "beach pixels");
    vols.external_file("dcim/IMG_0001.jpg", "beach pixels");
    vols.external_file("dcim/IMG_0002.jpg", "sunset pixels");
    vols.external_file("copy/IMG_0002.jpg", "sunset pixels");
    let index = vols.build_index();

    let summary = vols.scan(&index, 100);
    assert!(summary.completed);
    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.duplicates_found(), 2);

    let reports = vols.reports();
    assert_eq!(reports.len(), 1);
    let kept = kept.canonicalize().unwrap();
    let root = vols.external_root();

    let by_path = |rel: &str| {
        reports[0]
            .files
            .iter()
            .find(|f| f.record.path == root.join(rel))
            .unwrap()
            .classification
            .clone()
    };
    assert_eq!(
        by_path("dcim/IMG_0001.jpg"),
        Classification::MasterDuplicate { of: kept }
    );
    // Enumeration is sorted, so copy/ comes before dcim/
    assert_eq!(by_path("copy/IMG_0002.jpg"), Classification::Unique);
    assert_eq!(
        by_path("dcim/IMG_0002.jpg"),
        Classification::BatchDuplicate {
            of: root.join("copy/IMG_0002.jpg")
        }
    );
}

#[test]
fn test_duplicate_csv_lists_kept_copy() {
    let vols = Volumes::new();
    let kept = vols.master_file("x.bin", "payload");
    vols.external_file("y.bin", "payload");
    let index = vols.build_index();
    vols.scan(&index, 10);

    let csv_path = vols.layout().batch_csv_path(&vols.external_root(), 1);
    let content = fs::read_to_string(csv_path).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("external_path,master_path,size,filename,suggested_action")
    );
    let row = lines.next().unwrap();
    assert!(row.contains(&kept.canonicalize().unwrap().display().to_string()));
    assert!(row.ends_with(",7,y.bin,DELETE"));
    assert!(lines.next().is_none());
}

#[test]
fn test_exclusions_prune_directories() {
    let vols = Volumes::new();
    vols.external_file("keep/a.txt", "a");
    vols.external_file("node_modules/pkg/index.js", "js");
    vols.external_file("keep/.DS_Store", "junk");
    vols.external_file("_backups/old.txt", "old");

    let config = ScanConfig::default().with_exclude(vec![
        "node_modules/".into(),
        "_backups/".into(),
        ".DS_Store".into(),
    ]);
    let walker = Walker::new(vols.external.path(), 0, config).unwrap();
    let (files, errors) = walker.collect_files();

    assert!(errors.is_empty());
    let names: Vec<String> = files.iter().map(|f| f.file_name()).collect();
    assert_eq!(names, vec!["a.txt"]);
}

#[test]
fn test_records_carry_modification_time() {
    let vols = Volumes::new();
    let path = vols.external_file("dated.txt", "dated");
    filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let walker = Walker::new(vols.external.path(), 0, ScanConfig::default()).unwrap();
    let (files, _) = walker.collect_files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].modified.timestamp(), 1_600_000_000);
    assert_eq!(files[0].size, 5);
}

#[test]
fn test_empty_files_are_not_enumerated() {
    let vols = Volumes::new();
    vols.master_file("placeholder", "");
    vols.master_file("real.txt", "real");
    vols.external_file("empty_a", "");
    vols.external_file("empty_b", "");
    vols.external_file("real.txt", "real");
    let index = vols.build_index();
    assert_eq!(index.len(), 1);

    let summary = vols.scan(&index, 10);
    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.duplicates_found(), 1);
}
