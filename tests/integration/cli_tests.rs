use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use volclean::cli::Cli;
use volclean::error::ExitCode;

use super::common::Volumes;

/// Run `volclean` quietly against the volumes' work dir and an empty config.
fn run(vols: &Volumes, args: &[&str]) -> anyhow::Result<ExitCode> {
    let config = vols.work.path().join("config.toml");
    if !config.exists() {
        fs::write(&config, "").unwrap();
    }
    let mut argv = vec![
        "volclean".to_string(),
        "-q".to_string(),
        "--no-progress".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--work-dir".to_string(),
        vols.work.path().join("state").display().to_string(),
    ];
    argv.extend(args.iter().map(|s| s.to_string()));
    volclean::run_app(Cli::try_parse_from(argv).unwrap())
}

fn only_plan(vols: &Volumes) -> PathBuf {
    let dir = vols.work.path().join("state").join("plans");
    let mut plans: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(plans.len(), 1);
    plans.remove(0)
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_full_pipeline_through_cli() {
    let vols = Volumes::new();
    vols.master_file("x.bin", "hash A content");
    vols.external_file("file1", "hash A content");
    vols.external_file("file2", "hash C content");
    let master = path_arg(vols.master.path());
    let external = path_arg(vols.external.path());

    assert_eq!(run(&vols, &["index", &master]).unwrap(), ExitCode::Success);
    assert_eq!(
        run(&vols, &["scan", &external, "--batch-size", "1"]).unwrap(),
        ExitCode::Success
    );

    let csv = vols.work.path().join("plan.csv");
    assert_eq!(
        run(&vols, &["plan", &external, "--output", &path_arg(&csv)]).unwrap(),
        ExitCode::Success
    );
    let plan = path_arg(&only_plan(&vols));
    let csv_text = fs::read_to_string(&csv).unwrap();
    assert!(csv_text.lines().nth(1).unwrap().starts_with("DELETE,"));

    assert_eq!(run(&vols, &["dry-run", &plan]).unwrap(), ExitCode::Success);
    assert!(vols.external.path().join("file1").exists());

    assert_eq!(run(&vols, &["execute", &plan, "--yes"]).unwrap(), ExitCode::Success);
    assert!(!vols.external.path().join("file1").exists());
    assert!(vols.external.path().join("file2").exists());

    // Re-running the same plan only skips
    assert_eq!(run(&vols, &["execute", &plan, "--yes"]).unwrap(), ExitCode::Success);

    // Planning the same reports again reproduces the stored plan
    assert_eq!(run(&vols, &["plan", &external]).unwrap(), ExitCode::Success);
    assert_eq!(path_arg(&only_plan(&vols)), plan);
}

#[test]
fn test_scan_without_index_is_an_error() {
    let vols = Volumes::new();
    vols.external_file("a", "a");
    let err = run(&vols, &["scan", &path_arg(vols.external.path())]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
    assert!(format!("{err:#}").contains("master index"));
}

#[test]
fn test_plan_without_reports_is_an_error() {
    let vols = Volumes::new();
    vols.external_file("a", "a");
    assert!(run(&vols, &["plan", &path_arg(vols.external.path())]).is_err());
}

#[test]
fn test_invalid_batch_size_is_rejected() {
    let vols = Volumes::new();
    vols.master_file("x", "x");
    run(&vols, &["index", &path_arg(vols.master.path())]).unwrap();
    let err = run(
        &vols,
        &["scan", &path_arg(vols.external.path()), "--batch-size", "0"],
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("batch_size"));
}

#[test]
fn test_corrupt_index_is_fatal() {
    let vols = Volumes::new();
    vols.master_file("x", "x");
    vols.external_file("y", "y");
    run(&vols, &["index", &path_arg(vols.master.path())]).unwrap();

    let index = vols.work.path().join("state/index/master_index.json");
    let text = fs::read_to_string(&index).unwrap();
    fs::write(&index, text.replacen("\"size\"", "\"sizes\"", 1)).unwrap();

    let err = run(&vols, &["scan", &path_arg(vols.external.path())]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
    assert!(format!("{err:#}").contains("corrupt"));
}
