#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use volclean::actions::{ExecuteOptions, PlanExecutor};
use volclean::batch::{BatchCoordinator, BatchReport, RunRequest, RunSummary};
use volclean::index::{IndexBuilder, MasterIndex};
use volclean::plan::{build_plan_from_reports, ActionPlan, PurposeRules};
use volclean::scanner::ScanConfig;
use volclean::workspace::WorkLayout;

/// Trusted storage, an external drive and a work directory.
pub struct Volumes {
    pub master: TempDir,
    pub external: TempDir,
    pub work: TempDir,
}

impl Volumes {
    pub fn new() -> Self {
        Self {
            master: TempDir::new().unwrap(),
            external: TempDir::new().unwrap(),
            work: TempDir::new().unwrap(),
        }
    }

    pub fn master_file(&self, name: &str, content: &str) -> PathBuf {
        write(self.master.path(), name, content)
    }

    pub fn external_file(&self, name: &str, content: &str) -> PathBuf {
        write(self.external.path(), name, content)
    }

    pub fn external_root(&self) -> PathBuf {
        self.external.path().canonicalize().unwrap()
    }

    pub fn layout(&self) -> WorkLayout {
        WorkLayout::new(self.work.path())
    }

    pub fn build_index(&self) -> Arc<MasterIndex> {
        let (index, _) = IndexBuilder::new(ScanConfig::default())
            .build(&[self.master.path().to_path_buf()])
            .unwrap();
        index.save(&self.layout().index_path()).unwrap();
        Arc::new(index)
    }

    pub fn coordinator(&self) -> BatchCoordinator {
        BatchCoordinator::new(self.layout(), ScanConfig::default(), 2, 64 * 1024).unwrap()
    }

    pub fn scan(&self, index: &Arc<MasterIndex>, batch_size: usize) -> RunSummary {
        self.coordinator()
            .run(self.external.path(), index, &RunRequest::resume(batch_size))
            .unwrap()
    }

    pub fn reports(&self) -> Vec<BatchReport> {
        volclean::batch::load_reports(&self.layout(), &self.external_root()).unwrap()
    }

    pub fn plan(&self, rules: &PurposeRules) -> ActionPlan {
        build_plan_from_reports(&self.reports(), rules).unwrap()
    }

    pub fn executor(&self, options: ExecuteOptions) -> PlanExecutor {
        PlanExecutor::new(self.layout(), options)
    }
}

pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}
