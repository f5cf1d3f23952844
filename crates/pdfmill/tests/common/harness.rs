//! Test harness for isolated orchestrator runs.
//!
//! The `TestHarness` struct provides:
//! - A temporary instance directory with the `cache/` and `archives/` layout
//! - An in-memory task store
//! - Orchestrators wired to fake or real collaborators

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use pdfmill::db::Database;
use pdfmill::pipeline::{Orchestrator, PipelineConfig};
use pdfmill::processor::{ExtractionEngine, Limits, PdfGate, SourceFetcher};
use pdfmill::storage::InstanceLayout;
use pdfmill::task::{NewTask, Task, TaskStore};
use pdfmill::webhook::Notifier;

use super::builders::RecordingNotifier;

/// Isolated instance directory plus task store.
pub struct TestHarness {
    temp_dir: TempDir,
    pub layout: InstanceLayout,
    pub db: Arc<Database>,
    pub notifier: Arc<RecordingNotifier>,
    pub notify_on_failure: bool,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let layout = InstanceLayout::new(temp_dir.path());
        Self {
            temp_dir,
            layout,
            db: Arc::new(Database::open_in_memory().expect("Failed to open database")),
            notifier: Arc::new(RecordingNotifier::default()),
            notify_on_failure: false,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pipeline_config(&self) -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig {
            layout: self.layout.clone(),
            timezone: chrono_tz::Asia::Shanghai,
            limits: Limits::default(),
            notify_on_failure: self.notify_on_failure,
        })
    }

    /// Orchestrator over the harness store and recording notifier.
    pub fn orchestrator(
        &self,
        fetcher: impl SourceFetcher + 'static,
        engine: impl ExtractionEngine + 'static,
    ) -> Orchestrator {
        self.orchestrator_with(self.db.clone(), Arc::new(fetcher), engine, self.notifier.clone())
    }

    pub fn orchestrator_with(
        &self,
        store: Arc<dyn TaskStore>,
        fetcher: Arc<dyn SourceFetcher>,
        engine: impl ExtractionEngine + 'static,
        notifier: Arc<dyn Notifier>,
    ) -> Orchestrator {
        Orchestrator::new(
            self.pipeline_config(),
            store,
            fetcher,
            Arc::new(PdfGate::new(Limits::default())),
            Box::new(engine),
            notifier,
        )
    }

    pub fn submit(&self, task: NewTask) -> Task {
        self.db.insert(task).expect("Failed to insert task")
    }

    pub fn reload(&self, id: i64) -> Task {
        self.db
            .load(id)
            .expect("Failed to load task")
            .expect("Task disappeared")
    }

    /// Entries currently under `cache/`.
    pub fn cache_entries(&self) -> Vec<String> {
        list_names(&self.layout.cache_root())
    }

    /// Day directories currently under `archives/`.
    pub fn archive_days(&self) -> Vec<String> {
        list_names(&self.layout.archive_root())
    }
}

fn list_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
