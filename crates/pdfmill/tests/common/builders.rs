//! Test documents and fake collaborators.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lopdf::{dictionary, Document, Object};

use pdfmill::db::{Database, DatabaseError};
use pdfmill::processor::{
    EngineError, ExtractionEngine, FetchError, SourceFetcher, TuningOptions, ENGINE_ARTIFACTS,
};
use pdfmill::task::{NewTask, Phase, Status, Task, TaskStore};
use pdfmill::webhook::{Delivery, Notifier};

/// Builds a PDF whose pages have the given MediaBox sizes.
pub fn pdf_bytes(page_sizes: &[(i64, i64)], encrypted: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = page_sizes
        .iter()
        .map(|&(w, h)| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_sizes.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if encrypted {
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
        });
        doc.trailer.set("Encrypt", encrypt_id);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF");
    bytes
}

/// Two letter-sized pages.
pub fn letter_pdf() -> Vec<u8> {
    pdf_bytes(&[(612, 792), (612, 792)], false)
}

/// Builder for intake payloads.
pub struct TaskBuilder {
    file_id: String,
    file_url: String,
    finetune_args: String,
    callback_url: Option<String>,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            file_id: "contract-2026.v1".to_string(),
            file_url: "https://files.example.com/contract.pdf".to_string(),
            finetune_args: r#"{"parser_engine":"pipeline","target_language":"en"}"#.to_string(),
            callback_url: None,
        }
    }

    pub fn file_id(mut self, file_id: &str) -> Self {
        self.file_id = file_id.to_string();
        self
    }

    pub fn file_url(mut self, url: &str) -> Self {
        self.file_url = url.to_string();
        self
    }

    pub fn finetune_args(mut self, args: &str) -> Self {
        self.finetune_args = args.to_string();
        self
    }

    pub fn callback_url(mut self, url: &str) -> Self {
        self.callback_url = Some(url.to_string());
        self
    }

    pub fn build(self) -> NewTask {
        NewTask::new(
            &self.file_id,
            &self.file_url,
            &self.finetune_args,
            self.callback_url.as_deref(),
            chrono::Utc::now().fixed_offset(),
        )
        .expect("Invalid test task")
    }
}

/// Serves fixed bytes for every URL, or a fixed HTTP status.
pub struct StaticFetcher(pub Result<Vec<u8>, u16>);

impl SourceFetcher for StaticFetcher {
    fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, FetchError> {
        match &self.0 {
            Ok(bytes) => {
                std::fs::write(dest, bytes).map_err(|e| FetchError::Io {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
                Ok(bytes.len() as u64)
            }
            Err(status) => Err(FetchError::Status(*status)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum EngineBehavior {
    Succeed,
    OutOfMemory,
    DeviceUnavailable,
    Crash,
}

/// Writes the contract artifacts or fails the way a real engine would.
pub struct FakeEngine {
    pub behavior: EngineBehavior,
    pub seen: Arc<Mutex<Vec<TuningOptions>>>,
}

impl FakeEngine {
    pub fn new(behavior: EngineBehavior) -> Self {
        Self {
            behavior,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ExtractionEngine for FakeEngine {
    fn run(
        &mut self,
        input: &Path,
        output_dir: &Path,
        options: &TuningOptions,
    ) -> Result<(), EngineError> {
        self.seen.lock().unwrap().push(options.clone());
        match self.behavior {
            EngineBehavior::Succeed => {
                let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("doc");
                for artifact in ENGINE_ARTIFACTS {
                    std::fs::write(output_dir.join(artifact), format!("{{\"doc\":\"{}\"}}", stem))
                        .unwrap();
                }
                let images = output_dir.join("images");
                std::fs::create_dir_all(&images).unwrap();
                std::fs::write(images.join("p1.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
                Ok(())
            }
            EngineBehavior::OutOfMemory => Err(EngineError::OutOfMemory(
                "torch.OutOfMemoryError: CUDA out of memory".into(),
            )),
            EngineBehavior::DeviceUnavailable => Err(EngineError::DeviceUnavailable(
                "RuntimeError: No CUDA GPUs are available".into(),
            )),
            EngineBehavior::Crash => Err(EngineError::Other("segmentation fault".into())),
        }
    }
}

/// Counts notifications by terminal status.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<(String, Status)>>,
}

impl RecordingNotifier {
    pub fn statuses(&self) -> Vec<Status> {
        self.calls.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, task: &Task) -> Delivery {
        if task.callback_target().is_none() {
            return Delivery::Skipped;
        }
        self.calls
            .lock()
            .unwrap()
            .push((task.uuid.clone(), task.status));
        Delivery::Delivered { attempts: 1 }
    }
}

/// Store wrapper that keeps every committed `(status, result)` pair.
pub struct RecordingStore {
    inner: Arc<Database>,
    pub snapshots: Mutex<Vec<(Status, Phase)>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<Database>) -> Self {
        Self {
            inner,
            snapshots: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshots(&self) -> Vec<(Status, Phase)> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl TaskStore for RecordingStore {
    fn insert(&self, task: NewTask) -> Result<Task, DatabaseError> {
        self.inner.insert(task)
    }

    fn load(&self, id: i64) -> Result<Option<Task>, DatabaseError> {
        self.inner.load(id)
    }

    fn find_by_uuid(&self, uuid: &str) -> Result<Option<Task>, DatabaseError> {
        self.inner.find_by_uuid(uuid)
    }

    fn save(&self, task: &Task) -> Result<(), DatabaseError> {
        self.inner.save(task)?;
        self.snapshots.lock().unwrap().push((task.status, task.result));
        Ok(())
    }

    fn list_ids(&self, status: Status, limit: usize) -> Result<Vec<i64>, DatabaseError> {
        self.inner.list_ids(status, limit)
    }
}

/// Store wrapper whose first `failures` saves fail.
pub struct FlakyStore {
    inner: Arc<Database>,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<Database>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }

    pub fn remaining_failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl TaskStore for FlakyStore {
    fn insert(&self, task: NewTask) -> Result<Task, DatabaseError> {
        self.inner.insert(task)
    }

    fn load(&self, id: i64) -> Result<Option<Task>, DatabaseError> {
        self.inner.load(id)
    }

    fn find_by_uuid(&self, uuid: &str) -> Result<Option<Task>, DatabaseError> {
        self.inner.find_by_uuid(uuid)
    }

    fn save(&self, task: &Task) -> Result<(), DatabaseError> {
        let took_failure = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took_failure {
            return Err(DatabaseError::LockPoisoned);
        }
        self.inner.save(task)
    }

    fn list_ids(&self, status: Status, limit: usize) -> Result<Vec<i64>, DatabaseError> {
        self.inner.list_ids(status, limit)
    }
}
