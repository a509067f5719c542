//! JSON-file record store
//!
//! Every `*.json` file in the data directory is one task (file stem, lower
//! cased). Records live in memory in document order. With
//! `snapshot_on_submit`, each write also persists `<stem>.working.json`, and
//! that snapshot is preferred over the pristine file on the next start.
//! Snapshots are written to a sibling temp file and renamed into place, and
//! memory only changes once the snapshot has been written.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{RecordPatch, RecordStore};
use crate::aliases::AliasTable;
use crate::annotation::export::export_records;
use crate::error::{AnnotateError, AnnotateResult};
use crate::loader::{load_document, read_document, task_name_from_path};
use crate::types::{normalize_task, ExampleRecord};

const SNAPSHOT_SUFFIX: &str = ".working.json";
const PARTIAL_SUFFIX: &str = ".tmp";

#[derive(Debug, Default, Clone)]
struct TaskEntry {
    records: Vec<ExampleRecord>,
    index: HashMap<String, usize>,
    snapshot_path: Option<PathBuf>,
}

impl TaskEntry {
    fn with_records(records: Vec<ExampleRecord>, snapshot_path: Option<PathBuf>) -> Self {
        let mut entry = Self {
            records: Vec::new(),
            index: HashMap::new(),
            snapshot_path,
        };
        for record in records {
            entry.upsert(record);
        }
        entry
    }

    fn upsert(&mut self, record: ExampleRecord) {
        match self.index.get(&record.example_id) {
            Some(&idx) => self.records[idx] = record,
            None => {
                self.index.insert(record.example_id.clone(), self.records.len());
                self.records.push(record);
            }
        }
        // Keep the vector in position order; ties keep insertion order
        if self.records.windows(2).any(|w| w[0].position > w[1].position) {
            self.records.sort_by_key(|r| r.position);
            self.reindex();
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.example_id.clone(), i))
            .collect();
    }
}

/// In-memory store backed by per-task JSON documents
#[derive(Debug, Default)]
pub struct JsonFileStore {
    tasks: RwLock<BTreeMap<String, TaskEntry>>,
}

impl JsonFileStore {
    /// Empty store with no files behind it
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load every task document in `data_dir`
    pub async fn open(data_dir: &Path, snapshot_on_submit: bool, aliases: &AliasTable) -> AnnotateResult<Self> {
        if !tokio::fs::try_exists(data_dir).await? {
            return Err(AnnotateError::Store(format!(
                "data directory not found: {}",
                data_dir.display()
            )));
        }

        let mut sources: Vec<PathBuf> = Vec::new();
        let mut dir = tokio::fs::read_dir(data_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json") && !name.ends_with(SNAPSHOT_SUFFIX) {
                sources.push(path);
            }
        }
        sources.sort();

        let mut tasks = BTreeMap::new();
        for source in sources {
            let Some(task) = task_name_from_path(&source) else {
                continue;
            };
            let snapshot = snapshot_path_for(&source);
            let path = if snapshot_on_submit && tokio::fs::try_exists(&snapshot).await? {
                info!("Resuming task {} from {}", task, snapshot.display());
                snapshot.clone()
            } else {
                source.clone()
            };

            let doc = read_document(&path).await?;
            let records = load_document(&task, &doc, aliases)?;
            info!("Loaded task {} ({} examples)", task, records.len());
            if tasks.contains_key(&task) {
                warn!("Task {} defined twice, keeping {}", task, source.display());
            }
            tasks.insert(
                task,
                TaskEntry::with_records(records, snapshot_on_submit.then_some(snapshot)),
            );
        }

        Ok(Self {
            tasks: RwLock::new(tasks),
        })
    }

    /// Replace a whole task with freshly loaded records
    pub async fn insert_task(&self, task: &str, records: Vec<ExampleRecord>) {
        let mut tasks = self.tasks.write().await;
        tasks.insert(normalize_task(task), TaskEntry::with_records(records, None));
    }
}

fn snapshot_path_for(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    source.with_file_name(format!("{}{}", stem, SNAPSHOT_SUFFIX))
}

async fn write_snapshot(path: &Path, records: &[ExampleRecord]) -> AnnotateResult<()> {
    let docs = export_records(records, false);
    let body = serde_json::to_string_pretty(&serde_json::Value::Object(docs))?;

    let mut partial = path.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);
    tokio::fs::write(&partial, body).await?;
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            warn!("Failed to remove {}: {}", partial.display(), cleanup);
        }
        return Err(e.into());
    }
    debug!("Wrote snapshot {}", path.display());
    Ok(())
}

#[async_trait]
impl RecordStore for JsonFileStore {
    fn backend_name(&self) -> &'static str {
        "json"
    }

    async fn list_tasks(&self) -> AnnotateResult<Vec<String>> {
        Ok(self.tasks.read().await.keys().cloned().collect())
    }

    async fn get(&self, task: &str, example_id: &str) -> AnnotateResult<Option<ExampleRecord>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&normalize_task(task)).and_then(|entry| {
            entry
                .index
                .get(example_id)
                .map(|&idx| entry.records[idx].clone())
        }))
    }

    async fn put(&self, mut record: ExampleRecord) -> AnnotateResult<()> {
        record.task = normalize_task(&record.task);
        let mut tasks = self.tasks.write().await;
        let task = record.task.clone();
        let mut staged = tasks.get(&task).cloned().unwrap_or_default();
        staged.upsert(record);
        if let Some(path) = &staged.snapshot_path {
            write_snapshot(path, &staged.records).await?;
        }
        tasks.insert(task, staged);
        Ok(())
    }

    async fn scan_by_task(&self, task: &str) -> AnnotateResult<Vec<ExampleRecord>> {
        let tasks = self.tasks.read().await;
        tasks
            .get(&normalize_task(task))
            .map(|entry| entry.records.clone())
            .ok_or_else(|| AnnotateError::task_not_found(task))
    }

    async fn update(&self, task: &str, example_id: &str, patch: RecordPatch) -> AnnotateResult<ExampleRecord> {
        let task = normalize_task(task);
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(&task)
            .ok_or_else(|| AnnotateError::task_not_found(&task))?;
        let idx = *entry
            .index
            .get(example_id)
            .ok_or_else(|| AnnotateError::example_not_found(&task, example_id))?;

        let mut updated = entry.records[idx].clone();
        patch(&mut updated)?;
        if let Some(path) = &entry.snapshot_path {
            let mut staged = entry.records.clone();
            staged[idx] = updated.clone();
            write_snapshot(path, &staged).await?;
        }
        entry.records[idx] = updated.clone();
        Ok(updated)
    }

    async fn next_position(&self, task: &str) -> AnnotateResult<u64> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .get(&normalize_task(task))
            .and_then(|entry| entry.records.iter().map(|r| r.position + 1).max())
            .unwrap_or(0))
    }
}
