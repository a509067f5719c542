//! Record stores
//!
//! The annotation core only talks to [`RecordStore`]. Two backends ship:
//! - `json`: one source document per task on disk, held in memory
//! - `sqlite`: an `examples` table keyed by (task, example_id)

pub mod json;
pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::error::AnnotateResult;
use crate::types::ExampleRecord;

pub use json::JsonFileStore;
pub use sqlite::SqliteRecordStore;

/// A patch applied atomically to one record.
///
/// If it returns an error the stored record is left untouched.
pub type RecordPatch = Box<dyn FnOnce(&mut ExampleRecord) -> AnnotateResult<()> + Send>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for status output
    fn backend_name(&self) -> &'static str;

    /// Known task names, sorted
    async fn list_tasks(&self) -> AnnotateResult<Vec<String>>;

    async fn get(&self, task: &str, example_id: &str) -> AnnotateResult<Option<ExampleRecord>>;

    /// Insert or replace a record as given
    async fn put(&self, record: ExampleRecord) -> AnnotateResult<()>;

    /// All records of a task in stable order; unknown task is `NotFound`
    async fn scan_by_task(&self, task: &str) -> AnnotateResult<Vec<ExampleRecord>>;

    /// Read-modify-write one record without interleaving other writes to it.
    /// Returns the stored result; absent record is `NotFound`.
    async fn update(&self, task: &str, example_id: &str, patch: RecordPatch) -> AnnotateResult<ExampleRecord>;

    /// Position the next new record of `task` will take
    async fn next_position(&self, task: &str) -> AnnotateResult<u64>;

    /// Ingestion upsert on (task, example_id).
    ///
    /// A new record is appended to the task order. An existing one gets the
    /// incoming payload and derived fields but keeps its position, and keeps
    /// its annotation state when that state is already terminal.
    async fn upsert_source(&self, mut record: ExampleRecord) -> AnnotateResult<()> {
        match self.get(&record.task, &record.example_id).await? {
            Some(existing) => {
                record.position = existing.position;
                if existing.is_completed() || !record.is_completed() {
                    record.missing_information = existing.missing_information;
                    record.human_prediction = existing.human_prediction;
                    record.updated_at = existing.updated_at;
                }
            }
            None => {
                record.position = self.next_position(&record.task).await?;
            }
        }
        self.put(record).await
    }
}

/// Open the store the config names
pub async fn open(config: &Config) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Json => {
            let store = JsonFileStore::open(
                &config.store.data_dir,
                config.store.snapshot_on_submit,
                &config.aliases,
            )
            .await
            .with_context(|| format!("Failed to load tasks from {}", config.store.data_dir.display()))?;
            Arc::new(store)
        }
        StoreBackend::Sqlite => {
            let path = config.store.database_path()?;
            let store = SqliteRecordStore::new(&path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            Arc::new(store)
        }
    };
    info!("Opened {} record store", store.backend_name());
    Ok(store)
}
