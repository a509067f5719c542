//! Bulk ingestion
//!
//! Every `*.json` document in the data directory is a task. Each item is
//! matched to a local chart image, the image is uploaded to object storage
//! when a client is configured, and the record is upserted into the store.
//! A failing item is logged and collected; the run carries on.

pub mod image_index;
pub mod uploader;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::aliases::AliasTable;
use crate::config::IngestConfig;
use crate::images::ImageResolver;
use crate::loader::{document_entries, read_document, record_from_item, task_name_from_path};
use crate::store::RecordStore;

pub use image_index::{storage_key, ImageIndex, LocalImage};
pub use uploader::{ObjectStorageClient, RetryPolicy};

/// Payload keys the uploaded image URL is written to
pub const IMAGE_URL_KEYS: [&str; 2] = ["pdf_image_url", "chart_image_url"];

/// One item that could not be ingested
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestFailure {
    pub task: String,
    #[serde(rename = "exampleId")]
    pub example_id: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub tasks: Vec<String>,
    pub records: usize,
    pub uploaded: usize,
    pub without_image: usize,
    pub failures: Vec<IngestFailure>,
}

pub struct Ingestor {
    store: Arc<dyn RecordStore>,
    aliases: AliasTable,
    config: IngestConfig,
    prefix: String,
    resolver: ImageResolver,
    uploader: Option<ObjectStorageClient>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        aliases: AliasTable,
        config: IngestConfig,
        prefix: &str,
        resolver: ImageResolver,
        uploader: Option<ObjectStorageClient>,
    ) -> Self {
        Self {
            store,
            aliases,
            config,
            prefix: prefix.to_string(),
            resolver,
            uploader,
        }
    }

    /// Ingest every task document in `data_dir`
    pub async fn run(&self, data_dir: &Path) -> Result<IngestReport> {
        let documents = task_documents(data_dir).await?;
        if documents.is_empty() {
            bail!("No JSON files under {}", data_dir.display());
        }

        let index = ImageIndex::build(&self.config.image_root, &self.config.extensions);
        info!(
            "Indexed {} chart images under {}",
            index.file_count(),
            index.root().display()
        );
        if self.uploader.is_none() {
            info!("No object storage client; images are referenced locally");
        }

        let mut report = IngestReport::default();
        for path in documents {
            let Some(task) = task_name_from_path(&path) else {
                continue;
            };
            let doc = read_document(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let entries = document_entries(&doc, &self.aliases)
                .with_context(|| format!("Unsupported document {}", path.display()))?;
            info!("Ingesting task {} ({} items)", task, entries.len());

            for (i, (example_id, item)) in entries.into_iter().enumerate() {
                match self.ingest_item(&task, &example_id, item, &index).await {
                    Ok(uploaded) => {
                        report.records += 1;
                        match uploaded {
                            Some(true) => report.uploaded += 1,
                            Some(false) => {}
                            None => report.without_image += 1,
                        }
                    }
                    Err(e) => {
                        error!("[FAIL] {}/{}: {:#}", task, example_id, e);
                        report.failures.push(IngestFailure {
                            task: task.clone(),
                            example_id,
                            error: format!("{:#}", e),
                        });
                    }
                }

                if self.config.pause_every > 0 && i > 0 && i % self.config.pause_every == 0 {
                    tokio::time::sleep(Duration::from_millis(self.config.pause_ms)).await;
                }
            }
            report.tasks.push(task);
        }

        Ok(report)
    }

    /// `Some(true)` uploaded, `Some(false)` local image only, `None` no image
    async fn ingest_item(
        &self,
        task: &str,
        example_id: &str,
        mut item: Value,
        index: &ImageIndex,
    ) -> Result<Option<bool>> {
        let image = index.resolve(task, example_id, &item, &self.aliases);

        let mut image_ref = None;
        let mut uploaded = None;
        if let Some(image) = &image {
            match &self.uploader {
                Some(client) => {
                    let key = storage_key(&self.prefix, image);
                    client.upload(&image.path, &key).await?;
                    if self.config.embed_image_urls {
                        if let (Some(url), Some(map)) = (self.resolver.public_url(&key), item.as_object_mut()) {
                            for field in IMAGE_URL_KEYS {
                                map.insert(field.to_string(), Value::String(url.clone()));
                            }
                        }
                    }
                    image_ref = Some(key);
                    uploaded = Some(true);
                    tokio::time::sleep(Duration::from_millis(self.config.throttle_ms)).await;
                }
                None => {
                    image_ref = Some(image.relative.clone());
                    uploaded = Some(false);
                }
            }
        }

        let mut record = record_from_item(task, example_id, item, &self.aliases);
        if image_ref.is_some() {
            record.image_ref = image_ref;
        }
        let label = record.image_ref.clone();
        self.store.upsert_source(record).await?;

        match label {
            Some(r) => info!("[OK] {}/{} -> {}", task, example_id, r),
            None => info!("[OK] {}/{} (no chart image)", task, example_id),
        }
        Ok(uploaded)
    }
}

/// Source documents in `data_dir`, sorted; working snapshots are skipped
pub async fn task_documents(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    let mut dir = tokio::fs::read_dir(data_dir)
        .await
        .with_context(|| format!("Failed to read {}", data_dir.display()))?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".json") && !name.ends_with(".working.json") {
            documents.push(entry.path());
        }
    }
    documents.sort();
    Ok(documents)
}

/// Write the failure side log; nothing is written when there were none
pub async fn write_failures(path: &Path, failures: &[IngestFailure]) -> Result<bool> {
    if failures.is_empty() {
        return Ok(false);
    }
    let body = serde_json::to_string_pretty(failures)?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    warn!("Failed {} items. See {}", failures.len(), path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonFileStore;
    use serde_json::json;
    use tempfile::tempdir;

    fn ingestor(store: Arc<JsonFileStore>, image_root: PathBuf) -> Ingestor {
        let config = IngestConfig {
            image_root,
            throttle_ms: 0,
            pause_ms: 0,
            ..IngestConfig::default()
        };
        Ingestor::new(
            store,
            AliasTable::default(),
            config,
            "chart-only",
            ImageResolver::local(),
            None,
        )
    }

    #[tokio::test]
    async fn test_ingest_without_uploads() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let images = dir.path().join("images");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::create_dir_all(images.join("bar")).unwrap();
        std::fs::write(images.join("bar").join("bar-0.png"), b"png").unwrap();
        std::fs::write(
            data.join("bar.json"),
            r#"[{"custom_id": "bar-0", "question": "a"}, {"custom_id": "bar-1", "question": "b"}]"#,
        )
        .unwrap();

        let store = Arc::new(JsonFileStore::in_memory());
        let report = ingestor(store.clone(), images).run(&data).await.unwrap();
        assert_eq!(report.tasks, vec!["bar"]);
        assert_eq!(report.records, 2);
        assert_eq!(report.without_image, 1);
        assert!(report.failures.is_empty());

        let records = store.scan_by_task("bar").await.unwrap();
        assert_eq!(records[0].image_ref.as_deref(), Some("bar/bar-0.png"));
        assert_eq!(records[1].image_ref, None);
        assert_eq!(records[1].position, 1);
    }

    #[tokio::test]
    async fn test_reingest_keeps_annotations() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("line.json"), r#"{"line-0": {"question": "a"}}"#).unwrap();

        let store = Arc::new(JsonFileStore::in_memory());
        let ingestor = ingestor(store.clone(), dir.path().join("no-images"));
        ingestor.run(dir.path()).await.unwrap();
        store
            .update(
                "line",
                "line-0",
                Box::new(|r: &mut crate::types::ExampleRecord| {
                    r.human_prediction = Some("7".to_string());
                    Ok(())
                }),
            )
            .await
            .unwrap();

        std::fs::write(dir.path().join("line.json"), r#"{"line-0": {"question": "edited"}}"#).unwrap();
        ingestor.run(dir.path()).await.unwrap();

        let record = store.get("line", "line-0").await.unwrap().unwrap();
        assert_eq!(record.question.as_deref(), Some("edited"));
        assert_eq!(record.human_prediction.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_failures_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("upload_failures.json");
        assert!(!write_failures(&path, &[]).await.unwrap());
        assert!(!path.exists());

        let failures = vec![IngestFailure {
            task: "bar".to_string(),
            example_id: "bar-3".to_string(),
            error: "storage returned 500".to_string(),
        }];
        assert!(write_failures(&path, &failures).await.unwrap());
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            written,
            json!([{ "task": "bar", "exampleId": "bar-3", "error": "storage returned 500" }])
        );
    }

    #[tokio::test]
    async fn test_empty_data_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonFileStore::in_memory());
        assert!(ingestor(store, dir.path().to_path_buf()).run(dir.path()).await.is_err());
    }
}
