//! SQLite-backed record store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use super::{RecordPatch, RecordStore};
use crate::error::{AnnotateError, AnnotateResult};
use crate::types::{normalize_task, AnswerOption, ExampleRecord};

const SELECT_COLUMNS: &str = "task, example_id, position, question, context, options, image_path,
     json_blob, human_prediction, missing_information, updated_at";

/// Store keeping one row per (task, example_id) in an `examples` table
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

/// Raw column values before JSON decoding
struct ExampleRow {
    task: String,
    example_id: String,
    position: i64,
    question: Option<String>,
    context: Option<String>,
    options: Option<String>,
    image_path: Option<String>,
    json_blob: String,
    human_prediction: Option<String>,
    missing_information: bool,
    updated_at: Option<String>,
}

impl ExampleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task: row.get(0)?,
            example_id: row.get(1)?,
            position: row.get(2)?,
            question: row.get(3)?,
            context: row.get(4)?,
            options: row.get(5)?,
            image_path: row.get(6)?,
            json_blob: row.get(7)?,
            human_prediction: row.get(8)?,
            missing_information: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_record(self) -> AnnotateResult<ExampleRecord> {
        let options: Option<Vec<AnswerOption>> = match self.options {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        let updated_at = match self.updated_at.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(at)) => Some(at.with_timezone(&Utc)),
            Some(Err(e)) => {
                warn!(
                    "Ignoring unparseable updated_at on {}/{}: {}",
                    self.task, self.example_id, e
                );
                None
            }
            None => None,
        };
        Ok(ExampleRecord {
            task: self.task,
            example_id: self.example_id,
            position: self.position.max(0) as u64,
            question: self.question,
            context: self.context,
            options,
            image_ref: self.image_path,
            raw_payload: serde_json::from_str(&self.json_blob)?,
            human_prediction: self.human_prediction,
            missing_information: self.missing_information,
            updated_at,
        })
    }
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path`
    pub async fn new<P: AsRef<Path>>(path: P) -> AnnotateResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> AnnotateResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS examples (
                task TEXT NOT NULL,
                example_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                question TEXT,
                context TEXT,
                options TEXT,
                image_path TEXT,
                json_blob TEXT NOT NULL,
                human_prediction TEXT,
                missing_information INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT,
                PRIMARY KEY (task, example_id)
            );

            CREATE INDEX IF NOT EXISTS idx_examples_task_position ON examples(task, position);
        "#,
        )?;
        Ok(())
    }

    fn read_one(conn: &Connection, task: &str, example_id: &str) -> AnnotateResult<Option<ExampleRecord>> {
        let sql = format!(
            "SELECT {} FROM examples WHERE task = ?1 AND example_id = ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let row = stmt
            .query_row(params![task, example_id], ExampleRow::from_row)
            .optional()?;
        row.map(ExampleRow::into_record).transpose()
    }

    fn write_one(conn: &Connection, record: &ExampleRecord) -> AnnotateResult<()> {
        let options = record
            .options
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let json_blob = serde_json::to_string(&record.raw_payload)?;

        conn.execute(
            r#"INSERT INTO examples
               (task, example_id, position, question, context, options, image_path,
                json_blob, human_prediction, missing_information, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
               ON CONFLICT(task, example_id) DO UPDATE SET
                position = excluded.position,
                question = excluded.question,
                context = excluded.context,
                options = excluded.options,
                image_path = excluded.image_path,
                json_blob = excluded.json_blob,
                human_prediction = excluded.human_prediction,
                missing_information = excluded.missing_information,
                updated_at = excluded.updated_at"#,
            params![
                normalize_task(&record.task),
                record.example_id,
                record.position as i64,
                record.question,
                record.context,
                options,
                record.image_ref,
                json_blob,
                record.human_prediction,
                record.missing_information,
                record.updated_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn list_tasks(&self) -> AnnotateResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT DISTINCT task FROM examples ORDER BY task")?;
        let tasks = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    async fn get(&self, task: &str, example_id: &str) -> AnnotateResult<Option<ExampleRecord>> {
        let conn = self.conn.lock().await;
        Self::read_one(&conn, &normalize_task(task), example_id)
    }

    async fn put(&self, record: ExampleRecord) -> AnnotateResult<()> {
        let conn = self.conn.lock().await;
        Self::write_one(&conn, &record)
    }

    async fn scan_by_task(&self, task: &str) -> AnnotateResult<Vec<ExampleRecord>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM examples WHERE task = ?1 ORDER BY position ASC, example_id ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![normalize_task(task)], ExampleRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Err(AnnotateError::task_not_found(task));
        }
        rows.into_iter().map(ExampleRow::into_record).collect()
    }

    async fn update(&self, task: &str, example_id: &str, patch: RecordPatch) -> AnnotateResult<ExampleRecord> {
        let task = normalize_task(task);
        let conn = self.conn.lock().await;
        let mut record = Self::read_one(&conn, &task, example_id)?
            .ok_or_else(|| AnnotateError::example_not_found(&task, example_id))?;
        patch(&mut record)?;
        Self::write_one(&conn, &record)?;
        Ok(record)
    }

    async fn next_position(&self, task: &str) -> AnnotateResult<u64> {
        let conn = self.conn.lock().await;
        let next: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM examples WHERE task = ?1",
            params![normalize_task(task)],
            |row| row.get(0),
        )?;
        Ok(next.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(id: &str) -> ExampleRecord {
        let mut r = ExampleRecord::new("bar", id, json!({ "question": format!("q-{}", id), "z": 1, "a": 2 }));
        r.question = Some(format!("q-{}", id));
        r.options = Some(vec![AnswerOption::new("A", "yes")]);
        r
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = SqliteRecordStore::new(dir.path().join("test.db")).await.unwrap();

        let mut r = record("bar-0");
        r.human_prediction = Some("A".to_string());
        r.updated_at = Some(Utc::now());
        store.put(r.clone()).await.unwrap();

        let loaded = store.get("BAR", "bar-0").await.unwrap().unwrap();
        assert_eq!(loaded.raw_payload, r.raw_payload);
        assert_eq!(loaded.options, r.options);
        assert_eq!(loaded.human_prediction.as_deref(), Some("A"));
        assert!(store.get("bar", "bar-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_timestamp_keeps_annotation() {
        let dir = tempdir().unwrap();
        let store = SqliteRecordStore::new(dir.path().join("test.db")).await.unwrap();
        let mut r = record("bar-0");
        r.human_prediction = Some("A".to_string());
        r.updated_at = Some(Utc::now());
        store.put(r).await.unwrap();

        store
            .conn
            .lock()
            .await
            .execute("UPDATE examples SET updated_at = 'last tuesday' WHERE example_id = 'bar-0'", [])
            .unwrap();
        let loaded = store.get("bar", "bar-0").await.unwrap().unwrap();
        assert!(loaded.updated_at.is_none());
        assert_eq!(loaded.human_prediction.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_upsert_source_keeps_annotation_and_position() {
        let dir = tempdir().unwrap();
        let store = SqliteRecordStore::new(dir.path().join("test.db")).await.unwrap();

        store.upsert_source(record("bar-0")).await.unwrap();
        store.upsert_source(record("bar-1")).await.unwrap();
        store
            .update(
                "bar",
                "bar-0",
                Box::new(|r: &mut ExampleRecord| {
                    r.missing_information = true;
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let mut replacement = record("bar-0");
        replacement.raw_payload = json!({ "question": "edited upstream" });
        store.upsert_source(replacement).await.unwrap();

        let records = store.scan_by_task("bar").await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.example_id.as_str()).collect();
        assert_eq!(ids, vec!["bar-0", "bar-1"]);
        assert!(records[0].missing_information);
        assert_eq!(records[0].raw_payload, json!({ "question": "edited upstream" }));
        assert_eq!(store.list_tasks().await.unwrap(), vec!["bar"]);
    }

    #[tokio::test]
    async fn test_unknown_task_and_example() {
        let dir = tempdir().unwrap();
        let store = SqliteRecordStore::new(dir.path().join("test.db")).await.unwrap();
        store.put(record("bar-0")).await.unwrap();

        assert!(matches!(
            store.scan_by_task("pie").await,
            Err(AnnotateError::NotFound(_))
        ));
        let missing = store
            .update("bar", "nope", Box::new(|_: &mut ExampleRecord| Ok(())))
            .await;
        assert!(matches!(missing, Err(AnnotateError::NotFound(_))));
    }
}
