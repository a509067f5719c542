//! Export projection
//!
//! An exported document is the raw payload plus `missing_information` and,
//! for answered records only, `human_prediction`. Nothing else is added.

use chrono::Utc;
use serde_json::{Map, Value};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AnnotateResult;
use crate::loader::{HUMAN_PREDICTION_KEY, MISSING_INFORMATION_KEY};
use crate::types::ExampleRecord;

/// Project one record back into its source shape
pub fn export_document(record: &ExampleRecord) -> Value {
    let mut doc = match &record.raw_payload {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            // Non-object payloads cannot carry the annotation fields inline
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };

    doc.insert(
        MISSING_INFORMATION_KEY.to_string(),
        Value::Bool(record.missing_information),
    );
    match (&record.human_prediction, record.missing_information) {
        (Some(prediction), false) => {
            doc.insert(HUMAN_PREDICTION_KEY.to_string(), Value::String(prediction.clone()));
        }
        _ => {
            doc.shift_remove(HUMAN_PREDICTION_KEY);
        }
    }
    Value::Object(doc)
}

/// Export records (already in stable order) as an id-keyed mapping
pub fn export_records<'a, I>(records: I, completed_only: bool) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a ExampleRecord>,
{
    records
        .into_iter()
        .filter(|r| !completed_only || r.is_completed())
        .map(|r| (r.example_id.clone(), export_document(r)))
        .collect()
}

/// Download name for a task export
pub fn export_file_name(task: &str, completed_only: bool) -> String {
    if completed_only {
        format!("{}_completed.json", task)
    } else {
        format!("{}.json", task)
    }
}

/// Download name for the all-tasks archive
pub fn archive_file_name() -> String {
    format!("completed_{}.zip", Utc::now().format("%Y-%m-%d-%H-%M-%S"))
}

/// Pack per-task completed exports as `completed/<task>.json`.
///
/// Tasks with no completed records are left out.
pub fn zip_exports(exports: &[(String, Map<String, Value>)]) -> AnnotateResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (task, docs) in exports {
        if docs.is_empty() {
            continue;
        }
        zip.start_file(format!("completed/{}.json", task), options)?;
        let body = serde_json::to_vec_pretty(&Value::Object(docs.clone()))?;
        zip.write_all(&body)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, payload: Value) -> ExampleRecord {
        ExampleRecord::new("bar", id, payload)
    }

    #[test]
    fn test_missing_drops_prediction_key() {
        let mut r = record("bar-1", json!({ "question": "q", "human_prediction": "old" }));
        r.missing_information = true;
        let doc = export_document(&r);
        assert_eq!(doc, json!({ "question": "q", "missing_information": true }));
    }

    #[test]
    fn test_answered_appends_fields_in_order() {
        let mut r = record("bar-0", json!({ "z": 1, "a": 2 }));
        r.human_prediction = Some("42".to_string());
        let doc = export_document(&r);
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "missing_information", "human_prediction"]);
        assert_eq!(doc["human_prediction"], json!("42"));
    }

    #[test]
    fn test_completed_filter() {
        let pending = record("p", json!({}));
        let mut done = record("d", json!({}));
        done.missing_information = true;
        let all = export_records([&pending, &done], false);
        let completed = export_records([&pending, &done], true);
        assert_eq!(all.len(), 2);
        assert_eq!(completed.keys().collect::<Vec<_>>(), vec!["d"]);
    }

    #[test]
    fn test_zip_skips_empty_tasks() {
        let mut docs = Map::new();
        docs.insert("bar-0".to_string(), json!({ "missing_information": true }));
        let bytes = zip_exports(&[
            ("bar".to_string(), docs),
            ("line".to_string(), Map::new()),
        ])
        .unwrap();

        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(names, vec!["completed/bar.json"]);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(export_file_name("bar", false), "bar.json");
        assert_eq!(export_file_name("bar", true), "bar_completed.json");
        assert!(archive_file_name().starts_with("completed_"));
    }
}
