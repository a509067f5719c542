//! Source document loader
//!
//! A task's source document is either an array of items or an object keyed
//! by example id. Each item becomes one [`ExampleRecord`]; the item itself is
//! kept verbatim as the raw payload, minus any annotation fields a previous
//! export left behind.

use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::aliases::{pick, pick_string, AliasTable};
use crate::error::{AnnotateError, AnnotateResult};
use crate::options::normalize_options;
use crate::types::{normalize_task, ExampleRecord};

pub const MISSING_INFORMATION_KEY: &str = "missing_information";
pub const HUMAN_PREDICTION_KEY: &str = "human_prediction";

/// Split a source document into (example id, item) pairs in document order
pub fn document_entries(doc: &Value, aliases: &AliasTable) -> AnnotateResult<Vec<(String, Value)>> {
    match doc {
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let id = pick_string(item, &aliases.example_id).unwrap_or_else(|| idx.to_string());
                (id, item.clone())
            })
            .collect()),
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        _ => Err(AnnotateError::validation(
            "source document must be an array or an object keyed by example id",
        )),
    }
}

/// Build a record from one source item.
///
/// `missing_information` / `human_prediction` keys are lifted out of the
/// payload into annotation state: `missing_information: true` wins, otherwise
/// a non-blank prediction marks the record answered.
pub fn record_from_item(task: &str, example_id: &str, item: Value, aliases: &AliasTable) -> ExampleRecord {
    let mut payload = item;
    let (missing, prediction) = match payload.as_object_mut() {
        Some(map) => {
            let missing = map.shift_remove(MISSING_INFORMATION_KEY);
            let prediction = map.shift_remove(HUMAN_PREDICTION_KEY);
            (
                matches!(missing, Some(Value::Bool(true))),
                prediction
                    .as_ref()
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            )
        }
        None => (false, None),
    };

    let mut record = ExampleRecord::new(task, example_id, Value::Null);
    record.question = pick_string(&payload, &aliases.question);
    record.context = pick_string(&payload, &aliases.context);
    record.options = pick(&payload, &aliases.options)
        .map(|(_, raw)| normalize_options(raw))
        .filter(|opts| !opts.is_empty());
    record.image_ref = pick_string(&payload, &aliases.image).filter(|r| !r.trim().is_empty());
    record.missing_information = missing;
    record.human_prediction = if missing { None } else { prediction };
    record.raw_payload = payload;
    record
}

/// Load every item of a document as records with positions in document order.
///
/// Duplicate ids keep the first occurrence.
pub fn load_document(task: &str, doc: &Value, aliases: &AliasTable) -> AnnotateResult<Vec<ExampleRecord>> {
    let task = normalize_task(task);
    let mut records: Vec<ExampleRecord> = Vec::new();
    for (id, item) in document_entries(doc, aliases)? {
        if records.iter().any(|r| r.example_id == id) {
            warn!("Duplicate example id {}/{}, keeping the first", task, id);
            continue;
        }
        let mut record = record_from_item(&task, &id, item, aliases);
        record.position = records.len() as u64;
        records.push(record);
    }
    debug!("Loaded {} records for task {}", records.len(), task);
    Ok(records)
}

/// Task name for a source file: its stem, normalized
pub fn task_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(normalize_task)
        .filter(|t| !t.is_empty())
}

/// Read and parse a source document from disk
pub async fn read_document(path: &Path) -> AnnotateResult<Value> {
    let contents = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&contents).map_err(|e| {
        AnnotateError::Validation(format!("invalid JSON in {}: {}", path.display(), e))
    })
}
