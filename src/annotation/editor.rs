//! Question and option edits
//!
//! Edits touch the record's derived field and every copy of it in the raw
//! payload, so the payload never holds two diverging versions.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::aliases::{lookup, pick, set_path, AliasTable};
use crate::error::{AnnotateError, AnnotateResult};
use crate::options::{clean_and_label, options_to_value};
use crate::types::{AnswerOption, ExampleRecord};

const DEFAULT_QUESTION_PATH: &str = "question";
const DEFAULT_OPTIONS_PATH: &str = "options";

pub fn validate_question(question: &str) -> AnnotateResult<String> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AnnotateError::validation("question cannot be empty"));
    }
    Ok(question.to_string())
}

pub fn validate_options<S: AsRef<str>>(texts: &[S]) -> AnnotateResult<Vec<AnswerOption>> {
    let options = clean_and_label(texts);
    if options.is_empty() {
        return Err(AnnotateError::validation("options cannot be empty"));
    }
    Ok(options)
}

fn payload_object(record: &mut ExampleRecord) -> AnnotateResult<&mut Value> {
    if record.raw_payload.is_null() {
        record.raw_payload = Value::Object(Map::new());
    }
    if !record.raw_payload.is_object() {
        return Err(AnnotateError::validation(format!(
            "payload of {}/{} is not an object",
            record.task, record.example_id
        )));
    }
    Ok(&mut record.raw_payload)
}

/// Set the question on the record, the primary payload field and every
/// alias copy that already exists.
pub fn apply_question(
    record: &mut ExampleRecord,
    question: &str,
    aliases: &AliasTable,
    now: DateTime<Utc>,
) -> AnnotateResult<()> {
    let primary = aliases
        .question
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_QUESTION_PATH);
    let payload = payload_object(record)?;

    let mut targets: Vec<&str> = vec![primary];
    for path in &aliases.question {
        if path != primary && lookup(payload, path).is_some() {
            targets.push(path);
        }
    }
    for path in targets {
        if !set_path(payload, path, Value::String(question.to_string())) {
            return Err(AnnotateError::validation(format!(
                "cannot write question at {}",
                path
            )));
        }
    }

    record.question = Some(question.to_string());
    record.updated_at = Some(now);
    Ok(())
}

/// Store relabelled options on the record and at the payload path they
/// came from, keeping that field's shape.
pub fn apply_options(
    record: &mut ExampleRecord,
    options: Vec<AnswerOption>,
    aliases: &AliasTable,
    now: DateTime<Utc>,
) -> AnnotateResult<()> {
    let payload = payload_object(record)?;
    let path = pick(payload, &aliases.options)
        .map(|(path, _)| path.to_string())
        .unwrap_or_else(|| {
            aliases
                .options
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_OPTIONS_PATH.to_string())
        });

    let rendered = options_to_value(&options, lookup(payload, &path));
    if !set_path(payload, &path, rendered) {
        return Err(AnnotateError::validation(format!(
            "cannot write options at {}",
            path
        )));
    }

    record.options = Some(options);
    record.updated_at = Some(now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_updates_nested_copy() {
        let mut record = ExampleRecord::new(
            "t",
            "a",
            json!({ "question": "old", "metadata": { "question": "old" } }),
        );
        let q = validate_question("  new?  ").unwrap();
        apply_question(&mut record, &q, &AliasTable::default(), Utc::now()).unwrap();

        assert_eq!(record.question.as_deref(), Some("new?"));
        assert_eq!(record.raw_payload["question"], json!("new?"));
        assert_eq!(record.raw_payload["metadata"]["question"], json!("new?"));
    }

    #[test]
    fn test_question_only_nested() {
        let mut record = ExampleRecord::new("t", "a", json!({ "metadata": { "question": "old" } }));
        apply_question(&mut record, "new", &AliasTable::default(), Utc::now()).unwrap();
        assert_eq!(
            record.raw_payload,
            json!({ "metadata": { "question": "new" }, "question": "new" })
        );
    }

    #[test]
    fn test_empty_question_rejected() {
        assert!(validate_question(" \n ").is_err());
    }

    #[test]
    fn test_options_written_back_where_found() {
        let mut record = ExampleRecord::new(
            "t",
            "a",
            json!({ "answer_choices": { "A": "1", "B": "2", "C": "3" } }),
        );
        let options = validate_options(&["1", "", "3"]).unwrap();
        apply_options(&mut record, options, &AliasTable::default(), Utc::now()).unwrap();

        assert_eq!(record.raw_payload, json!({ "answer_choices": { "A": "1", "B": "3" } }));
        let labels: Vec<&str> = record
            .options
            .as_ref()
            .unwrap()
            .iter()
            .map(|o| o.label.as_str())
            .collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn test_all_blank_options_rejected() {
        assert!(matches!(
            validate_options(&["", "  "]),
            Err(AnnotateError::Validation(_))
        ));
    }
}
