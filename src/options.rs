//! Multiple-choice option handling
//!
//! Labels are never chosen by an editor. They are re-derived from position:
//! A..Z for the first 26 entries, then the 1-based index as text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::types::AnswerOption;

static LETTER_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]$").expect("valid regex"));
static OPTION_DELIMITERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n|;,]").expect("valid regex"));

/// Label for the option at `index`
pub fn label_for(index: usize) -> String {
    if index < 26 {
        char::from(b'A' + index as u8).to_string()
    } else {
        (index + 1).to_string()
    }
}

/// Label texts in order. Pure: same texts, same labels.
pub fn assign_labels<S: AsRef<str>>(texts: &[S]) -> Vec<AnswerOption> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| AnswerOption::new(label_for(i), text.as_ref()))
        .collect()
}

/// Trim, drop empties, then relabel. This is what an options edit stores.
pub fn clean_and_label<S: AsRef<str>>(texts: &[S]) -> Vec<AnswerOption> {
    let kept: Vec<&str> = texts
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect();
    assign_labels(&kept)
}

/// Does a previously selected letter still name an option?
pub fn selection_survives(options: &[AnswerOption], selected: &str) -> bool {
    options.iter().any(|o| o.label == selected)
}

fn option_text(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(map) => ["text", "label", "value", "answer"]
            .iter()
            .find_map(|k| map.get(*k).and_then(scalar_text))
            .unwrap_or_default(),
        other => scalar_text(other).unwrap_or_default(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn dedup_labelled(texts: Vec<String>) -> Vec<AnswerOption> {
    let mut seen: Vec<String> = Vec::new();
    for text in texts {
        let text = text.trim().to_string();
        if !text.is_empty() && !seen.contains(&text) {
            seen.push(text);
        }
    }
    assign_labels(&seen)
}

/// Normalize whatever a source document stores as options.
///
/// Arrays and delimited strings are trimmed, de-duplicated and labelled in
/// order. Objects keyed by single capital letters are ordered by key, other
/// objects by key order. Blank entries are dropped before labelling, so the
/// labels always run A, B, C without gaps.
pub fn normalize_options(raw: &Value) -> Vec<AnswerOption> {
    match raw {
        Value::Array(items) => dedup_labelled(items.iter().map(option_text).collect()),
        Value::String(s) => dedup_labelled(OPTION_DELIMITERS.split(s).map(str::to_string).collect()),
        Value::Object(map) => {
            let letter_keyed = !map.is_empty() && map.keys().all(|k| LETTER_KEY.is_match(k));
            let mut entries: Vec<(&String, String)> = map
                .iter()
                .map(|(k, v)| (k, scalar_text(v).unwrap_or_default().trim().to_string()))
                .collect();
            if letter_keyed {
                entries.sort_by(|a, b| a.0.cmp(b.0));
            }
            let texts: Vec<String> = entries
                .into_iter()
                .map(|(_, text)| text)
                .filter(|text| !text.is_empty())
                .collect();
            assign_labels(&texts)
        }
        _ => Vec::new(),
    }
}

/// Render edited options in the shape the payload already used
pub fn options_to_value(options: &[AnswerOption], previous: Option<&Value>) -> Value {
    match previous {
        Some(Value::Object(map)) if !map.is_empty() && map.keys().all(|k| LETTER_KEY.is_match(k)) => {
            let mut out = Map::new();
            for option in options {
                out.insert(option.label.clone(), Value::String(option.text.clone()));
            }
            Value::Object(out)
        }
        Some(Value::Array(items)) if items.iter().any(Value::is_object) => Value::Array(
            options
                .iter()
                .map(|o| serde_json::json!({ "label": o.label, "text": o.text }))
                .collect(),
        ),
        _ => Value::Array(
            options
                .iter()
                .map(|o| Value::String(o.text.clone()))
                .collect(),
        ),
    }
}
