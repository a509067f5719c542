//! Field alias table
//!
//! Source documents name the same logical field in many ways (`question`,
//! `metadata.question`, ...). Each logical field owns an ordered list of
//! dotted alias paths; the first path holding a non-null value wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered alias paths per logical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasTable {
    /// Example id fields, tried after the document key
    #[serde(default = "default_example_id")]
    pub example_id: Vec<String>,
    #[serde(default = "default_question")]
    pub question: Vec<String>,
    #[serde(default = "default_context")]
    pub context: Vec<String>,
    #[serde(default = "default_options")]
    pub options: Vec<String>,
    /// Fields already holding an image URL or storage key
    #[serde(default = "default_image")]
    pub image: Vec<String>,
    /// Fields holding a local chart file path (ingestion only)
    #[serde(default = "default_chart_path")]
    pub chart_path: Vec<String>,
}

fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_example_id() -> Vec<String> {
    paths(&["custom_id", "metadata.custom_id", "id"])
}

fn default_question() -> Vec<String> {
    paths(&["question", "metadata.question"])
}

fn default_context() -> Vec<String> {
    paths(&["context", "metadata.context"])
}

fn default_options() -> Vec<String> {
    paths(&[
        "options",
        "choices",
        "candidates",
        "answers",
        "candidate_answers",
        "answer_choices",
        "options_list",
        "metadata.options",
        "metadata.choices",
        "metadata.answers",
    ])
}

fn default_image() -> Vec<String> {
    paths(&[
        "pdf_image_url",
        "chart_image_url",
        "image",
        "img",
        "image_url",
        "imageUrl",
        "metadata.image",
        "metadata.image_url",
        "metadata.imageUrl",
    ])
}

fn default_chart_path() -> Vec<String> {
    paths(&[
        "chart_path",
        "chart_png_path",
        "chart_only_path",
        "chart_image",
        "chart_image_path",
        "metadata.chart_path",
        "metadata.chart_png_path",
        "metadata.chart_only_path",
        "metadata.chart_image",
        "metadata.chart_image_path",
    ])
}

impl Default for AliasTable {
    fn default() -> Self {
        Self {
            example_id: default_example_id(),
            question: default_question(),
            context: default_context(),
            options: default_options(),
            image: default_image(),
            chart_path: default_chart_path(),
        }
    }
}

/// Follow a dotted path through nested objects
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

/// First alias holding a non-null value, with the path that matched
pub fn pick<'a, 'p>(value: &'a Value, aliases: &'p [String]) -> Option<(&'p str, &'a Value)> {
    aliases.iter().find_map(|path| match lookup(value, path) {
        Some(Value::Null) | None => None,
        Some(found) => Some((path.as_str(), found)),
    })
}

/// First alias holding a string (numbers are rendered as text)
pub fn pick_string(value: &Value, aliases: &[String]) -> Option<String> {
    aliases.iter().find_map(|path| match lookup(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Write `new` at a dotted path, creating intermediate objects.
///
/// Returns false when a non-object sits in the way.
pub fn set_path(value: &mut Value, path: &str, new: Value) -> bool {
    let mut keys = path.split('.').peekable();
    let mut current = value;
    while let Some(key) = keys.next() {
        let Some(map) = current.as_object_mut() else {
            return false;
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), new);
            return true;
        }
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pick_respects_priority() {
        let aliases = AliasTable::default();
        let doc = json!({
            "metadata": { "question": "nested?" },
            "question": "top?"
        });
        assert_eq!(pick_string(&doc, &aliases.question).as_deref(), Some("top?"));

        let doc = json!({ "question": null, "metadata": { "question": "nested?" } });
        assert_eq!(pick_string(&doc, &aliases.question).as_deref(), Some("nested?"));
    }

    #[test]
    fn test_pick_reports_matched_path() {
        let aliases = AliasTable::default();
        let doc = json!({ "metadata": { "choices": ["a", "b"] } });
        let (path, found) = pick(&doc, &aliases.options).unwrap();
        assert_eq!(path, "metadata.choices");
        assert_eq!(found, &json!(["a", "b"]));
    }

    #[test]
    fn test_set_path_creates_parents() {
        let mut doc = json!({ "a": 1 });
        assert!(set_path(&mut doc, "metadata.question", json!("q")));
        assert_eq!(doc, json!({ "a": 1, "metadata": { "question": "q" } }));

        let mut scalar = json!({ "metadata": 3 });
        assert!(!set_path(&mut scalar, "metadata.question", json!("q")));
    }
}
