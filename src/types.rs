//! Shared types for chartqa-annotate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One multiple-choice option with its derived label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub label: String,
    pub text: String,
}

impl AnswerOption {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Annotation state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    Pending,
    Answered,
    Missing,
}

/// A stored example, unique per (task, example_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRecord {
    /// Normalized task name
    pub task: String,
    /// Example identifier within the task
    pub example_id: String,
    /// Index in the stable per-task order
    pub position: u64,
    pub question: Option<String>,
    pub context: Option<String>,
    pub options: Option<Vec<AnswerOption>>,
    /// Opaque image locator (storage key, relative path or absolute URL)
    pub image_ref: Option<String>,
    /// The original document, without annotation fields
    pub raw_payload: Value,
    pub human_prediction: Option<String>,
    pub missing_information: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExampleRecord {
    /// Create a pending record around a raw payload
    pub fn new(task: &str, example_id: impl Into<String>, raw_payload: Value) -> Self {
        Self {
            task: normalize_task(task),
            example_id: example_id.into(),
            position: 0,
            question: None,
            context: None,
            options: None,
            image_ref: None,
            raw_payload,
            human_prediction: None,
            missing_information: false,
            updated_at: None,
        }
    }

    pub fn status(&self) -> AnnotationStatus {
        if self.missing_information {
            AnnotationStatus::Missing
        } else if self.human_prediction.is_some() {
            AnnotationStatus::Answered
        } else {
            AnnotationStatus::Pending
        }
    }

    /// Pending records are the only ones the selector hands out
    pub fn is_pending(&self) -> bool {
        self.status() == AnnotationStatus::Pending
    }

    /// Completed means terminal: answered or marked missing
    pub fn is_completed(&self) -> bool {
        self.missing_information || self.human_prediction.is_some()
    }
}

/// Per-task annotation counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: u64,
    pub answered: u64,
    pub missing: u64,
    pub remaining: u64,
}

/// The example as handed to an annotator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleView {
    #[serde(rename = "exampleId")]
    pub example_id: String,
    pub question: Option<String>,
    pub context: Option<String>,
    pub options: Vec<AnswerOption>,
    pub image_url: Option<String>,
    pub raw: Value,
}

/// Result of a question edit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionUpdate {
    pub question: String,
    pub json_blob: Value,
}

/// Result of an options edit; carries the new label set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionsUpdate {
    pub options: Vec<AnswerOption>,
    pub json_blob: Value,
}

/// Task names are compared trimmed and lower-cased
pub fn normalize_task(task: &str) -> String {
    task.trim().to_lowercase()
}
