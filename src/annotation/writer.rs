//! Annotation patches

use chrono::{DateTime, Utc};

use crate::error::{AnnotateError, AnnotateResult};
use crate::types::ExampleRecord;

/// A validated annotation patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub missing_information: bool,
    /// Trimmed answer; always `None` when missing
    pub human_prediction: Option<String>,
}

impl Submission {
    /// Check the field-presence rules before touching any record
    pub fn new(missing_information: bool, human_prediction: Option<&str>) -> AnnotateResult<Self> {
        if missing_information {
            return Ok(Self {
                missing_information,
                human_prediction: None,
            });
        }
        match human_prediction.map(str::trim).filter(|p| !p.is_empty()) {
            Some(prediction) => Ok(Self {
                missing_information,
                human_prediction: Some(prediction.to_string()),
            }),
            None => Err(AnnotateError::validation(
                "human_prediction required when not missing_information",
            )),
        }
    }

    /// Overwrite the record's annotation state. Applying twice is a no-op.
    pub fn apply(&self, record: &mut ExampleRecord, now: DateTime<Utc>) {
        record.missing_information = self.missing_information;
        record.human_prediction = self.human_prediction.clone();
        record.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_answer_rejected() {
        assert!(matches!(
            Submission::new(false, Some("   ")),
            Err(AnnotateError::Validation(_))
        ));
        assert!(Submission::new(false, None).is_err());
    }

    #[test]
    fn test_missing_clears_prediction() {
        let mut record = ExampleRecord::new("t", "a", json!({}));
        record.human_prediction = Some("B".to_string());

        let patch = Submission::new(true, Some("ignored")).unwrap();
        patch.apply(&mut record, Utc::now());
        assert!(record.missing_information);
        assert_eq!(record.human_prediction, None);
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut record = ExampleRecord::new("t", "a", json!({}));
        let patch = Submission::new(false, Some("  42 ")).unwrap();
        let now = Utc::now();
        patch.apply(&mut record, now);
        let once = record.clone();
        patch.apply(&mut record, now);
        assert_eq!(record, once);
        assert_eq!(record.human_prediction.as_deref(), Some("42"));
    }
}
