//! Next-pending selection

use crate::types::ExampleRecord;

/// First pending record after `after_id` in stable order.
///
/// An `after_id` that is not in the task restarts the scan from the top.
pub fn next_pending<'a>(records: &'a [ExampleRecord], after_id: Option<&str>) -> Option<&'a ExampleRecord> {
    let start = after_id
        .and_then(|after| records.iter().position(|r| r.example_id == after))
        .map(|idx| idx + 1)
        .unwrap_or(0);

    records[start.min(records.len())..]
        .iter()
        .find(|r| r.is_pending())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(ids: &[&str]) -> Vec<ExampleRecord> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let mut r = ExampleRecord::new("bar", *id, json!({}));
                r.position = i as u64;
                r
            })
            .collect()
    }

    #[test]
    fn test_skips_terminal_records() {
        let mut rs = records(&["a", "b", "c"]);
        rs[0].human_prediction = Some("1".to_string());
        rs[1].missing_information = true;
        assert_eq!(next_pending(&rs, None).map(|r| r.example_id.as_str()), Some("c"));
    }

    #[test]
    fn test_resumes_after_known_id() {
        let rs = records(&["a", "b", "c"]);
        assert_eq!(next_pending(&rs, Some("a")).map(|r| r.example_id.as_str()), Some("b"));
        assert_eq!(next_pending(&rs, Some("c")), None);
        assert_eq!(next_pending(&rs, Some("zzz")).map(|r| r.example_id.as_str()), Some("a"));
    }

    #[test]
    fn test_does_not_wrap_around() {
        let mut rs = records(&["a", "b"]);
        rs[1].missing_information = true;
        assert_eq!(next_pending(&rs, Some("a")), None);
        assert_eq!(next_pending(&[], None), None);
    }
}
