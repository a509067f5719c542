//! Per-task counts

use crate::types::{ExampleRecord, TaskStats};

pub fn tally<'a, I>(records: I) -> TaskStats
where
    I: IntoIterator<Item = &'a ExampleRecord>,
{
    records.into_iter().fold(TaskStats::default(), |mut stats, r| {
        stats.total += 1;
        if r.human_prediction.is_some() {
            stats.answered += 1;
        }
        if r.missing_information {
            stats.missing += 1;
        }
        if r.human_prediction.is_none() && !r.missing_information {
            stats.remaining += 1;
        }
        stats
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_add_up() {
        let mut a = ExampleRecord::new("t", "a", json!({}));
        a.human_prediction = Some("x".to_string());
        let mut b = ExampleRecord::new("t", "b", json!({}));
        b.missing_information = true;
        let c = ExampleRecord::new("t", "c", json!({}));

        let stats = tally([&a, &b, &c]);
        assert_eq!(
            stats,
            TaskStats { total: 3, answered: 1, missing: 1, remaining: 1 }
        );
        assert_eq!(stats.answered + stats.missing + stats.remaining, stats.total);
    }
}
