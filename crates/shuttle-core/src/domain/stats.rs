use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-UTC-day task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: i64,
    pub success: i64,
    pub failure: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Total,
    Success,
    Failure,
}

impl Counter {
    /// `stats:tasks:<name>:<YYYY-MM-DD>`
    pub fn key(self, date: NaiveDate) -> String {
        let name = match self {
            Counter::Total => "total",
            Counter::Success => "success",
            Counter::Failure => "failure",
        };
        format!("stats:tasks:{name}:{}", date.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_keys_are_per_day() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(Counter::Success.key(date), "stats:tasks:success:2026-03-07");
        assert_eq!(Counter::Total.key(date), "stats:tasks:total:2026-03-07");
    }
}
