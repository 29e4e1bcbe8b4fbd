use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a finished tracking session, emitted by the session tracker and
/// fanned out to the daily aggregator, the health platform and the cloud
/// sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub steps_taken: u64,
    /// Weight-adjusted estimate computed at finish time.
    pub calories_burned: f64,
}

impl SessionSummary {
    pub fn duration_ms(&self) -> u64 {
        (self.ended_at - self.started_at).num_milliseconds().max(0) as u64
    }
}
