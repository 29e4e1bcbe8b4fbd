//! External collaborators: the platform health store and the cloud sink.
//!
//! Both are interfaces only. Health-platform reads return zero on
//! permission or availability failure rather than erroring; downstream
//! treats zero as "no data". Cloud writes are best effort: failures are
//! logged by the caller and never retried here.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{DailyHealthRecord, SessionSummary};

pub trait HealthPlatform: Send + Sync {
    /// Total steps recorded by the platform in the window. Zero on
    /// failure or missing permission, never an error.
    fn read_steps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u64;

    /// Average heart rate over the window, in bpm. Zero on failure.
    fn read_heart_rate(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u32;

    /// Write a finished session back to the platform.
    fn write_session(&self, summary: &SessionSummary) -> Result<()>;
}

pub trait CloudSink: Send + Sync {
    fn push_daily(&self, record: &DailyHealthRecord) -> Result<()>;
}

/// Stand-in used when the host wires no platform up; every read reports
/// "no data" and writes vanish.
pub struct Unavailable;

impl HealthPlatform for Unavailable {
    fn read_steps(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> u64 {
        0
    }

    fn read_heart_rate(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> u32 {
        0
    }

    fn write_session(&self, _summary: &SessionSummary) -> Result<()> {
        Ok(())
    }
}

impl CloudSink for Unavailable {
    fn push_daily(&self, _record: &DailyHealthRecord) -> Result<()> {
        Ok(())
    }
}
