//! Daily aggregation and reconciliation.
//!
//! Folds live step deltas and periodic external reads into one record per
//! calendar day, and fans finished sessions out to the local store, the
//! health platform and the cloud sink. The calendar day is resolved once
//! per write from the device's current date, never re-derived
//! retroactively.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate, NaiveTime, TimeZone, Utc};
use log::{error, info};

use crate::config::EngineConfig;
use crate::db::Database;
use crate::health::{CloudSink, HealthPlatform};
use crate::models::{DailyHealthRecord, SessionSummary};

#[derive(Clone)]
pub struct DailyAggregator {
    db: Database,
    health: Arc<dyn HealthPlatform>,
    cloud: Arc<dyn CloudSink>,
    config: EngineConfig,
}

impl DailyAggregator {
    pub fn new(
        db: Database,
        health: Arc<dyn HealthPlatform>,
        cloud: Arc<dyn CloudSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            health,
            cloud,
            config,
        }
    }

    /// Additive write of a true step delta (not a cumulative total).
    pub async fn apply_step_delta(
        &self,
        date: NaiveDate,
        step_delta: u64,
        calorie_delta: f64,
    ) -> Result<DailyHealthRecord> {
        self.db
            .apply_step_delta(date, step_delta, calorie_delta, Utc::now())
            .await
    }

    /// Pull the platform's totals for the whole calendar day and fold them
    /// in as the higher-trust source, then push the merged record to the
    /// cloud sink best-effort.
    pub async fn reconcile_from_external_source(&self, date: NaiveDate) -> Result<DailyHealthRecord> {
        // The record is keyed by local calendar day, so the external read
        // window is local midnight to local midnight.
        let midnight = date.and_time(NaiveTime::MIN);
        let start = Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));
        let end = start + chrono::Duration::days(1);

        let external_steps = self.health.read_steps(start, end);
        let external_heart_rate = self.health.read_heart_rate(start, end);

        let record = self
            .db
            .reconcile_daily_record(
                date,
                external_steps,
                external_heart_rate,
                self.config.calories_per_step,
                Utc::now(),
            )
            .await?;

        info!(
            "reconciled {date}: steps={} hr={} (external steps={external_steps})",
            record.steps, record.heart_rate_avg_bpm
        );

        self.push_to_cloud(&record);
        Ok(record)
    }

    /// Persist a finished session and fan it out to the health platform.
    /// The daily record is untouched here: the background tracker already
    /// folded these steps in as live deltas, and adding them again would
    /// count the same physical steps twice.
    pub async fn record_session_summary(&self, summary: &SessionSummary) -> Result<()> {
        self.db.insert_session_summary(summary).await?;

        if let Err(err) = self.health.write_session(summary) {
            error!("health platform rejected session summary: {err:?}");
        }
        Ok(())
    }

    pub async fn record_sleep_minutes(&self, date: NaiveDate, minutes: u64) -> Result<DailyHealthRecord> {
        let record = self.db.set_sleep_minutes(date, minutes, Utc::now()).await?;
        self.push_to_cloud(&record);
        Ok(record)
    }

    pub async fn daily_record(&self, date: NaiveDate) -> Result<Option<DailyHealthRecord>> {
        self.db.get_daily_record(date).await
    }

    fn push_to_cloud(&self, record: &DailyHealthRecord) {
        if let Err(err) = self.cloud.push_daily(record) {
            error!("cloud sink write failed (not retried): {err:?}");
        }
    }
}
