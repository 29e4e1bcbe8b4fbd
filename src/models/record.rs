use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One logical health record per calendar day. Created lazily on the first
/// write for that day; never deleted by this engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyHealthRecord {
    pub date: NaiveDate,
    pub steps: u64,
    pub calories_burned: f64,
    pub heart_rate_avg_bpm: u32,
    pub sleep_minutes: u64,
    pub updated_at: DateTime<Utc>,
}

impl DailyHealthRecord {
    /// Zeroed record for a day that has no data yet.
    pub fn empty(date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            date,
            steps: 0,
            calories_burned: 0.0,
            heart_rate_avg_bpm: 0,
            sleep_minutes: 0,
            updated_at: now,
        }
    }

    /// Additive step write. Callers submit true deltas since their last
    /// call, never cumulative totals.
    pub fn add_steps(&mut self, step_delta: u64, calorie_delta: f64, now: DateTime<Utc>) {
        self.steps = self.steps.saturating_add(step_delta);
        self.calories_burned += calorie_delta;
        self.updated_at = now;
    }

    /// Fold in a higher-trust external read. A non-zero external step count
    /// overwrites the local estimate; zero means "no data" and never lowers
    /// a positive local value. Heart rate follows the same rule.
    pub fn reconcile(
        &mut self,
        external_steps: u64,
        external_heart_rate_bpm: u32,
        calories_per_step: f64,
        now: DateTime<Utc>,
    ) {
        if external_steps > 0 {
            self.steps = external_steps;
            self.calories_burned = external_steps as f64 * calories_per_step;
        }
        if external_heart_rate_bpm > 0 {
            self.heart_rate_avg_bpm = external_heart_rate_bpm;
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DailyHealthRecord {
        DailyHealthRecord::empty(NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(), Utc::now())
    }

    #[test]
    fn reconcile_with_zero_never_decreases() {
        let mut local = record();
        local.add_steps(420, 16.8, Utc::now());
        local.heart_rate_avg_bpm = 72;

        let before = local.clone();
        local.reconcile(0, 0, 0.04, Utc::now());
        assert_eq!(local.steps, before.steps);
        assert_eq!(local.heart_rate_avg_bpm, before.heart_rate_avg_bpm);
        assert_eq!(local.calories_burned, before.calories_burned);
    }

    #[test]
    fn reconcile_overwrites_with_non_zero_external() {
        let mut local = record();
        local.add_steps(100, 4.0, Utc::now());
        local.reconcile(250, 68, 0.04, Utc::now());
        assert_eq!(local.steps, 250);
        assert_eq!(local.calories_burned, 10.0);
        assert_eq!(local.heart_rate_avg_bpm, 68);
    }

    #[test]
    fn step_deltas_are_additive() {
        let now = Utc::now();
        let mut split = record();
        split.add_steps(30, 1.2, now);
        split.add_steps(70, 2.8, now);

        let mut joined = record();
        joined.add_steps(100, 4.0, now);

        assert_eq!(split.steps, joined.steps);
        assert!((split.calories_burned - joined.calories_burned).abs() < 1e-9);
    }
}
