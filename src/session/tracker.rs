//! Session tracker: the state machine's IO layer.
//!
//! Every operation is a read-modify-write of the shared store; nothing is
//! cached between calls, since the background tracker and the interactive
//! layer both hold handles to the same store and either may have written
//! since our last read.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use log::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::SessionSummary;
use crate::session::state::{self, SessionSnapshot, SessionStatus};
use crate::store::StateStore;

#[derive(Clone)]
pub struct SessionTracker {
    store: StateStore,
    config: EngineConfig,
}

impl SessionTracker {
    pub fn new(store: StateStore, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Start a new session anchored at the current cumulative total. Valid
    /// from Idle or Paused; an already-running session is an error.
    pub fn start(&self, current_total: u64, now: DateTime<Utc>) -> Result<()> {
        let current = self.store.read();
        if state::status_of(&current) == SessionStatus::Running {
            bail!("session already running");
        }
        self.store.update(|shared| {
            state::begin(shared, current_total, now);
        })?;
        info!("session started at cumulative total {current_total}");
        Ok(())
    }

    /// Fold a new cumulative total into the session, applying the reboot
    /// rule, and return the steps taken this session. Safe to call in any
    /// state; Idle returns 0 and Paused returns the frozen count.
    pub fn observe(&self, current_total: u64) -> Result<u64> {
        let current = self.store.read();
        match state::status_of(&current) {
            SessionStatus::Idle => Ok(0),
            SessionStatus::Paused => Ok(current.accumulated_steps),
            SessionStatus::Running => {
                if current_total < current.baseline_steps {
                    let updated = self.store.update(|shared| {
                        state::reanchor_on_reboot(shared, current_total);
                    })?;
                    info!(
                        "counter reset detected ({current_total} < {}), baseline re-anchored",
                        current.baseline_steps
                    );
                    Ok(state::session_steps(&updated, current_total))
                } else {
                    Ok(state::session_steps(&current, current_total))
                }
            }
        }
    }

    pub fn pause(&self, current_total: u64) -> Result<()> {
        let current = self.store.read();
        if state::status_of(&current) != SessionStatus::Running {
            bail!("no running session to pause");
        }
        self.store.update(|shared| {
            state::pause(shared, current_total);
        })?;
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let current = self.store.read();
        if state::status_of(&current) != SessionStatus::Paused {
            bail!("no paused session to resume");
        }
        self.store.update(state::resume)?;
        Ok(())
    }

    /// Close out the session: compute the final step count, reset the
    /// shared record to idle and return the summary for downstream fan-out.
    pub fn finish(
        &self,
        current_total: u64,
        now: DateTime<Utc>,
        weight_kg: f64,
    ) -> Result<SessionSummary> {
        let mut current = self.store.read();
        if state::status_of(&current) == SessionStatus::Idle {
            bail!("no active session to finish");
        }

        state::reanchor_on_reboot(&mut current, current_total);
        let steps_taken = if current.is_running {
            state::session_steps(&current, current_total)
        } else {
            current.accumulated_steps
        };
        let started_at = current
            .start_time_ms
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(now);

        self.store.update(|shared| shared.clear_session())?;

        let summary = SessionSummary {
            id: Uuid::new_v4().to_string(),
            started_at,
            ended_at: now,
            steps_taken,
            calories_burned: self.config.session_calories(steps_taken, weight_kg),
        };
        info!(
            "session finished: {} steps, {:.2} kcal",
            summary.steps_taken, summary.calories_burned
        );
        Ok(summary)
    }

    /// Fresh projection for display surfaces.
    pub fn snapshot(&self, current_total: u64, now: DateTime<Utc>) -> SessionSnapshot {
        state::snapshot(&self.store.read(), current_total, now)
    }
}
