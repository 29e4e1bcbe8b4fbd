//! Durable shared-state channel for session bookkeeping.
//!
//! Both the background tracker and the interactive layer read and write the
//! same on-disk JSON document. Semantics are last-write-wins: a write
//! replaces the whole logical record, and readers re-load from disk on every
//! decision point instead of caching, since the other process may have
//! mutated state since the last read.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::Arc};

/// The full logical record held by the channel. Serialized as one document;
/// partial updates go through read-modify-write of the whole record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SharedState {
    pub is_running: bool,
    /// Cumulative total recorded at session start (or re-anchored since).
    pub baseline_steps: u64,
    /// Session steps folded in across pauses; survives process restart.
    pub accumulated_steps: u64,
    /// Epoch milliseconds; `None` while idle.
    pub start_time_ms: Option<i64>,
    /// Day-rollover bookkeeping: the calendar day the daily baseline was
    /// last anchored to.
    pub last_saved_date: Option<NaiveDate>,
    /// Cumulative total observed at the start of `last_saved_date`.
    pub start_of_day_steps: u64,
    /// Most recent cumulative total seen by the background tracker; the
    /// interactive layer anchors start/pause/finish against this.
    pub last_cumulative_total: u64,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            is_running: false,
            baseline_steps: 0,
            accumulated_steps: 0,
            start_time_ms: None,
            last_saved_date: None,
            start_of_day_steps: 0,
            last_cumulative_total: 0,
        }
    }
}

impl SharedState {
    /// Reset the session fields to idle, leaving daily bookkeeping alone.
    pub fn clear_session(&mut self) {
        self.is_running = false;
        self.baseline_steps = 0;
        self.accumulated_steps = 0;
        self.start_time_ms = None;
    }

    /// Counter-derived steps since the daily baseline was anchored, i.e.
    /// since the current calendar day began (or since boot, after a
    /// counter reset re-zeroed the anchor).
    pub fn steps_today(&self, current_total: u64) -> u64 {
        current_total.saturating_sub(self.start_of_day_steps)
    }
}

/// Handle to the on-disk channel. Cheap to clone; both execution contexts
/// receive a clone of the same handle at startup.
#[derive(Clone)]
pub struct StateStore {
    path: Arc<PathBuf>,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory {}", parent.display())
            })?;
        }
        let store = Self { path: Arc::new(path) };
        if !store.path.exists() {
            store.write(&SharedState::default())?;
        }
        Ok(store)
    }

    /// Load the latest persisted record. A missing or corrupt file degrades
    /// to the zeroed default rather than erroring.
    pub fn read(&self) -> SharedState {
        let contents = match fs::read_to_string(self.path.as_path()) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("state channel unreadable, using defaults: {err}");
                return SharedState::default();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!("state channel corrupt, using defaults: {err}");
            SharedState::default()
        })
    }

    /// Replace the whole record. Write goes through a temp file plus rename
    /// so a concurrent reader never observes a half-written document.
    pub fn write(&self, state: &SharedState) -> Result<()> {
        let serialized = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("failed to write state to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, self.path.as_path())
            .with_context(|| format!("failed to replace state at {}", self.path.display()))?;
        Ok(())
    }

    /// Read-modify-write of the full record.
    pub fn update<F>(&self, mutate: F) -> Result<SharedState>
    where
        F: FnOnce(&mut SharedState),
    {
        let mut state = self.read();
        mutate(&mut state);
        self.write(&state)?;
        Ok(state)
    }
}
