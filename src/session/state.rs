//! Pure session-state arithmetic over the shared record.
//!
//! All transitions are idempotent and order-insensitive within the ranges
//! the state machine expects; racing writers converge via last-write-wins
//! on the store plus recomputation here. Arithmetic is clamped to
//! non-negative throughout, so a reboot or a stale write degrades to a
//! frozen or re-anchored count, never a negative one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::SharedState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

/// Point-in-time projection of session state, derived from a fresh store
/// read. Never cached across decision points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session_steps: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
}

pub fn status_of(state: &SharedState) -> SessionStatus {
    match (state.start_time_ms, state.is_running) {
        (None, _) => SessionStatus::Idle,
        (Some(_), true) => SessionStatus::Running,
        (Some(_), false) => SessionStatus::Paused,
    }
}

/// Steps taken this session given the current cumulative total, without
/// mutating anything. While paused the count is frozen at the folded-in
/// accumulated value.
pub fn session_steps(state: &SharedState, current_total: u64) -> u64 {
    match status_of(state) {
        SessionStatus::Idle => 0,
        SessionStatus::Paused => state.accumulated_steps,
        SessionStatus::Running => state
            .accumulated_steps
            .saturating_add(current_total.saturating_sub(state.baseline_steps)),
    }
}

/// Apply the reboot rule: a cumulative total below the baseline means the
/// counting source restarted, so the baseline re-anchors to zero (steps
/// taken before observation resumed are unrecoverable for this session).
/// Returns true if a reboot was detected.
pub fn reanchor_on_reboot(state: &mut SharedState, current_total: u64) -> bool {
    if current_total < state.baseline_steps {
        state.baseline_steps = 0;
        true
    } else {
        false
    }
}

pub fn begin(state: &mut SharedState, current_total: u64, now: DateTime<Utc>) {
    state.is_running = true;
    state.baseline_steps = current_total;
    state.accumulated_steps = 0;
    state.start_time_ms = Some(now.timestamp_millis());
}

/// Fold the live delta into the persisted accumulated count and re-anchor,
/// so a paused session survives a process restart without losing steps.
pub fn pause(state: &mut SharedState, current_total: u64) {
    reanchor_on_reboot(state, current_total);
    state.accumulated_steps = state
        .accumulated_steps
        .saturating_add(current_total.saturating_sub(state.baseline_steps));
    state.baseline_steps = current_total;
    state.is_running = false;
}

/// Resume only flips the running flag; the baseline is untouched so the
/// count continues from where it left off.
pub fn resume(state: &mut SharedState) {
    state.is_running = true;
}

pub fn snapshot(state: &SharedState, current_total: u64, now: DateTime<Utc>) -> SessionSnapshot {
    let started_at = state
        .start_time_ms
        .and_then(DateTime::<Utc>::from_timestamp_millis);
    let elapsed_ms = started_at
        .map(|start| (now - start).num_milliseconds().max(0) as u64)
        .unwrap_or(0);
    SessionSnapshot {
        status: status_of(state),
        session_steps: session_steps(state, current_total),
        started_at,
        elapsed_ms,
    }
}
