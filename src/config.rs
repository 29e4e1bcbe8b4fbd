use std::time::Duration;

/// Tunable thresholds for the accelerometer step detector.
///
/// Defaults were chosen empirically against phone-in-pocket walking traces;
/// they are deliberately conservative rather than physiologically modeled.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Exponential low-pass coefficient for the per-axis gravity estimate.
    /// Higher keeps more history; range (0, 1).
    pub gravity_alpha: f64,

    /// Raw-magnitude threshold (m/s²) above which a sample can register a
    /// step. Sits above resting gravity (~9.8) and below impact jitter.
    pub magnitude_threshold: f64,

    /// Minimum spacing between two accepted steps. Caps detectable cadence
    /// at ~171 steps/min, safely above realistic stride rate.
    pub debounce: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            gravity_alpha: 0.8,
            magnitude_threshold: 12.0,
            debounce: Duration::from_millis(350),
        }
    }
}

impl DetectorConfig {
    pub fn debounce_ms(&self) -> u64 {
        self.debounce.as_millis() as u64
    }
}

/// Engine-level tuning: tick cadence, reconciliation cadence and the calorie
/// model constants.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval of the background ticker that refreshes the notification
    /// projection even when no step events arrive.
    pub tick_interval: Duration,

    /// Reconcile against the health platform (and push to the cloud sink)
    /// every this many ticks.
    pub reconcile_every_ticks: u32,

    /// Coarse per-step calorie constant for the daily record. Not
    /// weight-adjusted at this level.
    pub calories_per_step: f64,

    /// Reference body weight for the weight-adjusted session estimate:
    /// `calories_per_step * steps * (weight_kg / reference_weight_kg)`.
    pub reference_weight_kg: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            reconcile_every_ticks: 300,
            calories_per_step: 0.04,
            reference_weight_kg: 70.0,
        }
    }
}

impl EngineConfig {
    /// Daily-record calorie estimate for a step delta.
    pub fn calories_for_steps(&self, steps: u64) -> f64 {
        steps as f64 * self.calories_per_step
    }

    /// Weight-adjusted calorie estimate used for session summaries.
    pub fn session_calories(&self, steps: u64, weight_kg: f64) -> f64 {
        self.calories_per_step * steps as f64 * (weight_kg / self.reference_weight_kg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_calories_at_reference_weight_match_daily_model() {
        let config = EngineConfig::default();
        assert_eq!(config.session_calories(50, 70.0), 2.0);
        assert_eq!(config.calories_for_steps(50), 2.0);
    }

    #[test]
    fn session_calories_scale_with_weight() {
        let config = EngineConfig::default();
        assert_eq!(config.session_calories(100, 140.0), 8.0);
    }
}
