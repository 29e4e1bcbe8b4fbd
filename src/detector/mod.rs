//! Signal filtering and step detection over raw accelerometer samples.
//!
//! The detector keeps a per-axis exponential low-pass estimate of gravity and
//! registers a step when the raw vector magnitude crosses a fixed threshold,
//! debounced by a minimum inter-step interval. Two states (idle /
//! just-stepped); the debounce timer is the only hidden state. No stride
//! estimation, no smoothing across steps.

use crate::config::DetectorConfig;
use crate::models::{CounterReading, RawSample, StepEvent};

pub struct StepDetector {
    config: DetectorConfig,

    // Gravity estimate, seeded at zero. The first few samples before it
    // converges may produce one spurious early step; accepted as a bounded
    // startup transient.
    gravity: [f64; 3],

    last_step_ms: Option<u64>,
}

impl StepDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            gravity: [0.0; 3],
            last_step_ms: None,
        }
    }

    /// Feed one sample; returns a step event if this sample registered a
    /// step. Non-finite or zero-vector samples update nothing and never
    /// register.
    pub fn process_sample(&mut self, sample: &RawSample) -> Option<StepEvent> {
        let magnitude = sample.magnitude()?;

        let alpha = self.config.gravity_alpha;
        for (axis, raw) in self.gravity.iter_mut().zip(sample.accel) {
            *axis = alpha * *axis + (1.0 - alpha) * raw;
        }

        if magnitude <= self.config.magnitude_threshold {
            return None;
        }

        let now_ms = sample.timestamp_ms();
        if let Some(last) = self.last_step_ms {
            if now_ms.saturating_sub(last) < self.config.debounce_ms() {
                return None;
            }
        }

        self.last_step_ms = Some(now_ms);
        Some(StepEvent { timestamp_ms: now_ms })
    }

    /// Current gravity estimate, exposed for diagnostics.
    #[allow(dead_code)]
    pub fn gravity(&self) -> [f64; 3] {
        self.gravity
    }
}

/// Wraps a [`StepDetector`] and counts detected steps into a cumulative
/// total, so the accelerometer path speaks the same `CounterReading`
/// language as a hardware step counter. The epoch is subscription start,
/// which matches the reboot semantics downstream expects.
pub struct AccumulatingDetector {
    detector: StepDetector,
    total: u64,
}

impl AccumulatingDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            detector: StepDetector::new(config),
            total: 0,
        }
    }

    /// Feed one sample; returns an updated cumulative reading if a step was
    /// registered.
    pub fn process_sample(&mut self, sample: &RawSample) -> Option<CounterReading> {
        let event = self.detector.process_sample(sample)?;
        self.total = self.total.saturating_add(1);
        Some(CounterReading {
            total: self.total,
            timestamp_ms: event.timestamp_ms,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at_ms(ms: u64, magnitude: f64) -> RawSample {
        RawSample::new(ms * 1_000_000, [0.0, 0.0, magnitude])
    }

    #[test]
    fn registers_step_above_threshold() {
        let mut detector = StepDetector::new(DetectorConfig::default());
        let event = detector.process_sample(&sample_at_ms(0, 13.0));
        assert_eq!(event, Some(StepEvent { timestamp_ms: 0 }));
    }

    #[test]
    fn ignores_magnitude_at_or_below_threshold() {
        let mut detector = StepDetector::new(DetectorConfig::default());
        assert!(detector.process_sample(&sample_at_ms(0, 9.8)).is_none());
        assert!(detector.process_sample(&sample_at_ms(400, 12.0)).is_none());
    }

    #[test]
    fn debounce_suppresses_second_step_within_window() {
        let mut detector = StepDetector::new(DetectorConfig::default());
        assert!(detector.process_sample(&sample_at_ms(0, 13.0)).is_some());
        assert!(detector.process_sample(&sample_at_ms(100, 13.0)).is_none());
    }

    #[test]
    fn steps_spaced_past_debounce_both_register() {
        let mut detector = StepDetector::new(DetectorConfig::default());
        assert!(detector.process_sample(&sample_at_ms(0, 13.0)).is_some());
        assert!(detector.process_sample(&sample_at_ms(400, 13.0)).is_some());
    }

    #[test]
    fn no_two_events_closer_than_debounce() {
        let mut detector = StepDetector::new(DetectorConfig::default());
        let mut event_times = Vec::new();
        // 20 Hz burst of above-threshold samples for two seconds.
        for ms in (0..2000).step_by(50) {
            if let Some(event) = detector.process_sample(&sample_at_ms(ms, 14.0)) {
                event_times.push(event.timestamp_ms);
            }
        }
        for pair in event_times.windows(2) {
            assert!(pair[1] - pair[0] >= 350, "events at {} and {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn non_finite_samples_produce_no_step() {
        let mut detector = StepDetector::new(DetectorConfig::default());
        let bad = RawSample::new(0, [f64::NAN, 20.0, 20.0]);
        assert!(detector.process_sample(&bad).is_none());
        assert!(detector.gravity().iter().all(|axis| axis.is_finite()));
    }

    #[test]
    fn accumulating_detector_counts_monotonically() {
        let mut detector = AccumulatingDetector::new(DetectorConfig::default());
        assert!(detector.process_sample(&sample_at_ms(0, 13.0)).is_some());
        assert!(detector.process_sample(&sample_at_ms(100, 13.0)).is_none());
        let reading = detector.process_sample(&sample_at_ms(400, 13.0)).unwrap();
        assert_eq!(reading.total, 2);
        assert_eq!(detector.total(), 2);
    }

    #[test]
    fn gravity_converges_toward_constant_input() {
        let mut detector = StepDetector::new(DetectorConfig::default());
        for index in 0..100 {
            detector.process_sample(&sample_at_ms(index * 1000, 9.8));
        }
        let gravity = detector.gravity();
        assert!((gravity[2] - 9.8).abs() < 0.01, "gravity z = {}", gravity[2]);
    }
}
