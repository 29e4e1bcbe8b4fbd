/// One raw accelerometer reading: three axis accelerations in m/s² plus a
/// monotonic timestamp. Ephemeral; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Monotonic timestamp in nanoseconds since an arbitrary origin.
    pub timestamp_ns: u64,
    /// Accelerometer reading [x, y, z].
    pub accel: [f64; 3],
}

impl RawSample {
    pub fn new(timestamp_ns: u64, accel: [f64; 3]) -> Self {
        Self { timestamp_ns, accel }
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ns / 1_000_000
    }

    /// Vector magnitude of the raw reading. Returns `None` for non-finite or
    /// zero-vector samples so broken driver output never reaches the
    /// detector as a NaN.
    pub fn magnitude(&self) -> Option<f64> {
        let [x, y, z] = self.accel;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return None;
        }
        if x == 0.0 && y == 0.0 && z == 0.0 {
            return None;
        }
        Some((x * x + y * y + z * z).sqrt())
    }
}

/// A detected footstep. Produced by the detector, consumed immediately by
/// the session tracker; not persisted individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub timestamp_ms: u64,
}

/// A cumulative step total from the active source, counted since an
/// arbitrary epoch (device boot for both paths). Monotone non-decreasing
/// except across a reboot, where it resets to at or near zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    pub total: u64,
    pub timestamp_ms: u64,
}
