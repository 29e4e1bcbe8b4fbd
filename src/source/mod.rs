//! Sensor source selection and the unified step stream.
//!
//! The platform exposes push-based sensors; we wrap each registration in a
//! cold, channel-backed subscription whose drop deterministically cancels
//! the registration, so no callback outlives its consumer. The arbiter
//! picks one source per tracking lifetime: hardware step counter first
//! (firmware already debounces and gravity-compensates, its totals pass
//! through untouched), then the accelerometer + detector path, else a
//! permanently-silent stream. "No motion data" is a valid steady state,
//! never an error.

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::DetectorConfig;
use crate::detector::AccumulatingDetector;
use crate::models::{CounterReading, RawSample};

/// A live sensor registration. Dropping the subscription fires the
/// cancellation token the platform side listens on, which stops delivery.
pub struct SensorSubscription<T> {
    rx: mpsc::Receiver<T>,
    _guard: DropGuard,
}

impl<T> SensorSubscription<T> {
    pub fn new(rx: mpsc::Receiver<T>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            _guard: cancel.drop_guard(),
        }
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

/// Platform sensor access. `None` means the sensor does not exist or
/// registration failed; the arbiter degrades instead of propagating.
pub trait SensorHub: Send + Sync {
    fn step_counter(&self) -> Option<SensorSubscription<CounterReading>>;
    fn accelerometer(&self) -> Option<SensorSubscription<RawSample>>;
}

/// The unified stream downstream consumes, regardless of which source won.
pub enum StepStream {
    Hardware(SensorSubscription<CounterReading>),
    Derived {
        subscription: SensorSubscription<RawSample>,
        detector: AccumulatingDetector,
    },
    Silent {
        emitted_zero: bool,
    },
}

impl StepStream {
    /// Next cumulative total. Pends forever once a source goes quiet or was
    /// never available; the caller's ticker keeps the rest of the system
    /// alive. Cancel-safe for use inside `select!`.
    pub async fn next_total(&mut self) -> CounterReading {
        match self {
            StepStream::Hardware(subscription) => loop {
                match subscription.recv().await {
                    Some(reading) => return reading,
                    // Channel closed: the sensor is gone, go quiet.
                    None => std::future::pending::<()>().await,
                }
            },
            StepStream::Derived {
                subscription,
                detector,
            } => loop {
                match subscription.recv().await {
                    Some(sample) => {
                        if let Some(reading) = detector.process_sample(&sample) {
                            return reading;
                        }
                    }
                    None => std::future::pending::<()>().await,
                }
            },
            StepStream::Silent { emitted_zero } => {
                if !*emitted_zero {
                    *emitted_zero = true;
                    return CounterReading {
                        total: 0,
                        timestamp_ms: 0,
                    };
                }
                std::future::pending().await
            }
        }
    }
}

/// Pick the step source for this tracking lifetime.
pub fn select_source(hub: &dyn SensorHub, detector_config: DetectorConfig) -> StepStream {
    if let Some(subscription) = hub.step_counter() {
        info!("using hardware step counter");
        return StepStream::Hardware(subscription);
    }

    if let Some(subscription) = hub.accelerometer() {
        info!("hardware step counter unavailable, deriving steps from accelerometer");
        return StepStream::Derived {
            subscription,
            detector: AccumulatingDetector::new(detector_config),
        };
    }

    warn!("no motion sensors available, step stream will stay at zero");
    StepStream::Silent {
        emitted_zero: false,
    }
}
