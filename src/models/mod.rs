mod record;
mod sample;
mod summary;

pub use record::DailyHealthRecord;
pub use sample::{CounterReading, RawSample, StepEvent};
pub use summary::SessionSummary;
