pub mod state;
pub mod tracker;

pub use state::{SessionSnapshot, SessionStatus};
pub use tracker::SessionTracker;
