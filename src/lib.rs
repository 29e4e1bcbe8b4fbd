mod config;
mod daily;
mod db;
mod detector;
mod health;
mod models;
mod session;
mod source;
mod store;
mod tracker;

pub use config::{DetectorConfig, EngineConfig};
pub use daily::DailyAggregator;
pub use db::Database;
pub use detector::{AccumulatingDetector, StepDetector};
pub use health::{CloudSink, HealthPlatform, Unavailable};
pub use models::{CounterReading, DailyHealthRecord, RawSample, SessionSummary, StepEvent};
pub use session::{SessionSnapshot, SessionStatus, SessionTracker};
pub use source::{SensorHub, SensorSubscription, StepStream};
pub use store::{SharedState, StateStore};
pub use tracker::{format_notification, TrackerController};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use tokio::sync::{watch, Mutex};

/// Wiring options for [`Engine::new`]; one durable store and one database
/// per process, injected here rather than reached for globally.
pub struct EngineOptions {
    /// Directory holding the shared-state document and the SQLite file.
    pub data_dir: PathBuf,
    /// Body weight used for session-summary calorie estimates.
    pub user_weight_kg: f64,
    pub engine: EngineConfig,
    pub detector: DetectorConfig,
}

impl EngineOptions {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            user_weight_kg: 70.0,
            engine: EngineConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

/// Interactive-context facade over the engine. Holds the same store and
/// database handles as the background tracker; every session decision
/// re-reads the store rather than trusting a cached view.
pub struct Engine {
    store: StateStore,
    session: SessionTracker,
    aggregator: DailyAggregator,
    db: Database,
    tracker: Mutex<TrackerController>,
    hub: Arc<dyn SensorHub>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        options: EngineOptions,
        hub: Arc<dyn SensorHub>,
        health: Arc<dyn HealthPlatform>,
        cloud: Arc<dyn CloudSink>,
    ) -> Result<Self> {
        let store = StateStore::new(options.data_dir.join("session_state.json"))?;
        let db = Database::new(options.data_dir.join("steptrack.sqlite"))?;
        let session = SessionTracker::new(store.clone(), options.engine.clone());
        let aggregator = DailyAggregator::new(db.clone(), health, cloud, options.engine.clone());

        Ok(Self {
            store,
            session,
            aggregator,
            db,
            tracker: Mutex::new(TrackerController::new()),
            hub,
            options,
        })
    }

    pub async fn start_tracking(&self) -> Result<()> {
        self.tracker.lock().await.start(
            self.hub.clone(),
            self.session.clone(),
            self.aggregator.clone(),
            self.store.clone(),
            self.options.engine.clone(),
            self.options.detector.clone(),
        )
    }

    pub async fn stop_tracking(&self) -> Result<()> {
        self.tracker.lock().await.stop().await
    }

    pub async fn notification(&self) -> watch::Receiver<String> {
        self.tracker.lock().await.notification()
    }

    pub fn start_session(&self) -> Result<()> {
        let total = self.store.read().last_cumulative_total;
        self.session.start(total, Utc::now())
    }

    pub fn pause_session(&self) -> Result<()> {
        let total = self.store.read().last_cumulative_total;
        self.session.pause(total)
    }

    pub fn resume_session(&self) -> Result<()> {
        self.session.resume()
    }

    /// Finish the session and fan the summary out to the local store, the
    /// health platform and the cloud sink.
    pub async fn finish_session(&self) -> Result<SessionSummary> {
        let total = self.store.read().last_cumulative_total;
        let summary = self
            .session
            .finish(total, Utc::now(), self.options.user_weight_kg)?;
        self.aggregator.record_session_summary(&summary).await?;
        Ok(summary)
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        let total = self.store.read().last_cumulative_total;
        self.session.snapshot(total, Utc::now())
    }

    pub async fn daily_record(&self, date: NaiveDate) -> Result<Option<DailyHealthRecord>> {
        self.aggregator.daily_record(date).await
    }

    pub async fn today_record(&self) -> Result<Option<DailyHealthRecord>> {
        self.daily_record(Local::now().date_naive()).await
    }

    pub async fn reconcile_today(&self) -> Result<DailyHealthRecord> {
        self.aggregator
            .reconcile_from_external_source(Local::now().date_naive())
            .await
    }

    pub async fn record_sleep_minutes(
        &self,
        date: NaiveDate,
        minutes: u64,
    ) -> Result<DailyHealthRecord> {
        self.aggregator.record_sleep_minutes(date, minutes).await
    }

    pub async fn recent_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>> {
        self.db.list_session_summaries(limit).await
    }
}
