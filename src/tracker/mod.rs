//! Background tracking context.
//!
//! One long-lived task owns the sensor subscription, folds cumulative
//! totals into the session and the daily record, and keeps a notification
//! text surface fresh at tick cadence even when no steps arrive. Stopping
//! the controller cancels the task, which drops the subscription and with
//! it the sensor registration; nothing outlives the tracker.

mod worker;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{DetectorConfig, EngineConfig};
use crate::daily::DailyAggregator;
use crate::session::SessionTracker;
use crate::source::SensorHub;
use crate::store::StateStore;

pub use worker::format_notification;

pub struct TrackerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    notification: watch::Receiver<String>,
}

impl TrackerController {
    pub fn new() -> Self {
        let (_, rx) = watch::channel(String::new());
        Self {
            handle: None,
            cancel_token: None,
            notification: rx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Latest notification line; the surface re-renders whenever this
    /// changes. A projection of session state, never a source of truth.
    pub fn notification(&self) -> watch::Receiver<String> {
        self.notification.clone()
    }

    pub fn start(
        &mut self,
        hub: Arc<dyn SensorHub>,
        session: SessionTracker,
        aggregator: DailyAggregator,
        store: StateStore,
        engine_config: EngineConfig,
        detector_config: DetectorConfig,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("tracker already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        let (notify_tx, notify_rx) = watch::channel(String::new());

        let handle = tokio::spawn(worker::tracking_loop(
            hub,
            session,
            aggregator,
            store,
            engine_config,
            detector_config,
            notify_tx,
            token_clone,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.notification = notify_rx;
        info!("background tracker started");
        Ok(())
    }

    /// Cancel the worker and everything it owns, then wait for it to
    /// finish. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("tracking loop task failed to join")?;
            info!("background tracker stopped");
        }
        Ok(())
    }
}

impl Default for TrackerController {
    fn default() -> Self {
        Self::new()
    }
}
