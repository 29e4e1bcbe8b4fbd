use std::sync::Arc;

use chrono::{Local, Utc};
use log::error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{DetectorConfig, EngineConfig};
use crate::daily::DailyAggregator;
use crate::models::CounterReading;
use crate::session::{SessionSnapshot, SessionStatus, SessionTracker};
use crate::source::{select_source, SensorHub};
use crate::store::StateStore;

/// Render the notification line from a session snapshot and today's
/// counter-derived step total.
pub fn format_notification(snapshot: &SessionSnapshot, steps_today: u64) -> String {
    match snapshot.status {
        SessionStatus::Idle => format!("No session · {steps_today} steps today"),
        SessionStatus::Running | SessionStatus::Paused => {
            let total_secs = snapshot.elapsed_ms / 1000;
            let (hours, minutes, seconds) =
                (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);
            let elapsed = if hours > 0 {
                format!("{hours}:{minutes:02}:{seconds:02}")
            } else {
                format!("{minutes:02}:{seconds:02}")
            };
            let suffix = if snapshot.status == SessionStatus::Paused {
                " (paused)"
            } else {
                ""
            };
            format!("{elapsed} · {} steps{suffix}", snapshot.session_steps)
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(super) async fn tracking_loop(
    hub: Arc<dyn SensorHub>,
    session: SessionTracker,
    aggregator: DailyAggregator,
    store: StateStore,
    engine_config: EngineConfig,
    detector_config: DetectorConfig,
    notify_tx: watch::Sender<String>,
    cancel_token: CancellationToken,
) {
    // One source per tracking lifetime; the subscription (and the sensor
    // registration behind it) dies with this task.
    let mut stream = select_source(hub.as_ref(), detector_config);

    let mut ticker = tokio::time::interval(engine_config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            reading = stream.next_total() => {
                handle_reading(reading, &session, &aggregator, &store, &engine_config, &notify_tx).await;
            }
            _ = ticker.tick() => {
                refresh_notification(&store, &session, &notify_tx);

                ticks = ticks.wrapping_add(1);
                if engine_config.reconcile_every_ticks > 0
                    && ticks % engine_config.reconcile_every_ticks == 0
                {
                    let today = Local::now().date_naive();
                    if let Err(err) = aggregator.reconcile_from_external_source(today).await {
                        error!("periodic reconciliation failed: {err:?}");
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }
}

async fn handle_reading(
    reading: CounterReading,
    session: &SessionTracker,
    aggregator: &DailyAggregator,
    store: &StateStore,
    engine_config: &EngineConfig,
    notify_tx: &watch::Sender<String>,
) {
    // Calendar day resolved once per write, never retroactively.
    let today = Local::now().date_naive();

    // Day rollover re-anchors the daily baseline, and the daily delta is
    // taken against the persisted total from the previous observation, so
    // steps counted by the hardware between tracker restarts still land in
    // the record. The very first observation ever only seeds the anchors:
    // a boot-epoch total carries no trustworthy "since midnight" history.
    let mut delta: u64 = 0;
    let bookkeeping = store.update(|state| {
        let first_observation = state.last_saved_date.is_none();
        if state.last_saved_date != Some(today) {
            state.last_saved_date = Some(today);
            state.start_of_day_steps = reading.total;
        }
        if !first_observation {
            let previous = state.last_cumulative_total;
            if reading.total < previous {
                // Counting source rebooted; everything it reports is new,
                // and the daily anchor moves to the new epoch.
                delta = reading.total;
                state.start_of_day_steps = 0;
            } else {
                delta = reading.total - previous;
            }
        }
        state.last_cumulative_total = reading.total;
    });
    if let Err(err) = bookkeeping {
        error!("tracker bookkeeping write failed: {err:?}");
        delta = 0;
    }

    if delta > 0 {
        let calorie_delta = engine_config.calories_for_steps(delta);
        if let Err(err) = aggregator.apply_step_delta(today, delta, calorie_delta).await {
            error!("daily step write failed: {err:?}");
        }
    }

    if let Err(err) = session.observe(reading.total) {
        error!("session observe failed: {err:?}");
    }

    refresh_notification(store, session, notify_tx);
}

fn refresh_notification(
    store: &StateStore,
    session: &SessionTracker,
    notify_tx: &watch::Sender<String>,
) {
    let shared = store.read();
    let total = shared.last_cumulative_total;
    let snapshot = session.snapshot(total, Utc::now());
    notify_tx.send_replace(format_notification(&snapshot, shared.steps_today(total)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::db::Database;
    use crate::health::Unavailable;
    use crate::models::RawSample;
    use crate::source::SensorSubscription;
    use crate::tracker::TrackerController;

    struct AccelOnlyHub {
        rx: std::sync::Mutex<Option<SensorSubscription<RawSample>>>,
    }

    impl SensorHub for AccelOnlyHub {
        fn step_counter(&self) -> Option<SensorSubscription<CounterReading>> {
            None
        }

        fn accelerometer(&self) -> Option<SensorSubscription<RawSample>> {
            self.rx.lock().unwrap().take()
        }
    }

    fn unique_path(kind: &str, extension: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join("steptrack-tests")
            .join(format!("{kind}-{}.{extension}", Uuid::new_v4()))
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            tick_interval: Duration::from_millis(10),
            reconcile_every_ticks: 0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn notification_formats_idle_running_and_paused() {
        let idle = SessionSnapshot {
            status: SessionStatus::Idle,
            session_steps: 0,
            started_at: None,
            elapsed_ms: 0,
        };
        assert_eq!(format_notification(&idle, 4350), "No session · 4350 steps today");

        let running = SessionSnapshot {
            status: SessionStatus::Running,
            session_steps: 42,
            started_at: Some(Utc::now()),
            elapsed_ms: 5 * 60_000 + 7_000,
        };
        assert_eq!(format_notification(&running, 4350), "05:07 · 42 steps");

        let paused = SessionSnapshot {
            status: SessionStatus::Paused,
            session_steps: 42,
            started_at: Some(Utc::now()),
            elapsed_ms: 3_661_000,
        };
        assert_eq!(format_notification(&paused, 0), "1:01:01 · 42 steps (paused)");
    }

    #[tokio::test]
    async fn tracking_loop_counts_steps_into_session_and_daily_record() {
        let store = StateStore::new(unique_path("tracker-state", "json")).unwrap();
        let db = Database::new(unique_path("tracker-db", "sqlite")).unwrap();
        let session = SessionTracker::new(store.clone(), EngineConfig::default());
        let aggregator = DailyAggregator::new(
            db,
            Arc::new(Unavailable),
            Arc::new(Unavailable),
            EngineConfig::default(),
        );

        let (tx, rx) = mpsc::channel(32);
        let hub = Arc::new(AccelOnlyHub {
            rx: std::sync::Mutex::new(Some(SensorSubscription::new(
                rx,
                CancellationToken::new(),
            ))),
        });

        session.start(0, Utc::now()).unwrap();

        let mut controller = TrackerController::new();
        controller
            .start(
                hub,
                session.clone(),
                aggregator.clone(),
                store.clone(),
                fast_config(),
                DetectorConfig::default(),
            )
            .unwrap();
        let notification = controller.notification();

        // Three strides, each past the debounce window.
        for ms in [0u64, 400, 800] {
            tx.send(RawSample::new(ms * 1_000_000, [0.0, 0.0, 13.0]))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        controller.stop().await.unwrap();

        // First derived total seeds the delta baseline; the remaining two
        // land in the daily record.
        let today = Local::now().date_naive();
        let record = aggregator.daily_record(today).await.unwrap().unwrap();
        assert_eq!(record.steps, 2);

        assert_eq!(session.observe(3).unwrap(), 3);
        assert!(notification.borrow().contains("steps"));

        let shared = store.read();
        assert_eq!(shared.last_saved_date, Some(today));
    }

    struct CounterOnlyHub {
        rx: std::sync::Mutex<Option<SensorSubscription<CounterReading>>>,
    }

    impl SensorHub for CounterOnlyHub {
        fn step_counter(&self) -> Option<SensorSubscription<CounterReading>> {
            self.rx.lock().unwrap().take()
        }

        fn accelerometer(&self) -> Option<SensorSubscription<RawSample>> {
            None
        }
    }

    fn counter_hub(
        rx: mpsc::Receiver<CounterReading>,
    ) -> Arc<CounterOnlyHub> {
        Arc::new(CounterOnlyHub {
            rx: std::sync::Mutex::new(Some(SensorSubscription::new(
                rx,
                CancellationToken::new(),
            ))),
        })
    }

    #[tokio::test]
    async fn daily_deltas_survive_tracker_restart() {
        let store = StateStore::new(unique_path("restart-state", "json")).unwrap();
        let db = Database::new(unique_path("restart-db", "sqlite")).unwrap();
        let session = SessionTracker::new(store.clone(), EngineConfig::default());
        let aggregator = DailyAggregator::new(
            db,
            Arc::new(Unavailable),
            Arc::new(Unavailable),
            EngineConfig::default(),
        );

        let mut controller = TrackerController::new();

        // First tracker lifetime: the initial observation only seeds the
        // persisted anchors.
        let (tx, rx) = mpsc::channel(8);
        controller
            .start(
                counter_hub(rx),
                session.clone(),
                aggregator.clone(),
                store.clone(),
                fast_config(),
                DetectorConfig::default(),
            )
            .unwrap();
        tx.send(CounterReading { total: 1000, timestamp_ms: 0 })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.stop().await.unwrap();

        // Second lifetime: steps counted by the hardware while the tracker
        // was down are still credited against the persisted total.
        let (tx, rx) = mpsc::channel(8);
        controller
            .start(
                counter_hub(rx),
                session.clone(),
                aggregator.clone(),
                store.clone(),
                fast_config(),
                DetectorConfig::default(),
            )
            .unwrap();
        tx.send(CounterReading { total: 1060, timestamp_ms: 0 })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.stop().await.unwrap();

        let today = Local::now().date_naive();
        let record = aggregator.daily_record(today).await.unwrap().unwrap();
        assert_eq!(record.steps, 60);
        assert_eq!(store.read().last_cumulative_total, 1060);
    }

    #[tokio::test]
    async fn notification_uses_persisted_total_before_first_reading() {
        let store = StateStore::new(unique_path("notify-state", "json")).unwrap();
        let db = Database::new(unique_path("notify-db", "sqlite")).unwrap();
        let session = SessionTracker::new(store.clone(), EngineConfig::default());
        let aggregator = DailyAggregator::new(
            db,
            Arc::new(Unavailable),
            Arc::new(Unavailable),
            EngineConfig::default(),
        );

        // A previous tracker lifetime left a running session and a
        // persisted total behind.
        store
            .update(|state| {
                state.last_saved_date = Some(Local::now().date_naive());
                state.last_cumulative_total = 1000;
                state.start_of_day_steps = 900;
            })
            .unwrap();
        session.start(970, Utc::now()).unwrap();

        // Counter subscription that never delivers, so only ticks drive
        // the notification.
        let (_tx, rx) = mpsc::channel(1);
        let mut controller = TrackerController::new();
        controller
            .start(
                counter_hub(rx),
                session,
                aggregator,
                store,
                fast_config(),
                DetectorConfig::default(),
            )
            .unwrap();
        let notification = controller.notification();
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.stop().await.unwrap();

        assert!(
            notification.borrow().contains("30 steps"),
            "notification was '{}'",
            *notification.borrow()
        );
    }

    #[tokio::test]
    async fn stop_without_start_is_idempotent() {
        let mut controller = TrackerController::new();
        controller.stop().await.unwrap();
        assert!(!controller.is_running());
    }
}
