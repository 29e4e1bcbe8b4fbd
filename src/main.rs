//! Demo harness: runs the engine against a simulated accelerometer for a
//! few seconds of walking and prints the resulting session summary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::info;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use steptrack::{
    CounterReading, Engine, EngineOptions, RawSample, SensorHub, SensorSubscription, Unavailable,
};

/// Feeds a synthetic walking signal: an above-threshold spike every 500 ms
/// over a resting-gravity floor, 50 Hz sampling.
struct SimulatedAccelerometer;

impl SensorHub for SimulatedAccelerometer {
    fn step_counter(&self) -> Option<SensorSubscription<CounterReading>> {
        None
    }

    fn accelerometer(&self) -> Option<SensorSubscription<RawSample>> {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let registration = cancel.clone();

        tokio::spawn(async move {
            let mut elapsed_ms: u64 = 0;
            let mut ticker = tokio::time::interval(Duration::from_millis(20));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let magnitude = if elapsed_ms % 500 == 0 { 13.5 } else { 9.8 };
                        let sample = RawSample::new(elapsed_ms * 1_000_000, [0.3, 0.1, magnitude]);
                        if tx.send(sample).await.is_err() {
                            break;
                        }
                        elapsed_ms += 20;
                    }
                    _ = registration.cancelled() => {
                        info!("simulated accelerometer deregistered");
                        break;
                    }
                }
            }
        });

        Some(SensorSubscription::new(rx, cancel))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let data_dir = std::env::temp_dir().join("steptrack-demo");
    let engine = Engine::new(
        EngineOptions::with_data_dir(data_dir),
        Arc::new(SimulatedAccelerometer),
        Arc::new(Unavailable),
        Arc::new(Unavailable),
    )?;

    engine.start_tracking().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.start_session()?;

    let notification = engine.notification().await;
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        println!("notification: {}", *notification.borrow());
    }

    let summary = engine.finish_session().await?;
    engine.stop_tracking().await?;

    println!(
        "session: {} steps, {:.2} kcal over {} ms",
        summary.steps_taken,
        summary.calories_burned,
        summary.duration_ms()
    );

    if let Some(record) = engine.today_record().await? {
        println!(
            "today: {} steps, {:.2} kcal (hr {} bpm)",
            record.steps, record.calories_burned, record.heart_rate_avg_bpm
        );
    }

    Ok(())
}
