//! SQLite persistence behind a dedicated worker thread.
//!
//! The connection is owned by one thread; async callers submit closures
//! over an mpsc channel and await the result on a oneshot. This keeps
//! rusqlite off the async runtime while serializing all writes.

use std::{
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{DailyHealthRecord, SessionSummary};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("value {value} is negative"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| anyhow!("invalid date '{value}': {err}"))
}

fn read_daily(conn: &Connection, date: NaiveDate) -> Result<Option<DailyHealthRecord>> {
    let row = conn
        .query_row(
            "SELECT date, steps, calories_burned, heart_rate_avg_bpm, sleep_minutes, updated_at
             FROM daily_records WHERE date = ?1",
            params![date.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()
        .with_context(|| "failed to read daily record")?;

    row.map(|(date, steps, calories, heart_rate, sleep, updated_at)| {
        Ok(DailyHealthRecord {
            date: parse_date(&date)?,
            steps: to_u64(steps)?,
            calories_burned: calories,
            heart_rate_avg_bpm: u32::try_from(heart_rate)
                .map_err(|_| anyhow!("heart rate {heart_rate} out of range"))?,
            sleep_minutes: to_u64(sleep)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    })
    .transpose()
}

fn write_daily(conn: &Connection, record: &DailyHealthRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO daily_records (date, steps, calories_burned, heart_rate_avg_bpm, sleep_minutes, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(date) DO UPDATE SET
             steps = excluded.steps,
             calories_burned = excluded.calories_burned,
             heart_rate_avg_bpm = excluded.heart_rate_avg_bpm,
             sleep_minutes = excluded.sleep_minutes,
             updated_at = excluded.updated_at",
        params![
            record.date.to_string(),
            to_i64(record.steps)?,
            record.calories_burned,
            record.heart_rate_avg_bpm as i64,
            to_i64(record.sleep_minutes)?,
            record.updated_at.to_rfc3339(),
        ],
    )
    .with_context(|| "failed to upsert daily record")?;
    Ok(())
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("steptrack-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn get_daily_record(&self, date: NaiveDate) -> Result<Option<DailyHealthRecord>> {
        self.execute(move |conn| read_daily(conn, date)).await
    }

    /// Additive step/calorie write for one calendar day; the row is created
    /// lazily on first write. Read-merge-write happens inside a single
    /// worker task, so deltas are never lost to interleaving.
    pub async fn apply_step_delta(
        &self,
        date: NaiveDate,
        step_delta: u64,
        calorie_delta: f64,
        now: DateTime<Utc>,
    ) -> Result<DailyHealthRecord> {
        self.execute(move |conn| {
            let mut record =
                read_daily(conn, date)?.unwrap_or_else(|| DailyHealthRecord::empty(date, now));
            record.add_steps(step_delta, calorie_delta, now);
            write_daily(conn, &record)?;
            Ok(record)
        })
        .await
    }

    /// Higher-trust external write; merge rule lives on the record.
    pub async fn reconcile_daily_record(
        &self,
        date: NaiveDate,
        external_steps: u64,
        external_heart_rate_bpm: u32,
        calories_per_step: f64,
        now: DateTime<Utc>,
    ) -> Result<DailyHealthRecord> {
        self.execute(move |conn| {
            let mut record =
                read_daily(conn, date)?.unwrap_or_else(|| DailyHealthRecord::empty(date, now));
            record.reconcile(external_steps, external_heart_rate_bpm, calories_per_step, now);
            write_daily(conn, &record)?;
            Ok(record)
        })
        .await
    }

    pub async fn set_sleep_minutes(
        &self,
        date: NaiveDate,
        sleep_minutes: u64,
        now: DateTime<Utc>,
    ) -> Result<DailyHealthRecord> {
        self.execute(move |conn| {
            let mut record =
                read_daily(conn, date)?.unwrap_or_else(|| DailyHealthRecord::empty(date, now));
            record.sleep_minutes = sleep_minutes;
            record.updated_at = now;
            write_daily(conn, &record)?;
            Ok(record)
        })
        .await
    }

    pub async fn insert_session_summary(&self, summary: &SessionSummary) -> Result<()> {
        let record = summary.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO session_summaries (id, started_at, ended_at, steps_taken, calories_burned)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.ended_at.to_rfc3339(),
                    to_i64(record.steps_taken)?,
                    record.calories_burned,
                ],
            )
            .with_context(|| "failed to insert session summary")?;
            Ok(())
        })
        .await
    }

    pub async fn list_session_summaries(&self, limit: u32) -> Result<Vec<SessionSummary>> {
        self.execute(move |conn| {
            let mut statement = conn.prepare(
                "SELECT id, started_at, ended_at, steps_taken, calories_burned
                 FROM session_summaries ORDER BY started_at DESC LIMIT ?1",
            )?;
            let rows = statement.query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            })?;

            let mut summaries = Vec::new();
            for row in rows {
                let (id, started_at, ended_at, steps_taken, calories_burned) = row?;
                summaries.push(SessionSummary {
                    id,
                    started_at: parse_datetime(&started_at)?,
                    ended_at: parse_datetime(&ended_at)?,
                    steps_taken: to_u64(steps_taken)?,
                    calories_burned,
                });
            }
            Ok(summaries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_db() -> Database {
        let path = std::env::temp_dir()
            .join("steptrack-tests")
            .join(format!("db-{}.sqlite", Uuid::new_v4()));
        Database::new(path).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 30).unwrap()
    }

    #[tokio::test]
    async fn daily_record_created_lazily_and_deltas_accumulate() {
        let db = temp_db();
        let now = Utc::now();

        assert!(db.get_daily_record(day()).await.unwrap().is_none());

        db.apply_step_delta(day(), 30, 1.2, now).await.unwrap();
        let record = db.apply_step_delta(day(), 70, 2.8, now).await.unwrap();
        assert_eq!(record.steps, 100);
        assert!((record.calories_burned - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reconcile_zero_external_never_decreases() {
        let db = temp_db();
        let now = Utc::now();
        db.apply_step_delta(day(), 500, 20.0, now).await.unwrap();

        let record = db
            .reconcile_daily_record(day(), 0, 0, 0.04, now)
            .await
            .unwrap();
        assert_eq!(record.steps, 500);
    }

    #[tokio::test]
    async fn reconcile_non_zero_overwrites() {
        let db = temp_db();
        let now = Utc::now();
        db.apply_step_delta(day(), 500, 20.0, now).await.unwrap();

        let record = db
            .reconcile_daily_record(day(), 800, 71, 0.04, now)
            .await
            .unwrap();
        assert_eq!(record.steps, 800);
        assert_eq!(record.heart_rate_avg_bpm, 71);
        assert!((record.calories_burned - 32.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn session_summaries_round_trip() {
        let db = temp_db();
        let now = Utc::now();
        let summary = SessionSummary {
            id: Uuid::new_v4().to_string(),
            started_at: now,
            ended_at: now + chrono::Duration::minutes(20),
            steps_taken: 50,
            calories_burned: 2.0,
        };
        db.insert_session_summary(&summary).await.unwrap();

        let listed = db.list_session_summaries(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].steps_taken, 50);
        assert_eq!(listed[0].id, summary.id);
    }

    #[tokio::test]
    async fn sleep_minutes_write_preserves_steps() {
        let db = temp_db();
        let now = Utc::now();
        db.apply_step_delta(day(), 100, 4.0, now).await.unwrap();
        let record = db.set_sleep_minutes(day(), 420, now).await.unwrap();
        assert_eq!(record.sleep_minutes, 420);
        assert_eq!(record.steps, 100);
    }
}
