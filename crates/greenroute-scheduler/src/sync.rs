use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenroute_core::{config::SyncConfig, JobId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    records::{RawWeeklyRoutes, WeeklyRoutesRecord},
    types::Job,
};

/// The external store the engine loads from and writes to.
///
/// Routes are always written as a whole table; there is no per-route write.
#[async_trait]
pub trait RoutePersistence: Send + Sync {
    async fn load_jobs(&self) -> Result<Vec<Job>>;

    async fn load_weekly_routes(&self) -> Result<RawWeeklyRoutes>;

    /// Overwrite the stored route table with `record`.
    async fn save_weekly_routes(&self, record: &WeeklyRoutesRecord) -> Result<()>;

    /// Upsert a single job record.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Remove a job record. Removing an absent id is not an error.
    async fn delete_job(&self, id: &JobId) -> Result<()>;
}

/// Most recent flush failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushFailure {
    pub generation: u64,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Snapshot of the synchronizer's progress, published on a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Generation waiting for its debounce window to close.
    pub pending: Option<u64>,
    /// Highest generation known to be written.
    pub flushed: u64,
    pub last_flush_at: Option<DateTime<Utc>>,
    /// Cleared by the next successful flush.
    pub last_error: Option<FlushFailure>,
}

#[derive(Debug)]
struct Snapshot {
    generation: u64,
    record: WeeklyRoutesRecord,
}

enum Command {
    FlushNow { reply: oneshot::Sender<Result<u64>> },
}

/// Debounced writer of the full weekly route table.
///
/// Each [`schedule`](Self::schedule) replaces the pending snapshot and
/// restarts the quiet window; one write happens when the window closes.
/// Failures are published on the status channel and never touch the
/// caller's in-memory state.
pub struct RouteSynchronizer {
    snapshots: watch::Sender<Option<Arc<Snapshot>>>,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SyncStatus>,
    generation: u64,
    task: JoinHandle<()>,
}

impl RouteSynchronizer {
    /// Start the background flush task. Must be called inside a Tokio runtime.
    pub fn spawn(persistence: Arc<dyn RoutePersistence>, config: &SyncConfig) -> Self {
        let (snapshots, snapshot_rx) = watch::channel(None);
        let (commands, command_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (status_tx, status) = watch::channel(SyncStatus::default());

        let worker = FlushWorker {
            persistence,
            debounce: config.debounce(),
            snapshots: snapshot_rx,
            status: status_tx,
        };
        let task = tokio::spawn(worker.run(command_rx));

        Self {
            snapshots,
            commands,
            status,
            generation: 0,
            task,
        }
    }

    /// Queue `record` for a debounced write. Returns its generation number.
    pub fn schedule(&mut self, record: WeeklyRoutesRecord) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        debug!(generation, routes = record.route_count(), "route table flush scheduled");
        self.snapshots
            .send_replace(Some(Arc::new(Snapshot { generation, record })));
        generation
    }

    /// Write `record` now, skipping the debounce window.
    pub async fn flush_now(&mut self, record: WeeklyRoutesRecord) -> Result<u64> {
        self.schedule(record);
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::FlushNow { reply })
            .await
            .map_err(|_| SchedulerError::Persistence("synchronizer has stopped".to_string()))?;
        rx.await
            .map_err(|_| SchedulerError::Persistence("synchronizer dropped the flush".to_string()))?
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// True while some scheduled generation has not been written.
    pub fn is_dirty(&self) -> bool {
        self.status.borrow().flushed < self.generation
    }

    /// Stop the task, writing any pending snapshot first.
    pub async fn shutdown(self) {
        let Self {
            snapshots,
            commands,
            task,
            ..
        } = self;
        drop(commands);
        drop(snapshots);
        if let Err(e) = task.await {
            error!("route synchronizer task failed: {e}");
        }
    }
}

struct FlushWorker {
    persistence: Arc<dyn RoutePersistence>,
    debounce: Duration,
    snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    status: watch::Sender<SyncStatus>,
}

impl FlushWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(debounce_ms = self.debounce.as_millis() as u64, "route synchronizer started");
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        // Session dropped its handle; write what is left.
                        let _ = self.flush(false).await;
                        break;
                    }
                    let generation = self.latest_generation();
                    deadline = Some(Instant::now() + self.debounce);
                    self.status.send_modify(|s| s.pending = generation);
                }
                _ = wait_until(deadline) => {
                    deadline = None;
                    let _ = self.flush(false).await;
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::FlushNow { reply }) => {
                        deadline = None;
                        let result = self.flush(true).await;
                        let _ = reply.send(result);
                    }
                    None => {
                        let _ = self.flush(false).await;
                        break;
                    }
                },
            }
        }
        info!("route synchronizer stopped");
    }

    fn latest_generation(&self) -> Option<u64> {
        self.snapshots.borrow().as_ref().map(|s| s.generation)
    }

    /// Write the newest snapshot. Without `force`, an already-written
    /// generation is skipped.
    async fn flush(&mut self, force: bool) -> Result<u64> {
        let Some(snapshot) = self.snapshots.borrow_and_update().clone() else {
            return Ok(0);
        };
        let generation = snapshot.generation;
        if !force && generation <= self.status.borrow().flushed {
            debug!(generation, "snapshot already flushed");
            return Ok(generation);
        }

        match self.persistence.save_weekly_routes(&snapshot.record).await {
            Ok(()) => {
                info!(
                    generation,
                    routes = snapshot.record.route_count(),
                    jobs = snapshot.record.job_count(),
                    "route table flushed"
                );
                self.status.send_modify(|s| {
                    s.pending = None;
                    s.flushed = s.flushed.max(generation);
                    s.last_flush_at = Some(Utc::now());
                    s.last_error = None;
                });
                Ok(generation)
            }
            Err(e) => {
                error!(generation, error = %e, "route table flush failed; in-memory state kept");
                let message = e.to_string();
                self.status.send_modify(|s| {
                    s.pending = None;
                    s.last_error = Some(FlushFailure {
                        generation,
                        message,
                        at: Utc::now(),
                    });
                });
                Err(e)
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        let latest = self.latest_generation().unwrap_or(0);
        let flushed = self.status.borrow().flushed;
        if latest > flushed {
            warn!(latest, flushed, "route synchronizer stopped with an unwritten snapshot");
        }
    }
}
