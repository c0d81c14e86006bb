use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use greenroute_core::JobId;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    error::{Result, SchedulerError},
    records::{RawWeeklyRoutes, WeeklyRoutesRecord},
    sync::RoutePersistence,
    types::Job,
};

/// In-memory persistence for testing.
///
/// Counts route-table writes and can be told to fail them, or to fail
/// writes for particular jobs.
#[derive(Default)]
pub struct MemoryRouteStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    routes: RwLock<RawWeeklyRoutes>,
    last_record: RwLock<Option<WeeklyRoutesRecord>>,
    route_saves: AtomicUsize,
    fail_route_saves: AtomicBool,
    failing_jobs: RwLock<HashSet<JobId>>,
}

impl MemoryRouteStore {
    pub fn new(jobs: Vec<Job>, routes: RawWeeklyRoutes) -> Self {
        Self {
            jobs: RwLock::new(jobs.into_iter().map(|j| (j.id.clone(), j)).collect()),
            routes: RwLock::new(routes),
            ..Self::default()
        }
    }

    /// Number of successful route-table writes so far.
    pub fn route_saves(&self) -> usize {
        self.route_saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_route_saves(&self, fail: bool) {
        self.fail_route_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every `save_job` for `id` fail until cleared.
    pub async fn fail_job_saves(&self, id: impl Into<JobId>) {
        self.failing_jobs.write().await.insert(id.into());
    }

    pub async fn clear_job_failures(&self) {
        self.failing_jobs.write().await.clear();
    }

    /// The last route table written, as written.
    pub async fn last_record(&self) -> Option<WeeklyRoutesRecord> {
        self.last_record.read().await.clone()
    }

    pub async fn stored_job(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }
}

#[async_trait]
impl RoutePersistence for MemoryRouteStore {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    async fn load_weekly_routes(&self) -> Result<RawWeeklyRoutes> {
        Ok(self.routes.read().await.clone())
    }

    async fn save_weekly_routes(&self, record: &WeeklyRoutesRecord) -> Result<()> {
        if self.fail_route_saves.load(Ordering::SeqCst) {
            return Err(SchedulerError::Persistence(
                "route table write rejected".to_string(),
            ));
        }
        *self.routes.write().await = record.clone().into_raw();
        *self.last_record.write().await = Some(record.clone());
        let n = self.route_saves.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(saves = n, "memory store wrote route table");
        Ok(())
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        if self.failing_jobs.read().await.contains(&job.id) {
            return Err(SchedulerError::Persistence(format!(
                "job {} write rejected",
                job.id
            )));
        }
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn delete_job(&self, id: &JobId) -> Result<()> {
        self.jobs.write().await.remove(id);
        Ok(())
    }
}
