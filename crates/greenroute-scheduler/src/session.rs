use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use greenroute_core::{config::SyncConfig, JobId};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::{
    assign::{DeletedRoute, MoveOutcome, RemovalOutcome},
    complete::{BatchReport, CompletionOutcome, CompletionScope},
    error::{JobFailure, Result},
    push::{PushReport, PushRequest},
    routes::{OwnerKind, RouteOwner, RouteSlot, Weekday},
    store::{HydrationReport, SchedulingStore},
    sync::{RoutePersistence, RouteSynchronizer, SyncStatus},
    types::Job,
};

/// A hydrated [`SchedulingStore`] wired to its persistence.
///
/// Every successful route-table mutation schedules a debounced flush of the
/// whole table. Operations that change job records (add, complete, push)
/// also write those jobs before returning; a job whose write fails keeps its
/// in-memory change and is reported as [`JobFailure::Persistence`].
pub struct SchedulingSession {
    store: SchedulingStore,
    persistence: Arc<dyn RoutePersistence>,
    sync: RouteSynchronizer,
}

impl SchedulingSession {
    /// Load jobs and routes, rebuild the store and start the synchronizer.
    #[instrument(skip_all)]
    pub async fn hydrate(
        persistence: Arc<dyn RoutePersistence>,
        config: &SyncConfig,
    ) -> Result<(Self, HydrationReport)> {
        let (jobs, raw) =
            tokio::try_join!(persistence.load_jobs(), persistence.load_weekly_routes())?;
        let (store, report) = SchedulingStore::hydrate(jobs, raw);
        if !report.is_clean() {
            warn!(
                stale = report.stale_references.len(),
                duplicates = report.duplicate_references.len(),
                unknown_weekdays = report.unknown_weekdays.len(),
                "route data needed repair during hydration"
            );
        }

        let sync = RouteSynchronizer::spawn(Arc::clone(&persistence), config);
        let mut session = Self {
            store,
            persistence,
            sync,
        };
        // Persist whatever hydration repaired: the route table and any
        // job record whose recurrence fields were normalized.
        if !report.is_clean() {
            session.mark_dirty();
        }
        session.save_normalized(&report.normalized_jobs).await;
        Ok((session, report))
    }

    pub fn store(&self) -> &SchedulingStore {
        &self.store
    }

    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.sync.status()
    }

    pub fn is_dirty(&self) -> bool {
        self.sync.is_dirty()
    }

    fn mark_dirty(&mut self) {
        self.sync.schedule(self.store.to_record());
    }

    pub fn create_route(&mut self, day: Weekday, name: Option<String>) -> RouteSlot {
        let slot = self.store.create_route(day, name);
        self.mark_dirty();
        slot
    }

    pub fn rename_route(&mut self, slot: RouteSlot, name: impl Into<String>) -> Result<()> {
        self.store.rename_route(slot, name)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn move_from_pool_to_route(&mut self, id: &JobId, slot: RouteSlot) -> Result<usize> {
        let position = self.store.move_from_pool_to_route(id, slot)?;
        self.mark_dirty();
        Ok(position)
    }

    pub fn move_job(
        &mut self,
        id: &JobId,
        from: RouteSlot,
        to: RouteSlot,
        position: usize,
    ) -> Result<MoveOutcome> {
        let outcome = self.store.move_job(id, from, to, position)?;
        if outcome != MoveOutcome::NoOp {
            self.mark_dirty();
        }
        Ok(outcome)
    }

    pub fn remove_from_route(&mut self, id: &JobId) -> Result<RemovalOutcome> {
        let outcome = self.store.remove_from_route(id)?;
        self.mark_dirty();
        Ok(outcome)
    }

    pub fn delete_route(&mut self, slot: RouteSlot) -> Result<DeletedRoute> {
        let deleted = self.store.delete_route(slot)?;
        self.mark_dirty();
        Ok(deleted)
    }

    pub fn assign_owner(
        &mut self,
        slot: RouteSlot,
        kind: OwnerKind,
        owner_id: impl Into<String>,
    ) -> Result<()> {
        self.store.assign_owner(slot, kind, owner_id)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn clear_owner(&mut self, slot: RouteSlot) -> Result<Option<RouteOwner>> {
        let previous = self.store.clear_owner(slot)?;
        if previous.is_some() {
            self.mark_dirty();
        }
        Ok(previous)
    }

    /// Add a job to the pool and write its record.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn add_job(&mut self, job: Job) -> Result<JobId> {
        let id = job.id.clone();
        self.store.add_job(job)?;
        if let Some(job) = self.store.job(&id) {
            self.persistence.save_job(job).await?;
        }
        Ok(id)
    }

    /// Drop a job and its stored record. Route references to it go with it.
    ///
    /// The route table is scheduled before the record is removed, so a failed
    /// delete still leaves the job off every route.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn delete_job(&mut self, id: &JobId) -> Result<Job> {
        let was_assigned = self.store.table().locate(id).is_some();
        let job = self.store.delete_job(id)?;
        if was_assigned {
            self.mark_dirty();
        }
        self.persistence.delete_job(id).await?;
        Ok(job)
    }

    #[instrument(skip(self, ids, as_of, scope), fields(jobs = ids.len(), as_of = %as_of))]
    pub async fn complete_jobs(
        &mut self,
        ids: &[JobId],
        as_of: DateTime<Utc>,
        scope: Option<CompletionScope>,
    ) -> CompletionOutcome {
        match self.store.complete_jobs(ids, as_of, scope) {
            CompletionOutcome::Completed { mut report } => {
                self.persist_jobs(&mut report).await;
                CompletionOutcome::Completed { report }
            }
            pending => pending,
        }
    }

    #[instrument(skip(self))]
    pub async fn push(&mut self, request: &PushRequest) -> Result<PushReport> {
        let mut report = self.store.push(request)?;
        self.persist_jobs(&mut report.report).await;
        Ok(report)
    }

    /// Write the current route table now instead of waiting for the debounce.
    pub async fn flush_now(&mut self) -> Result<()> {
        let generation = self.sync.flush_now(self.store.to_record()).await?;
        info!(generation, "route table flushed on request");
        Ok(())
    }

    /// Stop the synchronizer after writing anything still pending.
    pub async fn shutdown(self) {
        self.sync.shutdown().await;
    }

    /// Rewrite normalized job records. A failed write only costs a repeat of
    /// the repair on the next load.
    async fn save_normalized(&self, ids: &[JobId]) {
        let persistence = &self.persistence;
        let writes = ids
            .iter()
            .filter_map(|id| self.store.job(id))
            .map(|job| async move { (&job.id, persistence.save_job(job).await) });
        for (id, result) in join_all(writes).await {
            match result {
                Ok(()) => info!(job_id = %id, "normalized job record saved"),
                Err(e) => warn!(job_id = %id, error = %e, "normalized job record not saved"),
            }
        }
    }

    /// Write every successfully changed job concurrently; a failed write turns
    /// that job's outcome into a persistence failure.
    async fn persist_jobs(&self, report: &mut BatchReport<Job>) {
        let persistence = &self.persistence;
        let writes = report.results.iter().filter_map(|outcome| {
            let job = outcome.result.as_ref().ok()?;
            Some(async move { (outcome.job_id.clone(), persistence.save_job(job).await) })
        });
        let failures: Vec<(JobId, String)> = join_all(writes)
            .await
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|e| (id, e.to_string())))
            .collect();

        for (id, message) in failures {
            warn!(job_id = %id, error = %message, "job write failed; in-memory change kept");
            if let Some(outcome) = report.results.iter_mut().find(|o| o.job_id == id) {
                outcome.result = Err(JobFailure::Persistence { message });
            }
        }
    }
}
