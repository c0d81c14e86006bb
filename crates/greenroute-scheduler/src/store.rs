use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use greenroute_core::JobId;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::{Result, SchedulerError},
    records::{RawWeeklyRoutes, WeeklyRoutesRecord},
    routes::{Route, RouteOwner, RouteSlot, Weekday, WeeklyRouteTable},
    schedule::{is_due, next_due_date},
    types::{Job, RecurrenceBucket},
};

/// Everything the scheduling engine owns for one session: the job catalog
/// and the weekly route table.
///
/// The pool is never stored. A job is in the pool when no route references
/// it and its status is not completed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchedulingStore {
    pub(crate) jobs: HashMap<JobId, Job>,
    pub(crate) table: WeeklyRouteTable,
}

/// Where a job currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobLocation {
    Pool,
    Route {
        slot: RouteSlot,
        bucket: RecurrenceBucket,
        /// Position among the route's jobs of the same bucket.
        position: usize,
    },
}

/// Tolerated inconsistencies found while hydrating.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HydrationReport {
    /// Route references to job ids with no job record; dropped.
    pub stale_references: Vec<(RouteSlot, JobId)>,
    /// Ids referenced by more than one route; kept in the first only.
    pub duplicate_references: Vec<(RouteSlot, JobId)>,
    /// Weekday keys that are not one of the seven English names; skipped.
    pub unknown_weekdays: Vec<String>,
    /// Routes that named both an employee and a crew; the employee was kept.
    pub conflicting_owners: Vec<RouteSlot>,
    /// One-time jobs that carried a recurrence pattern; reset to none.
    pub normalized_jobs: Vec<JobId>,
}

impl HydrationReport {
    pub fn is_clean(&self) -> bool {
        self.stale_references.is_empty()
            && self.duplicate_references.is_empty()
            && self.unknown_weekdays.is_empty()
            && self.conflicting_owners.is_empty()
            && self.normalized_jobs.is_empty()
    }
}

/// A job plus the values computed for it at a reference instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedJob {
    pub job: Job,
    pub is_due: bool,
    pub bucket: RecurrenceBucket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due: Option<NaiveDate>,
}

/// A route rendered with its jobs grouped by recurrence bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteView {
    pub slot: RouteSlot,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<RouteOwner>,
    pub one_time: Vec<AnnotatedJob>,
    pub weekly: Vec<AnnotatedJob>,
    pub bi_weekly: Vec<AnnotatedJob>,
    pub monthly: Vec<AnnotatedJob>,
}

impl RouteView {
    pub fn bucket(&self, bucket: RecurrenceBucket) -> &[AnnotatedJob] {
        match bucket {
            RecurrenceBucket::OneTime => &self.one_time,
            RecurrenceBucket::Weekly => &self.weekly,
            RecurrenceBucket::BiWeekly => &self.bi_weekly,
            RecurrenceBucket::Monthly => &self.monthly,
        }
    }
}

impl SchedulingStore {
    /// An empty store with a fresh table (one empty route per weekday).
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the in-memory state from what the persistence layer returned.
    ///
    /// Never fails: stale references, duplicate placements, unknown weekday
    /// keys and double owners are dropped or resolved and listed in the report.
    pub fn hydrate(jobs: Vec<Job>, raw: RawWeeklyRoutes) -> (Self, HydrationReport) {
        let mut report = HydrationReport::default();

        let jobs: HashMap<JobId, Job> = jobs
            .into_iter()
            .map(|mut job| {
                if job.normalize() {
                    report.normalized_jobs.push(job.id.clone());
                }
                (job.id.clone(), job)
            })
            .collect();

        let mut by_day: HashMap<Weekday, Vec<_>> = HashMap::new();
        for (key, routes) in raw {
            match key.parse::<Weekday>() {
                Ok(day) => by_day.entry(day).or_default().extend(routes),
                Err(_) => {
                    warn!(weekday = %key, routes = routes.len(), "unknown weekday key in route data");
                    report.unknown_weekdays.push(key);
                }
            }
        }

        let mut table = WeeklyRouteTable::empty();
        let mut placed: HashSet<JobId> = HashSet::new();
        for day in Weekday::ALL {
            let mut routes = by_day.remove(&day).unwrap_or_default();
            // Stable: routes without an index keep their listed order, after indexed ones.
            routes.sort_by_key(|r| r.index.unwrap_or(usize::MAX));

            for raw_route in routes {
                let conflicting = raw_route.has_conflicting_owner();
                let owner = raw_route.owner();
                let mut route = Route::new(0, raw_route.name);
                route.owner = owner;
                let ids = raw_route.jobs.into_ids();
                let slot = table.push_existing(day, route);
                if conflicting {
                    warn!(%slot, "route has both an employee and a crew; keeping the employee");
                    report.conflicting_owners.push(slot);
                }

                let Some(route) = table.route_mut(slot) else {
                    continue;
                };
                for id in ids {
                    if !jobs.contains_key(&id) {
                        warn!(%slot, job_id = %id, "dropping reference to missing job");
                        report.stale_references.push((slot, id));
                    } else if !placed.insert(id.clone()) {
                        warn!(%slot, job_id = %id, "job already placed on an earlier route; dropping duplicate");
                        report.duplicate_references.push((slot, id));
                    } else {
                        route.insert_at(usize::MAX, id);
                    }
                }
            }
        }

        let store = Self { jobs, table };
        info!(
            jobs = store.jobs.len(),
            pool = store.pool_ids().len(),
            clean = report.is_clean(),
            "scheduling store hydrated"
        );
        (store, report)
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn table(&self) -> &WeeklyRouteTable {
        &self.table
    }

    pub fn route(&self, slot: RouteSlot) -> Result<&Route> {
        self.table
            .route(slot)
            .ok_or(SchedulerError::RouteNotFound { slot })
    }

    pub(crate) fn require_job(&self, id: &JobId) -> Result<&Job> {
        self.jobs
            .get(id)
            .ok_or_else(|| SchedulerError::JobNotFound { id: id.to_string() })
    }

    pub fn is_in_pool(&self, id: &JobId) -> bool {
        self.jobs
            .get(id)
            .is_some_and(|job| job.is_poolable() && self.table.locate(id).is_none())
    }

    /// Pool members, sorted by id for stable output.
    pub fn pool_ids(&self) -> Vec<JobId> {
        let assigned = self.table.assigned_ids();
        let mut ids: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.is_poolable() && !assigned.contains(&job.id))
            .map(|job| job.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Current location, or `None` for unknown ids and completed jobs off every route.
    pub fn location_of(&self, id: &JobId) -> Option<JobLocation> {
        let job = self.jobs.get(id)?;
        match self.table.locate(id) {
            Some(slot) => {
                let route = self.table.route(slot)?;
                let position = route.bucket_position(id, &self.jobs)?;
                Some(JobLocation::Route {
                    slot,
                    bucket: job.bucket(),
                    position,
                })
            }
            None if job.is_poolable() => Some(JobLocation::Pool),
            None => None,
        }
    }

    pub fn annotate(&self, job: &Job, as_of: DateTime<Utc>) -> AnnotatedJob {
        AnnotatedJob {
            job: job.clone(),
            is_due: is_due(job, as_of),
            bucket: job.bucket(),
            next_due: next_due_date(job),
        }
    }

    pub fn pool_view(&self, as_of: DateTime<Utc>) -> Vec<AnnotatedJob> {
        self.pool_ids()
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .map(|job| self.annotate(job, as_of))
            .collect()
    }

    pub fn route_view(&self, slot: RouteSlot, as_of: DateTime<Utc>) -> Result<RouteView> {
        let route = self.route(slot)?;
        let collect = |bucket| {
            route
                .bucket_members(bucket, &self.jobs)
                .into_iter()
                .filter_map(|id| self.jobs.get(id))
                .map(|job| self.annotate(job, as_of))
                .collect::<Vec<_>>()
        };
        Ok(RouteView {
            slot,
            name: route.name.clone(),
            owner: route.owner.clone(),
            one_time: collect(RecurrenceBucket::OneTime),
            weekly: collect(RecurrenceBucket::Weekly),
            bi_weekly: collect(RecurrenceBucket::BiWeekly),
            monthly: collect(RecurrenceBucket::Monthly),
        })
    }

    /// Every route of the week, rendered.
    pub fn week_view(&self, as_of: DateTime<Utc>) -> Vec<RouteView> {
        self.table
            .iter()
            .filter_map(|(day, route)| self.route_view(RouteSlot::new(day, route.index), as_of).ok())
            .collect()
    }

    /// Every job that is due, wherever it sits.
    pub fn due_jobs(&self, as_of: DateTime<Utc>) -> Vec<AnnotatedJob> {
        let mut due: Vec<AnnotatedJob> = self
            .jobs
            .values()
            .filter(|job| is_due(job, as_of))
            .map(|job| self.annotate(job, as_of))
            .collect();
        due.sort_by(|a, b| a.job.id.cmp(&b.job.id));
        due
    }

    /// Snapshot of the route table as the persistence layer stores it.
    pub fn to_record(&self) -> WeeklyRoutesRecord {
        WeeklyRoutesRecord::from(&self.table)
    }

    /// Register a new job. It starts unassigned.
    pub fn add_job(&mut self, mut job: Job) -> Result<()> {
        if self.jobs.contains_key(&job.id) {
            return Err(SchedulerError::InvariantViolation(format!(
                "job {} already exists",
                job.id
            )));
        }
        job.normalize();
        info!(job_id = %job.id, service = %job.service, "job added");
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    /// Delete a job record, pulling it off whatever route holds it.
    pub fn delete_job(&mut self, id: &JobId) -> Result<Job> {
        let job = self
            .jobs
            .remove(id)
            .ok_or_else(|| SchedulerError::JobNotFound { id: id.to_string() })?;
        for (day, route) in self.table.iter_mut() {
            if route.remove(id).is_some() {
                info!(job_id = %id, weekday = %day, route = route.index, "deleted job removed from route");
            }
        }
        info!(job_id = %id, "job deleted");
        Ok(job)
    }

    /// Verify the single-location invariant and that every reference resolves.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen: HashSet<&JobId> = HashSet::new();
        for (day, route) in self.table.iter() {
            for id in route.jobs() {
                if !self.jobs.contains_key(id) {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "{day} #{} references missing job {id}",
                        route.index
                    )));
                }
                if !seen.insert(id) {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "job {id} appears on more than one route"
                    )));
                }
            }
        }
        for day in Weekday::ALL {
            for (i, route) in self.table.routes(day).iter().enumerate() {
                if route.index != i {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "{day} route indices are not contiguous"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{RawRoute, RawRouteJobs};
    use crate::types::{JobStatus, RecurrencePattern};
    use chrono::TimeZone;

    fn raw(day: &str, routes: Vec<RawRoute>) -> RawWeeklyRoutes {
        [(day.to_string(), routes)].into_iter().collect()
    }

    fn route_with(index: usize, ids: &[&str]) -> RawRoute {
        RawRoute {
            index: Some(index),
            jobs: RawRouteJobs::Flat(ids.iter().map(|s| JobId::from(*s)).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn hydrate_derives_pool_and_drops_stale_ids() {
        let jobs = vec![
            Job::one_time("a").with_id("a"),
            Job::one_time("b").with_id("b"),
            Job::one_time("done").with_id("done").with_status(JobStatus::Completed),
        ];
        let (store, report) =
            SchedulingStore::hydrate(jobs, raw("Monday", vec![route_with(0, &["a", "ghost"])]));

        assert_eq!(report.stale_references.len(), 1);
        assert_eq!(store.pool_ids(), vec![JobId::from("b")]);
        assert!(store.location_of(&"done".into()).is_none());
        assert!(store.check_invariants().is_ok());
        // Missing weekday keys still exist, empty.
        assert!(store.table().routes(Weekday::Friday).is_empty());
    }

    #[test]
    fn hydrate_keeps_first_of_duplicate_placements() {
        let jobs = vec![Job::one_time("a").with_id("a")];
        let mut data = raw("Tuesday", vec![route_with(0, &["a"])]);
        data.insert("Monday".into(), vec![route_with(0, &["a"])]);
        data.insert("Caturday".into(), vec![route_with(0, &["a"])]);

        let (store, report) = SchedulingStore::hydrate(jobs, data);
        assert_eq!(store.table().locate(&"a".into()), Some(RouteSlot::new(Weekday::Monday, 0)));
        assert_eq!(report.duplicate_references.len(), 1);
        assert_eq!(report.unknown_weekdays, vec!["Caturday".to_string()]);
    }

    #[test]
    fn hydrate_reindexes_sparse_route_indices() {
        let jobs = vec![Job::one_time("a").with_id("a")];
        let (store, _) = SchedulingStore::hydrate(
            jobs,
            raw("Wednesday", vec![route_with(5, &["a"]), route_with(2, &[])]),
        );
        let routes = store.table().routes(Weekday::Wednesday);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].index, 0);
        assert!(routes[0].is_empty());
        assert!(routes[1].contains(&"a".into()));
    }

    #[test]
    fn buckets_come_from_the_job_not_the_route_data() {
        let weekly = Job::recurring("w", RecurrencePattern::Weekly).unwrap().with_id("w");
        let data = raw(
            "Monday",
            vec![RawRoute {
                index: Some(0),
                // Legacy data filed the weekly job under monthly.
                jobs: RawRouteJobs::Grouped(crate::records::LegacyBuckets {
                    monthly: vec!["w".into()],
                    ..Default::default()
                }),
                ..Default::default()
            }],
        );
        let (store, _) = SchedulingStore::hydrate(vec![weekly], data);
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();
        let view = store.route_view(RouteSlot::new(Weekday::Monday, 0), now).unwrap();
        assert_eq!(view.weekly.len(), 1);
        assert!(view.monthly.is_empty());
        assert!(view.weekly[0].is_due);
    }

    #[test]
    fn delete_job_removes_route_reference() {
        let (mut store, _) = SchedulingStore::hydrate(
            vec![Job::one_time("a").with_id("a")],
            raw("Monday", vec![route_with(0, &["a"])]),
        );
        store.delete_job(&"a".into()).unwrap();
        assert!(store.table().assigned_ids().is_empty());
        assert!(matches!(
            store.delete_job(&"a".into()),
            Err(SchedulerError::JobNotFound { .. })
        ));
    }

    #[test]
    fn add_job_rejects_duplicate_ids() {
        let mut store = SchedulingStore::new();
        store.add_job(Job::one_time("a").with_id("a")).unwrap();
        assert!(store.is_in_pool(&"a".into()));
        assert!(store.add_job(Job::one_time("again").with_id("a")).is_err());
    }
}
