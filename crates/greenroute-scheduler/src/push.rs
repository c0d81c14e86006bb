use chrono::Duration;
use greenroute_core::JobId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    complete::{BatchReport, JobOutcome},
    error::{JobFailure, Result, SchedulerError},
    routes::RouteSlot,
    store::SchedulingStore,
    types::Job,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushTarget {
    /// Every job currently on the route.
    Route { slot: RouteSlot },
    /// One job, which must be on `slot`.
    Job { slot: RouteSlot, job_id: JobId },
}

impl PushTarget {
    pub fn slot(&self) -> RouteSlot {
        match self {
            PushTarget::Route { slot } | PushTarget::Job { slot, .. } => *slot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushUnit {
    Day,
    Week,
}

impl PushUnit {
    fn days(&self) -> i64 {
        match self {
            PushUnit::Day => 1,
            PushUnit::Week => 7,
        }
    }
}

/// Which occurrences a push is meant to affect.
///
/// There is no per-occurrence exception store, so `Future` currently has the
/// same effect as `Single`: the shared last-service baseline moves. Reports
/// for a `Future` push carry `scope_collapsed = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushScope {
    Single,
    Future,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    pub target: PushTarget,
    pub count: u32,
    pub unit: PushUnit,
    pub scope: PushScope,
}

impl PushRequest {
    pub fn shift(&self) -> Result<Duration> {
        let days = i64::from(self.count) * self.unit.days();
        if days == 0 {
            return Err(SchedulerError::InvalidPush(
                "shift must be at least one day".to_string(),
            ));
        }
        Ok(Duration::days(days))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushReport {
    pub shift_days: i64,
    pub scope: PushScope,
    /// `true` when a `Future` push was applied as a single-occurrence shift.
    pub scope_collapsed: bool,
    #[serde(flatten)]
    pub report: BatchReport<Job>,
}

impl Job {
    /// Move the last-service baseline forward by `shift`.
    pub fn push_service_date(&mut self, shift: Duration) -> std::result::Result<(), JobFailure> {
        let last = self.last_service_date.ok_or(JobFailure::NoServiceHistory)?;
        let pushed = last
            .checked_add_signed(shift)
            .ok_or(JobFailure::DateOutOfRange)?;
        self.last_service_date = Some(pushed);
        Ok(())
    }
}

impl SchedulingStore {
    /// Shift the next due computation for a route's jobs, or one job, forward.
    ///
    /// The request itself is validated up front (interval, route, job on
    /// route). After that each job succeeds or fails on its own.
    pub fn push(&mut self, request: &PushRequest) -> Result<PushReport> {
        let shift = request.shift()?;
        let slot = request.target.slot();
        let route = self.route(slot)?;

        let ids: Vec<JobId> = match &request.target {
            PushTarget::Route { .. } => route.jobs().to_vec(),
            PushTarget::Job { job_id, .. } => {
                if !route.contains(job_id) {
                    return Err(SchedulerError::NotOnRoute {
                        id: job_id.to_string(),
                        slot,
                    });
                }
                vec![job_id.clone()]
            }
        };

        let scope_collapsed = request.scope == PushScope::Future;
        if scope_collapsed {
            warn!(%slot, "future-occurrence push applied as a single-occurrence shift");
        }

        let results = ids
            .into_iter()
            .map(|id| {
                let result = match self.jobs.get_mut(&id) {
                    Some(job) => job.push_service_date(shift).map(|()| job.clone()),
                    None => Err(JobFailure::NotFound),
                };
                match &result {
                    Ok(job) => info!(
                        job_id = %id,
                        days = shift.num_days(),
                        last_service = ?job.last_service_date,
                        "job pushed"
                    ),
                    Err(e) => warn!(job_id = %id, error = %e, "job not pushed"),
                }
                JobOutcome { job_id: id, result }
            })
            .collect();

        Ok(PushReport {
            shift_days: shift.num_days(),
            scope: request.scope,
            scope_collapsed,
            report: BatchReport { results },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::Weekday;
    use crate::schedule::is_due;
    use crate::types::RecurrencePattern;
    use chrono::{DateTime, TimeZone, Utc};

    const SLOT: RouteSlot = RouteSlot {
        weekday: Weekday::Thursday,
        index: 0,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 9, 8, 0, 0).unwrap()
    }

    fn store() -> SchedulingStore {
        let mut store = SchedulingStore::new();
        let serviced = Job::recurring("w", RecurrencePattern::Weekly)
            .unwrap()
            .with_id("w")
            .with_last_service_date(now() - Duration::days(7));
        let never = Job::recurring("n", RecurrencePattern::Weekly).unwrap().with_id("n");
        for job in [serviced, never] {
            let id = job.id.clone();
            store.add_job(job).unwrap();
            store.move_from_pool_to_route(&id, SLOT).unwrap();
        }
        store
    }

    fn request(target: PushTarget, count: u32, unit: PushUnit, scope: PushScope) -> PushRequest {
        PushRequest {
            target,
            count,
            unit,
            scope,
        }
    }

    #[test]
    fn pushing_a_job_by_a_day_delays_its_due_date() {
        let mut store = store();
        assert!(is_due(store.job(&"w".into()).unwrap(), now()));

        let target = PushTarget::Job {
            slot: SLOT,
            job_id: "w".into(),
        };
        let report = store
            .push(&request(target, 1, PushUnit::Day, PushScope::Single))
            .unwrap();
        assert!(report.report.all_succeeded());
        assert!(!report.scope_collapsed);

        let job = store.job(&"w".into()).unwrap();
        assert_eq!(job.last_service_date, Some(now() - Duration::days(6)));
        assert!(!is_due(job, now()));
        assert!(is_due(job, now() + Duration::days(1)));
    }

    #[test]
    fn route_push_reports_each_job_independently() {
        let mut store = store();
        let report = store
            .push(&request(
                PushTarget::Route { slot: SLOT },
                2,
                PushUnit::Week,
                PushScope::Future,
            ))
            .unwrap();

        assert_eq!(report.shift_days, 14);
        assert!(report.scope_collapsed);
        assert!(report.report.outcome(&"w".into()).unwrap().is_ok());
        assert_eq!(
            report.report.outcome(&"n".into()),
            Some(&Err(JobFailure::NoServiceHistory))
        );
    }

    #[test]
    fn invalid_requests_are_rejected_before_any_change() {
        let mut store = store();
        let before = store.clone();
        let zero = request(PushTarget::Route { slot: SLOT }, 0, PushUnit::Day, PushScope::Single);
        assert!(matches!(store.push(&zero), Err(SchedulerError::InvalidPush(_))));

        let elsewhere = request(
            PushTarget::Job {
                slot: RouteSlot::new(Weekday::Monday, 0),
                job_id: "w".into(),
            },
            1,
            PushUnit::Day,
            PushScope::Single,
        );
        assert!(matches!(store.push(&elsewhere), Err(SchedulerError::NotOnRoute { .. })));
        assert_eq!(store, before);
    }

    #[test]
    fn long_pushes_apply_and_overflow_fails_per_job() {
        let mut store = store();
        let year_on = request(
            PushTarget::Job {
                slot: SLOT,
                job_id: "w".into(),
            },
            53,
            PushUnit::Week,
            PushScope::Single,
        );
        let report = store.push(&year_on).unwrap();
        assert_eq!(report.shift_days, 371);
        assert!(report.report.all_succeeded());

        let before = store.job(&"w".into()).unwrap().last_service_date;
        let huge = request(
            PushTarget::Job {
                slot: SLOT,
                job_id: "w".into(),
            },
            u32::MAX,
            PushUnit::Week,
            PushScope::Single,
        );
        let report = store.push(&huge).unwrap();
        assert_eq!(
            report.report.outcome(&"w".into()),
            Some(&Err(JobFailure::DateOutOfRange))
        );
        assert_eq!(store.job(&"w".into()).unwrap().last_service_date, before);
    }
}
