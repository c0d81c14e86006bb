//! Shapes exchanged with the persistence collaborator.
//!
//! `Raw*` types are what comes back from a load and are deliberately loose:
//! optional indices, legacy bucket groupings, routes naming both an employee
//! and a crew. [`WeeklyRoutesRecord`] is the strict unit of write.

use std::collections::BTreeMap;

use greenroute_core::{CrewId, EmployeeId, JobId};
use serde::{Deserialize, Serialize};

use crate::routes::{RouteOwner, Weekday, WeeklyRouteTable};

/// Job ids grouped under the legacy per-bucket keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyBuckets {
    #[serde(alias = "one_time")]
    pub one_time: Vec<JobId>,
    pub weekly: Vec<JobId>,
    #[serde(alias = "bi_weekly", alias = "biweekly")]
    pub bi_weekly: Vec<JobId>,
    pub monthly: Vec<JobId>,
}

/// A route's job list as persisted: flat, or grouped by legacy bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRouteJobs {
    Flat(Vec<JobId>),
    Grouped(LegacyBuckets),
}

impl Default for RawRouteJobs {
    fn default() -> Self {
        RawRouteJobs::Flat(Vec::new())
    }
}

impl RawRouteJobs {
    /// Flatten to one ordered list. Grouped lists come out one-time, weekly,
    /// bi-weekly, monthly; the stored grouping itself is not kept.
    pub fn into_ids(self) -> Vec<JobId> {
        match self {
            RawRouteJobs::Flat(ids) => ids,
            RawRouteJobs::Grouped(g) => g
                .one_time
                .into_iter()
                .chain(g.weekly)
                .chain(g.bi_weekly)
                .chain(g.monthly)
                .collect(),
        }
    }
}

/// One route as it comes back from the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawRoute {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub jobs: RawRouteJobs,
    #[serde(default, alias = "employee_id")]
    pub employee_id: Option<EmployeeId>,
    #[serde(default, alias = "crew_id")]
    pub crew_id: Option<CrewId>,
}

/// Weekday name → routes, exactly as loaded. Unknown keys are tolerated.
pub type RawWeeklyRoutes = BTreeMap<String, Vec<RawRoute>>;

/// One route in the unit of write: ordered ids flattened across buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub index: usize,
    pub name: String,
    pub jobs: Vec<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<EmployeeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crew_id: Option<CrewId>,
}

/// The full weekly route table as a single logical write.
///
/// Every weekday is present, even when its route list is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRoutesRecord {
    pub days: BTreeMap<Weekday, Vec<RouteRecord>>,
}

impl WeeklyRoutesRecord {
    pub fn route_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn job_count(&self) -> usize {
        self.days.values().flatten().map(|r| r.jobs.len()).sum()
    }

    /// Re-read a written record the way a load would see it.
    pub fn into_raw(self) -> RawWeeklyRoutes {
        self.days
            .into_iter()
            .map(|(day, routes)| {
                let raw = routes
                    .into_iter()
                    .map(|r| RawRoute {
                        index: Some(r.index),
                        name: Some(r.name),
                        jobs: RawRouteJobs::Flat(r.jobs),
                        employee_id: r.employee_id,
                        crew_id: r.crew_id,
                    })
                    .collect();
                (day.to_string(), raw)
            })
            .collect()
    }
}

impl From<&WeeklyRouteTable> for WeeklyRoutesRecord {
    fn from(table: &WeeklyRouteTable) -> Self {
        let days = Weekday::ALL
            .into_iter()
            .map(|day| {
                let routes = table
                    .routes(day)
                    .iter()
                    .map(|route| RouteRecord {
                        index: route.index,
                        name: route.name.clone(),
                        jobs: route.jobs().to_vec(),
                        employee_id: route.employee_id().cloned(),
                        crew_id: route.crew_id().cloned(),
                    })
                    .collect();
                (day, routes)
            })
            .collect();
        Self { days }
    }
}

impl RawRoute {
    /// Resolve the owner pair into a single owner. Employee wins if both are set.
    pub(crate) fn owner(&self) -> Option<RouteOwner> {
        match (&self.employee_id, &self.crew_id) {
            (Some(e), _) => Some(RouteOwner::Employee(e.clone())),
            (None, Some(c)) => Some(RouteOwner::Crew(c.clone())),
            (None, None) => None,
        }
    }

    pub(crate) fn has_conflicting_owner(&self) -> bool {
        self.employee_id.is_some() && self.crew_id.is_some()
    }
}
