use std::collections::{BTreeMap, HashMap, HashSet};

use greenroute_core::{CrewId, EmployeeId, JobId};
use serde::{Deserialize, Serialize};

use crate::types::{Job, RecurrenceBucket};

/// Day of the week a route runs on. Serialized as the English name ("Monday").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Weekday::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown weekday: {s}"))
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(d: chrono::Weekday) -> Self {
        Weekday::ALL[d.num_days_from_monday() as usize]
    }
}

/// Address of a route: the weekday plus its position in that day's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteSlot {
    pub weekday: Weekday,
    pub index: usize,
}

impl RouteSlot {
    pub fn new(weekday: Weekday, index: usize) -> Self {
        Self { weekday, index }
    }
}

impl std::fmt::Display for RouteSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.weekday, self.index)
    }
}

/// Which kind of assignee a caller wants to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Employee,
    Crew,
}

/// The single assignee of a route: an employee or a crew, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RouteOwner {
    Employee(EmployeeId),
    Crew(CrewId),
}

impl RouteOwner {
    pub fn new(kind: OwnerKind, id: impl Into<String>) -> Self {
        match kind {
            OwnerKind::Employee => RouteOwner::Employee(EmployeeId(id.into())),
            OwnerKind::Crew => RouteOwner::Crew(CrewId(id.into())),
        }
    }

    pub fn kind(&self) -> OwnerKind {
        match self {
            RouteOwner::Employee(_) => OwnerKind::Employee,
            RouteOwner::Crew(_) => OwnerKind::Crew,
        }
    }
}

/// One route slot: an ordered job sequence plus an optional owner.
///
/// Jobs are stored as a single ordered list. Recurrence buckets are views
/// over that list computed from each job's own pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub index: usize,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<RouteOwner>,
    #[serde(default)]
    jobs: Vec<JobId>,
}

impl Route {
    /// A new empty route. Unnamed routes are called "Route N" (N = index + 1).
    pub fn new(index: usize, name: Option<String>) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_route_name(index));
        Self {
            index,
            name,
            owner: None,
            jobs: Vec::new(),
        }
    }

    pub fn jobs(&self) -> &[JobId] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains(id)
    }

    pub fn position(&self, id: &JobId) -> Option<usize> {
        self.jobs.iter().position(|j| j == id)
    }

    /// Insert at a flat position, clamped to the end of the list.
    pub fn insert_at(&mut self, index: usize, id: JobId) {
        let index = index.min(self.jobs.len());
        self.jobs.insert(index, id);
    }

    /// Remove the job at a flat position.
    pub fn remove_at(&mut self, index: usize) -> Option<JobId> {
        (index < self.jobs.len()).then(|| self.jobs.remove(index))
    }

    /// Remove `id` wherever it sits; returns its former flat position.
    pub fn remove(&mut self, id: &JobId) -> Option<usize> {
        let pos = self.position(id)?;
        self.jobs.remove(pos);
        Some(pos)
    }

    pub(crate) fn take_jobs(&mut self) -> Vec<JobId> {
        std::mem::take(&mut self.jobs)
    }

    pub fn employee_id(&self) -> Option<&EmployeeId> {
        match &self.owner {
            Some(RouteOwner::Employee(id)) => Some(id),
            _ => None,
        }
    }

    pub fn crew_id(&self) -> Option<&CrewId> {
        match &self.owner {
            Some(RouteOwner::Crew(id)) => Some(id),
            _ => None,
        }
    }

    /// Members of `bucket` in route order. Ids without a job record are skipped.
    pub fn bucket_members<'a>(
        &'a self,
        bucket: RecurrenceBucket,
        jobs: &HashMap<JobId, Job>,
    ) -> Vec<&'a JobId> {
        self.jobs
            .iter()
            .filter(|id| jobs.get(*id).is_some_and(|j| j.bucket() == bucket))
            .collect()
    }

    /// Position of `id` counted only among jobs of its own bucket.
    pub fn bucket_position(&self, id: &JobId, jobs: &HashMap<JobId, Job>) -> Option<usize> {
        let bucket = jobs.get(id)?.bucket();
        self.bucket_members(bucket, jobs).iter().position(|j| *j == id)
    }

    /// Translate a position inside `bucket` into a flat insertion index.
    ///
    /// Past the last member (or into an empty bucket) the job lands right
    /// after the bucket's last member, or at the end of the route.
    pub fn flat_index_for(
        &self,
        bucket: RecurrenceBucket,
        position: usize,
        jobs: &HashMap<JobId, Job>,
    ) -> usize {
        let flat: Vec<usize> = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, id)| jobs.get(*id).is_some_and(|j| j.bucket() == bucket))
            .map(|(i, _)| i)
            .collect();
        match flat.get(position) {
            Some(i) => *i,
            None => flat.last().map(|i| i + 1).unwrap_or(self.jobs.len()),
        }
    }
}

pub(crate) fn default_route_name(index: usize) -> String {
    format!("Route {}", index + 1)
}

/// The seven weekdays, each mapped to an ordered list of routes.
///
/// Every weekday key is always present; a day may hold zero routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRouteTable {
    days: BTreeMap<Weekday, Vec<Route>>,
}

impl WeeklyRouteTable {
    /// A fresh table: one empty "Route 1" per weekday.
    pub fn new() -> Self {
        Self {
            days: Weekday::ALL
                .into_iter()
                .map(|d| (d, vec![Route::new(0, None)]))
                .collect(),
        }
    }

    /// Every weekday present, no routes anywhere.
    pub fn empty() -> Self {
        Self {
            days: Weekday::ALL.into_iter().map(|d| (d, Vec::new())).collect(),
        }
    }

    pub fn routes(&self, day: Weekday) -> &[Route] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn route(&self, slot: RouteSlot) -> Option<&Route> {
        self.days.get(&slot.weekday)?.get(slot.index)
    }

    pub fn route_mut(&mut self, slot: RouteSlot) -> Option<&mut Route> {
        self.days.get_mut(&slot.weekday)?.get_mut(slot.index)
    }

    /// Append a route to `day` and return its slot.
    pub fn push_route(&mut self, day: Weekday, name: Option<String>) -> RouteSlot {
        let routes = self.days.entry(day).or_default();
        let index = routes.len();
        routes.push(Route::new(index, name));
        RouteSlot::new(day, index)
    }

    pub(crate) fn push_existing(&mut self, day: Weekday, mut route: Route) -> RouteSlot {
        let routes = self.days.entry(day).or_default();
        let index = routes.len();
        route.index = index;
        routes.push(route);
        RouteSlot::new(day, index)
    }

    /// Remove the route at `slot` and renumber the rest of that day from 0.
    pub fn remove_route(&mut self, slot: RouteSlot) -> Option<Route> {
        let routes = self.days.get_mut(&slot.weekday)?;
        if slot.index >= routes.len() {
            return None;
        }
        let removed = routes.remove(slot.index);
        for (i, route) in routes.iter_mut().enumerate() {
            route.index = i;
        }
        Some(removed)
    }

    /// Slot of the route currently holding `id`.
    pub fn locate(&self, id: &JobId) -> Option<RouteSlot> {
        self.iter()
            .find(|(_, route)| route.contains(id))
            .map(|(day, route)| RouteSlot::new(day, route.index))
    }

    /// Every job id referenced by any route.
    pub fn assigned_ids(&self) -> HashSet<&JobId> {
        self.iter().flat_map(|(_, r)| r.jobs.iter()).collect()
    }

    /// All routes in weekday order, then index order.
    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &Route)> {
        self.days
            .iter()
            .flat_map(|(day, routes)| routes.iter().map(move |r| (*day, r)))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (Weekday, &mut Route)> {
        self.days
            .iter_mut()
            .flat_map(|(day, routes)| routes.iter_mut().map(move |r| (*day, r)))
    }
}

impl Default for WeeklyRouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecurrencePattern;

    fn catalog(jobs: &[Job]) -> HashMap<JobId, Job> {
        jobs.iter().map(|j| (j.id.clone(), j.clone())).collect()
    }

    #[test]
    fn weekday_parses_case_insensitively() {
        assert_eq!("monday".parse::<Weekday>().unwrap(), Weekday::Monday);
        assert_eq!("Sunday".parse::<Weekday>().unwrap(), Weekday::Sunday);
        assert!("Funday".parse::<Weekday>().is_err());
        assert_eq!(Weekday::from(chrono::Weekday::Wed), Weekday::Wednesday);
    }

    #[test]
    fn new_table_has_one_default_route_per_day() {
        let table = WeeklyRouteTable::new();
        for day in Weekday::ALL {
            let routes = table.routes(day);
            assert_eq!(routes.len(), 1);
            assert_eq!(routes[0].name, "Route 1");
        }
    }

    #[test]
    fn remove_route_renumbers_from_zero() {
        let mut table = WeeklyRouteTable::empty();
        table.push_route(Weekday::Tuesday, Some("North".into()));
        table.push_route(Weekday::Tuesday, None);
        table.push_route(Weekday::Tuesday, None);

        let removed = table.remove_route(RouteSlot::new(Weekday::Tuesday, 0)).unwrap();
        assert_eq!(removed.name, "North");

        let indices: Vec<usize> = table.routes(Weekday::Tuesday).iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(table.remove_route(RouteSlot::new(Weekday::Tuesday, 5)).is_none());
    }

    #[test]
    fn bucket_positions_map_to_flat_indices() {
        let a = Job::one_time("a");
        let w1 = Job::recurring("w1", RecurrencePattern::Weekly).unwrap();
        let b = Job::one_time("b");
        let w2 = Job::recurring("w2", RecurrencePattern::Weekly).unwrap();
        let jobs = catalog(&[a.clone(), w1.clone(), b.clone(), w2.clone()]);

        let mut route = Route::new(0, None);
        for id in [&a.id, &w1.id, &b.id, &w2.id] {
            route.insert_at(usize::MAX, id.clone());
        }

        assert_eq!(route.bucket_members(RecurrenceBucket::Weekly, &jobs), vec![&w1.id, &w2.id]);
        assert_eq!(route.bucket_position(&w2.id, &jobs), Some(1));
        assert_eq!(route.flat_index_for(RecurrenceBucket::Weekly, 1, &jobs), 3);
        // Past the end of the bucket: right after its last member.
        assert_eq!(route.flat_index_for(RecurrenceBucket::OneTime, 9, &jobs), 3);
        // Empty bucket: end of the route.
        assert_eq!(route.flat_index_for(RecurrenceBucket::Monthly, 0, &jobs), 4);
    }

    #[test]
    fn owner_accessors_are_exclusive() {
        let mut route = Route::new(0, None);
        route.owner = Some(RouteOwner::new(OwnerKind::Crew, "crew-1"));
        assert_eq!(route.crew_id().map(CrewId::as_str), Some("crew-1"));
        assert!(route.employee_id().is_none());
    }
}
