//! `greenroute-scheduler`: recurring-job scheduling and weekly route assignment.
//!
//! # Overview
//!
//! A [`SchedulingStore`] holds the job catalog and a [`WeeklyRouteTable`]:
//! seven weekdays, each with an ordered list of routes, each route an ordered
//! list of job ids. Jobs no route references (and that are not completed)
//! form the unassigned pool.
//!
//! Every mutation runs synchronously against the store and is validated
//! before anything changes. A [`SchedulingSession`] wraps the store with a
//! [`RoutePersistence`] backend and a [`RouteSynchronizer`] that writes the
//! whole route table once per debounce window.
//!
//! # Recurrence
//!
//! | Pattern     | Interval | Bucket     |
//! |-------------|----------|------------|
//! | `none`      | n/a      | one-time   |
//! | `weekly`    | 7 days   | weekly     |
//! | `bi-weekly` | 14 days  | bi-weekly  |
//! | `monthly`   | 30 days  | monthly    |
//!
//! A job is due once the calendar days since its last service reach the
//! interval. Never-serviced jobs are always due; completed one-time jobs
//! never are.

pub mod assign;
pub mod complete;
pub mod db;
pub mod error;
pub mod memory;
pub mod push;
pub mod records;
pub mod routes;
pub mod schedule;
pub mod session;
pub mod sqlite;
pub mod store;
pub mod sync;
pub mod types;

pub use assign::{DeletedRoute, MoveOutcome, RemovalOutcome};
pub use complete::{BatchReport, CompletionOutcome, CompletionPlan, CompletionScope, JobOutcome};
pub use error::{JobFailure, Result, SchedulerError};
pub use memory::MemoryRouteStore;
pub use push::{PushReport, PushRequest, PushScope, PushTarget, PushUnit};
pub use records::{RawRoute, RawRouteJobs, RawWeeklyRoutes, RouteRecord, WeeklyRoutesRecord};
pub use routes::{OwnerKind, Route, RouteOwner, RouteSlot, Weekday, WeeklyRouteTable};
pub use schedule::{days_since_service, is_due, next_due_date};
pub use session::SchedulingSession;
pub use sqlite::SqliteRouteStore;
pub use store::{AnnotatedJob, HydrationReport, JobLocation, RouteView, SchedulingStore};
pub use sync::{FlushFailure, RoutePersistence, RouteSynchronizer, SyncStatus};
pub use types::{Coordinates, Job, JobStatus, RecurrenceBucket, RecurrencePattern, ServiceLocation};
