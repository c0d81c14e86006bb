use greenroute_core::GreenrouteError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routes::RouteSlot;

/// Errors that can occur within the scheduling subsystem.
///
/// Every variant raised by a mutating store operation is returned before any
/// state has been touched.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column or payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// No route lives at the given weekday/index.
    #[error("Route not found: {slot}")]
    RouteNotFound { slot: RouteSlot },

    /// The job is already placed on a route; it must be moved, not re-added.
    #[error("Job {id} is already assigned to {slot}")]
    AlreadyAssigned { id: String, slot: RouteSlot },

    /// The job is not in the pool (assigned elsewhere or completed).
    #[error("Job {id} is not in the pool")]
    NotInPool { id: String },

    /// The job is not held by the route the caller named.
    #[error("Job {id} is not on {slot}")]
    NotOnRoute { id: String, slot: RouteSlot },

    /// The operation would break a structural rule of the route table.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A push request with a zero or out-of-range interval.
    #[error("Invalid push: {0}")]
    InvalidPush(String),

    /// A persisted row could not be turned into a domain record.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The persistence collaborator rejected a load or save.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<SchedulerError> for GreenrouteError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::JobNotFound { id } | SchedulerError::NotInPool { id } => {
                GreenrouteError::JobNotFound { id }
            }
            SchedulerError::RouteNotFound { slot } => GreenrouteError::RouteNotFound {
                weekday: slot.weekday.to_string(),
                index: slot.index,
            },
            SchedulerError::Serialization(e) => GreenrouteError::Serialization(e),
            e @ (SchedulerError::AlreadyAssigned { .. }
            | SchedulerError::NotOnRoute { .. }
            | SchedulerError::InvariantViolation(_)
            | SchedulerError::InvalidPush(_)) => GreenrouteError::InvariantViolation(e.to_string()),
            e @ (SchedulerError::Database(_)
            | SchedulerError::InvalidRecord(_)
            | SchedulerError::Persistence(_)) => GreenrouteError::Persistence(e.to_string()),
        }
    }
}

/// Why a single job inside a bulk operation did not go through.
///
/// Bulk operations never abort as a whole; each id carries its own outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum JobFailure {
    /// The id no longer resolves to a job record.
    #[error("job not found")]
    NotFound,
    /// The job was not due and the caller only confirmed the due subset.
    #[error("job is not due")]
    NotDue,
    /// A one-time job that has already been completed.
    #[error("job is already completed")]
    AlreadyCompleted,
    /// A push needs a last service date to shift.
    #[error("job has no service history to shift")]
    NoServiceHistory,
    /// The shifted date falls outside the representable range.
    #[error("shifted date is out of range")]
    DateOutOfRange,
    /// The in-memory change applied but writing the job record failed.
    #[error("persistence failed: {message}")]
    Persistence { message: String },
}
