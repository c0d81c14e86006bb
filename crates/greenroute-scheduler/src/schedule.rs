use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::types::{Job, JobStatus, RecurrencePattern};

impl RecurrencePattern {
    /// Days between visits, or `None` for one-time and unrecognized patterns.
    pub fn interval_days(&self) -> Option<i64> {
        match self {
            RecurrencePattern::Weekly => Some(7),
            RecurrencePattern::BiWeekly => Some(14),
            RecurrencePattern::Monthly => Some(30),
            RecurrencePattern::None | RecurrencePattern::Unrecognized => None,
        }
    }
}

/// Whole calendar days between the last visit and `as_of`.
///
/// Both ends are truncated to their UTC calendar day first, so a visit late
/// yesterday and a check early today are one day apart, not zero.
pub fn days_since_service(job: &Job, as_of: DateTime<Utc>) -> Option<i64> {
    let last = job.last_service_date?;
    Some((as_of.date_naive() - last.date_naive()).num_days())
}

/// Whether `job` is eligible for service as of `as_of`.
///
/// Pure: the only clock is the `as_of` argument.
pub fn is_due(job: &Job, as_of: DateTime<Utc>) -> bool {
    if !job.is_recurring && job.status == JobStatus::Completed {
        return false;
    }
    let Some(days) = days_since_service(job, as_of) else {
        // Never serviced.
        return true;
    };
    if !job.is_recurring {
        // Visited but not yet marked done.
        return true;
    }
    match job.recurrence.interval_days() {
        Some(interval) => days >= interval,
        None => false,
    }
}

/// Calendar day on which a recurring job next falls due.
///
/// `None` when the job has never been serviced (it is due now), is one-time,
/// or has no recognized pattern.
pub fn next_due_date(job: &Job) -> Option<NaiveDate> {
    if !job.is_recurring {
        return None;
    }
    let interval = job.recurrence.interval_days()?;
    let last = job.last_service_date?.date_naive();
    last.checked_add_signed(Duration::days(interval))
}
