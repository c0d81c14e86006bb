use chrono::{DateTime, Utc};
use greenroute_core::{CustomerId, JobId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// How often a recurring job comes back around.
///
/// Unknown strings coming out of the persistence layer decode to
/// [`RecurrencePattern::Unrecognized`], which is never due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum RecurrencePattern {
    /// One-time job.
    #[default]
    None,
    Weekly,
    BiWeekly,
    Monthly,
    Unrecognized,
}

impl From<String> for RecurrencePattern {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(RecurrencePattern::Unrecognized)
    }
}

impl From<RecurrencePattern> for String {
    fn from(p: RecurrencePattern) -> Self {
        p.to_string()
    }
}

impl std::fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecurrencePattern::None => "none",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::BiWeekly => "bi-weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Unrecognized => "unrecognized",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RecurrencePattern {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" | "one-time" | "onetime" => Ok(RecurrencePattern::None),
            "weekly" => Ok(RecurrencePattern::Weekly),
            "bi-weekly" | "biweekly" | "bi_weekly" => Ok(RecurrencePattern::BiWeekly),
            "monthly" => Ok(RecurrencePattern::Monthly),
            other => Err(format!("unknown recurrence pattern: {other}")),
        }
    }
}

/// Display grouping inside a route. Always derived from the job itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecurrenceBucket {
    OneTime,
    Weekly,
    BiWeekly,
    Monthly,
}

impl RecurrenceBucket {
    /// Display order used when a route is rendered or a legacy grouping is flattened.
    pub const ALL: [RecurrenceBucket; 4] = [
        RecurrenceBucket::OneTime,
        RecurrenceBucket::Weekly,
        RecurrenceBucket::BiWeekly,
        RecurrenceBucket::Monthly,
    ];
}

impl std::fmt::Display for RecurrenceBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecurrenceBucket::OneTime => "one-time",
            RecurrenceBucket::Weekly => "weekly",
            RecurrenceBucket::BiWeekly => "bi-weekly",
            RecurrenceBucket::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Scheduled")]
    Scheduled,
    #[serde(alias = "In Progress", alias = "in-progress")]
    InProgress,
    #[serde(alias = "Completed")]
    Completed,
    #[serde(alias = "Canceled", alias = "cancelled")]
    Canceled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Scheduled => "scheduled",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "scheduled" => Ok(JobStatus::Scheduled),
            "in_progress" | "in progress" | "in-progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "canceled" | "cancelled" => Ok(JobStatus::Canceled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Latitude/longitude pair, when the address has been geocoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Where the work happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceLocation {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// A unit of billable service work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Short service label, e.g. "Mow + edge".
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    /// Price in the smallest currency unit.
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub is_recurring: bool,
    /// Meaningful only when `is_recurring` is set.
    #[serde(default)]
    pub recurrence: RecurrencePattern,
    #[serde(default)]
    pub last_service_date: Option<DateTime<Utc>>,
    /// Number of completed visits (recurring jobs only).
    #[serde(default)]
    pub completion_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ServiceLocation>,
}

impl Job {
    /// A new pending one-time job with a fresh id.
    pub fn one_time(service: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            service: service.into(),
            description: None,
            customer_id: None,
            price_cents: 0,
            status: JobStatus::Pending,
            is_recurring: false,
            recurrence: RecurrencePattern::None,
            last_service_date: None,
            completion_count: 0,
            estimated_minutes: None,
            actual_minutes: None,
            location: None,
        }
    }

    /// A new pending recurring job. `pattern` must be weekly, bi-weekly or monthly.
    pub fn recurring(service: impl Into<String>, pattern: RecurrencePattern) -> Result<Self> {
        if pattern.interval_days().is_none() {
            return Err(SchedulerError::InvariantViolation(format!(
                "recurring job needs a weekly, bi-weekly or monthly pattern, got {pattern}"
            )));
        }
        Ok(Self {
            is_recurring: true,
            recurrence: pattern,
            ..Self::one_time(service)
        })
    }

    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<CustomerId>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_price_cents(mut self, price_cents: i64) -> Self {
        self.price_cents = price_cents;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_last_service_date(mut self, at: DateTime<Utc>) -> Self {
        self.last_service_date = Some(at);
        self
    }

    pub fn with_location(mut self, location: ServiceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Bucket this job is displayed under on a route.
    ///
    /// A recurring job without a recognized pattern falls back to one-time
    /// so that it stays visible; it is never due.
    pub fn bucket(&self) -> RecurrenceBucket {
        if !self.is_recurring {
            return RecurrenceBucket::OneTime;
        }
        match self.recurrence {
            RecurrencePattern::Weekly => RecurrenceBucket::Weekly,
            RecurrencePattern::BiWeekly => RecurrenceBucket::BiWeekly,
            RecurrencePattern::Monthly => RecurrenceBucket::Monthly,
            RecurrencePattern::None | RecurrencePattern::Unrecognized => RecurrenceBucket::OneTime,
        }
    }

    /// A completed one-time job: out of the pool and out of due-eligibility for good.
    pub fn is_terminal(&self) -> bool {
        !self.is_recurring && self.status == JobStatus::Completed
    }

    /// Whether an unassigned job of this shape belongs in the pool.
    pub fn is_poolable(&self) -> bool {
        self.status != JobStatus::Completed
    }

    /// Force a one-time job's pattern to `None`.
    ///
    /// Returns `true` if the record was changed.
    pub fn normalize(&mut self) -> bool {
        if !self.is_recurring && self.recurrence != RecurrencePattern::None {
            self.recurrence = RecurrencePattern::None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recurring_requires_an_interval_pattern() {
        assert!(Job::recurring("mow", RecurrencePattern::None).is_err());
        assert!(Job::recurring("mow", RecurrencePattern::Unrecognized).is_err());
        let job = Job::recurring("mow", RecurrencePattern::BiWeekly).unwrap();
        assert!(job.is_recurring);
        assert_eq!(job.bucket(), RecurrenceBucket::BiWeekly);
    }

    #[test]
    fn bucket_follows_recurring_flag_over_pattern() {
        let mut job = Job::one_time("aerate");
        job.recurrence = RecurrencePattern::Monthly;
        assert_eq!(job.bucket(), RecurrenceBucket::OneTime);
        assert!(job.normalize());
        assert_eq!(job.recurrence, RecurrencePattern::None);
        assert!(!job.normalize());
    }

    #[test]
    fn unknown_pattern_deserializes_as_unrecognized() {
        let p: RecurrencePattern = serde_json::from_str(r#""fortnightly-ish""#).unwrap();
        assert_eq!(p, RecurrencePattern::Unrecognized);
        let p: RecurrencePattern = serde_json::from_str(r#""Bi-weekly""#).unwrap();
        assert_eq!(p, RecurrencePattern::BiWeekly);
    }

    #[test]
    fn status_parses_display_forms() {
        assert_eq!("In Progress".parse::<JobStatus>().unwrap(), JobStatus::InProgress);
        assert_eq!("completed".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert!("archived".parse::<JobStatus>().is_err());
    }

    #[test]
    fn completed_recurring_job_is_not_terminal() {
        let job = Job::recurring("mow", RecurrencePattern::Weekly)
            .unwrap()
            .with_status(JobStatus::Completed);
        assert!(!job.is_terminal());
        assert!(Job::one_time("x").with_status(JobStatus::Completed).is_terminal());
    }
}
