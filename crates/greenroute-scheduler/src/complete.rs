use chrono::{DateTime, Utc};
use greenroute_core::JobId;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::JobFailure,
    schedule::is_due,
    store::SchedulingStore,
    types::{Job, JobStatus},
};

/// Which part of a mixed due/not-due batch the caller agreed to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionScope {
    /// Complete everything requested, including jobs that are not due.
    All,
    /// Complete only the due jobs; the rest are reported as not due.
    DueOnly,
}

/// A batch sorted by what completing it would mean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionPlan {
    pub due: Vec<JobId>,
    pub not_due: Vec<JobId>,
    pub already_completed: Vec<JobId>,
    pub missing: Vec<JobId>,
}

impl CompletionPlan {
    pub fn needs_confirmation(&self) -> bool {
        !self.not_due.is_empty()
    }
}

/// Outcome of one id inside a bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome<T> {
    pub job_id: JobId,
    pub result: Result<T, JobFailure>,
}

/// Per-id results of a bulk operation. Never collapsed into one boolean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<T> {
    pub results: Vec<JobOutcome<T>>,
}

impl<T> BatchReport<T> {
    pub fn succeeded(&self) -> impl Iterator<Item = &JobId> {
        self.results
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| &o.job_id)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&JobId, &JobFailure)> {
        self.results
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.job_id, e)))
    }

    pub fn outcome(&self, id: &JobId) -> Option<&Result<T, JobFailure>> {
        self.results
            .iter()
            .find(|o| &o.job_id == id)
            .map(|o| &o.result)
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|o| o.result.is_ok())
    }
}

/// Either the batch went through, or the caller has to confirm the not-due part.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionOutcome {
    NeedsConfirmation { plan: CompletionPlan },
    Completed { report: BatchReport<Job> },
}

impl Job {
    /// Apply the "done" transition.
    ///
    /// One-time jobs become `Completed` for good. Recurring jobs keep their
    /// status and route; the visit is recorded and the interval restarts.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.last_service_date = Some(at);
        if self.is_recurring {
            self.completion_count += 1;
        } else {
            self.status = JobStatus::Completed;
        }
    }
}

impl SchedulingStore {
    /// Sort a batch of ids by due-ness as of `as_of`. Duplicates are ignored.
    pub fn plan_completion(&self, ids: &[JobId], as_of: DateTime<Utc>) -> CompletionPlan {
        let mut plan = CompletionPlan::default();
        let mut seen = std::collections::HashSet::new();
        for id in ids.iter().filter(|id| seen.insert(*id)) {
            match self.jobs.get(id) {
                None => plan.missing.push(id.clone()),
                Some(job) if job.is_terminal() => plan.already_completed.push(id.clone()),
                Some(job) if is_due(job, as_of) => plan.due.push(id.clone()),
                Some(_) => plan.not_due.push(id.clone()),
            }
        }
        plan
    }

    /// Complete a batch of jobs.
    ///
    /// Without a `scope`, a batch containing any not-due job is not touched:
    /// the plan comes back for the caller to confirm. With a scope, every id
    /// gets its own result; stale ids and already-completed jobs fail alone.
    pub fn complete_jobs(
        &mut self,
        ids: &[JobId],
        as_of: DateTime<Utc>,
        scope: Option<CompletionScope>,
    ) -> CompletionOutcome {
        let plan = self.plan_completion(ids, as_of);
        let Some(scope) = scope.or((!plan.needs_confirmation()).then_some(CompletionScope::All))
        else {
            info!(
                due = plan.due.len(),
                not_due = plan.not_due.len(),
                "completion needs confirmation"
            );
            return CompletionOutcome::NeedsConfirmation { plan };
        };

        let mut results = Vec::with_capacity(ids.len());
        for id in &plan.missing {
            warn!(job_id = %id, "cannot complete missing job");
            results.push(JobOutcome {
                job_id: id.clone(),
                result: Err(JobFailure::NotFound),
            });
        }
        for id in &plan.already_completed {
            results.push(JobOutcome {
                job_id: id.clone(),
                result: Err(JobFailure::AlreadyCompleted),
            });
        }
        if scope == CompletionScope::DueOnly {
            for id in &plan.not_due {
                results.push(JobOutcome {
                    job_id: id.clone(),
                    result: Err(JobFailure::NotDue),
                });
            }
        }

        let to_complete = match scope {
            CompletionScope::All => plan.due.iter().chain(plan.not_due.iter()).collect::<Vec<_>>(),
            CompletionScope::DueOnly => plan.due.iter().collect(),
        };
        for id in to_complete {
            let result = match self.jobs.get_mut(id) {
                Some(job) => {
                    job.mark_completed(as_of);
                    info!(
                        job_id = %id,
                        recurring = job.is_recurring,
                        completions = job.completion_count,
                        "job completed"
                    );
                    Ok(job.clone())
                }
                None => Err(JobFailure::NotFound),
            };
            results.push(JobOutcome {
                job_id: id.clone(),
                result,
            });
        }

        CompletionOutcome::Completed {
            report: BatchReport { results },
        }
    }
}
