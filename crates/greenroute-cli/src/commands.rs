use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use greenroute_core::{GreenrouteError, JobId, Result};
use greenroute_scheduler::{
    CompletionOutcome, CompletionScope, Job, OwnerKind, PushRequest, PushScope, PushTarget,
    PushUnit, RawWeeklyRoutes, RecurrencePattern, SchedulingSession, ServiceLocation,
    SqliteRouteStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::cli::{AddJobArgs, Command, OwnerArgs, PushArgs, UnitArg};

/// Shape of an `import` file.
#[derive(Deserialize)]
struct ImportFile {
    #[serde(default)]
    jobs: Vec<Job>,
    #[serde(default)]
    routes: RawWeeklyRoutes,
}

pub(crate) fn print(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn import(backend: &SqliteRouteStore, file: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(file)?;
    let data: ImportFile = serde_json::from_str(&text)?;
    backend.import(&data.jobs, &data.routes)?;
    Ok(json!({
        "ok": true,
        "jobs": data.jobs.len(),
        "routes": data.routes.values().map(Vec::len).sum::<usize>(),
    }))
}

/// `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 instant.
pub(crate) fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| {
            GreenrouteError::InvalidInput(format!("bad date {s}: expected YYYY-MM-DD or RFC 3339"))
        })
}

pub(crate) fn resolve_as_of(arg: Option<&str>) -> Result<DateTime<Utc>> {
    arg.map(parse_instant).transpose().map(|at| at.unwrap_or_else(Utc::now))
}

fn build_job(args: AddJobArgs) -> Result<Job> {
    let mut job = match args.pattern {
        None | Some(RecurrencePattern::None) => Job::one_time(args.service),
        Some(pattern) => Job::recurring(args.service, pattern)?,
    };
    if let Some(id) = args.id {
        job = job.with_id(id);
    }
    if let Some(customer) = args.customer {
        job = job.with_customer(customer);
    }
    if let Some(last) = args.last_service {
        job = job.with_last_service_date(parse_instant(&last)?);
    }
    if let Some(address) = args.address {
        job = job.with_location(ServiceLocation {
            address,
            coordinates: None,
        });
    }
    Ok(job.with_price_cents(args.price_cents))
}

fn owner(args: OwnerArgs) -> Result<(OwnerKind, String)> {
    match (args.employee, args.crew) {
        (Some(employee), None) => Ok((OwnerKind::Employee, employee)),
        (None, Some(crew)) => Ok((OwnerKind::Crew, crew)),
        _ => Err(GreenrouteError::InvalidInput(
            "give exactly one of --employee or --crew".to_string(),
        )),
    }
}

fn push_request(args: PushArgs) -> PushRequest {
    let target = match args.job {
        Some(id) => PushTarget::Job {
            slot: args.slot,
            job_id: id.into(),
        },
        None => PushTarget::Route { slot: args.slot },
    };
    PushRequest {
        target,
        count: args.count,
        unit: match args.unit {
            UnitArg::Day => PushUnit::Day,
            UnitArg::Week => PushUnit::Week,
        },
        scope: if args.future {
            PushScope::Future
        } else {
            PushScope::Single
        },
    }
}

/// Run one command against a hydrated session. Route-table changes are
/// flushed before returning.
pub(crate) async fn run(
    session: &mut SchedulingSession,
    command: Command,
    as_of: DateTime<Utc>,
) -> Result<Value> {
    let output = match command {
        Command::Routes { day } => {
            let mut views = session.store().week_view(as_of);
            if let Some(day) = day {
                views.retain(|v| v.slot.weekday == day);
            }
            serde_json::to_value(views)?
        }
        Command::Pool => serde_json::to_value(session.store().pool_view(as_of))?,
        Command::Due => serde_json::to_value(session.store().due_jobs(as_of))?,
        Command::Import { .. } => {
            return Err(GreenrouteError::Internal(
                "import runs before the session is hydrated".to_string(),
            ))
        }
        Command::AddJob(args) => {
            let id = session.add_job(build_job(args)?).await?;
            json!({ "ok": true, "job_id": id })
        }
        Command::DeleteJob { job_id } => {
            let job = session.delete_job(&JobId::from(job_id)).await?;
            json!({ "ok": true, "deleted": job })
        }
        Command::CreateRoute { day, name } => {
            let slot = session.create_route(day, name);
            json!({ "ok": true, "slot": slot })
        }
        Command::RenameRoute { slot, name } => {
            session.rename_route(slot, name)?;
            json!({ "ok": true, "slot": slot })
        }
        Command::DeleteRoute { slot } => serde_json::to_value(session.delete_route(slot)?)?,
        Command::Assign { job_id, slot } => {
            let position = session.move_from_pool_to_route(&JobId::from(job_id), slot)?;
            json!({ "ok": true, "slot": slot, "position": position })
        }
        Command::Move {
            job_id,
            from,
            to,
            position,
        } => {
            let outcome =
                session.move_job(&JobId::from(job_id), from, to, position.unwrap_or(usize::MAX))?;
            serde_json::to_value(outcome)?
        }
        Command::Remove { job_id } => {
            let outcome = session.remove_from_route(&JobId::from(job_id))?;
            json!({ "ok": true, "outcome": outcome })
        }
        Command::SetOwner { slot, owner: args } => {
            let (kind, id) = owner(args)?;
            session.assign_owner(slot, kind, id)?;
            json!({ "ok": true, "slot": slot })
        }
        Command::ClearOwner { slot } => {
            let previous = session.clear_owner(slot)?;
            json!({ "ok": true, "previous": previous })
        }
        Command::Complete {
            job_ids,
            all,
            due_only,
        } => {
            let ids: Vec<JobId> = job_ids.into_iter().map(JobId::from).collect();
            let scope = match (all, due_only) {
                (true, _) => Some(CompletionScope::All),
                (_, true) => Some(CompletionScope::DueOnly),
                _ => None,
            };
            match session.complete_jobs(&ids, as_of, scope).await {
                CompletionOutcome::NeedsConfirmation { plan } => {
                    return Err(GreenrouteError::ConfirmationRequired {
                        job_ids: plan.not_due.iter().map(|id| id.to_string()).collect(),
                    });
                }
                CompletionOutcome::Completed { report } => serde_json::to_value(report)?,
            }
        }
        Command::Push(args) => serde_json::to_value(session.push(&push_request(args)).await?)?,
    };

    if session.is_dirty() {
        session.flush_now().await?;
        info!("route table saved");
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use greenroute_core::config::SyncConfig;
    use greenroute_scheduler::{MemoryRouteStore, RouteSlot, Weekday};
    use std::sync::Arc;

    fn add_args(service: &str, pattern: Option<RecurrencePattern>) -> AddJobArgs {
        AddJobArgs {
            service: service.to_string(),
            pattern,
            id: Some(service.to_string()),
            customer: None,
            price_cents: 0,
            last_service: None,
            address: None,
        }
    }

    #[test]
    fn dates_and_instants_both_parse() {
        assert_eq!(
            parse_instant("2026-03-01").unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("2026-03-01T10:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap()
        );
        assert_eq!(parse_instant("March 1").unwrap_err().code(), "INVALID_INPUT");
    }

    #[test]
    fn unrecognized_pattern_is_rejected_for_new_jobs() {
        assert!(build_job(add_args("x", Some(RecurrencePattern::Unrecognized))).is_err());
        let job = build_job(add_args("mow", Some(RecurrencePattern::Weekly))).unwrap();
        assert!(job.is_recurring);
    }

    #[tokio::test]
    async fn complete_needs_confirmation_for_not_due_jobs() {
        let backend = Arc::new(MemoryRouteStore::default());
        let (mut session, _) = SchedulingSession::hydrate(backend, &SyncConfig::default())
            .await
            .unwrap();
        let as_of = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();

        let mut fresh = add_args("fresh", Some(RecurrencePattern::Weekly));
        fresh.last_service = Some("2026-04-29".to_string());
        run(&mut session, Command::AddJob(fresh), as_of).await.unwrap();
        // An empty backend has no routes yet.
        run(
            &mut session,
            Command::CreateRoute {
                day: Weekday::Monday,
                name: None,
            },
            as_of,
        )
        .await
        .unwrap();
        run(
            &mut session,
            Command::Assign {
                job_id: "fresh".to_string(),
                slot: RouteSlot::new(Weekday::Monday, 0),
            },
            as_of,
        )
        .await
        .unwrap();
        assert!(!session.is_dirty());

        let complete = |all| Command::Complete {
            job_ids: vec!["fresh".to_string()],
            all,
            due_only: false,
        };
        let err = run(&mut session, complete(false), as_of).await.unwrap_err();
        assert_eq!(err.code(), "CONFIRMATION_REQUIRED");
        assert!(err.to_string().contains("fresh"));

        run(&mut session, complete(true), as_of).await.unwrap();
        let job = session.store().job(&JobId::from("fresh")).unwrap();
        assert_eq!(job.completion_count, 1);
        session.shutdown().await;
    }
}
