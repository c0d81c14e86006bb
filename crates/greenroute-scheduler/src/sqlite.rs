use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenroute_core::JobId;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    records::{RawRoute, RawRouteJobs, RawWeeklyRoutes, WeeklyRoutesRecord},
    sync::RoutePersistence,
    types::{Job, JobStatus, RecurrencePattern},
};

/// SQLite-backed [`RoutePersistence`].
///
/// Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct SqliteRouteStore {
    conn: Arc<Mutex<Connection>>,
}

const JOB_COLUMNS: &str = "id, service, description, customer_id, price_cents, status,
     is_recurring, recurrence, last_service_date, completion_count,
     estimated_minutes, actual_minutes, location";

impl SqliteRouteStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SchedulerError::Persistence("connection lock poisoned".to_string()))
    }

    /// Fetch one stored job.
    pub fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let row = conn
            .query_row(&sql, [id], |row| Ok(row_to_job(row)))
            .optional()?;
        row.transpose()
    }

    /// Write jobs and raw routes verbatim, replacing the stored route table.
    ///
    /// Raw routes keep whatever shape they arrived in, including legacy
    /// grouped job lists, so the next load goes through normal hydration.
    pub fn import(&self, jobs: &[Job], routes: &RawWeeklyRoutes) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for job in jobs {
            upsert_job(&tx, job)?;
        }
        tx.execute("DELETE FROM weekly_routes", [])?;
        for (day, list) in routes {
            for (position, route) in list.iter().enumerate() {
                let job_ids = serde_json::to_string(&route.jobs)?;
                tx.execute(
                    "INSERT INTO weekly_routes (weekday, idx, name, job_ids, employee_id, crew_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        day,
                        route.index.unwrap_or(position) as i64,
                        route.name,
                        job_ids,
                        route.employee_id.as_ref().map(|e| e.as_str()),
                        route.crew_id.as_ref().map(|c| c.as_str()),
                    ],
                )?;
            }
        }
        tx.commit()?;
        info!(jobs = jobs.len(), days = routes.len(), "imported scheduling data");
        Ok(())
    }
}

#[async_trait]
impl RoutePersistence for SqliteRouteStore {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map([], |row| Ok(row_to_job(row)))?
            .filter_map(|r| match r {
                Ok(Ok(job)) => Some(job),
                Ok(Err(e)) => {
                    warn!("skipping unreadable job row: {e}");
                    None
                }
                Err(e) => {
                    warn!("skipping job row: {e}");
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!(count = jobs.len(), "loaded jobs");
        Ok(jobs)
    }

    async fn load_weekly_routes(&self) -> Result<RawWeeklyRoutes> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT weekday, idx, name, job_ids, employee_id, crew_id
             FROM weekly_routes ORDER BY weekday, idx",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,         // weekday
                row.get::<_, i64>(1)?,            // idx
                row.get::<_, Option<String>>(2)?, // name
                row.get::<_, String>(3)?,         // job_ids JSON
                row.get::<_, Option<String>>(4)?, // employee_id
                row.get::<_, Option<String>>(5)?, // crew_id
            ))
        })?;

        let mut routes = RawWeeklyRoutes::new();
        for row in rows {
            let (day, index, name, job_ids, employee_id, crew_id) = row?;
            let jobs = serde_json::from_str::<RawRouteJobs>(&job_ids).unwrap_or_else(|e| {
                warn!(%day, index, "unreadable job list, treating route as empty: {e}");
                RawRouteJobs::default()
            });
            routes.entry(day).or_default().push(RawRoute {
                index: usize::try_from(index).ok(),
                name,
                jobs,
                employee_id: employee_id.map(Into::into),
                crew_id: crew_id.map(Into::into),
            });
        }
        Ok(routes)
    }

    async fn save_weekly_routes(&self, record: &WeeklyRoutesRecord) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM weekly_routes", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO weekly_routes (weekday, idx, name, job_ids, employee_id, crew_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (day, routes) in &record.days {
                for route in routes {
                    stmt.execute(params![
                        day.as_str(),
                        route.index as i64,
                        route.name,
                        serde_json::to_string(&route.jobs)?,
                        route.employee_id.as_ref().map(|e| e.as_str()),
                        route.crew_id.as_ref().map(|c| c.as_str()),
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn()?;
        upsert_job(&conn, job)?;
        debug!(job_id = %job.id, "job saved");
        Ok(())
    }

    async fn delete_job(&self, id: &JobId) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id.as_str()])?;
        debug!(job_id = %id, removed = n, "job deleted");
        Ok(())
    }
}

fn upsert_job(conn: &Connection, job: &Job) -> Result<()> {
    let location = job
        .location
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO jobs
         (id, service, description, customer_id, price_cents, status, is_recurring,
          recurrence, last_service_date, completion_count, estimated_minutes,
          actual_minutes, location, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
         ON CONFLICT(id) DO UPDATE SET
           service=excluded.service, description=excluded.description,
           customer_id=excluded.customer_id, price_cents=excluded.price_cents,
           status=excluded.status, is_recurring=excluded.is_recurring,
           recurrence=excluded.recurrence, last_service_date=excluded.last_service_date,
           completion_count=excluded.completion_count,
           estimated_minutes=excluded.estimated_minutes,
           actual_minutes=excluded.actual_minutes, location=excluded.location,
           updated_at=excluded.updated_at",
        params![
            job.id.as_str(),
            job.service,
            job.description,
            job.customer_id.as_ref().map(|c| c.as_str()),
            job.price_cents,
            job.status.to_string(),
            job.is_recurring,
            job.recurrence.to_string(),
            job.last_service_date.map(|d| d.to_rfc3339()),
            job.completion_count,
            job.estimated_minutes,
            job.actual_minutes,
            location,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn row_to_job(row: &Row<'_>) -> Result<Job> {
    let id: String = row.get(0)?;
    let status: String = row.get(5)?;
    let status: JobStatus = status
        .parse()
        .map_err(|e: String| SchedulerError::InvalidRecord(format!("job {id}: {e}")))?;
    let last_service_date = row
        .get::<_, Option<String>>(8)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| SchedulerError::InvalidRecord(format!("job {id}: bad date {s}: {e}")))
        })
        .transpose()?;
    let location = row
        .get::<_, Option<String>>(12)?
        .map(|s| serde_json::from_str(&s))
        .transpose()?;

    Ok(Job {
        id: id.into(),
        service: row.get(1)?,
        description: row.get(2)?,
        customer_id: row.get::<_, Option<String>>(3)?.map(Into::into),
        price_cents: row.get(4)?,
        status,
        is_recurring: row.get(6)?,
        recurrence: RecurrencePattern::from(row.get::<_, String>(7)?),
        last_service_date,
        completion_count: row.get(9)?,
        estimated_minutes: row.get(10)?,
        actual_minutes: row.get(11)?,
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::LegacyBuckets;
    use crate::routes::{RouteOwner, RouteSlot, Weekday};
    use crate::store::SchedulingStore;
    use chrono::TimeZone;

    fn store() -> SqliteRouteStore {
        SqliteRouteStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn job_round_trips_through_sqlite() {
        let db = store();
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap();
        let job = Job::recurring("mow", RecurrencePattern::BiWeekly)
            .unwrap()
            .with_id("j1")
            .with_customer("c1")
            .with_price_cents(4500)
            .with_last_service_date(at);
        db.save_job(&job).await.unwrap();

        let loaded = db.load_jobs().await.unwrap();
        assert_eq!(loaded, vec![job.clone()]);

        let mut updated = job;
        updated.completion_count = 3;
        db.save_job(&updated).await.unwrap();
        assert_eq!(db.get_job("j1").unwrap().unwrap().completion_count, 3);

        db.delete_job(&"j1".into()).await.unwrap();
        assert!(db.get_job("j1").unwrap().is_none());
        assert!(db.load_jobs().await.unwrap().is_empty());
        // Already gone.
        db.delete_job(&"j1".into()).await.unwrap();
    }

    #[tokio::test]
    async fn route_table_write_replaces_previous_rows() {
        let db = store();
        let mut s = SchedulingStore::new();
        s.add_job(Job::one_time("a").with_id("a")).unwrap();
        db.save_job(s.job(&"a".into()).unwrap()).await.unwrap();
        let tue = RouteSlot::new(Weekday::Tuesday, 0);
        s.move_from_pool_to_route(&"a".into(), tue).unwrap();
        s.assign_owner(tue, crate::routes::OwnerKind::Crew, "crew-9").unwrap();
        db.save_weekly_routes(&s.to_record()).await.unwrap();

        let extra = s.create_route(Weekday::Tuesday, Some("Back nine".into()));
        db.save_weekly_routes(&s.to_record()).await.unwrap();
        s.delete_route(extra).unwrap();
        db.save_weekly_routes(&s.to_record()).await.unwrap();

        let raw = db.load_weekly_routes().await.unwrap();
        assert_eq!(raw.values().map(Vec::len).sum::<usize>(), 7);
        let (reloaded, report) = SchedulingStore::hydrate(db.load_jobs().await.unwrap(), raw);
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(reloaded.table().locate(&"a".into()), Some(tue));
        assert_eq!(
            reloaded.route(tue).unwrap().owner,
            Some(RouteOwner::Crew("crew-9".into()))
        );
    }

    #[tokio::test]
    async fn imported_legacy_grouping_loads_flattened() {
        let db = store();
        let jobs = vec![
            Job::one_time("o").with_id("o"),
            Job::recurring("w", RecurrencePattern::Weekly).unwrap().with_id("w"),
        ];
        let mut routes = RawWeeklyRoutes::new();
        routes.insert(
            "wednesday".to_string(),
            vec![RawRoute {
                index: Some(0),
                jobs: RawRouteJobs::Grouped(LegacyBuckets {
                    weekly: vec!["w".into()],
                    one_time: vec!["o".into()],
                    ..Default::default()
                }),
                ..Default::default()
            }],
        );
        db.import(&jobs, &routes).unwrap();

        let raw = db.load_weekly_routes().await.unwrap();
        let (s, _) = SchedulingStore::hydrate(db.load_jobs().await.unwrap(), raw);
        let route = s.route(RouteSlot::new(Weekday::Wednesday, 0)).unwrap();
        assert_eq!(route.jobs(), &["o".into(), "w".into()][..]);
    }

    #[tokio::test]
    async fn unreadable_rows_are_skipped() {
        let db = store();
        db.save_job(&Job::one_time("ok").with_id("ok")).await.unwrap();
        {
            let conn = db.conn().unwrap();
            conn.execute(
                "INSERT INTO jobs (id, service, status, updated_at) VALUES ('bad', 'x', 'exploded', '')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO weekly_routes (weekday, idx, job_ids) VALUES ('Friday', 0, 'not json')",
                [],
            )
            .unwrap();
        }
        let jobs = db.load_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        let raw = db.load_weekly_routes().await.unwrap();
        assert_eq!(raw["Friday"][0].jobs, RawRouteJobs::default());
    }
}
