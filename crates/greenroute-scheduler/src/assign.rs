//! Manual placement of jobs onto route slots.
//!
//! Every operation validates first and mutates second, so a rejected call
//! leaves the store exactly as it was.

use greenroute_core::JobId;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::{Result, SchedulerError},
    routes::{OwnerKind, Route, RouteOwner, RouteSlot, Weekday},
    store::SchedulingStore,
};

/// What a move actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved { from: RouteSlot, to: RouteSlot, position: usize },
    /// Source and destination were the same place.
    NoOp,
}

/// Where a job went after being taken off a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOutcome {
    ReturnedToPool,
    /// Completed jobs are not re-pooled.
    Dropped,
}

/// Result of deleting a whole route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedRoute {
    pub route: Route,
    pub returned_to_pool: Vec<JobId>,
    pub dropped: Vec<JobId>,
}

impl SchedulingStore {
    /// Append a new route to `day`. Unnamed routes are called "Route N".
    pub fn create_route(&mut self, day: Weekday, name: Option<String>) -> RouteSlot {
        let slot = self.table.push_route(day, name);
        info!(%slot, "route created");
        slot
    }

    pub fn rename_route(&mut self, slot: RouteSlot, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchedulerError::InvariantViolation(
                "route name must not be empty".to_string(),
            ));
        }
        let route = self
            .table
            .route_mut(slot)
            .ok_or(SchedulerError::RouteNotFound { slot })?;
        info!(%slot, old = %route.name, new = %name, "route renamed");
        route.name = name;
        Ok(())
    }

    /// Put a pool job onto a route. The bucket comes from the job's own pattern;
    /// the job lands at the end of its bucket.
    pub fn move_from_pool_to_route(&mut self, id: &JobId, slot: RouteSlot) -> Result<usize> {
        self.require_job(id)?;
        if let Some(current) = self.table.locate(id) {
            return Err(SchedulerError::AlreadyAssigned {
                id: id.to_string(),
                slot: current,
            });
        }
        if !self.is_in_pool(id) {
            return Err(SchedulerError::NotInPool { id: id.to_string() });
        }
        let bucket = self.require_job(id)?.bucket();
        let route = self.route(slot)?;
        let flat = route.flat_index_for(bucket, usize::MAX, &self.jobs);

        let route = self
            .table
            .route_mut(slot)
            .ok_or(SchedulerError::RouteNotFound { slot })?;
        route.insert_at(flat, id.clone());
        let position = route
            .bucket_position(id, &self.jobs)
            .unwrap_or_default();
        info!(job_id = %id, %slot, %bucket, position, "job assigned from pool");
        Ok(position)
    }

    /// Move a job between routes, or reorder it inside one route.
    ///
    /// `position` counts only jobs of the same bucket in the destination; past
    /// the end means "last in bucket".
    pub fn move_job(
        &mut self,
        id: &JobId,
        from: RouteSlot,
        to: RouteSlot,
        position: usize,
    ) -> Result<MoveOutcome> {
        let bucket = self.require_job(id)?.bucket();
        let source = self.route(from)?;
        if !source.contains(id) {
            return Err(SchedulerError::NotOnRoute {
                id: id.to_string(),
                slot: from,
            });
        }
        self.route(to)?;

        if from == to {
            let members = source.bucket_members(bucket, &self.jobs).len();
            let target = position.min(members.saturating_sub(1));
            if source.bucket_position(id, &self.jobs) == Some(target) {
                debug!(job_id = %id, slot = %from, position, "move is a no-op");
                return Ok(MoveOutcome::NoOp);
            }
        }

        let source = self
            .table
            .route_mut(from)
            .ok_or(SchedulerError::RouteNotFound { slot: from })?;
        source.remove(id);

        let flat = self.route(to)?.flat_index_for(bucket, position, &self.jobs);
        let dest = self
            .table
            .route_mut(to)
            .ok_or(SchedulerError::RouteNotFound { slot: to })?;
        dest.insert_at(flat, id.clone());
        let placed = dest.bucket_position(id, &self.jobs).unwrap_or_default();

        info!(job_id = %id, %from, %to, %bucket, position = placed, "job moved");
        Ok(MoveOutcome::Moved {
            from,
            to,
            position: placed,
        })
    }

    /// Take a job off whatever route holds it.
    pub fn remove_from_route(&mut self, id: &JobId) -> Result<RemovalOutcome> {
        let poolable = self.require_job(id)?.is_poolable();
        let slot = self.table.locate(id).ok_or_else(|| {
            SchedulerError::InvariantViolation(format!("job {id} is not on any route"))
        })?;
        let route = self
            .table
            .route_mut(slot)
            .ok_or(SchedulerError::RouteNotFound { slot })?;
        route.remove(id);

        let outcome = if poolable {
            RemovalOutcome::ReturnedToPool
        } else {
            RemovalOutcome::Dropped
        };
        info!(job_id = %id, %slot, ?outcome, "job removed from route");
        Ok(outcome)
    }

    /// Delete a route. Its non-completed jobs return to the pool and the
    /// remaining routes of that day are renumbered from 0.
    pub fn delete_route(&mut self, slot: RouteSlot) -> Result<DeletedRoute> {
        let mut route = self
            .table
            .remove_route(slot)
            .ok_or(SchedulerError::RouteNotFound { slot })?;

        let (returned_to_pool, dropped): (Vec<JobId>, Vec<JobId>) = route
            .take_jobs()
            .into_iter()
            .partition(|id| self.jobs.get(id).is_some_and(|j| j.is_poolable()));

        info!(
            %slot,
            name = %route.name,
            returned = returned_to_pool.len(),
            dropped = dropped.len(),
            remaining = self.table.routes(slot.weekday).len(),
            "route deleted"
        );
        Ok(DeletedRoute {
            route,
            returned_to_pool,
            dropped,
        })
    }

    /// Set the route's assignee. Setting an employee clears any crew and vice versa.
    pub fn assign_owner(
        &mut self,
        slot: RouteSlot,
        kind: OwnerKind,
        owner_id: impl Into<String>,
    ) -> Result<()> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(SchedulerError::InvariantViolation(
                "owner id must not be empty".to_string(),
            ));
        }
        let route = self
            .table
            .route_mut(slot)
            .ok_or(SchedulerError::RouteNotFound { slot })?;
        let owner = RouteOwner::new(kind, owner_id);
        info!(%slot, ?owner, previous = ?route.owner, "route owner assigned");
        route.owner = Some(owner);
        Ok(())
    }

    pub fn clear_owner(&mut self, slot: RouteSlot) -> Result<Option<RouteOwner>> {
        let route = self
            .table
            .route_mut(slot)
            .ok_or(SchedulerError::RouteNotFound { slot })?;
        let previous = route.owner.take();
        info!(%slot, ?previous, "route owner cleared");
        Ok(previous)
    }
}
