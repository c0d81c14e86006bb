//! CLI definitions for greenroute.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use greenroute_scheduler::{RecurrencePattern, RouteSlot, Weekday};

/// Recurring lawn-care jobs and weekly route assignment.
#[derive(Parser)]
#[command(name = "greenroute")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GREENROUTE_GIT_SHA"), ")"))]
pub(crate) struct Cli {
    /// Configuration file path (falls back to GREENROUTE_CONFIG, then ~/.greenroute/greenroute.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Evaluate due dates as of this day (YYYY-MM-DD) or instant (RFC 3339) instead of now
    #[arg(long, global = true)]
    pub as_of: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Show the weekly route table, grouped by recurrence bucket
    Routes {
        /// Only this weekday
        #[arg(long)]
        day: Option<Weekday>,
    },

    /// List unassigned jobs
    Pool,

    /// List every job that is due
    Due,

    /// Load jobs and routes from a JSON file, replacing the stored route table
    Import {
        /// File with `{"jobs": [...], "routes": {"Monday": [...], ...}}`
        file: PathBuf,
    },

    /// Register a new job in the pool
    AddJob(AddJobArgs),

    /// Delete a job record and pull it off its route
    DeleteJob { job_id: String },

    /// Append an empty route to a weekday
    CreateRoute {
        day: Weekday,
        #[arg(long)]
        name: Option<String>,
    },

    RenameRoute {
        #[arg(value_parser = parse_slot)]
        slot: RouteSlot,
        name: String,
    },

    /// Delete a route; its open jobs return to the pool
    DeleteRoute {
        #[arg(value_parser = parse_slot)]
        slot: RouteSlot,
    },

    /// Move a pool job onto a route
    Assign {
        job_id: String,
        #[arg(value_parser = parse_slot)]
        slot: RouteSlot,
    },

    /// Move a job to another route, or to another position within its bucket
    Move {
        job_id: String,
        #[arg(long, value_parser = parse_slot)]
        from: RouteSlot,
        #[arg(long, value_parser = parse_slot)]
        to: RouteSlot,
        /// Position among jobs of the same bucket (default: last)
        #[arg(long)]
        position: Option<usize>,
    },

    /// Take a job off its route
    Remove { job_id: String },

    /// Assign an employee or a crew to a route
    SetOwner {
        #[arg(value_parser = parse_slot)]
        slot: RouteSlot,
        #[command(flatten)]
        owner: OwnerArgs,
    },

    ClearOwner {
        #[arg(value_parser = parse_slot)]
        slot: RouteSlot,
    },

    /// Mark jobs done
    Complete {
        #[arg(required = true)]
        job_ids: Vec<String>,
        /// Also complete jobs that are not due yet
        #[arg(long, conflicts_with = "due_only")]
        all: bool,
        /// Complete only the due jobs in the batch
        #[arg(long)]
        due_only: bool,
    },

    /// Push a route, or one job on it, later
    Push(PushArgs),
}

#[derive(Args)]
pub(crate) struct AddJobArgs {
    /// Service label, e.g. "Mow + edge"
    pub service: String,
    /// Recurrence pattern; omit for a one-time job
    #[arg(long)]
    pub pattern: Option<RecurrencePattern>,
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub customer: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub price_cents: i64,
    /// Last visit (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub last_service: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub(crate) struct OwnerArgs {
    #[arg(long)]
    pub employee: Option<String>,
    #[arg(long)]
    pub crew: Option<String>,
}

#[derive(Args)]
pub(crate) struct PushArgs {
    /// Route to push (`<weekday>:<index>`)
    #[arg(value_parser = parse_slot)]
    pub slot: RouteSlot,
    /// Push only this job on the route
    #[arg(long)]
    pub job: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub count: u32,
    #[arg(long, value_enum, default_value_t = UnitArg::Day)]
    pub unit: UnitArg,
    /// Meant for all future occurrences (currently same effect as a single push)
    #[arg(long)]
    pub future: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum UnitArg {
    Day,
    Week,
}

/// Parse `monday:0` / `Monday#0` into a route slot.
pub(crate) fn parse_slot(s: &str) -> Result<RouteSlot, String> {
    let (day, index) = s
        .split_once([':', '#'])
        .ok_or_else(|| format!("expected <weekday>:<index>, got {s}"))?;
    let weekday: Weekday = day.trim().parse()?;
    let index = index
        .trim()
        .parse()
        .map_err(|e| format!("bad route index {index}: {e}"))?;
    Ok(RouteSlot::new(weekday, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn slots_parse_in_both_spellings() {
        assert_eq!(
            parse_slot("tuesday:2").unwrap(),
            RouteSlot::new(Weekday::Tuesday, 2)
        );
        assert_eq!(
            parse_slot("Friday#0").unwrap(),
            RouteSlot::new(Weekday::Friday, 0)
        );
        assert!(parse_slot("Funday:1").is_err());
        assert!(parse_slot("monday").is_err());
    }

    #[test]
    fn complete_flags_conflict() {
        let parsed = Cli::try_parse_from(["greenroute", "complete", "a", "--all", "--due-only"]);
        assert!(parsed.is_err());
    }
}
