//! `greenroute-core`: identifiers, configuration and the top-level error
//! shared by every greenroute crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::GreenrouteConfig;
pub use error::{GreenrouteError, Result};
pub use types::{CrewId, CustomerId, EmployeeId, JobId};
