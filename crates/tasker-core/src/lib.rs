//! tasker-core - Core library for Tasker
//!
//! Models, the local/remote store pair, the availability monitor, the store
//! facade and the reconciliation service shared by every Tasker front end.

pub mod cipher;
pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod machine;
pub mod models;
pub mod monitor;
pub mod password;
pub mod services;
pub mod session;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use facade::{RemoteOutcome, StoreFacade};
pub use models::{EntityId, EntityKind, Priority, Project, Session, Task, User, WorkStatus};
pub use monitor::{AvailabilityMonitor, MonitorHandle, RemoteProbe};
pub use sync::{ReconciliationService, SyncReport};
