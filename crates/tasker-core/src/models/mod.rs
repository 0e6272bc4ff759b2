//! Data models for Tasker

mod entity;
mod envelope;
mod id;
mod project;
mod session;
mod status;
mod task;
mod user;

pub use entity::{EntityKind, SyncEntity};
pub use envelope::Envelope;
pub use id::EntityId;
pub use project::Project;
pub use session::Session;
pub use status::{Priority, WorkStatus};
pub use task::Task;
pub use user::{validate_username, User, MAX_USERNAME_LEN};
