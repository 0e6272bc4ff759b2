//! Application services

mod tasker;

pub use tasker::{NewTask, TaskChanges, TaskerService};
