pub mod account;
pub mod common;
pub mod project;
pub mod setup;
pub mod status;
pub mod sync;
pub mod task;
