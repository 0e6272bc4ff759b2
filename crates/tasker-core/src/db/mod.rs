//! Storage layer: libSQL stores, schema migrations and row mapping

mod connection;
mod migrations;
mod row;
mod store;

pub use connection::{RemoteConfig, Store, StoreRole};
pub use row::RowReader;
pub use store::Visibility;
