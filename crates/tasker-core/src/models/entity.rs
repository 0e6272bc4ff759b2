//! The replicated-entity contract shared by both stores

use std::fmt;

use libsql::Value;

use super::{EntityId, Envelope};
use crate::db::RowReader;
use crate::error::Result;

/// The fixed set of replicated entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Project,
    Task,
    Session,
}

impl EntityKind {
    /// Parents before children, so foreign keys resolve on the receiving store.
    pub const SYNC_ORDER: [Self; 4] = [Self::User, Self::Project, Self::Task, Self::Session];

    /// Backing table name (identical in both stores)
    pub const fn table(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Project => "projects",
            Self::Task => "tasks",
            Self::Session => "user_sessions",
        }
    }

    /// Column that ties a row to the user it belongs to, used for scoped passes.
    pub const fn scope_column(self) -> &'static str {
        match self {
            Self::User => "id",
            Self::Project => "owner_id",
            Self::Task | Self::Session => "user_id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Task => "task",
            Self::Session => "session",
        };
        f.write_str(name)
    }
}

/// A record carrying an [`Envelope`] that can be moved between the two stores.
///
/// The column list and the two mapping functions are the only fields that
/// travel between stores. Entities hold foreign keys as plain ids and have no
/// in-memory object graph, so a copy never drags related rows along.
pub trait SyncEntity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Which table this entity lives in
    const KIND: EntityKind;

    /// Non-envelope columns, in the order `column_values` binds them
    const COLUMNS: &'static [&'static str];

    fn envelope(&self) -> &Envelope;

    fn envelope_mut(&mut self) -> &mut Envelope;

    /// Scalar field values in `COLUMNS` order
    fn column_values(&self) -> Vec<Value>;

    /// Rebuild the entity from a row whose envelope has already been read.
    fn from_columns(envelope: Envelope, reader: &mut RowReader<'_>) -> Result<Self>;

    fn id(&self) -> EntityId {
        self.envelope().id
    }

    /// Copy destined for the other store, flagged as confirmed on arrival.
    #[must_use]
    fn transfer_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.envelope_mut().is_synced = true;
        copy
    }
}

/// Bind helper for optional ids.
pub(crate) fn opt_id_value(id: Option<EntityId>) -> Value {
    id.map_or(Value::Null, |id| Value::Text(id.as_str()))
}

/// Bind helper for optional integers.
pub(crate) fn opt_int_value(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

/// Bind helper for optional text.
pub(crate) fn opt_text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}
