//! Project model

use libsql::Value;
use serde::{Deserialize, Serialize};

use super::entity::opt_int_value;
use super::{EntityId, EntityKind, Envelope, Priority, SyncEntity};
use crate::db::RowReader;
use crate::error::{Error, Result};
use crate::util::now_millis;

/// A named group of tasks owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Unique per owner
    pub name: String,
    pub description: String,
    pub priority: Priority,
    /// Creation timestamp (Unix ms)
    pub created_on: i64,
    /// Last user-visible edit (Unix ms)
    pub updated_on: i64,
    pub completed_on: Option<i64>,
    pub owner_id: EntityId,
}

impl Project {
    /// Create a new project for `owner_id`
    pub fn new(owner_id: EntityId, name: &str, description: impl Into<String>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("project name cannot be empty".into()));
        }
        let now = now_millis();
        Ok(Self {
            envelope: Envelope::new(),
            name: name.to_string(),
            description: description.into(),
            priority: Priority::None,
            created_on: now,
            updated_on: now,
            completed_on: None,
            owner_id,
        })
    }

    /// Whether the project has been marked complete
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed_on.is_some()
    }
}

impl SyncEntity for Project {
    const KIND: EntityKind = EntityKind::Project;
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "priority",
        "created_on",
        "updated_on",
        "completed_on",
        "owner_id",
    ];

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Text(self.description.clone()),
            Value::Text(self.priority.as_str().to_string()),
            Value::Integer(self.created_on),
            Value::Integer(self.updated_on),
            opt_int_value(self.completed_on),
            Value::Text(self.owner_id.as_str()),
        ]
    }

    fn from_columns(envelope: Envelope, reader: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            envelope,
            name: reader.text()?,
            description: reader.text()?,
            priority: reader.parsed()?,
            created_on: reader.int()?,
            updated_on: reader.int()?,
            completed_on: reader.opt_int()?,
            owner_id: reader.id()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_new() {
        let owner = EntityId::new();
        let project = Project::new(owner, " Garden ", "spring work").unwrap();
        assert_eq!(project.name, "Garden");
        assert_eq!(project.owner_id, owner);
        assert_eq!(project.created_on, project.updated_on);
        assert!(!project.is_completed());
    }

    #[test]
    fn test_project_rejects_blank_name() {
        assert!(Project::new(EntityId::new(), "  ", "").is_err());
    }
}
