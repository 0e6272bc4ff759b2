//! Task model

use libsql::Value;
use serde::{Deserialize, Serialize};

use super::entity::{opt_id_value, opt_int_value, opt_text_value};
use super::{EntityId, EntityKind, Envelope, Priority, SyncEntity, WorkStatus};
use crate::db::RowReader;
use crate::error::{Error, Result};
use crate::util::now_millis;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// A unit of work owned by a user, optionally filed under a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Unique per (user, project)
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: WorkStatus,
    /// Creation timestamp (Unix ms)
    pub created_on: i64,
    pub updated_on: Option<i64>,
    pub completed_on: Option<i64>,
    pub due_date: Option<i64>,
    pub assigned_to: Option<String>,
    pub time_estimate_minutes: Option<i64>,
    pub actual_time_minutes: i64,
    pub active_start_time: Option<i64>,
    pub last_paused_time: Option<i64>,
    pub user_id: EntityId,
    pub project_id: Option<EntityId>,
}

impl Task {
    /// Create a new task for `user_id`
    pub fn new(user_id: EntityId, title: &str) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("task title cannot be empty".into()));
        }
        Ok(Self {
            envelope: Envelope::new(),
            title: title.to_string(),
            description: String::new(),
            priority: Priority::None,
            status: WorkStatus::NotAssigned,
            created_on: now_millis(),
            updated_on: None,
            completed_on: None,
            due_date: None,
            assigned_to: None,
            time_estimate_minutes: None,
            actual_time_minutes: 0,
            active_start_time: None,
            last_paused_time: None,
            user_id,
            project_id: None,
        })
    }

    /// File the task under a project
    #[must_use]
    pub const fn in_project(mut self, project_id: EntityId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Move to `next`, accumulating active time and maintaining the
    /// start/pause markers.
    pub fn transition(&mut self, next: WorkStatus, now: i64) {
        let was_running = self.status == WorkStatus::Active;

        if was_running {
            if let Some(started) = self.active_start_time {
                self.actual_time_minutes += (now - started).max(0) / MILLIS_PER_MINUTE;
            }
        }

        match next {
            WorkStatus::Active => {
                self.active_start_time = Some(now);
                self.last_paused_time = None;
            }
            WorkStatus::Paused | WorkStatus::Blocked | WorkStatus::Testing => {
                if was_running && self.active_start_time.is_some() {
                    self.last_paused_time = Some(now);
                    self.active_start_time = None;
                }
            }
            WorkStatus::Finished => {
                self.active_start_time = None;
                self.last_paused_time = None;
            }
            WorkStatus::NotAssigned | WorkStatus::Assigned => {
                if was_running {
                    self.active_start_time = None;
                }
            }
        }

        self.completed_on = (next == WorkStatus::Finished).then_some(now);
        self.status = next;
    }

    /// Whether the task has been finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == WorkStatus::Finished
    }
}

impl SyncEntity for Task {
    const KIND: EntityKind = EntityKind::Task;
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "description",
        "priority",
        "status",
        "created_on",
        "updated_on",
        "completed_on",
        "due_date",
        "assigned_to",
        "time_estimate_minutes",
        "actual_time_minutes",
        "active_start_time",
        "last_paused_time",
        "user_id",
        "project_id",
    ];

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.title.clone()),
            Value::Text(self.description.clone()),
            Value::Text(self.priority.as_str().to_string()),
            Value::Text(self.status.as_str().to_string()),
            Value::Integer(self.created_on),
            opt_int_value(self.updated_on),
            opt_int_value(self.completed_on),
            opt_int_value(self.due_date),
            opt_text_value(self.assigned_to.as_deref()),
            opt_int_value(self.time_estimate_minutes),
            Value::Integer(self.actual_time_minutes),
            opt_int_value(self.active_start_time),
            opt_int_value(self.last_paused_time),
            Value::Text(self.user_id.as_str()),
            opt_id_value(self.project_id),
        ]
    }

    fn from_columns(envelope: Envelope, reader: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            envelope,
            title: reader.text()?,
            description: reader.text()?,
            priority: reader.parsed()?,
            status: reader.parsed()?,
            created_on: reader.int()?,
            updated_on: reader.opt_int()?,
            completed_on: reader.opt_int()?,
            due_date: reader.opt_int()?,
            assigned_to: reader.opt_text()?,
            time_estimate_minutes: reader.opt_int()?,
            actual_time_minutes: reader.int()?,
            active_start_time: reader.opt_int()?,
            last_paused_time: reader.opt_int()?,
            user_id: reader.id()?,
            project_id: reader.opt_id()?,
        })
    }
}
