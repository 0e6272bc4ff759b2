use std::env;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tasker_core::config::default_database_path;
use tasker_core::models::SyncEntity;
use tasker_core::{EntityId, Priority, Project, Task, WorkStatus};

use crate::cli::{PriorityArg, StatusArg};
use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub project_id: Option<String>,
    pub due_date: Option<String>,
    pub assigned_to: Option<String>,
    pub time_estimate_minutes: Option<i64>,
    pub actual_time_minutes: i64,
    pub last_modified: i64,
    pub relative_time: String,
    pub is_synced: bool,
}

#[derive(Debug, Serialize)]
pub struct ProjectListItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub priority: String,
    pub created_on: i64,
    pub is_synced: bool,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::None => Self::None,
            PriorityArg::Low => Self::Low,
            PriorityArg::Medium => Self::Medium,
            PriorityArg::High => Self::High,
            PriorityArg::Urgent => Self::Urgent,
        }
    }
}

impl From<StatusArg> for WorkStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::NotAssigned => Self::NotAssigned,
            StatusArg::Assigned => Self::Assigned,
            StatusArg::Active => Self::Active,
            StatusArg::Paused => Self::Paused,
            StatusArg::Blocked => Self::Blocked,
            StatusArg::Testing => Self::Testing,
            StatusArg::Finished => Self::Finished,
        }
    }
}

pub fn short_id(id: EntityId) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

pub fn task_to_list_item(task: &Task) -> TaskListItem {
    let now_ms = Utc::now().timestamp_millis();
    TaskListItem {
        id: task.id().to_string(),
        title: task.title.clone(),
        description: task.description.clone(),
        status: task.status.to_string(),
        priority: task.priority.to_string(),
        project_id: task.project_id.map(|id| id.to_string()),
        due_date: task.due_date.map(format_date),
        assigned_to: task.assigned_to.clone(),
        time_estimate_minutes: task.time_estimate_minutes,
        actual_time_minutes: task.actual_time_minutes,
        last_modified: task.envelope.last_modified,
        relative_time: format_relative_time(task.envelope.last_modified, now_ms),
        is_synced: task.envelope.is_synced,
    }
}

pub fn project_to_list_item(project: &Project) -> ProjectListItem {
    ProjectListItem {
        id: project.id().to_string(),
        name: project.name.clone(),
        description: project.description.clone(),
        priority: project.priority.to_string(),
        created_on: project.created_on,
        is_synced: project.envelope.is_synced,
    }
}

pub fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let marker = if task.envelope.is_synced { ' ' } else { '*' };
            let title = truncate(&task.title, 40);
            let due = task
                .due_date
                .map(|due| format!("  due {}", format_date(due)))
                .unwrap_or_default();
            format!(
                "{marker}{:<13}  {title:<40}  {:<11}  {:<6}  {}{due}",
                short_id(task.id()),
                task.status.as_str(),
                task.priority.as_str(),
                format_relative_time(task.envelope.last_modified, now_ms),
            )
        })
        .collect()
}

pub fn format_project_lines(projects: &[Project]) -> Vec<String> {
    projects
        .iter()
        .map(|project| {
            let marker = if project.envelope.is_synced { ' ' } else { '*' };
            let description = truncate(&project.description, 50);
            format!(
                "{marker}{:<24}  {:<6}  {description}",
                truncate(&project.name, 24),
                project.priority.as_str()
            )
        })
        .collect()
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let mut truncated = first_line
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_date(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d").to_string(),
    )
}

/// Midnight UTC of a `YYYY-MM-DD` date, as Unix ms
pub fn parse_due_date(raw: &str) -> Result<i64, CliError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date_time| date_time.and_utc().timestamp_millis())
        .ok_or_else(|| CliError::InvalidDate(trimmed.to_string()))
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_task_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyTaskId)
    } else {
        Ok(trimmed.to_lowercase())
    }
}

/// Pick the task whose id equals or starts with `query`
pub fn resolve_task_id(query: &str, tasks: &[Task]) -> Result<EntityId, CliError> {
    let query = normalize_task_identifier(query)?;
    if let Some(exact) = tasks.iter().find(|task| task.id().to_string() == query) {
        return Ok(exact.id());
    }

    let matching = tasks
        .iter()
        .filter(|task| task.id().to_string().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::TaskNotFound(query)),
        [task] => Ok(task.id()),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|task| short_id(task.id()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousTaskId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TASKER_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_database_path)
}
