use tasker_core::models::SyncEntity;
use tasker_core::services::{NewTask, TaskChanges};
use tasker_core::{EntityId, Task, User, WorkStatus};

use crate::app::App;
use crate::cli::{AddTaskArgs, UpdateTaskArgs};
use crate::commands::common::{
    format_task_lines, parse_due_date, resolve_task_id, short_id, task_to_list_item,
    TaskListItem,
};
use crate::error::CliError;

pub async fn run_task_add(app: &App, args: AddTaskArgs) -> Result<(), CliError> {
    let user = app.current_user().await?;
    let project_id = project_id_for(app, &user, args.project.as_deref()).await?;
    let due_date = args.due.as_deref().map(parse_due_date).transpose()?;

    let task = app
        .tasker
        .add_task(
            user.id(),
            NewTask {
                title: args.title,
                description: args.description,
                project_id,
                priority: args.priority.into(),
                due_date,
                time_estimate_minutes: args.estimate,
            },
        )
        .await?;
    println!("{}  {}", short_id(task.id()), task.title);
    Ok(())
}

pub async fn run_task_list(
    app: &App,
    project: Option<&str>,
    include_finished: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let user = app.current_user().await?;
    let project_id = project_id_for(app, &user, project).await?;
    let tasks = app
        .tasker
        .tasks(user.id(), project_id)
        .await?
        .into_iter()
        .filter(|task| include_finished || task.status != WorkStatus::Finished)
        .collect::<Vec<Task>>();

    if as_json {
        let json_items = tasks
            .iter()
            .map(task_to_list_item)
            .collect::<Vec<TaskListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if tasks.is_empty() {
        println!("No tasks.");
    } else {
        for line in format_task_lines(&tasks) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_task_update(app: &App, args: UpdateTaskArgs) -> Result<(), CliError> {
    let user = app.current_user().await?;
    let task_id = find_task(app, &user, &args.id).await?;
    let changes = task_changes(args)?;

    let task = app.tasker.update_task(user.id(), task_id, changes).await?;
    println!("Updated {}  {} [{}]", short_id(task.id()), task.title, task.status);
    Ok(())
}

pub async fn run_task_done(app: &App, id: &str) -> Result<(), CliError> {
    let user = app.current_user().await?;
    let task_id = find_task(app, &user, id).await?;
    let task = app.tasker.complete_task(user.id(), task_id).await?;
    println!("Finished {}  {}", short_id(task.id()), task.title);
    Ok(())
}

pub async fn run_task_delete(app: &App, id: &str) -> Result<(), CliError> {
    let user = app.current_user().await?;
    let task_id = find_task(app, &user, id).await?;
    app.tasker.delete_task(user.id(), task_id).await?;
    println!("Deleted {}", short_id(task_id));
    Ok(())
}

/// Translate update flags into a change set; at least one field must change.
pub fn task_changes(args: UpdateTaskArgs) -> Result<TaskChanges, CliError> {
    let due_date = if args.clear_due {
        Some(None)
    } else {
        args.due.as_deref().map(parse_due_date).transpose()?.map(Some)
    };
    let assigned_to = if args.unassign {
        Some(None)
    } else {
        args.assign.map(|name| Some(name.trim().to_string()))
    };

    let changes = TaskChanges {
        title: args.title,
        description: args.description,
        priority: args.priority.map(Into::into),
        status: args.status.map(Into::into),
        due_date,
        assigned_to,
        time_estimate_minutes: args.estimate.map(Some),
    };

    let untouched = changes.title.is_none()
        && changes.description.is_none()
        && changes.priority.is_none()
        && changes.status.is_none()
        && changes.due_date.is_none()
        && changes.assigned_to.is_none()
        && changes.time_estimate_minutes.is_none();
    if untouched {
        return Err(CliError::NothingToUpdate);
    }
    Ok(changes)
}

async fn project_id_for(
    app: &App,
    user: &User,
    project: Option<&str>,
) -> Result<Option<EntityId>, CliError> {
    match project {
        Some(name) => Ok(Some(app.tasker.project_named(user.id(), name).await?.id())),
        None => Ok(None),
    }
}

async fn find_task(app: &App, user: &User, query: &str) -> Result<EntityId, CliError> {
    let tasks = app.tasker.tasks(user.id(), None).await?;
    resolve_task_id(query, &tasks)
}
