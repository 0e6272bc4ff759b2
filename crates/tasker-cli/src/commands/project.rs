use tasker_core::models::SyncEntity;
use tasker_core::Priority;

use crate::app::App;
use crate::commands::common::{format_project_lines, project_to_list_item, ProjectListItem};
use crate::error::CliError;

pub async fn run_project_add(
    app: &App,
    name: &str,
    description: &str,
    priority: Priority,
) -> Result<(), CliError> {
    let user = app.current_user().await?;
    let project = app
        .tasker
        .create_project(user.id(), name, description, priority)
        .await?;
    println!("Created project '{}'", project.name);
    Ok(())
}

pub async fn run_project_list(app: &App, as_json: bool) -> Result<(), CliError> {
    let user = app.current_user().await?;
    let projects = app.tasker.projects(user.id()).await?;

    if as_json {
        let json_items = projects
            .iter()
            .map(project_to_list_item)
            .collect::<Vec<ProjectListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if projects.is_empty() {
        println!("No projects yet.");
    } else {
        for line in format_project_lines(&projects) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_project_delete(app: &App, name: &str) -> Result<(), CliError> {
    let user = app.current_user().await?;
    let project = app.tasker.project_named(user.id(), name).await?;
    app.tasker.delete_project(user.id(), project.id()).await?;
    println!("Deleted project '{}'", project.name);
    Ok(())
}
