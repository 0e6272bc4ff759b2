//! Tasker CLI - offline-first task tracking from the terminal
//!
//! Every command works against the local store; when a remote store is
//! configured and reachable, writes are mirrored and a background pass
//! reconciles both stores before the process exits.

mod app;
mod cli;
mod commands;
mod error;
mod prompt;

#[cfg(test)]
mod tests;

use clap::Parser;
use tasker_core::config::AppConfig;

use crate::app::App;
use crate::cli::{Cli, Commands, ProjectCommands, TaskCommands, UserCommands};
use crate::commands::account::{run_login, run_logout, run_session, run_user_create};
use crate::commands::common::resolve_db_path;
use crate::commands::project::{run_project_add, run_project_delete, run_project_list};
use crate::commands::setup::{run_setup, SetupOptions};
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::task::{
    run_task_add, run_task_delete, run_task_done, run_task_list, run_task_update,
};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "tasker=info"
            .parse()
            .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?,
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load();

    // Setup must work even when the configured remote is broken
    if let Commands::Setup {
        url,
        token,
        probe_interval,
        timeout,
        clear,
    } = cli.command
    {
        return run_setup(
            config,
            SetupOptions {
                url,
                token,
                probe_interval,
                timeout,
                clear,
            },
        );
    }

    let db_path = resolve_db_path(cli.db_path);
    let mut app = App::open(&db_path, config).await?;
    if !matches!(cli.command, Commands::Sync { .. }) {
        app.start_background_sync().await;
    }

    let outcome = dispatch(&mut app, cli.command).await;
    app.close().await;
    outcome
}

async fn dispatch(app: &mut App, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Setup {
            url,
            token,
            probe_interval,
            timeout,
            clear,
        } => run_setup(
            app.config.clone(),
            SetupOptions {
                url,
                token,
                probe_interval,
                timeout,
                clear,
            },
        ),
        Commands::User {
            command: UserCommands::Create { username },
        } => run_user_create(app, &username).await,
        Commands::Login { username, days } => run_login(app, &username, days).await,
        Commands::Logout => run_logout(app).await,
        Commands::Session { days, auto_login } => run_session(app, days, auto_login).await,
        Commands::Project { command } => match command {
            ProjectCommands::Add {
                name,
                description,
                priority,
            } => run_project_add(app, &name, &description, priority.into()).await,
            ProjectCommands::List { json } => run_project_list(app, json).await,
            ProjectCommands::Delete { name } => run_project_delete(app, &name).await,
        },
        Commands::Task { command } => match command {
            TaskCommands::Add(args) => run_task_add(app, args).await,
            TaskCommands::List { project, all, json } => {
                run_task_list(app, project.as_deref(), all, json).await
            }
            TaskCommands::Update(args) => run_task_update(app, args).await,
            TaskCommands::Done { id } => run_task_done(app, &id).await,
            TaskCommands::Delete { id } => run_task_delete(app, &id).await,
        },
        Commands::Sync { direction } => run_sync(app, direction).await,
        Commands::Status { json } => run_status(app, json).await,
    }
}
