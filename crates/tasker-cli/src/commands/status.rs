use serde::Serialize;
use tasker_core::models::SyncEntity;
use tasker_core::{Project, Session, Task, User};

use crate::app::App;
use crate::error::CliError;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct StatusSummary {
    pub remote_configured: bool,
    pub remote_reachable: bool,
    pub user: Option<String>,
    pub unsynced_users: usize,
    pub unsynced_projects: usize,
    pub unsynced_tasks: usize,
    pub unsynced_sessions: usize,
}

impl StatusSummary {
    pub const fn pending(&self) -> usize {
        self.unsynced_users + self.unsynced_projects + self.unsynced_tasks + self.unsynced_sessions
    }
}

pub async fn run_status(app: &App, as_json: bool) -> Result<(), CliError> {
    let remote_configured = app.config.remote().is_some();
    let remote_reachable = app.facade.reachable_remote().await.is_some();
    let user = match app.current_user().await {
        Ok(user) => Some(user.username),
        Err(CliError::NotLoggedIn) => None,
        Err(error) => return Err(error),
    };

    let summary = StatusSummary {
        remote_configured,
        remote_reachable,
        user,
        unsynced_users: app.facade.get_unsynced::<User>().await?.len(),
        unsynced_projects: app.facade.get_unsynced::<Project>().await?.len(),
        unsynced_tasks: app.facade.get_unsynced::<Task>().await?.len(),
        unsynced_sessions: app.facade.get_unsynced::<Session>().await?.len(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_status_lines(&summary) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(summary: &StatusSummary) -> Vec<String> {
    let remote = match (summary.remote_configured, summary.remote_reachable) {
        (false, _) => "not configured (local only)",
        (true, true) => "reachable",
        (true, false) => "unreachable (working locally)",
    };
    vec![
        format!("Remote:   {remote}"),
        format!(
            "User:     {}",
            summary.user.as_deref().unwrap_or("not logged in")
        ),
        format!(
            "Pending:  {} change(s) ({} {}, {} {}, {} {}, {} {})",
            summary.pending(),
            summary.unsynced_users,
            User::KIND,
            summary.unsynced_projects,
            Project::KIND,
            summary.unsynced_tasks,
            Task::KIND,
            summary.unsynced_sessions,
            Session::KIND,
        ),
    ]
}
