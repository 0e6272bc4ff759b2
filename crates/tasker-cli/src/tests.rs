use clap::Parser;
use tasker_core::config::AppConfig;
use tasker_core::models::SyncEntity;
use tasker_core::sync::{ConflictResolution, IdentityReport, UsernameRejection};
use tasker_core::{EntityId, Priority, SyncReport, Task, User, WorkStatus};
use tempfile::tempdir;

use crate::app::App;
use crate::cli::{Cli, Commands, StatusArg, SyncDirection, TaskCommands, UpdateTaskArgs};
use crate::commands::common::{
    format_date, format_relative_time, normalize_task_identifier, parse_due_date,
    resolve_task_id, short_id, task_to_list_item, truncate,
};
use crate::commands::setup::{apply_setup, SetupOptions};
use crate::commands::status::{format_status_lines, StatusSummary};
use crate::commands::sync::{format_identity_lines, format_sync_report};
use crate::commands::task::task_changes;
use crate::error::CliError;
use crate::prompt::{confirm_password, conflict_prompt, normalize_answer};

fn update_args(id: &str) -> UpdateTaskArgs {
    UpdateTaskArgs {
        id: id.to_string(),
        title: None,
        description: None,
        priority: None,
        status: None,
        due: None,
        clear_due: false,
        assign: None,
        unassign: false,
        estimate: None,
    }
}

fn setup_options(url: Option<&str>) -> SetupOptions {
    SetupOptions {
        url: url.map(ToString::to_string),
        token: None,
        probe_interval: None,
        timeout: None,
        clear: false,
    }
}

#[test]
fn parse_due_date_is_midnight_utc() {
    assert_eq!(parse_due_date("2024-03-01").unwrap(), 1_709_251_200_000);
    assert_eq!(parse_due_date(" 1970-01-02 ").unwrap(), 86_400_000);
    assert_eq!(format_date(1_709_251_200_000), "2024-03-01");
}

#[test]
fn parse_due_date_rejects_other_formats() {
    assert!(matches!(
        parse_due_date("03/01/2024"),
        Err(CliError::InvalidDate(raw)) if raw == "03/01/2024"
    ));
    assert!(parse_due_date("2024-02-30").is_err());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn truncate_keeps_first_line_within_limit() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("first line\nsecond", 20), "first line");
    assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
}

#[test]
fn normalize_task_identifier_rejects_blank() {
    assert!(matches!(
        normalize_task_identifier("   "),
        Err(CliError::EmptyTaskId)
    ));
    assert_eq!(normalize_task_identifier(" ABC ").unwrap(), "abc");
}

#[test]
fn resolve_task_id_matches_exact_and_prefix() {
    let owner = EntityId::new();
    let first = Task::new(owner, "write report").unwrap();
    let second = Task::new(owner, "review report").unwrap();
    let tasks = vec![first.clone(), second.clone()];

    let full = first.id().to_string();
    assert_eq!(resolve_task_id(&full, &tasks).unwrap(), first.id());
    assert_eq!(
        resolve_task_id(&full.to_uppercase(), &tasks).unwrap(),
        first.id()
    );

    // v7 ids minted together share their timestamp prefix
    let shared = &full[..4];
    assert!(matches!(
        resolve_task_id(shared, &tasks),
        Err(CliError::AmbiguousTaskId(_))
    ));
    assert!(matches!(
        resolve_task_id("zzzz", &tasks),
        Err(CliError::TaskNotFound(_))
    ));
}

#[test]
fn short_id_is_prefix_of_full_id() {
    let id = EntityId::new();
    let short = short_id(id);
    assert_eq!(short.len(), 13);
    assert!(id.to_string().starts_with(&short));
}

#[test]
fn task_list_item_carries_sync_state() {
    let mut task = Task::new(EntityId::new(), "ship it").unwrap();
    task.due_date = Some(86_400_000);
    task.priority = Priority::High;

    let item = task_to_list_item(&task);
    assert_eq!(item.title, "ship it");
    assert_eq!(item.priority, "High");
    assert_eq!(item.status, "NotAssigned");
    assert_eq!(item.due_date.as_deref(), Some("1970-01-02"));
    assert!(!item.is_synced);
}

#[test]
fn task_changes_requires_a_field() {
    assert!(matches!(
        task_changes(update_args("abc")),
        Err(CliError::NothingToUpdate)
    ));
}

#[test]
fn task_changes_maps_clear_flags() {
    let mut args = update_args("abc");
    args.clear_due = true;
    args.unassign = true;
    args.status = Some(StatusArg::Active);

    let changes = task_changes(args).unwrap();
    assert_eq!(changes.due_date, Some(None));
    assert_eq!(changes.assigned_to, Some(None));
    assert_eq!(changes.status, Some(WorkStatus::Active));
    assert_eq!(changes.title, None);
}

#[test]
fn task_changes_parses_due_and_assignee() {
    let mut args = update_args("abc");
    args.due = Some("1970-01-02".into());
    args.assign = Some("  sam ".into());
    args.estimate = Some(45);

    let changes = task_changes(args).unwrap();
    assert_eq!(changes.due_date, Some(Some(86_400_000)));
    assert_eq!(changes.assigned_to, Some(Some("sam".to_string())));
    assert_eq!(changes.time_estimate_minutes, Some(Some(45)));
}

#[test]
fn apply_setup_validates_url_scheme() {
    let mut config = AppConfig::default();
    assert!(matches!(
        apply_setup(&mut config, setup_options(Some("tasks.example.com"))),
        Err(CliError::Config(_))
    ));
    assert!(matches!(
        apply_setup(&mut config, setup_options(Some("   "))),
        Err(CliError::Config(_))
    ));
    assert_eq!(config, AppConfig::default());

    let mut options = setup_options(Some(" libsql://tasks.example.com "));
    options.token = Some("secret".into());
    options.timeout = Some(3);
    apply_setup(&mut config, options).unwrap();
    assert_eq!(config.remote_url.as_deref(), Some("libsql://tasks.example.com"));
    assert_eq!(config.remote_auth_token.as_deref(), Some("secret"));
    assert_eq!(config.remote_timeout_secs, Some(3));
}

#[test]
fn apply_setup_clear_forgets_remote() {
    let mut config = AppConfig {
        remote_url: Some("libsql://tasks.example.com".into()),
        remote_auth_token: Some("secret".into()),
        session_token: Some("session".into()),
        ..AppConfig::default()
    };
    let mut options = setup_options(None);
    options.clear = true;
    apply_setup(&mut config, options).unwrap();

    assert!(config.remote().is_none());
    assert_eq!(config.remote_auth_token, None);
    assert_eq!(config.session_token.as_deref(), Some("session"));
}

#[test]
fn confirm_password_requires_match() {
    assert_eq!(confirm_password("hunter22".into(), "hunter22").unwrap(), "hunter22");
    assert!(matches!(
        confirm_password("hunter22".into(), "hunter23"),
        Err(CliError::PasswordMismatch)
    ));
}

#[test]
fn conflict_prompt_mentions_rejection_reason() {
    let local = User::new("alice", "hash").unwrap();
    let remote = User::new("Alice", "hash").unwrap();

    let first = conflict_prompt(&local, &remote, None);
    assert!(first.contains("'alice'"));
    assert!(first.contains("'Alice'"));

    let retry = conflict_prompt(&local, &remote, Some(&UsernameRejection::TakenRemotely));
    assert!(retry.contains("already taken on the server"));
}

#[test]
fn normalize_answer_treats_blank_as_give_up() {
    assert_eq!(normalize_answer("  \n"), None);
    assert_eq!(normalize_answer(" alice2 ").as_deref(), Some("alice2"));
}

#[test]
fn format_sync_report_lines() {
    let report = SyncReport {
        sent: 2,
        received: 1,
        unchanged: 4,
        failed: 1,
        reset_detected: true,
        skipped: false,
    };
    assert_eq!(
        format_sync_report("push", &report),
        "push: 2 sent, 1 received, 4 unchanged, 1 failed (will retry); remote store was empty, local data queued again"
    );

    let skipped = SyncReport {
        skipped: true,
        ..SyncReport::default()
    };
    assert_eq!(
        format_sync_report("pull", &skipped),
        "pull: skipped (remote unreachable)"
    );
}

#[test]
fn format_identity_lines_describe_each_resolution() {
    let report = IdentityReport {
        remote_checked: true,
        resolutions: vec![
            ConflictResolution::Renamed {
                user_id: EntityId::new(),
                from: "alice".into(),
                to: "alice2".into(),
            },
            ConflictResolution::Abandoned {
                user_id: EntityId::new(),
                username: "bob".into(),
            },
        ],
    };
    let lines = format_identity_lines(&report);
    assert_eq!(lines[0], "Account 'alice' renamed to 'alice2'");
    assert!(lines[1].contains("'bob'"));
}

#[test]
fn format_status_lines_reports_remote_state() {
    let summary = StatusSummary {
        remote_configured: true,
        remote_reachable: false,
        user: Some("alice".into()),
        unsynced_tasks: 3,
        unsynced_sessions: 1,
        ..StatusSummary::default()
    };
    let lines = format_status_lines(&summary);
    assert_eq!(lines[0], "Remote:   unreachable (working locally)");
    assert_eq!(lines[1], "User:     alice");
    assert!(lines[2].starts_with("Pending:  4 change(s)"));

    let local_only = format_status_lines(&StatusSummary::default());
    assert_eq!(local_only[0], "Remote:   not configured (local only)");
    assert_eq!(local_only[1], "User:     not logged in");
}

#[test]
fn cli_parses_task_update_flags() {
    let cli = Cli::try_parse_from([
        "tasker",
        "task",
        "update",
        "0190abcd",
        "--status",
        "testing",
        "--clear-due",
    ])
    .unwrap();
    let Commands::Task {
        command: TaskCommands::Update(args),
    } = cli.command
    else {
        panic!("expected task update");
    };
    assert_eq!(args.id, "0190abcd");
    assert_eq!(args.status, Some(StatusArg::Testing));
    assert!(args.clear_due);
}

#[test]
fn cli_rejects_conflicting_flags() {
    assert!(Cli::try_parse_from([
        "tasker",
        "task",
        "update",
        "x",
        "--due",
        "2024-01-01",
        "--clear-due",
    ])
    .is_err());
    assert!(
        Cli::try_parse_from(["tasker", "setup", "--clear", "--url", "libsql://x"]).is_err()
    );
    assert!(Cli::try_parse_from(["tasker", "setup"]).is_err());
}

#[test]
fn cli_sync_direction_defaults_to_both() {
    let cli = Cli::try_parse_from(["tasker", "sync"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Sync {
            direction: SyncDirection::Both
        }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn app_runs_local_only_without_remote() {
    let tmp = tempdir().unwrap();
    let mut app = App::open(&tmp.path().join("tasker.db"), AppConfig::default())
        .await
        .unwrap();
    app.start_background_sync().await;

    assert!(!app.facade.has_remote());
    assert!(app.scope().is_none());
    assert!(matches!(
        app.current_user().await,
        Err(CliError::NotLoggedIn)
    ));

    let user = app.tasker.register_user("alice", "Str0ng!Pass").await.unwrap();
    let pending = app.facade.get_unsynced::<User>().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id(), user.id());

    app.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn app_ignores_unknown_session_token() {
    let tmp = tempdir().unwrap();
    let config = AppConfig {
        session_token: Some("no-such-token".into()),
        ..AppConfig::default()
    };
    let app = App::open(&tmp.path().join("tasker.db"), config).await.unwrap();
    assert!(app.session().is_none());
    app.close().await;
}
