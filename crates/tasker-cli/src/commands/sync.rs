use tasker_core::sync::{ConflictResolution, IdentityReport};
use tasker_core::SyncReport;

use crate::app::App;
use crate::cli::SyncDirection;
use crate::error::CliError;

pub async fn run_sync(app: &App, direction: SyncDirection) -> Result<(), CliError> {
    if !app.facade.has_remote() {
        return Err(if app.config.remote().is_some() {
            CliError::RemoteUnavailable
        } else {
            CliError::SyncNotConfigured
        });
    }

    let identity = app.sync.handle_identity_conflicts().await?;
    for line in format_identity_lines(&identity) {
        println!("{line}");
    }

    let scope = app.scope();
    let reports = match direction {
        SyncDirection::Both => {
            let (pushed, pulled) = app.sync.reconcile(scope).await?;
            vec![("push", pushed), ("pull", pulled)]
        }
        SyncDirection::Push => vec![("push", app.sync.sync_to_remote(scope).await?)],
        SyncDirection::Pull => vec![("pull", app.sync.sync_from_remote(scope).await?)],
    };

    for (label, report) in &reports {
        println!("{}", format_sync_report(label, report));
    }
    if reports.iter().any(|(_, report)| report.skipped) {
        return Err(CliError::RemoteUnavailable);
    }
    Ok(())
}

pub fn format_sync_report(label: &str, report: &SyncReport) -> String {
    if report.skipped {
        return format!("{label}: skipped (remote unreachable)");
    }
    let mut line = format!(
        "{label}: {} sent, {} received, {} unchanged",
        report.sent, report.received, report.unchanged
    );
    if report.failed > 0 {
        line.push_str(&format!(", {} failed (will retry)", report.failed));
    }
    if report.reset_detected {
        line.push_str("; remote store was empty, local data queued again");
    }
    line
}

pub fn format_identity_lines(report: &IdentityReport) -> Vec<String> {
    report
        .resolutions
        .iter()
        .map(|resolution| match resolution {
            ConflictResolution::Rekeyed {
                username,
                old_id,
                new_id,
            } => format!("Account '{username}' re-keyed {old_id} -> {new_id}"),
            ConflictResolution::Renamed { from, to, .. } => {
                format!("Account '{from}' renamed to '{to}'")
            }
            ConflictResolution::Abandoned { username, .. } => {
                format!("Account '{username}' still conflicts with the server and was not synced")
            }
        })
        .collect()
}
