use tasker_core::models::SyncEntity;

use crate::app::App;
use crate::commands::common::format_timestamp;
use crate::error::CliError;
use crate::prompt::{read_new_password, read_password};

pub async fn run_user_create(app: &App, username: &str) -> Result<(), CliError> {
    let password = read_new_password()?;
    let user = app.tasker.register_user(username, &password).await?;
    println!("Created account '{}' ({})", user.username, user.id());
    Ok(())
}

pub async fn run_login(app: &mut App, username: &str, days: i64) -> Result<(), CliError> {
    let password = read_password("Password: ")?;
    let user = match app.tasker.authenticate(username, &password).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(CliError::InvalidCredentials),
        Err(tasker_core::Error::LockedOut { until }) => {
            return Err(CliError::LockedOut(format_timestamp(until)));
        }
        Err(error) => return Err(error.into()),
    };

    if let Some(previous) = app.config.session_token.take() {
        app.sessions.invalidate_session(&previous).await?;
    }
    let session = app.sessions.create_session(&user, days, true).await?;
    app.config.session_token = Some(session.token.clone());
    app.config.save()?;

    println!(
        "Logged in as {} until {}",
        user.username,
        format_timestamp(session.expires_at)
    );
    Ok(())
}

pub async fn run_logout(app: &mut App) -> Result<(), CliError> {
    let Some(token) = app.config.session_token.take() else {
        println!("Not logged in");
        return Ok(());
    };

    app.sessions.invalidate_session(&token).await?;
    app.config.save()?;
    println!("Logged out");
    Ok(())
}

pub async fn run_session(
    app: &App,
    days: Option<i64>,
    auto_login: Option<bool>,
) -> Result<(), CliError> {
    let session = app.session().ok_or(CliError::NotLoggedIn)?;
    let session = if days.is_some() || auto_login.is_some() {
        app.sessions
            .update_session_settings(&session.token, days, auto_login)
            .await?
    } else {
        session.clone()
    };

    println!("Session:    {}", session.id());
    println!("Expires:    {}", format_timestamp(session.expires_at));
    println!("Duration:   {} day(s)", session.duration_days);
    println!(
        "Auto-login: {}",
        if session.auto_login_enabled { "on" } else { "off" }
    );
    Ok(())
}
