//! Terminal input: passwords and replacement usernames.

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};

use async_trait::async_trait;
use tasker_core::sync::{UsernameRejection, UsernameResolver};
use tasker_core::User;

use crate::error::CliError;

pub const PASSWORD_ENV: &str = "TASKER_PASSWORD";

/// Print `prompt` to stderr and read one line from stdin, without the newline.
pub fn read_line(prompt: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Password from `TASKER_PASSWORD`, or read from the terminal.
pub fn read_password(prompt: &str) -> Result<String, CliError> {
    if let Ok(password) = env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    Ok(read_line(prompt)?)
}

/// Ask for a new password twice and require both entries to match
pub fn read_new_password() -> Result<String, CliError> {
    if let Ok(password) = env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    let first = read_line("Password: ")?;
    let second = read_line("Repeat password: ")?;
    confirm_password(first, &second)
}

pub fn confirm_password(first: String, second: &str) -> Result<String, CliError> {
    if first == second {
        Ok(first)
    } else {
        Err(CliError::PasswordMismatch)
    }
}

/// Asks on the terminal for a replacement username; gives up when stdin is not a TTY.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalResolver;

#[async_trait]
impl UsernameResolver for TerminalResolver {
    async fn propose_username(
        &self,
        local: &User,
        taken_by: &User,
        rejection: Option<&UsernameRejection>,
    ) -> Option<String> {
        if !io::stdin().is_terminal() {
            tracing::warn!(
                "Username '{}' is taken on the server; run `tasker sync` in a terminal to rename it",
                local.username
            );
            return None;
        }

        let prompt = conflict_prompt(local, taken_by, rejection);
        match tokio::task::spawn_blocking(move || read_line(&prompt)).await {
            Ok(Ok(answer)) => normalize_answer(&answer),
            Ok(Err(error)) => {
                tracing::warn!("Could not read replacement username: {error}");
                None
            }
            Err(error) => {
                tracing::warn!("Username prompt failed: {error}");
                None
            }
        }
    }
}

pub fn conflict_prompt(
    local: &User,
    taken_by: &User,
    rejection: Option<&UsernameRejection>,
) -> String {
    let mut prompt = String::new();
    if let Some(reason) = rejection {
        prompt.push_str(&format!("That name was refused: {reason}.\n"));
    } else {
        prompt.push_str(&format!(
            "The username '{}' is already used on the server by another account ('{}').\n",
            local.username, taken_by.username
        ));
    }
    prompt.push_str("New username for this account (blank to skip): ");
    prompt
}

/// Blank answers mean "give up"
pub fn normalize_answer(answer: &str) -> Option<String> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
