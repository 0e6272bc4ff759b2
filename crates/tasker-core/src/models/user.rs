//! User model

use libsql::Value;
use serde::{Deserialize, Serialize};

use super::entity::opt_int_value;
use super::{EntityKind, Envelope, SyncEntity};
use crate::db::RowReader;
use crate::error::{Error, Result};

/// Maximum username length accepted by both stores
pub const MAX_USERNAME_LEN: usize = 50;

/// An account that owns projects, tasks and sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Unique across both stores, compared case-insensitively
    pub username: String,
    /// Opaque credential hash produced outside the core
    pub password_hash: String,
    pub failed_login_attempts: i64,
    /// Lockout expiry (Unix ms)
    pub lockout_end_time: Option<i64>,
}

impl User {
    /// Create a new user with the given username and credential hash
    pub fn new(username: &str, password_hash: impl Into<String>) -> Result<Self> {
        Ok(Self {
            envelope: Envelope::new(),
            username: validate_username(username)?,
            password_hash: password_hash.into(),
            failed_login_attempts: 0,
            lockout_end_time: None,
        })
    }

    /// Case-insensitive username comparison
    #[must_use]
    pub fn has_username(&self, username: &str) -> bool {
        self.username.to_lowercase() == username.trim().to_lowercase()
    }
}

/// Trim and validate a candidate username.
pub fn validate_username(raw: &str) -> Result<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(Error::InvalidInput("username cannot be empty".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(Error::InvalidInput(format!(
            "username cannot exceed {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(username.to_string())
}

impl SyncEntity for User {
    const KIND: EntityKind = EntityKind::User;
    const COLUMNS: &'static [&'static str] = &[
        "username",
        "password_hash",
        "failed_login_attempts",
        "lockout_end_time",
    ];

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.username.clone()),
            Value::Text(self.password_hash.clone()),
            Value::Integer(self.failed_login_attempts),
            opt_int_value(self.lockout_end_time),
        ]
    }

    fn from_columns(envelope: Envelope, reader: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            envelope,
            username: reader.text()?,
            password_hash: reader.text()?,
            failed_login_attempts: reader.int()?,
            lockout_end_time: reader.opt_int()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new_trims_username() {
        let user = User::new("  alice ", "hash").unwrap();
        assert_eq!(user.username, "alice");
        assert!(!user.envelope.is_synced);
    }

    #[test]
    fn test_user_rejects_empty_and_long_names() {
        assert!(User::new("   ", "hash").is_err());
        assert!(User::new(&"x".repeat(MAX_USERNAME_LEN + 1), "hash").is_err());
        assert!(User::new(&"x".repeat(MAX_USERNAME_LEN), "hash").is_ok());
    }

    #[test]
    fn test_has_username_ignores_case() {
        let user = User::new("Alice", "hash").unwrap();
        assert!(user.has_username("alice"));
        assert!(user.has_username("ALICE "));
        assert!(!user.has_username("alice2"));
    }

    #[test]
    fn test_column_values_follow_column_order() {
        let user = User::new("bob", "h").unwrap();
        assert_eq!(user.column_values().len(), User::COLUMNS.len());
    }
}
