//! Login session model

use libsql::Value;
use serde::{Deserialize, Serialize};

use super::{EntityId, EntityKind, Envelope, SyncEntity};
use crate::db::RowReader;
use crate::error::Result;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// An auto-login token bound to one user on one machine
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub user_id: EntityId,
    pub token: String,
    /// Expiry (Unix ms)
    pub expires_at: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    pub duration_days: i64,
    pub auto_login_enabled: bool,
    /// Identifier of the machine the token was issued on
    pub machine_id: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Session")
            .field("envelope", &self.envelope)
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("duration_days", &self.duration_days)
            .field("auto_login_enabled", &self.auto_login_enabled)
            .field("machine_id", &self.machine_id)
            .finish()
    }
}

impl Session {
    /// Issue a session valid for `duration_days` starting at `now`
    #[must_use]
    pub fn issue(
        user_id: EntityId,
        token: impl Into<String>,
        machine_id: impl Into<String>,
        duration_days: i64,
        auto_login_enabled: bool,
        now: i64,
    ) -> Self {
        Self {
            envelope: Envelope::new(),
            user_id,
            token: token.into(),
            expires_at: expiry_from(now, duration_days),
            created_at: now,
            duration_days,
            auto_login_enabled,
            machine_id: machine_id.into(),
        }
    }

    /// Change the lifetime, restarting the expiry clock at `now`
    pub fn set_duration(&mut self, duration_days: i64, now: i64) {
        self.duration_days = duration_days;
        self.expires_at = expiry_from(now, duration_days);
    }

    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

const fn expiry_from(now: i64, duration_days: i64) -> i64 {
    now.saturating_add(duration_days.saturating_mul(MILLIS_PER_DAY))
}

impl SyncEntity for Session {
    const KIND: EntityKind = EntityKind::Session;
    const COLUMNS: &'static [&'static str] = &[
        "user_id",
        "token",
        "expires_at",
        "created_at",
        "duration_days",
        "auto_login_enabled",
        "machine_id",
    ];

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.user_id.as_str()),
            Value::Text(self.token.clone()),
            Value::Integer(self.expires_at),
            Value::Integer(self.created_at),
            Value::Integer(self.duration_days),
            Value::Integer(i64::from(self.auto_login_enabled)),
            Value::Text(self.machine_id.clone()),
        ]
    }

    fn from_columns(envelope: Envelope, reader: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            envelope,
            user_id: reader.id()?,
            token: reader.text()?,
            expires_at: reader.int()?,
            created_at: reader.int()?,
            duration_days: reader.int()?,
            auto_login_enabled: reader.flag()?,
            machine_id: reader.text()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_sets_expiry() {
        let session = Session::issue(EntityId::new(), "tok", "machine", 7, true, 1_000);
        assert_eq!(session.expires_at, 1_000 + 7 * MILLIS_PER_DAY);
        assert!(!session.is_expired(1_000));
        assert!(session.is_expired(session.expires_at));
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = Session::issue(EntityId::new(), "secret-token", "m", 1, false, 0);
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_set_duration_restarts_clock() {
        let mut session = Session::issue(EntityId::new(), "t", "m", 1, false, 0);
        session.set_duration(30, 5_000);
        assert_eq!(session.duration_days, 30);
        assert_eq!(session.expires_at, 5_000 + 30 * MILLIS_PER_DAY);
    }
}
