//! Auto-login sessions bound to one machine

use std::sync::Arc;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use rand::RngCore;

use crate::error::{Error, Result};
use crate::facade::StoreFacade;
use crate::machine::MachineIdProvider;
use crate::models::{Session, SyncEntity, User};
use crate::util::now_millis;

const TOKEN_BYTES: usize = 32;

/// Issues, checks and revokes sessions through the store facade.
pub struct SessionService {
    facade: Arc<StoreFacade>,
    machine: Arc<dyn MachineIdProvider>,
}

impl SessionService {
    pub fn new(facade: Arc<StoreFacade>, machine: Arc<dyn MachineIdProvider>) -> Self {
        Self { facade, machine }
    }

    /// Start a session for `user` on this machine
    pub async fn create_session(
        &self,
        user: &User,
        duration_days: i64,
        auto_login_enabled: bool,
    ) -> Result<Session> {
        if duration_days <= 0 {
            return Err(Error::InvalidInput(
                "session duration must be at least one day".into(),
            ));
        }

        let mut session = Session::issue(
            user.id(),
            generate_token(),
            self.machine.machine_id(),
            duration_days,
            auto_login_enabled,
            now_millis(),
        );
        self.facade.add(&mut session).await?;
        tracing::info!("Started session for {}", user.username);
        Ok(session)
    }

    /// The session for `token`, if it is live, unexpired and was issued here.
    ///
    /// A stale session is tombstoned so it cannot be resumed later.
    pub async fn validate_session(&self, token: &str) -> Result<Option<Session>> {
        let Some(session) = self.facade.session_by_token(token).await? else {
            return Ok(None);
        };

        let expired = session.is_expired(now_millis());
        let foreign = session.machine_id != self.machine.machine_id();
        if !expired && !foreign {
            return Ok(Some(session));
        }

        tracing::info!(
            "Discarding session {} ({})",
            session.id(),
            if expired { "expired" } else { "issued on another machine" }
        );
        self.discard(&session).await?;
        Ok(None)
    }

    /// Revoke the session for `token`; unknown tokens are ignored
    pub async fn invalidate_session(&self, token: &str) -> Result<()> {
        if let Some(session) = self.facade.session_by_token(token).await? {
            self.discard(&session).await?;
        }
        Ok(())
    }

    /// Change lifetime or auto-login; a new duration restarts the expiry clock.
    pub async fn update_session_settings(
        &self,
        token: &str,
        duration_days: Option<i64>,
        auto_login_enabled: Option<bool>,
    ) -> Result<Session> {
        let mut session = self
            .facade
            .session_by_token(token)
            .await?
            .ok_or_else(|| Error::NotFound("session".into()))?;

        if let Some(days) = duration_days {
            if days <= 0 {
                return Err(Error::InvalidInput(
                    "session duration must be at least one day".into(),
                ));
            }
            session.set_duration(days, now_millis());
        }
        if let Some(enabled) = auto_login_enabled {
            session.auto_login_enabled = enabled;
        }

        self.facade.update(&mut session).await?;
        Ok(session)
    }

    async fn discard(&self, session: &Session) -> Result<()> {
        match self.facade.delete::<Session>(session.id()).await {
            // Known only remotely; nothing to tombstone here
            Ok(_) | Err(Error::NotFound(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

/// 32 random bytes, base64 encoded
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64_STANDARD.encode(bytes)
}
