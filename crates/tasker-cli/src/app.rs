//! Per-invocation wiring: stores, monitor, facade and services.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tasker_core::cipher::PlaintextCipher;
use tasker_core::config::AppConfig;
use tasker_core::db::{RemoteConfig, Store};
use tasker_core::machine::SystemMachineId;
use tasker_core::monitor::Unconfigured;
use tasker_core::services::TaskerService;
use tasker_core::session::SessionService;
use tasker_core::util::bounded;
use tasker_core::{
    AvailabilityMonitor, EntityId, MonitorHandle, ReconciliationService, RemoteProbe, Session,
    StoreFacade, User,
};
use tokio::task::JoinHandle;

use crate::error::CliError;
use crate::prompt::TerminalResolver;

pub struct App {
    pub config: AppConfig,
    pub facade: Arc<StoreFacade>,
    pub tasker: TaskerService,
    pub sessions: SessionService,
    pub sync: Arc<ReconciliationService>,
    session: Option<Session>,
    monitor: Option<MonitorHandle>,
    startup: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl App {
    /// Open the local store and, when configured, the remote one.
    ///
    /// A remote store that cannot be reached right now is not an error: the
    /// run proceeds local-only and pending rows are pushed on a later run.
    pub async fn open(db_path: &Path, config: AppConfig) -> Result<Self, CliError> {
        let timings = config.timings();
        let local = Store::open_local(db_path).await?;
        let remote = match config.remote() {
            Some(remote_config) => connect_remote(&remote_config, timings.remote_timeout).await,
            None => None,
        };

        let probe: Arc<dyn RemoteProbe> = match &remote {
            Some(store) => Arc::new(store.clone()),
            None => Arc::new(Unconfigured),
        };
        let monitor = Arc::new(AvailabilityMonitor::new(
            probe,
            timings.probe_interval,
            timings.remote_timeout,
        ));
        let monitor_handle = remote.is_some().then(|| monitor.start());
        let facade = Arc::new(StoreFacade::new(
            local,
            remote,
            Arc::clone(&monitor),
            timings.remote_timeout,
        ));

        let tasker = TaskerService::new(Arc::clone(&facade), Arc::new(PlaintextCipher));
        let sessions = SessionService::new(Arc::clone(&facade), Arc::new(SystemMachineId));
        let sync = Arc::new(
            ReconciliationService::new(Arc::clone(&facade))
                .with_resolver(Arc::new(TerminalResolver)),
        );

        let mut app = Self {
            config,
            facade,
            tasker,
            sessions,
            sync,
            session: None,
            monitor: monitor_handle,
            startup: None,
            reconnect: None,
        };
        app.session = app.resume_session().await?;
        Ok(app)
    }

    /// Settle identity conflicts, then start the startup reconcile and
    /// reconnect pushes in the background.
    ///
    /// The identity pass may prompt on the terminal, so it finishes before
    /// the command reads any input of its own.
    pub async fn start_background_sync(&mut self) {
        if !self.facade.has_remote() {
            return;
        }
        if let Err(error) = self.sync.handle_identity_conflicts().await {
            tracing::warn!("Identity conflict check failed: {error}");
            return;
        }
        let scope = self.scope();
        self.startup = Some(self.sync.spawn_startup(scope));
        self.reconnect = Some(self.sync.spawn_on_reconnect(scope));
    }

    /// Id of the logged-in user, used to scope replication
    pub fn scope(&self) -> Option<EntityId> {
        self.session.as_ref().map(|session| session.user_id)
    }

    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub async fn current_user(&self) -> Result<User, CliError> {
        let session = self.session.as_ref().ok_or(CliError::NotLoggedIn)?;
        self.facade
            .get::<User>(session.user_id)
            .await?
            .ok_or(CliError::NotLoggedIn)
    }

    /// Wait for the startup sync, then stop the background tasks.
    pub async fn close(mut self) {
        if let Some(startup) = self.startup.take() {
            if let Err(error) = startup.await {
                tracing::warn!("Startup sync task failed: {error}");
            }
        }
        if let Some(reconnect) = self.reconnect.take() {
            reconnect.abort();
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
        }
    }

    async fn resume_session(&self) -> Result<Option<Session>, CliError> {
        let Some(token) = self.config.session_token.as_deref() else {
            return Ok(None);
        };
        let Some(session) = self.sessions.validate_session(token).await? else {
            tracing::debug!("Stored session is no longer valid");
            return Ok(None);
        };
        if !session.auto_login_enabled {
            tracing::debug!("Stored session has auto-login disabled");
            return Ok(None);
        }
        Ok(Some(session))
    }
}

async fn connect_remote(config: &RemoteConfig, timeout: Duration) -> Option<Store> {
    match bounded(timeout, Store::open_remote(config)).await {
        Ok(store) => Some(store),
        Err(error) => {
            tracing::warn!("Remote store unavailable, working locally: {error}");
            None
        }
    }
}
