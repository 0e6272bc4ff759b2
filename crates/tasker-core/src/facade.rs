//! Read/write routing over the local and remote stores
//!
//! Writes always commit locally first. The remote half is best effort: it is
//! attempted only after a live probe succeeds, bounded by a timeout, and any
//! failure leaves the local row flagged `is_synced = false` for the
//! reconciliation service to pick up. Reads prefer the remote store and fall
//! back to the local one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::db::{Store, Visibility};
use crate::error::{Error, Result};
use crate::models::{EntityId, Session, SyncEntity, Task, User};
use crate::monitor::AvailabilityMonitor;
use crate::util::bounded;

/// What happened to the remote half of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The remote store accepted the row; the local copy is marked synced
    Committed,
    /// No remote store configured, or it did not answer the probe
    Skipped,
    /// The remote write failed or timed out
    Failed(String),
}

impl RemoteOutcome {
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

#[derive(Debug, Clone, Copy)]
enum RemoteWrite {
    Insert,
    Upsert,
}

#[derive(Debug)]
pub struct StoreFacade {
    local: Store,
    remote: Option<Store>,
    monitor: Arc<AvailabilityMonitor>,
    remote_timeout: Duration,
    // Held for a whole logical write so two writes never interleave their
    // statement sequences on either store.
    write_gate: Mutex<()>,
}

impl StoreFacade {
    pub fn new(
        local: Store,
        remote: Option<Store>,
        monitor: Arc<AvailabilityMonitor>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            monitor,
            remote_timeout,
            write_gate: Mutex::new(()),
        }
    }

    pub const fn local(&self) -> &Store {
        &self.local
    }

    pub const fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn monitor(&self) -> &Arc<AvailabilityMonitor> {
        &self.monitor
    }

    pub const fn remote_timeout(&self) -> Duration {
        self.remote_timeout
    }

    pub(crate) async fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// The remote store, if one is configured and answers a probe right now
    pub async fn reachable_remote(&self) -> Option<Store> {
        let remote = self.remote.as_ref()?;
        if self.monitor.refresh().await {
            Some(remote.clone())
        } else {
            None
        }
    }

    /// Run a read against the remote store; `None` when skipped or failed.
    async fn remote_read<T, F, Fut>(&self, read: F) -> Option<T>
    where
        F: FnOnce(Store) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let remote = self.reachable_remote().await?;
        match bounded(self.remote_timeout, read(remote)).await {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!("Remote read failed, falling back to local store: {error}");
                None
            }
        }
    }

    /// Copy `entity` to the remote store and flag the local row synced on success.
    async fn replicate<E: SyncEntity>(&self, entity: &mut E, mode: RemoteWrite) -> Result<RemoteOutcome> {
        let Some(remote) = self.reachable_remote().await else {
            tracing::debug!("Remote unreachable; {} {} stays pending", E::KIND, entity.id());
            return Ok(RemoteOutcome::Skipped);
        };

        let copy = entity.transfer_copy();
        let write = async {
            match mode {
                RemoteWrite::Insert => remote.insert(&copy).await,
                RemoteWrite::Upsert => remote.upsert(&copy).await,
            }
        };

        match bounded(self.remote_timeout, write).await {
            Ok(()) => {
                if self.local.mark_synced(&*entity).await? {
                    entity.envelope_mut().is_synced = true;
                }
                Ok(RemoteOutcome::Committed)
            }
            Err(error) => {
                tracing::warn!(
                    "Remote write of {} {} failed, left for reconciliation: {error}",
                    E::KIND,
                    entity.id()
                );
                Ok(RemoteOutcome::Failed(error.to_string()))
            }
        }
    }

    /// Get a live entity by id
    pub async fn get<E: SyncEntity>(&self, id: EntityId) -> Result<Option<E>> {
        let remote = self
            .remote_read(|remote| async move { remote.fetch::<E>(id, Visibility::Live).await })
            .await;
        if let Some(Some(entity)) = remote {
            return Ok(Some(entity));
        }
        self.local.fetch(id, Visibility::Live).await
    }

    /// All live entities of one type, optionally restricted to one user's rows
    pub async fn get_all<E: SyncEntity>(&self, scope: Option<EntityId>) -> Result<Vec<E>> {
        let remote = self
            .remote_read(|remote| async move { remote.fetch_live::<E>(scope).await })
            .await;
        match remote {
            Some(entities) => Ok(entities),
            None => self.local.fetch_live(scope).await,
        }
    }

    /// Stamp and store a new entity
    pub async fn add<E: SyncEntity>(&self, entity: &mut E) -> Result<RemoteOutcome> {
        let _gate = self.write_gate().await;
        entity.envelope_mut().stamp();
        self.local.insert(entity).await?;
        self.replicate(entity, RemoteWrite::Insert).await
    }

    /// Stamp and store changes to an existing entity.
    ///
    /// The remote side is an upsert by id, so it works whether or not the
    /// row ever reached the remote store. A row known only to the remote
    /// store (not pulled yet) is adopted locally.
    pub async fn update<E: SyncEntity>(&self, entity: &mut E) -> Result<RemoteOutcome> {
        let _gate = self.write_gate().await;
        entity.envelope_mut().stamp();
        if !self.local.overwrite(entity).await? {
            if self.remote_copy::<E>(entity.id()).await.is_none() {
                return Err(Error::NotFound(format!("{} {}", E::KIND, entity.id())));
            }
            self.local.insert(entity).await?;
        }
        self.replicate(entity, RemoteWrite::Upsert).await
    }

    /// Tombstone an entity; rows are never physically removed.
    pub async fn delete<E: SyncEntity>(&self, id: EntityId) -> Result<RemoteOutcome> {
        let _gate = self.write_gate().await;
        let found = match self.local.fetch::<E>(id, Visibility::Live).await? {
            Some(entity) => Some(entity),
            None => self.remote_copy::<E>(id).await,
        };
        let mut entity = found.ok_or_else(|| Error::NotFound(format!("{} {id}", E::KIND)))?;

        let envelope = entity.envelope_mut();
        envelope.is_deleted = true;
        envelope.stamp();
        self.local.upsert(&entity).await?;
        self.replicate(&mut entity, RemoteWrite::Upsert).await
    }

    /// Live remote copy of a row, when the remote store answers
    async fn remote_copy<E: SyncEntity>(&self, id: EntityId) -> Option<E> {
        self.remote_read(|remote| async move { remote.fetch::<E>(id, Visibility::Live).await })
            .await
            .flatten()
    }

    /// Local rows still waiting for the remote store, tombstones included
    pub async fn get_unsynced<E: SyncEntity>(&self) -> Result<Vec<E>> {
        self.local.fetch_unsynced(None).await
    }

    /// Case-insensitive username lookup
    pub async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let name = username.to_string();
        let remote = self
            .remote_read(|remote| async move { remote.find_user_by_username(&name).await })
            .await;
        if let Some(Some(user)) = remote {
            return Ok(Some(user));
        }
        self.local.find_user_by_username(username).await
    }

    /// True when either store has a live user with this name
    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let name = username.to_string();
        let remote = self
            .remote_read(|remote| async move {
                Ok(remote.find_user_by_username(&name).await?.is_some())
            })
            .await;
        if remote == Some(true) {
            return Ok(true);
        }
        Ok(self.local.find_user_by_username(username).await?.is_some())
    }

    pub async fn project_name_exists(&self, name: &str, owner_id: EntityId) -> Result<bool> {
        let owned = name.to_string();
        let remote = self
            .remote_read(|remote| async move { remote.project_name_exists(&owned, owner_id).await })
            .await;
        if remote == Some(true) {
            return Ok(true);
        }
        self.local.project_name_exists(name, owner_id).await
    }

    pub async fn task_title_exists(
        &self,
        title: &str,
        user_id: EntityId,
        project_id: Option<EntityId>,
    ) -> Result<bool> {
        let owned = title.to_string();
        let remote = self
            .remote_read(|remote| async move {
                remote.task_title_exists(&owned, user_id, project_id).await
            })
            .await;
        if remote == Some(true) {
            return Ok(true);
        }
        self.local.task_title_exists(title, user_id, project_id).await
    }

    pub async fn session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let owned = token.to_string();
        let remote = self
            .remote_read(|remote| async move { remote.session_by_token(&owned).await })
            .await;
        if let Some(Some(session)) = remote {
            return Ok(Some(session));
        }
        self.local.session_by_token(token).await
    }

    pub async fn tasks_for_project(&self, project_id: EntityId) -> Result<Vec<Task>> {
        let remote = self
            .remote_read(|remote| async move { remote.tasks_for_project(project_id).await })
            .await;
        match remote {
            Some(tasks) => Ok(tasks),
            None => self.local.tasks_for_project(project_id).await,
        }
    }
}
