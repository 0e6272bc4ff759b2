//! Push/pull reconciliation between the local and remote stores

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::identity::{
    detect_identity_conflicts, ConflictResolution, IdentityConflict, IdentityReport,
    UsernameRejection, UsernameResolver,
};
use crate::db::{Store, Visibility};
use crate::error::Result;
use crate::facade::StoreFacade;
use crate::models::{
    validate_username, EntityId, EntityKind, Project, Session, SyncEntity, Task, User,
};
use crate::util::bounded;

/// Proposals a resolver gets before its conflict is abandoned
const MAX_USERNAME_PROPOSALS: usize = 5;

/// Counters for one push or pull pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Rows written to the remote store
    pub sent: usize,
    /// Rows written to the local store
    pub received: usize,
    /// Rows inspected but left as they were
    pub unchanged: usize,
    /// Rows whose processing failed; retried on the next pass
    pub failed: usize,
    /// The remote store looked wiped and every local row was queued again
    pub reset_detected: bool,
    /// The remote store was unreachable and nothing was attempted
    pub skipped: bool,
}

impl SyncReport {
    const fn skipped() -> Self {
        Self {
            sent: 0,
            received: 0,
            unchanged: 0,
            failed: 0,
            reset_detected: false,
            skipped: true,
        }
    }

    pub const fn is_clean(&self) -> bool {
        self.failed == 0 && !self.skipped
    }

    fn record(&mut self, step: RowStep) {
        match step {
            RowStep::Sent => self.sent += 1,
            RowStep::Received => self.received += 1,
            RowStep::Unchanged => self.unchanged += 1,
        }
    }
}

enum RowStep {
    Sent,
    Received,
    Unchanged,
}

/// Converges the two stores independently of individual facade writes.
///
/// Runs are serialized: a timer-triggered pass and a reconnect-triggered pass
/// never interleave.
pub struct ReconciliationService {
    facade: Arc<StoreFacade>,
    resolver: Option<Arc<dyn UsernameResolver>>,
    run_lock: Mutex<()>,
}

impl ReconciliationService {
    pub fn new(facade: Arc<StoreFacade>) -> Self {
        Self {
            facade,
            resolver: None,
            run_lock: Mutex::new(()),
        }
    }

    /// Use `resolver` to pick replacement usernames during identity passes
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn UsernameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub const fn facade(&self) -> &Arc<StoreFacade> {
        &self.facade
    }

    /// Push pending local rows, parents before children.
    pub async fn sync_to_remote(&self, scope: Option<EntityId>) -> Result<SyncReport> {
        let _run = self.run_lock.lock().await;
        self.push(scope).await
    }

    /// Apply newer live remote rows locally, parents before children.
    pub async fn sync_from_remote(&self, scope: Option<EntityId>) -> Result<SyncReport> {
        let _run = self.run_lock.lock().await;
        self.pull(scope).await
    }

    /// Push then pull as one serialized run
    pub async fn reconcile(&self, scope: Option<EntityId>) -> Result<(SyncReport, SyncReport)> {
        let _run = self.run_lock.lock().await;
        let pushed = self.push(scope).await?;
        let pulled = self.pull(scope).await?;
        Ok((pushed, pulled))
    }

    async fn push(&self, scope: Option<EntityId>) -> Result<SyncReport> {
        let Some(remote) = self.facade.reachable_remote().await else {
            tracing::debug!("Skipping push: remote store unreachable");
            return Ok(SyncReport::skipped());
        };

        let mut report = SyncReport {
            reset_detected: self.requeue_if_remote_reset(&remote).await?,
            ..SyncReport::default()
        };

        for kind in EntityKind::SYNC_ORDER {
            match kind {
                EntityKind::User => self.push_kind::<User>(&remote, scope, &mut report).await?,
                EntityKind::Project => {
                    self.push_kind::<Project>(&remote, scope, &mut report).await?;
                }
                EntityKind::Task => self.push_kind::<Task>(&remote, scope, &mut report).await?,
                EntityKind::Session => {
                    self.push_kind::<Session>(&remote, scope, &mut report).await?;
                }
            }
        }

        tracing::info!(
            "Push finished: {} sent, {} taken from remote, {} failed",
            report.sent,
            report.received,
            report.failed
        );
        Ok(report)
    }

    /// An empty remote next to synced local rows means the remote was wiped
    /// or replaced; clear every local sync flag so everything is resent.
    async fn requeue_if_remote_reset(&self, remote: &Store) -> Result<bool> {
        let timeout = self.facade.remote_timeout();
        let mut remote_live = 0;
        for kind in EntityKind::SYNC_ORDER {
            match bounded(timeout, remote.count_live(kind)).await {
                Ok(count) => remote_live += count,
                Err(error) => {
                    tracing::warn!("Could not count remote {kind} rows, skipping reset check: {error}");
                    return Ok(false);
                }
            }
        }
        if remote_live > 0 {
            return Ok(false);
        }

        let local = self.facade.local();
        let mut local_synced = 0;
        for kind in EntityKind::SYNC_ORDER {
            local_synced += local.count_synced(kind).await?;
        }
        if local_synced == 0 {
            return Ok(false);
        }

        let requeued = local.clear_synced().await?;
        tracing::warn!("Remote store is empty; re-queued {requeued} local rows for a full resend");
        Ok(true)
    }

    async fn push_kind<E: SyncEntity>(
        &self,
        remote: &Store,
        scope: Option<EntityId>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let pending = self.facade.local().fetch_unsynced::<E>(scope).await?;
        if !pending.is_empty() {
            tracing::debug!("Pushing {} pending {} rows", pending.len(), E::KIND);
        }

        for entity in pending {
            let _gate = self.facade.write_gate().await;
            match self.push_row(remote, &entity).await {
                Ok(step) => report.record(step),
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!("Failed to push {} {}: {error}", E::KIND, entity.id());
                }
            }
        }
        Ok(())
    }

    /// Push the current local version of a pending row. Callers hold the
    /// facade write gate, so `pending` may be older than what is stored.
    async fn push_row<E: SyncEntity>(&self, remote: &Store, pending: &E) -> Result<RowStep> {
        let local = self.facade.local();
        let timeout = self.facade.remote_timeout();

        let Some(entity) = local.fetch::<E>(pending.id(), Visibility::All).await? else {
            return Ok(RowStep::Unchanged);
        };
        if entity.envelope().is_synced {
            return Ok(RowStep::Unchanged);
        }

        let existing = bounded(timeout, remote.fetch::<E>(entity.id(), Visibility::All)).await?;
        match existing {
            None => {
                bounded(timeout, remote.insert(&entity.transfer_copy())).await?;
            }
            Some(remote_row) if entity.envelope().is_older_than(remote_row.envelope()) => {
                tracing::debug!("Remote {} {} is newer; keeping remote version", E::KIND, entity.id());
                local.overwrite(&remote_row.transfer_copy()).await?;
                return Ok(RowStep::Received);
            }
            Some(_) => {
                bounded(timeout, remote.overwrite(&entity.transfer_copy())).await?;
            }
        }

        if !local.mark_synced(&entity).await? {
            tracing::debug!("{} {} changed during push; left pending", E::KIND, entity.id());
            return Ok(RowStep::Unchanged);
        }
        tracing::debug!("Pushed {} {}", E::KIND, entity.id());
        Ok(RowStep::Sent)
    }

    async fn pull(&self, scope: Option<EntityId>) -> Result<SyncReport> {
        let Some(remote) = self.facade.reachable_remote().await else {
            tracing::debug!("Skipping pull: remote store unreachable");
            return Ok(SyncReport::skipped());
        };

        let mut report = SyncReport::default();
        for kind in EntityKind::SYNC_ORDER {
            match kind {
                EntityKind::User => self.pull_kind::<User>(&remote, scope, &mut report).await,
                EntityKind::Project => self.pull_kind::<Project>(&remote, scope, &mut report).await,
                EntityKind::Task => self.pull_kind::<Task>(&remote, scope, &mut report).await,
                EntityKind::Session => self.pull_kind::<Session>(&remote, scope, &mut report).await,
            }
        }

        tracing::info!(
            "Pull finished: {} received, {} unchanged, {} failed",
            report.received,
            report.unchanged,
            report.failed
        );
        Ok(report)
    }

    async fn pull_kind<E: SyncEntity>(
        &self,
        remote: &Store,
        scope: Option<EntityId>,
        report: &mut SyncReport,
    ) {
        let rows = match bounded(self.facade.remote_timeout(), remote.fetch_live::<E>(scope)).await {
            Ok(rows) => rows,
            Err(error) => {
                report.failed += 1;
                tracing::warn!("Failed to read remote {} rows: {error}", E::KIND);
                return;
            }
        };

        for remote_row in rows {
            let _gate = self.facade.write_gate().await;
            match self.pull_row(&remote_row).await {
                Ok(step) => report.record(step),
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!("Failed to pull {} {}: {error}", E::KIND, remote_row.id());
                }
            }
        }
    }

    async fn pull_row<E: SyncEntity>(&self, remote_row: &E) -> Result<RowStep> {
        let local = self.facade.local();
        match local.fetch::<E>(remote_row.id(), Visibility::All).await? {
            None => {
                local.insert(&remote_row.transfer_copy()).await?;
                Ok(RowStep::Received)
            }
            Some(existing) if existing.envelope().is_older_than(remote_row.envelope()) => {
                local.overwrite(&remote_row.transfer_copy()).await?;
                Ok(RowStep::Received)
            }
            Some(_) => Ok(RowStep::Unchanged),
        }
    }

    /// Settle users that would collide with remote users before they are pushed.
    pub async fn handle_identity_conflicts(&self) -> Result<IdentityReport> {
        let _run = self.run_lock.lock().await;
        let local = self.facade.local();

        let pending: Vec<User> = local
            .fetch_unsynced::<User>(None)
            .await?
            .into_iter()
            .filter(|user| !user.envelope.is_deleted)
            .collect();
        if pending.is_empty() {
            return Ok(IdentityReport {
                remote_checked: false,
                resolutions: Vec::new(),
            });
        }

        let Some(remote) = self.facade.reachable_remote().await else {
            return Ok(IdentityReport::default());
        };
        let remote_users =
            match bounded(self.facade.remote_timeout(), remote.fetch_live::<User>(None)).await {
                Ok(users) => users,
                Err(error) => {
                    tracing::warn!("Could not read remote users for conflict check: {error}");
                    return Ok(IdentityReport::default());
                }
            };

        let mut report = IdentityReport {
            remote_checked: true,
            resolutions: Vec::new(),
        };
        if remote_users.is_empty() {
            return Ok(report);
        }

        for conflict in detect_identity_conflicts(&pending, &remote_users) {
            let resolution = match conflict {
                IdentityConflict::Id { local: user, .. } => {
                    let new_id = EntityId::new();
                    tracing::warn!(
                        "User id {} is used remotely by another account; re-keying to {new_id}",
                        user.id()
                    );
                    {
                        let _gate = self.facade.write_gate().await;
                        local.rekey_user(user.id(), new_id).await?;
                    }
                    ConflictResolution::Rekeyed {
                        old_id: user.id(),
                        new_id,
                        username: user.username,
                    }
                }
                IdentityConflict::Username {
                    local: user,
                    remote: taken_by,
                } => self.rename_local_user(&remote, user, &taken_by).await?,
            };
            report.resolutions.push(resolution);
        }

        Ok(report)
    }

    async fn rename_local_user(
        &self,
        remote: &Store,
        mut user: User,
        taken_by: &User,
    ) -> Result<ConflictResolution> {
        let abandoned = ConflictResolution::Abandoned {
            user_id: user.id(),
            username: user.username.clone(),
        };
        let Some(resolver) = self.resolver.as_ref() else {
            tracing::warn!(
                "Username '{}' is taken remotely and no resolver is configured",
                user.username
            );
            return Ok(abandoned);
        };

        let mut rejection = None;
        for _ in 0..MAX_USERNAME_PROPOSALS {
            let Some(proposal) = resolver
                .propose_username(&user, taken_by, rejection.as_ref())
                .await
            else {
                return Ok(abandoned);
            };

            match self.vet_username(remote, &user, &proposal).await? {
                Ok(accepted) => {
                    let _gate = self.facade.write_gate().await;
                    let local = self.facade.local();
                    if let Some(current) = local.fetch::<User>(user.id(), Visibility::All).await? {
                        user = current;
                    }
                    let from = std::mem::replace(&mut user.username, accepted.clone());
                    user.envelope.stamp();
                    local.overwrite(&user).await?;
                    tracing::info!("Renamed local account '{from}' to '{accepted}'");
                    return Ok(ConflictResolution::Renamed {
                        user_id: user.id(),
                        from,
                        to: accepted,
                    });
                }
                Err(reason) => rejection = Some(reason),
            }
        }

        tracing::warn!("Gave up renaming '{}' after {MAX_USERNAME_PROPOSALS} proposals", user.username);
        Ok(abandoned)
    }

    /// Check a proposal against both stores. The outer `Result` is a local
    /// store failure; the inner one is the verdict.
    async fn vet_username(
        &self,
        remote: &Store,
        user: &User,
        proposal: &str,
    ) -> Result<std::result::Result<String, UsernameRejection>> {
        let proposal = proposal.trim();
        if proposal.is_empty() {
            return Ok(Err(UsernameRejection::Empty));
        }
        let proposal = match validate_username(proposal) {
            Ok(valid) => valid,
            Err(error) => return Ok(Err(UsernameRejection::Invalid(error.to_string()))),
        };

        let taken_remotely = bounded(
            self.facade.remote_timeout(),
            remote.find_user_by_username(&proposal),
        )
        .await;
        match taken_remotely {
            Ok(Some(_)) => return Ok(Err(UsernameRejection::TakenRemotely)),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!("Could not check '{proposal}' against the remote store: {error}");
                return Ok(Err(UsernameRejection::Unverified));
            }
        }

        let taken_locally = self.facade.local().find_user_by_username(&proposal).await?;
        if taken_locally.is_some_and(|other| other.id() != user.id()) {
            return Ok(Err(UsernameRejection::TakenLocally));
        }

        Ok(Ok(proposal))
    }

    /// Run a full push/pull in the background.
    ///
    /// The identity pass may prompt, so callers run it in the foreground
    /// before spawning this.
    pub fn spawn_startup(self: &Arc<Self>, scope: Option<EntityId>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = service.reconcile(scope).await {
                tracing::warn!("Startup sync failed: {error}");
            }
        })
    }

    /// Push pending rows every time the remote store becomes reachable again.
    pub fn spawn_on_reconnect(self: &Arc<Self>, scope: Option<EntityId>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut transitions = self.facade.monitor().subscribe();
        tokio::spawn(async move {
            loop {
                match transitions.recv().await {
                    Ok(true) => {
                        tracing::info!("Remote store reachable; pushing pending changes");
                        if let Err(error) = service.sync_to_remote(scope).await {
                            tracing::warn!("Reconnect sync failed: {error}");
                        }
                    }
                    Ok(false) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!("Missed {missed} availability transitions");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl std::fmt::Debug for ReconciliationService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReconciliationService")
            .field("facade", &self.facade)
            .field("has_resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::facade::RemoteOutcome;
    use crate::test_support::Harness;

    /// Replays canned answers and records every rejection it was shown.
    struct ScriptedResolver {
        answers: StdMutex<Vec<Option<String>>>,
        rejections: StdMutex<Vec<UsernameRejection>>,
    }

    impl ScriptedResolver {
        fn new(answers: &[Option<&str>]) -> Arc<Self> {
            let mut answers: Vec<Option<String>> = answers
                .iter()
                .map(|answer| answer.map(str::to_string))
                .collect();
            answers.reverse();
            Arc::new(Self {
                answers: StdMutex::new(answers),
                rejections: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl UsernameResolver for ScriptedResolver {
        async fn propose_username(
            &self,
            _local: &User,
            _taken_by: &User,
            rejection: Option<&UsernameRejection>,
        ) -> Option<String> {
            if let Some(rejection) = rejection {
                self.rejections.lock().unwrap().push(rejection.clone());
            }
            self.answers.lock().unwrap().pop().flatten()
        }
    }

    /// Edits the conflicting user through the facade while it is being asked.
    struct EditingResolver {
        facade: Arc<StoreFacade>,
        answer: String,
    }

    #[async_trait]
    impl UsernameResolver for EditingResolver {
        async fn propose_username(
            &self,
            local: &User,
            _taken_by: &User,
            _rejection: Option<&UsernameRejection>,
        ) -> Option<String> {
            let mut edited = local.clone();
            edited.failed_login_attempts = 3;
            self.facade.update(&mut edited).await.unwrap();
            Some(self.answer.clone())
        }
    }

    fn service(harness: &Harness) -> ReconciliationService {
        ReconciliationService::new(Arc::clone(&harness.facade))
    }

    async fn offline_user(harness: &Harness, name: &str) -> User {
        harness.go_offline();
        let mut user = User::new(name, "hash").unwrap();
        harness.facade.add(&mut user).await.unwrap();
        harness.go_online();
        user
    }

    async fn remote_row<E: SyncEntity>(harness: &Harness, id: EntityId) -> Option<E> {
        harness.remote.fetch(id, Visibility::All).await.unwrap()
    }

    async fn local_row<E: SyncEntity>(harness: &Harness, id: EntityId) -> E {
        harness
            .local
            .fetch(id, Visibility::All)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_task_reaches_remote_after_reconnect() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let alice = offline_user(&harness, "alice").await;

        harness.go_offline();
        let mut task = Task::new(alice.id(), "T1").unwrap();
        assert_eq!(harness.facade.add(&mut task).await.unwrap(), RemoteOutcome::Skipped);
        assert!(!local_row::<Task>(&harness, task.id()).await.envelope.is_synced);

        harness.go_online();
        let report = sync.sync_to_remote(None).await.unwrap();
        assert_eq!(report.sent, 2);
        assert!(report.is_clean());

        let pushed: Task = remote_row(&harness, task.id()).await.unwrap();
        assert_eq!(pushed.title, "T1");
        assert_eq!(pushed.user_id, alice.id());
        assert!(local_row::<Task>(&harness, task.id()).await.envelope.is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_is_idempotent() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        offline_user(&harness, "alice").await;

        let first = sync.sync_to_remote(None).await.unwrap();
        assert_eq!(first.sent, 1);
        let second = sync.sync_to_remote(None).await.unwrap();
        assert_eq!(second, SyncReport::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pushed_fields_match_local() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let alice = offline_user(&harness, "alice").await;

        harness.go_offline();
        let mut project = Project::new(alice.id(), "Garden", "beds and paths").unwrap();
        harness.facade.add(&mut project).await.unwrap();
        project.description = "raised beds".into();
        harness.facade.update(&mut project).await.unwrap();
        harness.go_online();

        sync.sync_to_remote(None).await.unwrap();
        let local: Project = local_row(&harness, project.id()).await;
        let remote: Project = remote_row(&harness, project.id()).await.unwrap();
        assert_eq!(remote, local);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_lets_newer_remote_row_win() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let mut alice = User::new("alice", "hash").unwrap();
        harness.facade.add(&mut alice).await.unwrap();

        // Local edit at t1, remote edit at t2 > t1
        harness.go_offline();
        alice.failed_login_attempts = 1;
        harness.facade.update(&mut alice).await.unwrap();
        harness.go_online();

        let mut theirs: User = remote_row(&harness, alice.id()).await.unwrap();
        theirs.failed_login_attempts = 4;
        theirs.envelope.last_modified = alice.envelope.last_modified + 1_000;
        harness.remote.overwrite(&theirs).await.unwrap();

        let report = sync.sync_to_remote(None).await.unwrap();
        assert_eq!(report.received, 1);
        assert_eq!(report.sent, 0);

        let local: User = local_row(&harness, alice.id()).await;
        assert_eq!(local.failed_login_attempts, 4);
        assert_eq!(local.envelope.last_modified, theirs.envelope.last_modified);
        assert!(local.envelope.is_synced);
        let remote: User = remote_row(&harness, alice.id()).await.unwrap();
        assert_eq!(remote.failed_login_attempts, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_sends_edit_made_after_pending_rows_were_read() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let mut alice = offline_user(&harness, "alice").await;
        let stale = harness.local.fetch_unsynced::<User>(None).await.unwrap().remove(0);

        harness.go_offline();
        alice.failed_login_attempts = 4;
        harness.facade.update(&mut alice).await.unwrap();
        harness.go_online();

        let step = {
            let _gate = harness.facade.write_gate().await;
            sync.push_row(&harness.remote, &stale).await.unwrap()
        };
        assert!(matches!(step, RowStep::Sent));

        let local: User = local_row(&harness, alice.id()).await;
        assert_eq!(local.failed_login_attempts, 4);
        assert!(local.envelope.is_synced);
        let remote: User = remote_row(&harness, alice.id()).await.unwrap();
        assert_eq!(remote.failed_login_attempts, 4);
        assert_eq!(remote.envelope.sync_version, local.envelope.sync_version);

        let next = sync.sync_to_remote(None).await.unwrap();
        assert_eq!(next.sent, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_compares_remote_against_current_local_version() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let mut alice = User::new("alice", "hash").unwrap();
        harness.facade.add(&mut alice).await.unwrap();

        harness.go_offline();
        alice.failed_login_attempts = 1;
        harness.facade.update(&mut alice).await.unwrap();
        let stale = harness.local.fetch_unsynced::<User>(None).await.unwrap().remove(0);

        // Remote is newer than what was read, older than the latest local edit
        let mut theirs: User = remote_row(&harness, alice.id()).await.unwrap();
        theirs.failed_login_attempts = 9;
        theirs.envelope.last_modified = stale.envelope.last_modified + 1_000;
        harness.remote.overwrite(&theirs).await.unwrap();

        alice.failed_login_attempts = 2;
        alice.envelope.last_modified = stale.envelope.last_modified + 5_000;
        harness.facade.update(&mut alice).await.unwrap();
        harness.go_online();

        let step = {
            let _gate = harness.facade.write_gate().await;
            sync.push_row(&harness.remote, &stale).await.unwrap()
        };
        assert!(matches!(step, RowStep::Sent));
        assert_eq!(local_row::<User>(&harness, alice.id()).await.failed_login_attempts, 2);
        let remote: User = remote_row(&harness, alice.id()).await.unwrap();
        assert_eq!(remote.failed_login_attempts, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_runs_do_not_double_push() {
        let harness = Harness::new().await;
        let sync = Arc::new(service(&harness));
        let alice = offline_user(&harness, "alice").await;
        offline_user(&harness, "bob").await;
        harness.go_offline();
        let mut task = Task::new(alice.id(), "T1").unwrap();
        harness.facade.add(&mut task).await.unwrap();
        harness.go_online();

        let push = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.sync_to_remote(None).await }
        });
        let full = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.reconcile(None).await }
        });
        let pushed = push.await.unwrap().unwrap();
        let (pushed_again, pulled) = full.await.unwrap().unwrap();

        assert_eq!(pushed.failed + pushed_again.failed + pulled.failed, 0);
        assert_eq!(pushed.sent + pushed_again.sent, 3);
        assert_eq!(harness.remote.count_live(EntityKind::User).await.unwrap(), 2);
        assert_eq!(harness.remote.count_live(EntityKind::Task).await.unwrap(), 1);
        assert_eq!(harness.local.count_unsynced(EntityKind::User).await.unwrap(), 0);
        assert_eq!(harness.local.count_unsynced(EntityKind::Task).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_overwrites_when_timestamps_tie() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let mut alice = User::new("alice", "hash").unwrap();
        harness.facade.add(&mut alice).await.unwrap();

        harness.go_offline();
        alice.failed_login_attempts = 2;
        harness.facade.update(&mut alice).await.unwrap();
        harness.go_online();

        let mut theirs: User = remote_row(&harness, alice.id()).await.unwrap();
        theirs.failed_login_attempts = 9;
        theirs.envelope.last_modified = alice.envelope.last_modified;
        harness.remote.overwrite(&theirs).await.unwrap();

        sync.sync_to_remote(None).await.unwrap();
        let remote: User = remote_row(&harness, alice.id()).await.unwrap();
        assert_eq!(remote.failed_login_attempts, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tombstone_propagates() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let mut alice = User::new("alice", "hash").unwrap();
        harness.facade.add(&mut alice).await.unwrap();
        let mut task = Task::new(alice.id(), "obsolete").unwrap();
        harness.facade.add(&mut task).await.unwrap();

        harness.go_offline();
        harness.facade.delete::<Task>(task.id()).await.unwrap();
        harness.go_online();

        sync.sync_to_remote(None).await.unwrap();
        let remote: Task = remote_row(&harness, task.id()).await.unwrap();
        assert!(remote.envelope.is_deleted);
        assert!(harness.remote.fetch_live::<Task>(None).await.unwrap().is_empty());
        assert!(harness.local.fetch_live::<Task>(None).await.unwrap().is_empty());
        assert!(harness
            .facade
            .get_all::<Task>(Some(alice.id()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_remote_triggers_full_resend() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let mut alice = User::new("alice", "hash").unwrap();
        harness.facade.add(&mut alice).await.unwrap();
        let mut task = Task::new(alice.id(), "keep me").unwrap();
        harness.facade.add(&mut task).await.unwrap();
        assert_eq!(harness.local.count_unsynced(EntityKind::Task).await.unwrap(), 0);

        // Simulate a wiped server
        {
            let conn = harness.remote.lock().await;
            conn.execute("DELETE FROM tasks", ()).await.unwrap();
            conn.execute("DELETE FROM users", ()).await.unwrap();
        }

        let report = sync.sync_to_remote(None).await.unwrap();
        assert!(report.reset_detected);
        assert_eq!(report.sent, 2);
        assert!(remote_row::<Task>(&harness, task.id()).await.is_some());
        assert!(remote_row::<User>(&harness, alice.id()).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_remote_with_nothing_synced_is_not_a_reset() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        offline_user(&harness, "alice").await;

        let report = sync.sync_to_remote(None).await.unwrap();
        assert!(!report.reset_detected);
        assert_eq!(report.sent, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_remote_skips_passes() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        offline_user(&harness, "alice").await;

        harness.go_offline();
        let (pushed, pulled) = sync.reconcile(None).await.unwrap();
        assert!(pushed.skipped);
        assert!(pulled.skipped);
        assert_eq!(harness.local.count_unsynced(EntityKind::User).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_row_does_not_abort_pass() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let alice = offline_user(&harness, "alice").await;

        // Remote copy of a distinct account already owns the username, so the
        // remote unique index rejects alice while bob still goes through.
        let squatter = User::new("ALICE", "hash").unwrap();
        harness.remote.insert(&squatter.transfer_copy()).await.unwrap();
        let bob = offline_user(&harness, "bob").await;

        let report = sync.sync_to_remote(None).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 1);
        assert!(!local_row::<User>(&harness, alice.id()).await.envelope.is_synced);
        assert!(local_row::<User>(&harness, bob.id()).await.envelope.is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scoped_push_only_touches_one_user() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let alice = offline_user(&harness, "alice").await;
        let bob = offline_user(&harness, "bob").await;

        sync.sync_to_remote(Some(alice.id())).await.unwrap();
        assert!(remote_row::<User>(&harness, alice.id()).await.is_some());
        assert!(remote_row::<User>(&harness, bob.id()).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_inserts_and_applies_newer_rows() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let mut alice = User::new("alice", "hash").unwrap();
        harness.facade.add(&mut alice).await.unwrap();

        // Created by another machine straight on the server
        let mut remote_task = Task::new(alice.id(), "from laptop").unwrap();
        remote_task.envelope.stamp();
        harness.remote.insert(&remote_task.transfer_copy()).await.unwrap();

        let mut newer: User = remote_row(&harness, alice.id()).await.unwrap();
        newer.failed_login_attempts = 2;
        newer.envelope.last_modified += 5_000;
        harness.remote.overwrite(&newer).await.unwrap();

        let report = sync.sync_from_remote(None).await.unwrap();
        assert_eq!(report.received, 2);
        assert_eq!(report.failed, 0);

        let pulled: Task = local_row(&harness, remote_task.id()).await;
        assert!(pulled.envelope.is_synced);
        assert_eq!(pulled.title, "from laptop");
        assert_eq!(local_row::<User>(&harness, alice.id()).await.failed_login_attempts, 2);

        let again = sync.sync_from_remote(None).await.unwrap();
        assert_eq!(again.received, 0);
        assert_eq!(again.unchanged, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_keeps_newer_local_edit() {
        let harness = Harness::new().await;
        let sync = service(&harness);
        let mut alice = User::new("alice", "hash").unwrap();
        harness.facade.add(&mut alice).await.unwrap();

        harness.go_offline();
        alice.envelope.last_modified += 5_000;
        alice.failed_login_attempts = 3;
        harness.facade.update(&mut alice).await.unwrap();
        harness.go_online();

        let report = sync.sync_from_remote(None).await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(local_row::<User>(&harness, alice.id()).await.failed_login_attempts, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_username_conflict_renames_local_user() {
        let harness = Harness::new().await;
        let server_alice = User::new("Alice", "hash").unwrap();
        harness.remote.insert(&server_alice.transfer_copy()).await.unwrap();
        let carol = User::new("carol", "hash").unwrap();
        harness.remote.insert(&carol.transfer_copy()).await.unwrap();
        let local_alice = offline_user(&harness, "alice").await;

        let resolver = ScriptedResolver::new(&[Some("  "), Some("CAROL"), Some(" alice2 ")]);
        let sync = service(&harness).with_resolver(resolver.clone());

        let report = sync.handle_identity_conflicts().await.unwrap();
        assert!(report.remote_checked);
        assert_eq!(
            report.resolutions,
            vec![ConflictResolution::Renamed {
                user_id: local_alice.id(),
                from: "alice".into(),
                to: "alice2".into(),
            }]
        );
        assert_eq!(
            *resolver.rejections.lock().unwrap(),
            vec![UsernameRejection::Empty, UsernameRejection::TakenRemotely]
        );

        let renamed: User = local_row(&harness, local_alice.id()).await;
        assert_eq!(renamed.username, "alice2");
        assert!(!renamed.envelope.is_synced);

        let push = sync.sync_to_remote(None).await.unwrap();
        assert_eq!(push.failed, 0);
        let pushed: User = remote_row(&harness, local_alice.id()).await.unwrap();
        assert_eq!(pushed.username, "alice2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rename_keeps_edit_made_while_prompting() {
        let harness = Harness::new().await;
        let server_alice = User::new("alice", "hash").unwrap();
        harness.remote.insert(&server_alice.transfer_copy()).await.unwrap();
        let local_alice = offline_user(&harness, "alice").await;

        let resolver = Arc::new(EditingResolver {
            facade: Arc::clone(&harness.facade),
            answer: "alice2".into(),
        });
        let sync = service(&harness).with_resolver(resolver);
        sync.handle_identity_conflicts().await.unwrap();

        let renamed: User = local_row(&harness, local_alice.id()).await;
        assert_eq!(renamed.username, "alice2");
        assert_eq!(renamed.failed_login_attempts, 3);
        assert!(!renamed.envelope.is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_username_proposal_taken_locally_is_rejected() {
        let harness = Harness::new().await;
        let server_alice = User::new("alice", "hash").unwrap();
        harness.remote.insert(&server_alice.transfer_copy()).await.unwrap();
        let local_alice = offline_user(&harness, "alice").await;
        offline_user(&harness, "dave").await;

        let resolver = ScriptedResolver::new(&[Some("Dave"), Some("alicia")]);
        let sync = service(&harness).with_resolver(resolver.clone());
        sync.handle_identity_conflicts().await.unwrap();

        assert_eq!(
            *resolver.rejections.lock().unwrap(),
            vec![UsernameRejection::TakenLocally]
        );
        assert_eq!(local_row::<User>(&harness, local_alice.id()).await.username, "alicia");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_username_conflict_without_answer_is_abandoned() {
        let harness = Harness::new().await;
        let server_alice = User::new("alice", "hash").unwrap();
        harness.remote.insert(&server_alice.transfer_copy()).await.unwrap();
        let local_alice = offline_user(&harness, "alice").await;

        let sync = service(&harness).with_resolver(ScriptedResolver::new(&[None]));
        let report = sync.handle_identity_conflicts().await.unwrap();
        assert!(!report.is_clear());
        assert_eq!(local_row::<User>(&harness, local_alice.id()).await.username, "alice");

        let unresolved = service(&harness).handle_identity_conflicts().await.unwrap();
        assert!(!unresolved.is_clear());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_id_conflict_rekeys_local_user() {
        let harness = Harness::new().await;
        let local_alice = offline_user(&harness, "alice").await;
        let mut impostor = local_alice.clone();
        impostor.username = "mallory".into();
        harness.remote.insert(&impostor.transfer_copy()).await.unwrap();

        harness.go_offline();
        let mut task = Task::new(local_alice.id(), "mine").unwrap();
        harness.facade.add(&mut task).await.unwrap();
        harness.go_online();

        let sync = service(&harness);
        let report = sync.handle_identity_conflicts().await.unwrap();
        let ConflictResolution::Rekeyed { new_id, old_id, .. } = report.resolutions[0].clone() else {
            panic!("expected a re-key, got {:?}", report.resolutions);
        };
        assert_eq!(old_id, local_alice.id());

        let moved: User = local_row(&harness, new_id).await;
        assert_eq!(moved.username, "alice");
        assert_eq!(local_row::<Task>(&harness, task.id()).await.user_id, new_id);

        let push = sync.sync_to_remote(None).await.unwrap();
        assert_eq!(push.failed, 0);
        let remote_impostor: User = remote_row(&harness, old_id).await.unwrap();
        assert_eq!(remote_impostor.username, "mallory");
        assert!(remote_row::<User>(&harness, new_id).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_identity_pass_ignores_synced_users() {
        let harness = Harness::new().await;
        let mut alice = User::new("alice", "hash").unwrap();
        harness.facade.add(&mut alice).await.unwrap();

        let report = service(&harness).handle_identity_conflicts().await.unwrap();
        assert!(!report.remote_checked);
        assert!(report.resolutions.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_startup_run_never_asks_for_usernames() {
        let harness = Harness::new().await;
        let server_alice = User::new("alice", "hash").unwrap();
        harness.remote.insert(&server_alice.transfer_copy()).await.unwrap();
        let local_alice = offline_user(&harness, "alice").await;

        let resolver = ScriptedResolver::new(&[Some("alice2")]);
        let sync = Arc::new(service(&harness).with_resolver(resolver.clone()));
        sync.spawn_startup(None).await.unwrap();

        assert_eq!(resolver.answers.lock().unwrap().len(), 1);
        let untouched: User = local_row(&harness, local_alice.id()).await;
        assert_eq!(untouched.username, "alice");
        assert!(!untouched.envelope.is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconnect_triggers_push() {
        let harness = Harness::new().await;
        let sync = Arc::new(service(&harness));
        let alice = offline_user(&harness, "alice").await;
        harness.go_offline();
        harness.facade.monitor().refresh().await;

        let listener = sync.spawn_on_reconnect(None);
        harness.go_online();
        harness.facade.monitor().refresh().await;

        let mut pushed = false;
        for _ in 0..50 {
            if remote_row::<User>(&harness, alice.id()).await.is_some() {
                pushed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        listener.abort();
        assert!(pushed);
    }
}
