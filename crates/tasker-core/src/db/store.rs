//! Entity operations shared by both store roles

use libsql::params::Params;
use libsql::Value;
use uuid::Uuid;

use super::{RowReader, Store};
use crate::error::Result;
use crate::models::{EntityId, EntityKind, Envelope, Session, SyncEntity, Task, User};
use crate::util::now_millis;

const ENVELOPE_COLUMNS: [&str; 5] = ["id", "last_modified", "is_synced", "sync_version", "is_deleted"];

/// Whether a read should see tombstoned rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only rows with `is_deleted = 0`
    Live,
    /// Tombstones included (reconciliation needs them)
    All,
}

impl Visibility {
    const fn filter(self) -> &'static str {
        match self {
            Self::Live => " AND is_deleted = 0",
            Self::All => "",
        }
    }
}

fn select_sql<E: SyncEntity>(condition: &str) -> String {
    let mut columns: Vec<&str> = ENVELOPE_COLUMNS.to_vec();
    columns.extend_from_slice(E::COLUMNS);
    format!(
        "SELECT {} FROM {} WHERE {condition}",
        columns.join(", "),
        E::KIND.table()
    )
}

fn envelope_values(envelope: &Envelope) -> Vec<Value> {
    vec![
        Value::Text(envelope.id.as_str()),
        Value::Integer(envelope.last_modified),
        Value::Integer(i64::from(envelope.is_synced)),
        envelope
            .sync_version
            .clone()
            .map_or(Value::Null, Value::Text),
        Value::Integer(i64::from(envelope.is_deleted)),
    ]
}

/// Append `AND <scope column> = ?` when a user scope is given.
fn scoped(kind: EntityKind, mut condition: String, scope: Option<EntityId>) -> (String, Vec<Value>) {
    let mut values = Vec::new();
    if let Some(user_id) = scope {
        condition = format!("{condition} AND {} = ?", kind.scope_column());
        values.push(Value::Text(user_id.as_str()));
    }
    (condition, values)
}

impl Store {
    async fn query_entities<E: SyncEntity>(&self, sql: &str, values: Vec<Value>) -> Result<Vec<E>> {
        let conn = self.lock().await;
        let mut rows = conn.query(sql, Params::Positional(values)).await?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut reader = RowReader::new(&row);
            let envelope = reader.envelope()?;
            entities.push(E::from_columns(envelope, &mut reader)?);
        }
        Ok(entities)
    }

    async fn query_count(&self, sql: &str, values: Vec<Value>) -> Result<i64> {
        let conn = self.lock().await;
        let mut rows = conn.query(sql, Params::Positional(values)).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    /// Get one entity by id
    pub async fn fetch<E: SyncEntity>(&self, id: EntityId, visibility: Visibility) -> Result<Option<E>> {
        let sql = select_sql::<E>(&format!("id = ?{}", visibility.filter()));
        let mut found = self
            .query_entities::<E>(&sql, vec![Value::Text(id.as_str())])
            .await?;
        Ok(found.pop())
    }

    /// All live rows, optionally restricted to one user's records
    pub async fn fetch_live<E: SyncEntity>(&self, scope: Option<EntityId>) -> Result<Vec<E>> {
        let (condition, values) = scoped(E::KIND, "is_deleted = 0".to_string(), scope);
        let sql = select_sql::<E>(&format!("{condition} ORDER BY last_modified"));
        self.query_entities(&sql, values).await
    }

    /// Rows awaiting confirmation from the other store, tombstones included
    pub async fn fetch_unsynced<E: SyncEntity>(&self, scope: Option<EntityId>) -> Result<Vec<E>> {
        let (condition, values) = scoped(E::KIND, "is_synced = 0".to_string(), scope);
        let sql = select_sql::<E>(&format!("{condition} ORDER BY last_modified"));
        self.query_entities(&sql, values).await
    }

    /// Insert a row exactly as given, envelope included
    pub async fn insert<E: SyncEntity>(&self, entity: &E) -> Result<()> {
        let mut columns: Vec<&str> = ENVELOPE_COLUMNS.to_vec();
        columns.extend_from_slice(E::COLUMNS);
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            E::KIND.table(),
            columns.join(", ")
        );

        let mut values = envelope_values(entity.envelope());
        values.extend(entity.column_values());

        let conn = self.lock().await;
        conn.execute(&sql, Params::Positional(values)).await?;
        tracing::debug!("{} store inserted {} {}", self.role(), E::KIND, entity.id());
        Ok(())
    }

    /// Replace every non-key column of an existing row.
    ///
    /// Returns `false` when no row with the entity's id exists.
    pub async fn overwrite<E: SyncEntity>(&self, entity: &E) -> Result<bool> {
        let assignments = ENVELOPE_COLUMNS[1..]
            .iter()
            .chain(E::COLUMNS)
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {assignments} WHERE id = ?", E::KIND.table());

        let mut values = envelope_values(entity.envelope());
        let id = values.remove(0);
        values.extend(entity.column_values());
        values.push(id);

        let conn = self.lock().await;
        let affected = conn.execute(&sql, Params::Positional(values)).await?;
        Ok(affected > 0)
    }

    /// Insert, or overwrite when a row with the same id (live or not) exists
    pub async fn upsert<E: SyncEntity>(&self, entity: &E) -> Result<()> {
        if !self.overwrite(entity).await? {
            self.insert(entity).await?;
        }
        Ok(())
    }

    /// Flag one row synced, but only while it still carries `entity`'s
    /// sync version.
    ///
    /// Returns `false` when the row changed in the meantime; it then stays
    /// pending for the next push.
    pub async fn mark_synced<E: SyncEntity>(&self, entity: &E) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET is_synced = 1 WHERE id = ? AND sync_version IS ?",
            E::KIND.table()
        );
        let envelope = entity.envelope();
        let conn = self.lock().await;
        let affected = conn
            .execute(
                &sql,
                Params::Positional(vec![
                    Value::Text(envelope.id.as_str()),
                    envelope
                        .sync_version
                        .clone()
                        .map_or(Value::Null, Value::Text),
                ]),
            )
            .await?;
        Ok(affected > 0)
    }

    pub async fn count_live(&self, kind: EntityKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE is_deleted = 0", kind.table());
        self.query_count(&sql, Vec::new()).await
    }

    pub async fn count_synced(&self, kind: EntityKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE is_synced = 1", kind.table());
        self.query_count(&sql, Vec::new()).await
    }

    pub async fn count_unsynced(&self, kind: EntityKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE is_synced = 0", kind.table());
        self.query_count(&sql, Vec::new()).await
    }

    /// Flag every row of every table as unsynced; returns the rows touched.
    pub async fn clear_synced(&self) -> Result<u64> {
        let conn = self.lock().await;
        let mut touched = 0;
        for kind in EntityKind::SYNC_ORDER {
            let sql = format!("UPDATE {} SET is_synced = 0 WHERE is_synced = 1", kind.table());
            touched += conn.execute(&sql, ()).await?;
        }
        Ok(touched)
    }

    /// Case-insensitive username lookup over live users
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = select_sql::<User>("username = ? COLLATE NOCASE AND is_deleted = 0");
        let mut found = self
            .query_entities::<User>(&sql, vec![Value::Text(username.trim().to_string())])
            .await?;
        Ok(found.pop())
    }

    pub async fn project_name_exists(&self, name: &str, owner_id: EntityId) -> Result<bool> {
        let count = self
            .query_count(
                "SELECT COUNT(*) FROM projects WHERE name = ? AND owner_id = ? AND is_deleted = 0",
                vec![
                    Value::Text(name.trim().to_string()),
                    Value::Text(owner_id.as_str()),
                ],
            )
            .await?;
        Ok(count > 0)
    }

    /// Titles are unique per (user, project); `project_id = None` is its own bucket.
    pub async fn task_title_exists(
        &self,
        title: &str,
        user_id: EntityId,
        project_id: Option<EntityId>,
    ) -> Result<bool> {
        let count = self
            .query_count(
                "SELECT COUNT(*) FROM tasks
                 WHERE title = ? AND user_id = ? AND project_id IS ? AND is_deleted = 0",
                vec![
                    Value::Text(title.trim().to_string()),
                    Value::Text(user_id.as_str()),
                    project_id.map_or(Value::Null, |id| Value::Text(id.as_str())),
                ],
            )
            .await?;
        Ok(count > 0)
    }

    pub async fn session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let sql = select_sql::<Session>("token = ? AND is_deleted = 0");
        let mut found = self
            .query_entities::<Session>(&sql, vec![Value::Text(token.to_string())])
            .await?;
        Ok(found.pop())
    }

    pub async fn tasks_for_project(&self, project_id: EntityId) -> Result<Vec<Task>> {
        let sql = select_sql::<Task>("project_id = ? AND is_deleted = 0 ORDER BY created_on");
        self.query_entities(&sql, vec![Value::Text(project_id.as_str())])
            .await
    }

    /// Move a user to a fresh id.
    ///
    /// Foreign keys cascade the new id into owned rows; those rows are marked
    /// unsynced so the next push re-points them on the other store too.
    pub async fn rekey_user(&self, old_id: EntityId, new_id: EntityId) -> Result<()> {
        let conn = self.lock().await;
        let tx = conn.transaction().await?;

        tx.execute(
            "UPDATE users SET id = ?, is_synced = 0, last_modified = MAX(last_modified, ?), sync_version = ?
             WHERE id = ?",
            Params::Positional(vec![
                Value::Text(new_id.as_str()),
                Value::Integer(now_millis()),
                Value::Text(Uuid::new_v4().to_string()),
                Value::Text(old_id.as_str()),
            ]),
        )
        .await?;

        for kind in [EntityKind::Project, EntityKind::Task, EntityKind::Session] {
            let sql = format!(
                "UPDATE {} SET is_synced = 0 WHERE {} = ?",
                kind.table(),
                kind.scope_column()
            );
            tx.execute(&sql, Params::Positional(vec![Value::Text(new_id.as_str())]))
                .await?;
        }

        tx.commit().await?;
        tracing::info!("Re-keyed local user {old_id} to {new_id}");
        Ok(())
    }
}
