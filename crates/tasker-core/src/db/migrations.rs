//! Database migrations
//!
//! Both the local and the remote store run the same schema so a row can be
//! copied column-for-column in either direction.

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Execute `statements` inside one transaction, rolling back on the first failure.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: entity tables with sync envelope columns
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // schema_version has to exist before `apply` records the version
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        (),
    )
    .await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            last_modified INTEGER NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_version TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            username TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            lockout_end_time INTEGER
        )",
        "CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            last_modified INTEGER NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_version TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            priority TEXT NOT NULL,
            created_on INTEGER NOT NULL,
            updated_on INTEGER NOT NULL,
            completed_on INTEGER,
            owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE ON UPDATE CASCADE
        )",
        "CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id)",
        "CREATE INDEX IF NOT EXISTS idx_projects_created ON projects(created_on)",
        "CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            last_modified INTEGER NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_version TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            priority TEXT NOT NULL,
            status TEXT NOT NULL,
            created_on INTEGER NOT NULL,
            updated_on INTEGER,
            completed_on INTEGER,
            due_date INTEGER,
            assigned_to TEXT,
            time_estimate_minutes INTEGER,
            actual_time_minutes INTEGER NOT NULL DEFAULT 0,
            active_start_time INTEGER,
            last_paused_time INTEGER,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE ON UPDATE CASCADE,
            project_id TEXT REFERENCES projects(id) ON DELETE SET NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due_date)",
        "CREATE TABLE IF NOT EXISTS user_sessions (
            id TEXT PRIMARY KEY,
            last_modified INTEGER NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_version TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE ON UPDATE CASCADE,
            token TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            duration_days INTEGER NOT NULL,
            auto_login_enabled INTEGER NOT NULL DEFAULT 0,
            machine_id TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON user_sessions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_token ON user_sessions(token)",
    ];

    apply(conn, 1, &statements).await
}

/// Migration to version 2: uniqueness constraints and sync-queue indexes
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        // Partial so a tombstoned row never blocks reusing its name
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_users_username
            ON users(username COLLATE NOCASE) WHERE is_deleted = 0",
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_projects_owner_name
            ON projects(owner_id, name) WHERE is_deleted = 0",
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_tasks_user_project_title
            ON tasks(user_id, project_id, title) WHERE is_deleted = 0",
        "CREATE INDEX IF NOT EXISTS idx_users_synced ON users(is_synced)",
        "CREATE INDEX IF NOT EXISTS idx_projects_synced ON projects(is_synced)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_synced ON tasks(is_synced)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_synced ON user_sessions(is_synced)",
    ];

    apply(conn, 2, &statements).await
}
