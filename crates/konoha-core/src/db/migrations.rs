//! Database migrations

use crate::error::Result;
use libsql::Connection;

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

/// Execute statements inside one transaction, rolling back on the first failure
async fn run_in_transaction(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: queue, roster cache, settings
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Pending-write queue; one row per (event, attendee) ever recorded here
        "CREATE TABLE IF NOT EXISTS pending_checkins (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL,
            attendee_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            recorded_by TEXT NOT NULL,
            sync_state TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT NOT NULL DEFAULT '',
            UNIQUE (event_id, attendee_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_pending_checkins_state ON pending_checkins(sync_state, seq)",
        // Cached event documents for offline session start
        "CREATE TABLE IF NOT EXISTS events_cache (
            id TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            cached_at INTEGER NOT NULL
        )",
        // Offline roster of the events scanned on this device
        "CREATE TABLE IF NOT EXISTS roster_cache (
            event_id TEXT NOT NULL,
            attendee_id TEXT NOT NULL,
            display_name TEXT NOT NULL DEFAULT '',
            registration TEXT NOT NULL,
            checked_in INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (event_id, attendee_id)
        )",
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    run_in_transaction(conn, &statements).await?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: conflict audit log
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS checkin_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL,
            attendee_id TEXT NOT NULL,
            local_timestamp INTEGER NOT NULL,
            local_recorded_by TEXT NOT NULL,
            remote_timestamp INTEGER NOT NULL,
            remote_recorded_by TEXT NOT NULL,
            resolved_at INTEGER NOT NULL,
            strategy TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_checkin_conflicts_event ON checkin_conflicts(event_id)",
        "CREATE INDEX IF NOT EXISTS idx_checkin_conflicts_resolved_at ON checkin_conflicts(resolved_at DESC)",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    run_in_transaction(conn, &statements).await?;
    tracing::info!("Migrated database to version 2");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn memory_connection() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_reach_latest_version() {
        let conn = memory_connection().await;
        run(&conn).await.unwrap();
        assert_eq!(get_version(&conn).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_are_idempotent() {
        let conn = memory_connection().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();
        assert_eq!(get_version(&conn).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_enforces_pair_uniqueness() {
        let conn = memory_connection().await;
        run(&conn).await.unwrap();

        let insert = "INSERT INTO pending_checkins (event_id, attendee_id, timestamp, recorded_by)
                      VALUES ('evt1', 'usr1', 1, 'dev')";
        conn.execute(insert, ()).await.unwrap();
        assert!(conn.execute(insert, ()).await.is_err());
    }
}
