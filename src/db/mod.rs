/// Database layer for the Plaza server
///
/// Manages the SQLite connection pool and installs the relational schema.
/// The same `init_schema` runs at startup and against the in-memory pools
/// used by tests, so there is a single source of truth for DDL.
use crate::error::{HubError, HubResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> HubResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePool::connect_with(
        sqlx::sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(if options.enable_wal {
                sqlx::sqlite::SqliteJournalMode::Wal
            } else {
                sqlx::sqlite::SqliteJournalMode::Delete
            })
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5)),
    )
    .await
    .map_err(HubError::Database)?;

    Ok(pool)
}

/// Install the schema. Idempotent; safe to run on every startup.
pub async fn init_schema(pool: &SqlitePool) -> HubResult<()> {
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> HubResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(HubError::Database)?;

    Ok(())
}

/// Parse an RFC 3339 timestamp column
pub fn parse_timestamp(s: &str) -> HubResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HubError::Internal(format!("Invalid timestamp: {}", e)))
}

/// Parse an optional RFC 3339 timestamp column
pub fn parse_opt_timestamp(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS department (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        parent_id INTEGER REFERENCES department(id),
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS employee (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        department_id INTEGER REFERENCES department(id),
        role TEXT NOT NULL DEFAULT 'employee',
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS knowledge_category (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        parent_id INTEGER REFERENCES knowledge_category(id),
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS knowledge_post (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        author_id TEXT NOT NULL,
        category_id INTEGER REFERENCES knowledge_category(id),
        tags TEXT NOT NULL DEFAULT '[]',
        view_count INTEGER NOT NULL DEFAULT 0,
        endorsement_count INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_comment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL REFERENCES knowledge_post(id),
        author_id TEXT NOT NULL,
        body TEXT NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS endorsement (
        post_id INTEGER NOT NULL REFERENCES knowledge_post(id),
        employee_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (post_id, employee_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feed_entry (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id TEXT NOT NULL,
        post_id INTEGER NOT NULL REFERENCES knowledge_post(id),
        relevance_score REAL NOT NULL DEFAULT 0,
        priority TEXT NOT NULL DEFAULT 'normal',
        reason TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (employee_id, post_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS moderation_record (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content_type TEXT NOT NULL,
        content_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        reported_by TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        category TEXT NOT NULL,
        severity TEXT NOT NULL,
        action_taken TEXT,
        reason TEXT NOT NULL,
        confidence REAL,
        moderated_by TEXT,
        moderation_date TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS moderation_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES moderation_record(id),
        action TEXT NOT NULL,
        previous_status TEXT,
        new_status TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        is_automatic INTEGER NOT NULL DEFAULT 0,
        notes TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS appeal (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES moderation_record(id),
        employee_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        reason TEXT NOT NULL,
        evidence TEXT,
        priority TEXT NOT NULL DEFAULT 'normal',
        decision TEXT,
        result_action TEXT,
        response TEXT,
        reviewed_by TEXT,
        reviewed_at TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS punishment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id TEXT NOT NULL,
        record_id INTEGER REFERENCES moderation_record(id),
        kind TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        severity TEXT NOT NULL,
        reason TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT,
        is_permanent INTEGER NOT NULL DEFAULT 0,
        infraction_points INTEGER NOT NULL DEFAULT 0,
        revoked_by TEXT,
        revoked_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        action_type TEXT NOT NULL,
        resource_type TEXT NOT NULL,
        resource_id TEXT,
        actor_id TEXT,
        details TEXT,
        severity TEXT NOT NULL DEFAULT 'info',
        category TEXT NOT NULL,
        success INTEGER NOT NULL DEFAULT 1,
        metadata TEXT,
        created_at TEXT NOT NULL,
        retention_date TEXT NOT NULL,
        reviewed_by TEXT,
        reviewed_at TEXT,
        review_notes TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS consent (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id TEXT NOT NULL,
        category TEXT NOT NULL,
        granted INTEGER NOT NULL,
        granted_at TEXT NOT NULL,
        withdrawn_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS data_export_request (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        categories TEXT NOT NULL DEFAULT '[]',
        request_date TEXT NOT NULL,
        completion_date TEXT,
        file_path TEXT,
        file_hash TEXT,
        processed_by TEXT,
        rejection_reason TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS data_deletion_request (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        reason TEXT,
        request_date TEXT NOT NULL,
        completion_date TEXT,
        processed_by TEXT,
        rejection_reason TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notification (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employee_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT,
        read_at TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS channel_event (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        channel TEXT NOT NULL,
        event_type TEXT NOT NULL,
        payload BLOB NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_moderation_record_status ON moderation_record(status)",
    "CREATE INDEX IF NOT EXISTS idx_moderation_log_record ON moderation_log(record_id)",
    "CREATE INDEX IF NOT EXISTS idx_appeal_record ON appeal(record_id)",
    "CREATE INDEX IF NOT EXISTS idx_punishment_employee ON punishment(employee_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_audit_log_created ON audit_log(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_notification_employee ON notification(employee_id, read_at)",
    "CREATE INDEX IF NOT EXISTS idx_channel_event_channel ON channel_event(channel, seq)",
    "CREATE INDEX IF NOT EXISTS idx_feed_entry_employee ON feed_entry(employee_id)",
];

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();
    }

    #[test]
    fn test_parse_timestamp_roundtrip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn test_parse_opt_timestamp_none_on_garbage() {
        assert!(parse_opt_timestamp(Some("not-a-time".to_string())).is_none());
        assert!(parse_opt_timestamp(None).is_none());
    }
}
