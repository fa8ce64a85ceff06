/// Append-only moderation transition log
///
/// One row per status change. Rows are written inside the transaction that
/// performs the change, so a committed transition always has its log entry.
use crate::{
    db,
    error::HubResult,
    moderation::state::ModerationStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// One transition event on a moderation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationLogEntry {
    pub id: i64,
    pub record_id: i64,
    pub action: String,
    pub previous_status: Option<ModerationStatus>,
    pub new_status: ModerationStatus,
    pub actor_id: String,
    pub is_automatic: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append a log entry on the caller's transaction
pub async fn append(
    conn: &mut SqliteConnection,
    record_id: i64,
    action: &str,
    previous_status: Option<ModerationStatus>,
    new_status: ModerationStatus,
    actor_id: &str,
    is_automatic: bool,
    notes: Option<&str>,
) -> HubResult<i64> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO moderation_log
        (record_id, action, previous_status, new_status, actor_id, is_automatic, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record_id)
    .bind(action)
    .bind(previous_status.map(|s| s.as_str()))
    .bind(new_status.as_str())
    .bind(actor_id)
    .bind(is_automatic)
    .bind(notes)
    .bind(now.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Full transition history for a record, oldest first
pub async fn history(db: &SqlitePool, record_id: i64) -> HubResult<Vec<ModerationLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, record_id, action, previous_status, new_status,
               actor_id, is_automatic, notes, created_at
        FROM moderation_log
        WHERE record_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(record_id)
    .fetch_all(db)
    .await?;

    let mut entries = Vec::new();
    for row in rows {
        let previous_status = row
            .try_get::<Option<String>, _>("previous_status")?
            .map(|s| ModerationStatus::from_str(&s))
            .transpose()?;
        let new_status_str: String = row.get("new_status");
        let created_at_str: String = row.get("created_at");

        entries.push(ModerationLogEntry {
            id: row.get("id"),
            record_id: row.get("record_id"),
            action: row.get("action"),
            previous_status,
            new_status: ModerationStatus::from_str(&new_status_str)?,
            actor_id: row.get("actor_id"),
            is_automatic: row.get("is_automatic"),
            notes: row.get("notes"),
            created_at: db::parse_timestamp(&created_at_str)?,
        });
    }

    Ok(entries)
}
