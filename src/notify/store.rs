/// Persistent notification state
///
/// Read/unread tracking lives here, separate from the real-time channel:
/// the event log pushes, this table remembers.
use crate::{
    db,
    error::{HubError, HubResult},
    notify::events::{channel, ChannelPayload, EventLog},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// A stored notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub employee_id: String,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Notification store
#[derive(Clone)]
pub struct NotificationStore {
    db: SqlitePool,
    events: EventLog,
}

impl NotificationStore {
    pub fn new(db: SqlitePool, events: EventLog) -> Self {
        Self { db, events }
    }

    /// Create a notification and push it to the employee's personal
    /// channel. The push is best-effort; the stored row is authoritative.
    pub async fn notify(
        &self,
        employee_id: &str,
        kind: &str,
        title: &str,
        body: Option<&str>,
    ) -> HubResult<Notification> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO notification (employee_id, kind, title, body, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(employee_id)
        .bind(kind)
        .bind(title)
        .bind(body)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();

        let payload = ChannelPayload {
            kind: kind.to_string(),
            title: title.to_string(),
            body: body.map(String::from),
            resource_type: Some("notification".to_string()),
            resource_id: Some(id.to_string()),
        };
        if let Err(e) = self
            .events
            .publish(&channel::employee(employee_id), "notification", &payload)
            .await
        {
            tracing::warn!(error = %e, employee_id, "failed to push notification event");
        }

        Ok(Notification {
            id,
            employee_id: employee_id.to_string(),
            kind: kind.to_string(),
            title: title.to_string(),
            body: body.map(String::from),
            read_at: None,
            created_at: now,
        })
    }

    /// Broadcast to a non-personal channel (department, role, topic,
    /// corporate). No per-employee rows are stored for broadcasts.
    pub async fn broadcast(
        &self,
        channel_name: &str,
        kind: &str,
        title: &str,
        body: Option<&str>,
    ) -> HubResult<i64> {
        let payload = ChannelPayload {
            kind: kind.to_string(),
            title: title.to_string(),
            body: body.map(String::from),
            resource_type: None,
            resource_id: None,
        };
        self.events.publish(channel_name, kind, &payload).await
    }

    /// List an employee's notifications, newest first
    pub async fn list(
        &self,
        employee_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> HubResult<Vec<Notification>> {
        let limit = limit.clamp(1, 200);

        let rows = if unread_only {
            sqlx::query(
                r#"
                SELECT id, employee_id, kind, title, body, read_at, created_at
                FROM notification
                WHERE employee_id = ? AND read_at IS NULL
                ORDER BY id DESC
                LIMIT ?
                "#,
            )
            .bind(employee_id)
            .bind(limit)
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT id, employee_id, kind, title, body, read_at, created_at
                FROM notification
                WHERE employee_id = ?
                ORDER BY id DESC
                LIMIT ?
                "#,
            )
            .bind(employee_id)
            .bind(limit)
            .fetch_all(&self.db)
            .await?
        };

        let mut notifications = Vec::new();
        for row in rows {
            let created_at_str: String = row.get("created_at");
            notifications.push(Notification {
                id: row.get("id"),
                employee_id: row.get("employee_id"),
                kind: row.get("kind"),
                title: row.get("title"),
                body: row.get("body"),
                read_at: db::parse_opt_timestamp(row.try_get("read_at").ok()),
                created_at: db::parse_timestamp(&created_at_str)?,
            });
        }
        Ok(notifications)
    }

    /// Unread count for an employee
    pub async fn unread_count(&self, employee_id: &str) -> HubResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification WHERE employee_id = ? AND read_at IS NULL",
        )
        .bind(employee_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    /// Mark one notification read
    pub async fn mark_read(&self, employee_id: &str, notification_id: i64) -> HubResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE notification
            SET read_at = ?
            WHERE id = ? AND employee_id = ? AND read_at IS NULL
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(notification_id)
        .bind(employee_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!(
                "Unread notification {} not found",
                notification_id
            )));
        }
        Ok(())
    }

    /// Mark all of an employee's notifications read. Returns count marked.
    pub async fn mark_all_read(&self, employee_id: &str) -> HubResult<u64> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE notification SET read_at = ? WHERE employee_id = ? AND read_at IS NULL",
        )
        .bind(now.to_rfc3339())
        .bind(employee_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::notify::events::EventLogConfig;

    async fn store() -> NotificationStore {
        let pool = test_pool().await;
        let events = EventLog::new(pool.clone(), EventLogConfig::default());
        NotificationStore::new(pool, events)
    }

    #[tokio::test]
    async fn test_notify_tracks_unread() {
        let store = store().await;

        store
            .notify("emp-1", "moderation", "Your post was removed", None)
            .await
            .unwrap();
        store
            .notify("emp-1", "social", "Ana endorsed your post", None)
            .await
            .unwrap();

        assert_eq!(store.unread_count("emp-1").await.unwrap(), 2);
        assert_eq!(store.unread_count("emp-2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_flow() {
        let store = store().await;

        let n = store
            .notify("emp-1", "social", "Welcome", None)
            .await
            .unwrap();

        store.mark_read("emp-1", n.id).await.unwrap();
        assert_eq!(store.unread_count("emp-1").await.unwrap(), 0);

        // Already read: NotFound
        assert!(store.mark_read("emp-1", n.id).await.is_err());
        // Someone else's notification: NotFound
        let other = store.notify("emp-2", "social", "Hi", None).await.unwrap();
        assert!(store.mark_read("emp-1", other.id).await.is_err());
    }

    #[tokio::test]
    async fn test_notify_publishes_personal_event() {
        let pool = test_pool().await;
        let events = EventLog::new(pool.clone(), EventLogConfig::default());
        let store = NotificationStore::new(pool, events.clone());

        store
            .notify("emp-7", "moderation", "Decision", Some("details"))
            .await
            .unwrap();

        let personal = vec![channel::employee("emp-7")];
        let pushed = events.events_after(0, &personal, 10).await.unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].payload.title, "Decision");
        assert_eq!(pushed[0].payload.resource_type.as_deref(), Some("notification"));
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let store = store().await;

        for i in 0..3 {
            store
                .notify("emp-1", "social", &format!("n{}", i), None)
                .await
                .unwrap();
        }

        assert_eq!(store.mark_all_read("emp-1").await.unwrap(), 3);
        assert_eq!(store.unread_count("emp-1").await.unwrap(), 0);

        let unread = store.list("emp-1", true, 50).await.unwrap();
        assert!(unread.is_empty());
        let all = store.list("emp-1", false, 50).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
