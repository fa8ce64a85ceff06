/// Durable channel event log
///
/// Real-time fan-out is a stateless edge over this table: publishers append
/// sequenced rows, WebSocket handlers follow the log from a cursor and
/// filter by channel. Any server instance sharing the database can deliver.
/// Delivery is at-most-once, best-effort; rows are pruned after a retention
/// window.
use crate::error::{HubError, HubResult};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Event log configuration
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Maximum number of events returned by a single poll
    pub max_query_limit: i64,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_query_limit: 1000,
        }
    }
}

/// Payload carried by a channel event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelPayload {
    pub kind: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

/// A sequenced event as stored
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub seq: i64,
    pub channel: String,
    pub event_type: String,
    pub payload: ChannelPayload,
    pub time: String,
}

/// Channel naming helpers. Group addressing is by convention:
/// `employee:{id}`, `department:{id}`, `team:{id}`, `role:{role}`,
/// `topic:{tag}`, and the shared `corporate` channel.
pub mod channel {
    pub const CORPORATE: &str = "corporate";

    pub fn employee(id: &str) -> String {
        format!("employee:{}", id)
    }

    pub fn department(id: i64) -> String {
        format!("department:{}", id)
    }

    pub fn team(id: &str) -> String {
        format!("team:{}", id)
    }

    pub fn role(role: &str) -> String {
        format!("role:{}", role)
    }

    pub fn topic(tag: &str) -> String {
        format!("topic:{}", tag.to_lowercase())
    }
}

/// Durable event log
#[derive(Clone)]
pub struct EventLog {
    db: SqlitePool,
    config: EventLogConfig,
    last_seq: Arc<RwLock<Option<i64>>>,
}

impl EventLog {
    pub fn new(db: SqlitePool, config: EventLogConfig) -> Self {
        Self {
            db,
            config,
            last_seq: Arc::new(RwLock::new(None)),
        }
    }

    /// Append an event to a channel. Returns the sequence number.
    pub async fn publish(
        &self,
        channel: &str,
        event_type: &str,
        payload: &ChannelPayload,
    ) -> HubResult<i64> {
        let bytes = serde_cbor::to_vec(payload)
            .map_err(|e| HubError::Internal(format!("Failed to encode event: {}", e)))?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO channel_event (channel, event_type, payload, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING seq
            "#,
        )
        .bind(channel)
        .bind(event_type)
        .bind(&bytes)
        .bind(&now)
        .fetch_one(&self.db)
        .await
        .map_err(HubError::Database)?;

        let seq: i64 = result.try_get("seq")?;

        let mut last = self.last_seq.write().await;
        *last = Some(seq);

        crate::metrics::CHANNEL_EVENTS_TOTAL
            .with_label_values(&[event_type])
            .inc();

        Ok(seq)
    }

    /// Current maximum sequence number
    pub async fn current_seq(&self) -> HubResult<Option<i64>> {
        if let Some(seq) = *self.last_seq.read().await {
            return Ok(Some(seq));
        }

        let result = sqlx::query("SELECT MAX(seq) as max_seq FROM channel_event")
            .fetch_one(&self.db)
            .await
            .map_err(HubError::Database)?;

        Ok(result.try_get("max_seq").ok())
    }

    /// Events after a cursor, restricted to the given channels. An empty
    /// channel list returns events from every channel.
    pub async fn events_after(
        &self,
        cursor: i64,
        channels: &[String],
        limit: i64,
    ) -> HubResult<Vec<ChannelEvent>> {
        let limit = limit.clamp(1, self.config.max_query_limit);

        let rows = sqlx::query(
            r#"
            SELECT seq, channel, event_type, payload, created_at
            FROM channel_event
            WHERE seq > ?1
            ORDER BY seq ASC
            LIMIT ?2
            "#,
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .map_err(HubError::Database)?;

        let mut events = Vec::new();
        for row in rows {
            let channel: String = row.try_get("channel")?;
            if !channels.is_empty() && !channels.iter().any(|c| c == &channel) {
                continue;
            }

            let bytes: Vec<u8> = row.try_get("payload")?;
            let payload: ChannelPayload = serde_cbor::from_slice(&bytes)
                .map_err(|e| HubError::Internal(format!("Failed to decode event: {}", e)))?;

            events.push(ChannelEvent {
                seq: row.try_get("seq")?,
                channel,
                event_type: row.try_get("event_type")?,
                payload,
                time: row.try_get("created_at")?,
            });
        }

        Ok(events)
    }

    /// Prune events older than the retention window. Returns count removed.
    pub async fn prune(&self, retention_days: i64) -> HubResult<u64> {
        let cutoff = (Utc::now() - Duration::days(retention_days)).to_rfc3339();

        let result = sqlx::query("DELETE FROM channel_event WHERE created_at < ?")
            .bind(&cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn payload(kind: &str, title: &str) -> ChannelPayload {
        ChannelPayload {
            kind: kind.to_string(),
            title: title.to_string(),
            body: None,
            resource_type: None,
            resource_id: None,
        }
    }

    #[tokio::test]
    async fn test_publish_assigns_monotonic_seq() {
        let log = EventLog::new(test_pool().await, EventLogConfig::default());

        let a = log
            .publish(channel::CORPORATE, "announcement", &payload("announcement", "A"))
            .await
            .unwrap();
        let b = log
            .publish(channel::CORPORATE, "announcement", &payload("announcement", "B"))
            .await
            .unwrap();

        assert!(b > a);
        assert_eq!(log.current_seq().await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn test_events_after_filters_by_channel() {
        let log = EventLog::new(test_pool().await, EventLogConfig::default());

        log.publish(&channel::employee("emp-1"), "notification", &payload("n", "for emp-1"))
            .await
            .unwrap();
        log.publish(&channel::department(3), "notification", &payload("n", "for dept-3"))
            .await
            .unwrap();
        log.publish(channel::CORPORATE, "announcement", &payload("a", "for everyone"))
            .await
            .unwrap();

        let subscribed = vec![channel::employee("emp-1"), channel::CORPORATE.to_string()];
        let events = log.events_after(0, &subscribed, 100).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload.title, "for emp-1");
        assert_eq!(events[1].payload.title, "for everyone");
    }

    #[tokio::test]
    async fn test_cursor_resume() {
        let log = EventLog::new(test_pool().await, EventLogConfig::default());

        let first = log
            .publish(channel::CORPORATE, "announcement", &payload("a", "one"))
            .await
            .unwrap();
        log.publish(channel::CORPORATE, "announcement", &payload("a", "two"))
            .await
            .unwrap();

        let events = log.events_after(first, &[], 100).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload.title, "two");
    }

    #[tokio::test]
    async fn test_payload_roundtrips_through_cbor() {
        let log = EventLog::new(test_pool().await, EventLogConfig::default());

        let original = ChannelPayload {
            kind: "moderation".to_string(),
            title: "Decision".to_string(),
            body: Some("Your post was removed".to_string()),
            resource_type: Some("moderation_record".to_string()),
            resource_id: Some("17".to_string()),
        };
        log.publish(&channel::employee("emp-9"), "moderation", &original)
            .await
            .unwrap();

        let events = log.events_after(0, &[], 10).await.unwrap();
        assert_eq!(events[0].payload, original);
    }

    #[tokio::test]
    async fn test_prune_removes_old_events() {
        let pool = test_pool().await;
        let log = EventLog::new(pool.clone(), EventLogConfig::default());

        log.publish(channel::CORPORATE, "announcement", &payload("a", "old"))
            .await
            .unwrap();
        let past = (Utc::now() - Duration::days(30)).to_rfc3339();
        sqlx::query("UPDATE channel_event SET created_at = ?")
            .bind(&past)
            .execute(&pool)
            .await
            .unwrap();

        let removed = log.prune(14).await.unwrap();
        assert_eq!(removed, 1);
    }
}
