/// Audit Log
///
/// Append-only ledger of security/compliance-relevant actions. Workflows
/// that mutate state call `append` on their own transaction so the business
/// write and its audit entry commit or roll back together. Call sites with
/// no transaction of their own (logins, access denials) use `log`.
///
/// Rows are immutable after insert except the reviewed_by / reviewed_at /
/// review_notes triple, and are hard-deleted once past retention_date.
use crate::{
    db,
    error::{HubError, HubResult},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailure,
    AccessDenied,
    Create,
    Update,
    Delete,
    ModerationDecision,
    DataExport,
    DataDeletion,
    ConsentChange,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFailure => "login_failure",
            AuditAction::AccessDenied => "access_denied",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::ModerationDecision => "moderation_decision",
            AuditAction::DataExport => "data_export",
            AuditAction::DataDeletion => "data_deletion",
            AuditAction::ConsentChange => "consent_change",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "login_success" => Ok(AuditAction::LoginSuccess),
            "login_failure" => Ok(AuditAction::LoginFailure),
            "access_denied" => Ok(AuditAction::AccessDenied),
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            "moderation_decision" => Ok(AuditAction::ModerationDecision),
            "data_export" => Ok(AuditAction::DataExport),
            "data_deletion" => Ok(AuditAction::DataDeletion),
            "consent_change" => Ok(AuditAction::ConsentChange),
            _ => Err(HubError::Validation(format!("Invalid audit action: {}", s))),
        }
    }
}

/// Audit severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "info" => Ok(AuditSeverity::Info),
            "warning" => Ok(AuditSeverity::Warning),
            "critical" => Ok(AuditSeverity::Critical),
            _ => Err(HubError::Validation(format!(
                "Invalid audit severity: {}",
                s
            ))),
        }
    }
}

/// Audit category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    Authentication,
    Moderation,
    Privacy,
    Content,
    Directory,
    System,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Authentication => "authentication",
            AuditCategory::Moderation => "moderation",
            AuditCategory::Privacy => "privacy",
            AuditCategory::Content => "content",
            AuditCategory::Directory => "directory",
            AuditCategory::System => "system",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "authentication" => Ok(AuditCategory::Authentication),
            "moderation" => Ok(AuditCategory::Moderation),
            "privacy" => Ok(AuditCategory::Privacy),
            "content" => Ok(AuditCategory::Content),
            "directory" => Ok(AuditCategory::Directory),
            "system" => Ok(AuditCategory::System),
            _ => Err(HubError::Validation(format!(
                "Invalid audit category: {}",
                s
            ))),
        }
    }
}

/// Immutable audit log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action_type: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub actor_id: Option<String>,
    pub details: Option<String>,
    pub severity: AuditSeverity,
    pub category: AuditCategory,
    pub success: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub retention_date: DateTime<Utc>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
}

/// Parameters for a new entry
#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    pub action: AuditAction,
    pub resource_type: &'a str,
    pub resource_id: Option<&'a str>,
    pub actor_id: Option<&'a str>,
    pub details: Option<&'a str>,
    pub severity: AuditSeverity,
    pub category: AuditCategory,
    pub success: bool,
    pub metadata: Option<serde_json::Value>,
}

/// Search filters
#[derive(Debug, Clone, Default)]
pub struct AuditSearch {
    pub action: Option<AuditAction>,
    pub category: Option<AuditCategory>,
    pub severity: Option<AuditSeverity>,
    pub actor_id: Option<String>,
    pub resource_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Audit log manager
#[derive(Clone)]
pub struct AuditLogger {
    db: SqlitePool,
    retention: Duration,
}

impl AuditLogger {
    pub fn new(db: SqlitePool, retention_days: i64) -> Self {
        Self {
            db,
            retention: Duration::days(retention_days.max(1)),
        }
    }

    /// Append an entry on the caller's transaction
    pub async fn append(&self, conn: &mut SqliteConnection, event: AuditEvent<'_>) -> HubResult<i64> {
        let now = Utc::now();
        let retention_date = now + self.retention;

        let result = sqlx::query(
            r#"
            INSERT INTO audit_log
            (action_type, resource_type, resource_id, actor_id, details,
             severity, category, success, metadata, created_at, retention_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.action.as_str())
        .bind(event.resource_type)
        .bind(event.resource_id)
        .bind(event.actor_id)
        .bind(event.details)
        .bind(event.severity.as_str())
        .bind(event.category.as_str())
        .bind(event.success)
        .bind(event.metadata.map(|m| m.to_string()))
        .bind(now.to_rfc3339())
        .bind(retention_date.to_rfc3339())
        .execute(conn)
        .await?;

        crate::metrics::AUDIT_ENTRIES_TOTAL
            .with_label_values(&[event.action.as_str()])
            .inc();

        Ok(result.last_insert_rowid())
    }

    /// Standalone append for call sites with no transaction of their own
    pub async fn log(&self, event: AuditEvent<'_>) -> HubResult<i64> {
        let mut conn = self.db.acquire().await?;
        self.append(&mut conn, event).await
    }

    /// Login succeeded
    pub async fn log_login_success(&self, employee_id: &str) -> HubResult<i64> {
        self.log(AuditEvent {
            action: AuditAction::LoginSuccess,
            resource_type: "session",
            resource_id: None,
            actor_id: Some(employee_id),
            details: None,
            severity: AuditSeverity::Info,
            category: AuditCategory::Authentication,
            success: true,
            metadata: None,
        })
        .await
    }

    /// Login failed
    pub async fn log_login_failure(&self, identifier: &str) -> HubResult<i64> {
        self.log(AuditEvent {
            action: AuditAction::LoginFailure,
            resource_type: "session",
            resource_id: None,
            actor_id: Some(identifier),
            details: None,
            severity: AuditSeverity::Warning,
            category: AuditCategory::Authentication,
            success: false,
            metadata: None,
        })
        .await
    }

    /// Permission check denied
    pub async fn log_access_denied(
        &self,
        employee_id: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> HubResult<i64> {
        self.log(AuditEvent {
            action: AuditAction::AccessDenied,
            resource_type,
            resource_id,
            actor_id: Some(employee_id),
            details: None,
            severity: AuditSeverity::Warning,
            category: AuditCategory::Authentication,
            success: false,
            metadata: None,
        })
        .await
    }

    /// Data export completed or rejected
    pub async fn log_data_export(
        &self,
        conn: &mut SqliteConnection,
        request_id: i64,
        actor_id: &str,
        success: bool,
    ) -> HubResult<i64> {
        self.append(
            conn,
            AuditEvent {
                action: AuditAction::DataExport,
                resource_type: "data_export_request",
                resource_id: Some(&request_id.to_string()),
                actor_id: Some(actor_id),
                details: None,
                severity: AuditSeverity::Critical,
                category: AuditCategory::Privacy,
                success,
                metadata: None,
            },
        )
        .await
    }

    /// Paginated filtered search, creation time descending
    pub async fn search(
        &self,
        filters: &AuditSearch,
        page: i64,
        page_size: i64,
    ) -> HubResult<Vec<AuditLogEntry>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 500);

        let mut sql = String::from(
            "SELECT id, action_type, resource_type, resource_id, actor_id, details, \
             severity, category, success, metadata, created_at, retention_date, \
             reviewed_by, reviewed_at, review_notes FROM audit_log WHERE 1 = 1",
        );
        if filters.action.is_some() {
            sql.push_str(" AND action_type = ?");
        }
        if filters.category.is_some() {
            sql.push_str(" AND category = ?");
        }
        if filters.severity.is_some() {
            sql.push_str(" AND severity = ?");
        }
        if filters.actor_id.is_some() {
            sql.push_str(" AND actor_id = ?");
        }
        if filters.resource_type.is_some() {
            sql.push_str(" AND resource_type = ?");
        }
        if filters.since.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if filters.until.is_some() {
            sql.push_str(" AND created_at <= ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(action) = filters.action {
            query = query.bind(action.as_str());
        }
        if let Some(category) = filters.category {
            query = query.bind(category.as_str());
        }
        if let Some(severity) = filters.severity {
            query = query.bind(severity.as_str());
        }
        if let Some(actor_id) = &filters.actor_id {
            query = query.bind(actor_id);
        }
        if let Some(resource_type) = &filters.resource_type {
            query = query.bind(resource_type);
        }
        if let Some(since) = filters.since {
            query = query.bind(since.to_rfc3339());
        }
        if let Some(until) = filters.until {
            query = query.bind(until.to_rfc3339());
        }
        query = query.bind(page_size).bind((page - 1) * page_size);

        let rows = query.fetch_all(&self.db).await?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(Self::parse_entry(row)?);
        }

        Ok(entries)
    }

    /// Record the explicit review of an entry. The only permitted update.
    pub async fn review(&self, entry_id: i64, reviewer: &str, notes: Option<&str>) -> HubResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE audit_log
            SET reviewed_by = ?,
                reviewed_at = ?,
                review_notes = ?
            WHERE id = ?
            "#,
        )
        .bind(reviewer)
        .bind(now.to_rfc3339())
        .bind(notes)
        .bind(entry_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!(
                "Audit entry {} not found",
                entry_id
            )));
        }

        Ok(())
    }

    /// Hard-delete rows past their retention date. Returns count removed.
    pub async fn cleanup(&self) -> HubResult<u64> {
        let now = Utc::now();

        let result = sqlx::query("DELETE FROM audit_log WHERE retention_date < ?")
            .bind(now.to_rfc3339())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    fn parse_entry(row: sqlx::sqlite::SqliteRow) -> HubResult<AuditLogEntry> {
        let action_str: String = row.get("action_type");
        let severity_str: String = row.get("severity");
        let category_str: String = row.get("category");
        let created_at_str: String = row.get("created_at");
        let retention_str: String = row.get("retention_date");
        let metadata = row
            .try_get::<Option<String>, _>("metadata")?
            .and_then(|m| serde_json::from_str(&m).ok());

        Ok(AuditLogEntry {
            id: row.get("id"),
            action_type: AuditAction::from_str(&action_str)?,
            resource_type: row.get("resource_type"),
            resource_id: row.get("resource_id"),
            actor_id: row.get("actor_id"),
            details: row.get("details"),
            severity: AuditSeverity::from_str(&severity_str)?,
            category: AuditCategory::from_str(&category_str)?,
            success: row.get("success"),
            metadata,
            created_at: db::parse_timestamp(&created_at_str)?,
            retention_date: db::parse_timestamp(&retention_str)?,
            reviewed_by: row.get("reviewed_by"),
            reviewed_at: db::parse_opt_timestamp(row.try_get("reviewed_at").ok()),
            review_notes: row.get("review_notes"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_log_and_search() {
        let pool = test_pool().await;
        let logger = AuditLogger::new(pool, 365);

        logger.log_login_success("emp-1").await.unwrap();
        logger.log_login_failure("emp-2").await.unwrap();

        let all = logger.search(&AuditSearch::default(), 1, 50).await.unwrap();
        assert_eq!(all.len(), 2);

        let failures = logger
            .search(
                &AuditSearch {
                    action: Some(AuditAction::LoginFailure),
                    ..Default::default()
                },
                1,
                50,
            )
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert!(!failures[0].success);
        assert_eq!(failures[0].category, AuditCategory::Authentication);
    }

    #[tokio::test]
    async fn test_review_is_only_update() {
        let pool = test_pool().await;
        let logger = AuditLogger::new(pool, 365);

        let id = logger.log_access_denied("emp-1", "audit_log", None).await.unwrap();
        logger.review(id, "admin-1", Some("expected")).await.unwrap();

        let entries = logger.search(&AuditSearch::default(), 1, 10).await.unwrap();
        assert_eq!(entries[0].reviewed_by.as_deref(), Some("admin-1"));
        assert!(entries[0].reviewed_at.is_some());

        // Reviewing a missing entry is NotFound
        assert!(logger.review(9999, "admin-1", None).await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_rows() {
        let pool = test_pool().await;

        // Retention of one day, rows backdated two days
        let logger = AuditLogger::new(pool.clone(), 1);
        logger.log_login_success("emp-1").await.unwrap();

        let past = (Utc::now() - Duration::days(2)).to_rfc3339();
        sqlx::query("UPDATE audit_log SET retention_date = ?")
            .bind(&past)
            .execute(&pool)
            .await
            .unwrap();

        let removed = logger.cleanup().await.unwrap();
        assert_eq!(removed, 1);
        assert!(logger
            .search(&AuditSearch::default(), 1, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
