/// Privacy and compliance bookkeeping (LGPD/GDPR)
///
/// Consent records plus data export and deletion request lifecycles.
pub mod requests;

pub use requests::{
    DataDeletionRequest, DataExportRequest, PrivacyRequestManager, RequestStatus,
};

use crate::{
    audit::{AuditAction, AuditCategory, AuditEvent, AuditLogger, AuditSeverity},
    db,
    error::{HubError, HubResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Categories of personal data covered by consent and export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonalDataCategory {
    Profile,
    Employment,
    Content,
    Usage,
    Communications,
}

impl PersonalDataCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonalDataCategory::Profile => "profile",
            PersonalDataCategory::Employment => "employment",
            PersonalDataCategory::Content => "content",
            PersonalDataCategory::Usage => "usage",
            PersonalDataCategory::Communications => "communications",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "profile" => Ok(PersonalDataCategory::Profile),
            "employment" => Ok(PersonalDataCategory::Employment),
            "content" => Ok(PersonalDataCategory::Content),
            "usage" => Ok(PersonalDataCategory::Usage),
            "communications" => Ok(PersonalDataCategory::Communications),
            _ => Err(HubError::Validation(format!(
                "Invalid data category: {}",
                s
            ))),
        }
    }

    pub fn all() -> [PersonalDataCategory; 5] {
        [
            PersonalDataCategory::Profile,
            PersonalDataCategory::Employment,
            PersonalDataCategory::Content,
            PersonalDataCategory::Usage,
            PersonalDataCategory::Communications,
        ]
    }
}

/// One consent grant or withdrawal. History rows are retained; the latest
/// row per category is the current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: i64,
    pub employee_id: String,
    pub category: PersonalDataCategory,
    pub granted: bool,
    pub granted_at: DateTime<Utc>,
    pub withdrawn_at: Option<DateTime<Utc>>,
}

/// Consent manager
#[derive(Clone)]
pub struct ConsentManager {
    db: SqlitePool,
    audit: AuditLogger,
}

impl ConsentManager {
    pub fn new(db: SqlitePool, audit: AuditLogger) -> Self {
        Self { db, audit }
    }

    /// Grant consent for a category
    pub async fn grant(
        &self,
        employee_id: &str,
        category: PersonalDataCategory,
    ) -> HubResult<ConsentRecord> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO consent (employee_id, category, granted, granted_at)
            VALUES (?, ?, 1, ?)
            "#,
        )
        .bind(employee_id)
        .bind(category.as_str())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        self.audit
            .append(
                &mut tx,
                AuditEvent {
                    action: AuditAction::ConsentChange,
                    resource_type: "consent",
                    resource_id: Some(&id.to_string()),
                    actor_id: Some(employee_id),
                    details: Some(category.as_str()),
                    severity: AuditSeverity::Info,
                    category: AuditCategory::Privacy,
                    success: true,
                    metadata: None,
                },
            )
            .await?;

        tx.commit().await?;

        Ok(ConsentRecord {
            id,
            employee_id: employee_id.to_string(),
            category,
            granted: true,
            granted_at: now,
            withdrawn_at: None,
        })
    }

    /// Withdraw consent for a category. Marks the latest open grant.
    pub async fn withdraw(
        &self,
        employee_id: &str,
        category: PersonalDataCategory,
    ) -> HubResult<()> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE consent
            SET granted = 0, withdrawn_at = ?
            WHERE id = (
                SELECT id FROM consent
                WHERE employee_id = ? AND category = ? AND granted = 1
                ORDER BY id DESC LIMIT 1
            )
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(employee_id)
        .bind(category.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!(
                "No active consent for {} in category {}",
                employee_id,
                category.as_str()
            )));
        }

        self.audit
            .append(
                &mut tx,
                AuditEvent {
                    action: AuditAction::ConsentChange,
                    resource_type: "consent",
                    resource_id: None,
                    actor_id: Some(employee_id),
                    details: Some(category.as_str()),
                    severity: AuditSeverity::Info,
                    category: AuditCategory::Privacy,
                    success: true,
                    metadata: Some(serde_json::json!({ "withdrawn": true })),
                },
            )
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Current consent state per category (latest row wins)
    pub async fn current(&self, employee_id: &str) -> HubResult<Vec<ConsentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, employee_id, category, granted, granted_at, withdrawn_at
            FROM consent
            WHERE employee_id = ?
              AND id IN (
                  SELECT MAX(id) FROM consent WHERE employee_id = ? GROUP BY category
              )
            ORDER BY category
            "#,
        )
        .bind(employee_id)
        .bind(employee_id)
        .fetch_all(&self.db)
        .await?;

        let mut records = Vec::new();
        for row in rows {
            let category_str: String = row.get("category");
            let granted_at_str: String = row.get("granted_at");
            records.push(ConsentRecord {
                id: row.get("id"),
                employee_id: row.get("employee_id"),
                category: PersonalDataCategory::from_str(&category_str)?,
                granted: row.get("granted"),
                granted_at: db::parse_timestamp(&granted_at_str)?,
                withdrawn_at: db::parse_opt_timestamp(row.try_get("withdrawn_at").ok()),
            });
        }

        Ok(records)
    }

    /// Whether the employee currently consents to a category
    pub async fn has_consent(
        &self,
        employee_id: &str,
        category: PersonalDataCategory,
    ) -> HubResult<bool> {
        let current = self.current(employee_id).await?;
        Ok(current
            .iter()
            .any(|c| c.category == category && c.granted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn manager() -> ConsentManager {
        let pool = test_pool().await;
        let audit = AuditLogger::new(pool.clone(), 365);
        ConsentManager::new(pool, audit)
    }

    #[tokio::test]
    async fn test_grant_and_withdraw_cycle() {
        let consent = manager().await;

        consent
            .grant("emp-1", PersonalDataCategory::Usage)
            .await
            .unwrap();
        assert!(consent
            .has_consent("emp-1", PersonalDataCategory::Usage)
            .await
            .unwrap());

        consent
            .withdraw("emp-1", PersonalDataCategory::Usage)
            .await
            .unwrap();
        assert!(!consent
            .has_consent("emp-1", PersonalDataCategory::Usage)
            .await
            .unwrap());

        // Re-grant creates a fresh row; history is preserved
        consent
            .grant("emp-1", PersonalDataCategory::Usage)
            .await
            .unwrap();
        assert!(consent
            .has_consent("emp-1", PersonalDataCategory::Usage)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_withdraw_without_grant_is_not_found() {
        let consent = manager().await;

        let err = consent
            .withdraw("emp-2", PersonalDataCategory::Profile)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_current_returns_one_row_per_category() {
        let consent = manager().await;

        consent
            .grant("emp-3", PersonalDataCategory::Profile)
            .await
            .unwrap();
        consent
            .grant("emp-3", PersonalDataCategory::Content)
            .await
            .unwrap();
        consent
            .withdraw("emp-3", PersonalDataCategory::Profile)
            .await
            .unwrap();
        consent
            .grant("emp-3", PersonalDataCategory::Profile)
            .await
            .unwrap();

        let current = consent.current("emp-3").await.unwrap();
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|c| c.granted));
    }
}
