/// Data export and deletion request lifecycles
///
/// Both follow Pending → Processing → Completed | Rejected, guarded before
/// persistence. Export bundles are written as JSON files under the export
/// directory with a SHA-256 digest recorded on the request.
use crate::{
    audit::{AuditAction, AuditCategory, AuditEvent, AuditLogger, AuditSeverity},
    db,
    error::{HubError, HubResult},
    privacy::PersonalDataCategory,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle status shared by export and deletion requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "processing" => Ok(RequestStatus::Processing),
            "completed" => Ok(RequestStatus::Completed),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(HubError::Validation(format!(
                "Invalid request status: {}",
                s
            ))),
        }
    }
}

/// Guard for request status moves
fn ensure_transition(table: &str, current: RequestStatus, next: RequestStatus) -> HubResult<()> {
    let legal = matches!(
        (current, next),
        (RequestStatus::Pending, RequestStatus::Processing)
            | (RequestStatus::Pending, RequestStatus::Rejected)
            | (RequestStatus::Processing, RequestStatus::Completed)
            | (RequestStatus::Processing, RequestStatus::Rejected)
    );
    if legal {
        Ok(())
    } else {
        Err(HubError::Conflict(format!(
            "{}: cannot move from {} to {}",
            table,
            current.as_str(),
            next.as_str()
        )))
    }
}

/// A request to export an employee's personal data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataExportRequest {
    pub id: i64,
    pub employee_id: String,
    pub status: RequestStatus,
    pub categories: Vec<PersonalDataCategory>,
    pub request_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    pub file_path: Option<String>,
    pub file_hash: Option<String>,
    pub processed_by: Option<String>,
    pub rejection_reason: Option<String>,
}

/// A request to delete an employee's personal data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDeletionRequest {
    pub id: i64,
    pub employee_id: String,
    pub status: RequestStatus,
    pub reason: Option<String>,
    pub request_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Manager for export and deletion requests
#[derive(Clone)]
pub struct PrivacyRequestManager {
    db: SqlitePool,
    audit: AuditLogger,
    export_directory: PathBuf,
}

impl PrivacyRequestManager {
    pub fn new(db: SqlitePool, audit: AuditLogger, export_directory: PathBuf) -> Self {
        Self {
            db,
            audit,
            export_directory,
        }
    }

    // ========== Export ==========

    /// File a new export request
    pub async fn request_export(
        &self,
        employee_id: &str,
        categories: &[PersonalDataCategory],
    ) -> HubResult<DataExportRequest> {
        let categories: Vec<PersonalDataCategory> = if categories.is_empty() {
            PersonalDataCategory::all().to_vec()
        } else {
            categories.to_vec()
        };
        let categories_json = serde_json::to_string(
            &categories.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
        )
        .map_err(|e| HubError::Internal(format!("Failed to encode categories: {}", e)))?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO data_export_request (employee_id, status, categories, request_date)
            VALUES (?, 'pending', ?, ?)
            "#,
        )
        .bind(employee_id)
        .bind(&categories_json)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        tracing::info!(employee_id, "data export requested");

        Ok(DataExportRequest {
            id: result.last_insert_rowid(),
            employee_id: employee_id.to_string(),
            status: RequestStatus::Pending,
            categories,
            request_date: now,
            completion_date: None,
            file_path: None,
            file_hash: None,
            processed_by: None,
            rejection_reason: None,
        })
    }

    /// Process an export end to end: Pending → Processing, gather the
    /// employee's data into a JSON bundle, record path and digest,
    /// → Completed.
    pub async fn process_export(&self, request_id: i64, admin_id: &str) -> HubResult<DataExportRequest> {
        let request = self.get_export(request_id).await?;
        ensure_transition("data_export_request", request.status, RequestStatus::Processing)?;

        sqlx::query("UPDATE data_export_request SET status = 'processing', processed_by = ? WHERE id = ?")
            .bind(admin_id)
            .bind(request_id)
            .execute(&self.db)
            .await?;

        let bundle = self.gather(&request.employee_id, &request.categories).await?;
        let bytes = serde_json::to_vec_pretty(&bundle)
            .map_err(|e| HubError::Internal(format!("Failed to encode export: {}", e)))?;

        tokio::fs::create_dir_all(&self.export_directory).await?;
        let file_name = format!("export-{}-{}.json", request.employee_id, Uuid::new_v4());
        let path = self.export_directory.join(file_name);
        tokio::fs::write(&path, &bytes).await?;

        let hash = hex::encode(Sha256::digest(&bytes));
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            UPDATE data_export_request
            SET status = 'completed', completion_date = ?, file_path = ?, file_hash = ?
            WHERE id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(path.to_string_lossy().to_string())
        .bind(&hash)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        self.audit
            .log_data_export(&mut tx, request_id, admin_id, true)
            .await?;
        tx.commit().await?;

        tracing::info!(request_id, "data export completed");

        self.get_export(request_id).await
    }

    /// Reject an export request
    pub async fn reject_export(
        &self,
        request_id: i64,
        admin_id: &str,
        reason: &str,
    ) -> HubResult<DataExportRequest> {
        let request = self.get_export(request_id).await?;
        ensure_transition("data_export_request", request.status, RequestStatus::Rejected)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            UPDATE data_export_request
            SET status = 'rejected', completion_date = ?, processed_by = ?, rejection_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(admin_id)
        .bind(reason)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        self.audit
            .log_data_export(&mut tx, request_id, admin_id, false)
            .await?;
        tx.commit().await?;

        self.get_export(request_id).await
    }

    /// Get an export request
    pub async fn get_export(&self, request_id: i64) -> HubResult<DataExportRequest> {
        let row = sqlx::query(
            r#"
            SELECT id, employee_id, status, categories, request_date, completion_date,
                   file_path, file_hash, processed_by, rejection_reason
            FROM data_export_request
            WHERE id = ?
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Export request {} not found", request_id)))?;

        let status_str: String = row.get("status");
        let categories_json: String = row.get("categories");
        let names: Vec<String> = serde_json::from_str(&categories_json).unwrap_or_default();
        let categories = names
            .iter()
            .map(|n| PersonalDataCategory::from_str(n))
            .collect::<HubResult<Vec<_>>>()?;
        let request_date_str: String = row.get("request_date");

        Ok(DataExportRequest {
            id: row.get("id"),
            employee_id: row.get("employee_id"),
            status: RequestStatus::from_str(&status_str)?,
            categories,
            request_date: db::parse_timestamp(&request_date_str)?,
            completion_date: db::parse_opt_timestamp(row.try_get("completion_date").ok()),
            file_path: row.get("file_path"),
            file_hash: row.get("file_hash"),
            processed_by: row.get("processed_by"),
            rejection_reason: row.get("rejection_reason"),
        })
    }

    /// Pending export requests, oldest first
    pub async fn pending_exports(&self, limit: i64) -> HubResult<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM data_export_request WHERE status = 'pending' ORDER BY id ASC LIMIT ?",
        )
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    /// Collect the employee's data per consented category
    async fn gather(
        &self,
        employee_id: &str,
        categories: &[PersonalDataCategory],
    ) -> HubResult<serde_json::Value> {
        let mut bundle = serde_json::Map::new();
        bundle.insert(
            "employee_id".to_string(),
            serde_json::Value::String(employee_id.to_string()),
        );
        bundle.insert(
            "generated_at".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );

        for category in categories {
            let section = match category {
                PersonalDataCategory::Profile | PersonalDataCategory::Employment => {
                    let row = sqlx::query(
                        "SELECT id, name, email, department_id, role, created_at FROM employee WHERE id = ?",
                    )
                    .bind(employee_id)
                    .fetch_optional(&self.db)
                    .await?;
                    match row {
                        Some(row) => serde_json::json!({
                            "name": row.get::<String, _>("name"),
                            "email": row.get::<String, _>("email"),
                            "department_id": row.get::<Option<i64>, _>("department_id"),
                            "role": row.get::<String, _>("role"),
                            "joined": row.get::<String, _>("created_at"),
                        }),
                        None => serde_json::Value::Null,
                    }
                }
                PersonalDataCategory::Content => {
                    let posts = sqlx::query(
                        "SELECT id, title, created_at FROM knowledge_post WHERE author_id = ? AND is_deleted = 0",
                    )
                    .bind(employee_id)
                    .fetch_all(&self.db)
                    .await?;
                    let comments = sqlx::query(
                        "SELECT id, post_id, body, created_at FROM post_comment WHERE author_id = ? AND is_deleted = 0",
                    )
                    .bind(employee_id)
                    .fetch_all(&self.db)
                    .await?;
                    serde_json::json!({
                        "posts": posts.iter().map(|r| serde_json::json!({
                            "id": r.get::<i64, _>("id"),
                            "title": r.get::<String, _>("title"),
                            "created_at": r.get::<String, _>("created_at"),
                        })).collect::<Vec<_>>(),
                        "comments": comments.iter().map(|r| serde_json::json!({
                            "id": r.get::<i64, _>("id"),
                            "post_id": r.get::<i64, _>("post_id"),
                            "body": r.get::<String, _>("body"),
                            "created_at": r.get::<String, _>("created_at"),
                        })).collect::<Vec<_>>(),
                    })
                }
                PersonalDataCategory::Usage => {
                    let consents = sqlx::query(
                        "SELECT category, granted, granted_at FROM consent WHERE employee_id = ?",
                    )
                    .bind(employee_id)
                    .fetch_all(&self.db)
                    .await?;
                    serde_json::json!({
                        "consents": consents.iter().map(|r| serde_json::json!({
                            "category": r.get::<String, _>("category"),
                            "granted": r.get::<bool, _>("granted"),
                            "granted_at": r.get::<String, _>("granted_at"),
                        })).collect::<Vec<_>>(),
                    })
                }
                PersonalDataCategory::Communications => {
                    let notifications = sqlx::query(
                        "SELECT kind, title, created_at FROM notification WHERE employee_id = ?",
                    )
                    .bind(employee_id)
                    .fetch_all(&self.db)
                    .await?;
                    serde_json::json!({
                        "notifications": notifications.iter().map(|r| serde_json::json!({
                            "kind": r.get::<String, _>("kind"),
                            "title": r.get::<String, _>("title"),
                            "created_at": r.get::<String, _>("created_at"),
                        })).collect::<Vec<_>>(),
                    })
                }
            };
            bundle.insert(category.as_str().to_string(), section);
        }

        Ok(serde_json::Value::Object(bundle))
    }

    // ========== Deletion ==========

    /// File a deletion request
    pub async fn request_deletion(
        &self,
        employee_id: &str,
        reason: Option<&str>,
    ) -> HubResult<DataDeletionRequest> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO data_deletion_request (employee_id, status, reason, request_date)
            VALUES (?, 'pending', ?, ?)
            "#,
        )
        .bind(employee_id)
        .bind(reason)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        tracing::info!(employee_id, "data deletion requested");

        Ok(DataDeletionRequest {
            id: result.last_insert_rowid(),
            employee_id: employee_id.to_string(),
            status: RequestStatus::Pending,
            reason: reason.map(String::from),
            request_date: now,
            completion_date: None,
            processed_by: None,
            rejection_reason: None,
        })
    }

    /// Process a deletion: soft-delete the employee and their content and
    /// anonymize the email, in one transaction with the audit entry.
    pub async fn process_deletion(
        &self,
        request_id: i64,
        admin_id: &str,
    ) -> HubResult<DataDeletionRequest> {
        let request = self.get_deletion(request_id).await?;
        ensure_transition("data_deletion_request", request.status, RequestStatus::Processing)?;

        let now = Utc::now();
        let anonymized = format!("deleted-{}@redacted.invalid", Uuid::new_v4());

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE employee SET is_deleted = 1, name = 'Deleted employee', email = ? WHERE id = ?")
            .bind(&anonymized)
            .bind(&request.employee_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE knowledge_post SET is_deleted = 1 WHERE author_id = ?")
            .bind(&request.employee_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE post_comment SET is_deleted = 1 WHERE author_id = ?")
            .bind(&request.employee_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM notification WHERE employee_id = ?")
            .bind(&request.employee_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE data_deletion_request
            SET status = 'completed', completion_date = ?, processed_by = ?
            WHERE id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(admin_id)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        self.audit
            .append(
                &mut tx,
                AuditEvent {
                    action: AuditAction::DataDeletion,
                    resource_type: "data_deletion_request",
                    resource_id: Some(&request_id.to_string()),
                    actor_id: Some(admin_id),
                    details: None,
                    severity: AuditSeverity::Critical,
                    category: AuditCategory::Privacy,
                    success: true,
                    metadata: None,
                },
            )
            .await?;

        tx.commit().await?;

        tracing::info!(request_id, "data deletion completed");

        self.get_deletion(request_id).await
    }

    /// Reject a deletion request
    pub async fn reject_deletion(
        &self,
        request_id: i64,
        admin_id: &str,
        reason: &str,
    ) -> HubResult<DataDeletionRequest> {
        let request = self.get_deletion(request_id).await?;
        ensure_transition("data_deletion_request", request.status, RequestStatus::Rejected)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"
            UPDATE data_deletion_request
            SET status = 'rejected', completion_date = ?, processed_by = ?, rejection_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(admin_id)
        .bind(reason)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        self.audit
            .append(
                &mut tx,
                AuditEvent {
                    action: AuditAction::DataDeletion,
                    resource_type: "data_deletion_request",
                    resource_id: Some(&request_id.to_string()),
                    actor_id: Some(admin_id),
                    details: Some(reason),
                    severity: AuditSeverity::Warning,
                    category: AuditCategory::Privacy,
                    success: false,
                    metadata: None,
                },
            )
            .await?;

        tx.commit().await?;

        self.get_deletion(request_id).await
    }

    /// Get a deletion request
    pub async fn get_deletion(&self, request_id: i64) -> HubResult<DataDeletionRequest> {
        let row = sqlx::query(
            r#"
            SELECT id, employee_id, status, reason, request_date, completion_date,
                   processed_by, rejection_reason
            FROM data_deletion_request
            WHERE id = ?
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Deletion request {} not found", request_id)))?;

        let status_str: String = row.get("status");
        let request_date_str: String = row.get("request_date");

        Ok(DataDeletionRequest {
            id: row.get("id"),
            employee_id: row.get("employee_id"),
            status: RequestStatus::from_str(&status_str)?,
            reason: row.get("reason"),
            request_date: db::parse_timestamp(&request_date_str)?,
            completion_date: db::parse_opt_timestamp(row.try_get("completion_date").ok()),
            processed_by: row.get("processed_by"),
            rejection_reason: row.get("rejection_reason"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Utc;

    async fn manager_with_dir() -> (PrivacyRequestManager, SqlitePool, tempfile::TempDir) {
        let pool = test_pool().await;
        let audit = AuditLogger::new(pool.clone(), 365);
        let dir = tempfile::tempdir().unwrap();
        (
            PrivacyRequestManager::new(pool.clone(), audit, dir.path().to_path_buf()),
            pool,
            dir,
        )
    }

    async fn seed_employee(pool: &SqlitePool, id: &str) {
        sqlx::query(
            "INSERT INTO employee (id, name, email, role, created_at) VALUES (?, ?, ?, 'employee', ?)",
        )
        .bind(id)
        .bind("Sam Reyes")
        .bind(format!("{}@example.com", id))
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_export_lifecycle_sets_path_and_hash() {
        let (manager, pool, _dir) = manager_with_dir().await;
        seed_employee(&pool, "emp-1").await;

        let request = manager
            .request_export("emp-1", &[PersonalDataCategory::Profile])
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        let done = manager.process_export(request.id, "admin-1").await.unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        assert!(done.completion_date.is_some());

        let path = done.file_path.clone().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let expected = hex::encode(Sha256::digest(&bytes));
        assert_eq!(done.file_hash.unwrap(), expected);

        let bundle: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(bundle["profile"]["email"], "emp-1@example.com");
    }

    #[tokio::test]
    async fn test_export_cannot_be_processed_twice() {
        let (manager, pool, _dir) = manager_with_dir().await;
        seed_employee(&pool, "emp-2").await;

        let request = manager.request_export("emp-2", &[]).await.unwrap();
        // Empty selection expands to every category
        assert_eq!(request.categories.len(), 5);

        manager.process_export(request.id, "admin-1").await.unwrap();
        let err = manager.process_export(request.id, "admin-1").await.unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rejected_export_records_reason() {
        let (manager, pool, _dir) = manager_with_dir().await;
        seed_employee(&pool, "emp-3").await;

        let request = manager.request_export("emp-3", &[]).await.unwrap();
        let rejected = manager
            .reject_export(request.id, "admin-1", "Identity not verified")
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("Identity not verified")
        );
        assert!(rejected.file_path.is_none());
    }

    #[tokio::test]
    async fn test_deletion_soft_deletes_and_anonymizes() {
        let (manager, pool, _dir) = manager_with_dir().await;
        seed_employee(&pool, "emp-4").await;
        sqlx::query(
            "INSERT INTO knowledge_post (title, body, author_id, created_at, updated_at) VALUES ('t', 'b', 'emp-4', ?, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let request = manager
            .request_deletion("emp-4", Some("Leaving the company"))
            .await
            .unwrap();
        let done = manager.process_deletion(request.id, "admin-1").await.unwrap();
        assert_eq!(done.status, RequestStatus::Completed);

        let (email, deleted): (String, bool) =
            sqlx::query_as("SELECT email, is_deleted FROM employee WHERE id = 'emp-4'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(deleted);
        assert!(email.ends_with("@redacted.invalid"));

        let post_deleted: bool =
            sqlx::query_scalar("SELECT is_deleted FROM knowledge_post WHERE author_id = 'emp-4'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(post_deleted);
    }
}
