/// Department management
use crate::{
    db,
    error::{HubError, HubResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Organizational unit, optionally nested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Department manager
#[derive(Clone)]
pub struct DepartmentManager {
    db: SqlitePool,
}

impl DepartmentManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a department. Codes are unique among live departments.
    pub async fn create(
        &self,
        code: &str,
        name: &str,
        parent_id: Option<i64>,
    ) -> HubResult<Department> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(HubError::Validation("Department code is required".to_string()));
        }

        let duplicate: Option<i64> =
            sqlx::query_scalar("SELECT id FROM department WHERE code = ? AND is_deleted = 0")
                .bind(&code)
                .fetch_optional(&self.db)
                .await?;
        if duplicate.is_some() {
            return Err(HubError::Conflict(format!(
                "Department code {} already exists",
                code
            )));
        }

        if let Some(parent_id) = parent_id {
            let parent: Option<i64> =
                sqlx::query_scalar("SELECT id FROM department WHERE id = ? AND is_deleted = 0")
                    .bind(parent_id)
                    .fetch_optional(&self.db)
                    .await?;
            if parent.is_none() {
                return Err(HubError::NotFound(format!(
                    "Parent department {} not found",
                    parent_id
                )));
            }
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO department (code, name, parent_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&code)
        .bind(name)
        .bind(parent_id)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Department {
            id: result.last_insert_rowid(),
            code,
            name: name.to_string(),
            parent_id,
            created_at: now,
        })
    }

    /// Get a department by id
    pub async fn get(&self, id: i64) -> HubResult<Department> {
        let row = sqlx::query(
            "SELECT id, code, name, parent_id, created_at FROM department WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Department {} not found", id)))?;

        Self::parse_department(row)
    }

    /// List live departments
    pub async fn list(&self) -> HubResult<Vec<Department>> {
        let rows = sqlx::query(
            "SELECT id, code, name, parent_id, created_at FROM department WHERE is_deleted = 0 ORDER BY code",
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_department).collect()
    }

    /// Rename a department
    pub async fn rename(&self, id: i64, name: &str) -> HubResult<()> {
        let result = sqlx::query("UPDATE department SET name = ? WHERE id = ? AND is_deleted = 0")
            .bind(name)
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Department {} not found", id)));
        }
        Ok(())
    }

    /// Soft-delete a department. Blocked while employees or child
    /// departments reference it.
    pub async fn delete(&self, id: i64) -> HubResult<()> {
        let employees: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM employee WHERE department_id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        if employees > 0 {
            return Err(HubError::Validation(format!(
                "Department {} still has {} employees",
                id, employees
            )));
        }

        let children: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM department WHERE parent_id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        if children > 0 {
            return Err(HubError::Validation(format!(
                "Department {} still has {} child departments",
                id, children
            )));
        }

        let result = sqlx::query("UPDATE department SET is_deleted = 1 WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Department {} not found", id)));
        }
        Ok(())
    }

    fn parse_department(row: sqlx::sqlite::SqliteRow) -> HubResult<Department> {
        let created_at_str: String = row.get("created_at");
        Ok(Department {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            parent_id: row.get("parent_id"),
            created_at: db::parse_timestamp(&created_at_str)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_duplicate_code_conflicts() {
        let manager = DepartmentManager::new(test_pool().await);

        manager.create("ENG", "Engineering", None).await.unwrap();
        let err = manager.create("eng", "Engineering 2", None).await.unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_missing_parent_is_not_found() {
        let manager = DepartmentManager::new(test_pool().await);

        let err = manager.create("QA", "Quality", Some(42)).await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_blocked_by_children() {
        let manager = DepartmentManager::new(test_pool().await);

        let parent = manager.create("ENG", "Engineering", None).await.unwrap();
        manager
            .create("ENG-BE", "Backend", Some(parent.id))
            .await
            .unwrap();

        let err = manager.delete(parent.id).await.unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_empty_department_soft_deletes() {
        let manager = DepartmentManager::new(test_pool().await);

        let dept = manager.create("HR", "People", None).await.unwrap();
        manager.delete(dept.id).await.unwrap();

        assert!(matches!(
            manager.get(dept.id).await.unwrap_err(),
            HubError::NotFound(_)
        ));
        // Code is reusable after soft delete
        manager.create("HR", "People v2", None).await.unwrap();
    }
}
