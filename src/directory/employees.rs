/// Employee management
use crate::{
    auth::Role,
    db,
    error::{HubError, HubResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Employee profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department_id: Option<i64>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Employee manager
#[derive(Clone)]
pub struct EmployeeManager {
    db: SqlitePool,
}

impl EmployeeManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create an employee. Emails are unique among live employees.
    pub async fn create(
        &self,
        name: &str,
        email: &str,
        department_id: Option<i64>,
        role: Role,
    ) -> HubResult<Employee> {
        let email = email.trim().to_lowercase();
        if name.trim().is_empty() || email.is_empty() {
            return Err(HubError::Validation(
                "Employee name and email are required".to_string(),
            ));
        }

        let duplicate: Option<String> =
            sqlx::query_scalar("SELECT id FROM employee WHERE email = ? AND is_deleted = 0")
                .bind(&email)
                .fetch_optional(&self.db)
                .await?;
        if duplicate.is_some() {
            return Err(HubError::Conflict(format!(
                "Employee email {} already exists",
                email
            )));
        }

        if let Some(department_id) = department_id {
            let dept: Option<i64> =
                sqlx::query_scalar("SELECT id FROM department WHERE id = ? AND is_deleted = 0")
                    .bind(department_id)
                    .fetch_optional(&self.db)
                    .await?;
            if dept.is_none() {
                return Err(HubError::NotFound(format!(
                    "Department {} not found",
                    department_id
                )));
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO employee (id, name, email, department_id, role, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(&email)
        .bind(department_id)
        .bind(role.as_str())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Employee {
            id,
            name: name.to_string(),
            email,
            department_id,
            role,
            created_at: now,
        })
    }

    /// Get an employee by id
    pub async fn get(&self, id: &str) -> HubResult<Employee> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, department_id, role, created_at
            FROM employee
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Employee {} not found", id)))?;

        Self::parse_employee(row)
    }

    /// List employees, optionally filtered by department
    pub async fn list(&self, department_id: Option<i64>) -> HubResult<Vec<Employee>> {
        let rows = if let Some(department_id) = department_id {
            sqlx::query(
                r#"
                SELECT id, name, email, department_id, role, created_at
                FROM employee
                WHERE department_id = ? AND is_deleted = 0
                ORDER BY name
                "#,
            )
            .bind(department_id)
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT id, name, email, department_id, role, created_at
                FROM employee
                WHERE is_deleted = 0
                ORDER BY name
                "#,
            )
            .fetch_all(&self.db)
            .await?
        };

        rows.into_iter().map(Self::parse_employee).collect()
    }

    /// Change an employee's role
    pub async fn set_role(&self, id: &str, role: Role) -> HubResult<()> {
        let result = sqlx::query("UPDATE employee SET role = ? WHERE id = ? AND is_deleted = 0")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Employee {} not found", id)));
        }
        Ok(())
    }

    /// Move an employee to another department
    pub async fn set_department(&self, id: &str, department_id: Option<i64>) -> HubResult<()> {
        if let Some(department_id) = department_id {
            let dept: Option<i64> =
                sqlx::query_scalar("SELECT id FROM department WHERE id = ? AND is_deleted = 0")
                    .bind(department_id)
                    .fetch_optional(&self.db)
                    .await?;
            if dept.is_none() {
                return Err(HubError::NotFound(format!(
                    "Department {} not found",
                    department_id
                )));
            }
        }

        let result =
            sqlx::query("UPDATE employee SET department_id = ? WHERE id = ? AND is_deleted = 0")
                .bind(department_id)
                .bind(id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Employee {} not found", id)));
        }
        Ok(())
    }

    /// Soft-delete an employee
    pub async fn delete(&self, id: &str) -> HubResult<()> {
        let result = sqlx::query("UPDATE employee SET is_deleted = 1 WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Employee {} not found", id)));
        }
        Ok(())
    }

    fn parse_employee(row: sqlx::sqlite::SqliteRow) -> HubResult<Employee> {
        let role_str: String = row.get("role");
        let created_at_str: String = row.get("created_at");

        Ok(Employee {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            department_id: row.get("department_id"),
            role: Role::from_str(&role_str)?,
            created_at: db::parse_timestamp(&created_at_str)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::directory::departments::DepartmentManager;

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let manager = EmployeeManager::new(test_pool().await);

        manager
            .create("Ana", "ana@corp.example", None, Role::Employee)
            .await
            .unwrap();
        let err = manager
            .create("Ana Clone", "ANA@corp.example", None, Role::Employee)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_department_is_not_found() {
        let manager = EmployeeManager::new(test_pool().await);

        let err = manager
            .create("Bo", "bo@corp.example", Some(7), Role::Employee)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_by_department() {
        let pool = test_pool().await;
        let departments = DepartmentManager::new(pool.clone());
        let employees = EmployeeManager::new(pool);

        let eng = departments.create("ENG", "Engineering", None).await.unwrap();
        let hr = departments.create("HR", "People", None).await.unwrap();

        employees
            .create("Ana", "ana@corp.example", Some(eng.id), Role::Employee)
            .await
            .unwrap();
        employees
            .create("Bo", "bo@corp.example", Some(hr.id), Role::Moderator)
            .await
            .unwrap();

        let in_eng = employees.list(Some(eng.id)).await.unwrap();
        assert_eq!(in_eng.len(), 1);
        assert_eq!(in_eng[0].name, "Ana");
    }

    #[tokio::test]
    async fn test_role_change_persists() {
        let manager = EmployeeManager::new(test_pool().await);

        let ana = manager
            .create("Ana", "ana@corp.example", None, Role::Employee)
            .await
            .unwrap();
        manager.set_role(&ana.id, Role::Moderator).await.unwrap();

        assert_eq!(manager.get(&ana.id).await.unwrap().role, Role::Moderator);
    }
}
