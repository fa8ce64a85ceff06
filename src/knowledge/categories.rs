/// Knowledge category tree
use crate::{
    db,
    error::{HubError, HubResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// A category in the knowledge tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeCategory {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Category manager
#[derive(Clone)]
pub struct CategoryManager {
    db: SqlitePool,
}

impl CategoryManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a category, optionally under a parent
    pub async fn create(&self, name: &str, parent_id: Option<i64>) -> HubResult<KnowledgeCategory> {
        if name.trim().is_empty() {
            return Err(HubError::Validation("Category name is required".to_string()));
        }

        if let Some(parent_id) = parent_id {
            let parent: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM knowledge_category WHERE id = ? AND is_deleted = 0",
            )
            .bind(parent_id)
            .fetch_optional(&self.db)
            .await?;
            if parent.is_none() {
                return Err(HubError::NotFound(format!(
                    "Parent category {} not found",
                    parent_id
                )));
            }
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO knowledge_category (name, parent_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(parent_id)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(KnowledgeCategory {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            parent_id,
            created_at: now,
        })
    }

    /// Get a category by id
    pub async fn get(&self, id: i64) -> HubResult<KnowledgeCategory> {
        let row = sqlx::query(
            "SELECT id, name, parent_id, created_at FROM knowledge_category WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Category {} not found", id)))?;

        Self::parse_category(row)
    }

    /// List live categories
    pub async fn list(&self) -> HubResult<Vec<KnowledgeCategory>> {
        let rows = sqlx::query(
            "SELECT id, name, parent_id, created_at FROM knowledge_category WHERE is_deleted = 0 ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_category).collect()
    }

    /// Soft-delete a category. Fails while subcategories or posts reference
    /// it.
    pub async fn delete(&self, id: i64) -> HubResult<()> {
        let children: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM knowledge_category WHERE parent_id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        if children > 0 {
            return Err(HubError::Validation(format!(
                "Category {} still has {} subcategories",
                id, children
            )));
        }

        let posts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM knowledge_post WHERE category_id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        if posts > 0 {
            return Err(HubError::Validation(format!(
                "Category {} still has {} posts",
                id, posts
            )));
        }

        let result = sqlx::query(
            "UPDATE knowledge_category SET is_deleted = 1 WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Category {} not found", id)));
        }
        Ok(())
    }

    fn parse_category(row: sqlx::sqlite::SqliteRow) -> HubResult<KnowledgeCategory> {
        let created_at_str: String = row.get("created_at");
        Ok(KnowledgeCategory {
            id: row.get("id"),
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
    use chrono::Utc;

    #[tokio::test]
    async fn test_delete_with_subcategories_fails() {
        let manager = CategoryManager::new(test_pool().await);

        let parent = manager.create("Engineering", None).await.unwrap();
        manager.create("Backend", Some(parent.id)).await.unwrap();

        let err = manager.delete(parent.id).await.unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_with_posts_fails() {
        let pool = test_pool().await;
        let manager = CategoryManager::new(pool.clone());

        let cat = manager.create("Guides", None).await.unwrap();
        sqlx::query(
            "INSERT INTO knowledge_post (title, body, author_id, category_id, created_at, updated_at) VALUES ('t', 'b', 'emp-1', ?, ?, ?)",
        )
        .bind(cat.id)
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let err = manager.delete(cat.id).await.unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_empty_category_succeeds() {
        let manager = CategoryManager::new(test_pool().await);

        let cat = manager.create("Empty", None).await.unwrap();
        manager.delete(cat.id).await.unwrap();

        assert!(matches!(
            manager.get(cat.id).await.unwrap_err(),
            HubError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_parent_is_not_found() {
        let manager = CategoryManager::new(test_pool().await);

        let err = manager.create("Orphan", Some(99)).await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }
}
