/// Knowledge posts, comments, and endorsements
///
/// Counters (`view_count`, `endorsement_count`) are incremented with
/// database-side `UPDATE ... SET x = x + 1` so concurrent requests cannot
/// lose updates.
use crate::{
    db,
    error::{HubError, HubResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// A knowledge article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgePost {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub author_id: String,
    pub category_id: Option<i64>,
    pub tags: Vec<String>,
    pub view_count: i64,
    pub endorsement_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A comment on a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Post manager
#[derive(Clone)]
pub struct PostManager {
    db: SqlitePool,
}

impl PostManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a post
    pub async fn create(
        &self,
        title: &str,
        body: &str,
        author_id: &str,
        category_id: Option<i64>,
        tags: &[String],
    ) -> HubResult<KnowledgePost> {
        if title.trim().is_empty() || body.trim().is_empty() {
            return Err(HubError::Validation(
                "Post title and body are required".to_string(),
            ));
        }

        if let Some(category_id) = category_id {
            let cat: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM knowledge_category WHERE id = ? AND is_deleted = 0",
            )
            .bind(category_id)
            .fetch_optional(&self.db)
            .await?;
            if cat.is_none() {
                return Err(HubError::NotFound(format!(
                    "Category {} not found",
                    category_id
                )));
            }
        }

        let tags: Vec<String> = tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let tags_json = serde_json::to_string(&tags)
            .map_err(|e| HubError::Internal(format!("Failed to encode tags: {}", e)))?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO knowledge_post (title, body, author_id, category_id, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(title)
        .bind(body)
        .bind(author_id)
        .bind(category_id)
        .bind(&tags_json)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(KnowledgePost {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            body: body.to_string(),
            author_id: author_id.to_string(),
            category_id,
            tags,
            view_count: 0,
            endorsement_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a post by id
    pub async fn get(&self, id: i64) -> HubResult<KnowledgePost> {
        let row = sqlx::query(
            r#"
            SELECT id, title, body, author_id, category_id, tags,
                   view_count, endorsement_count, created_at, updated_at
            FROM knowledge_post
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Post {} not found", id)))?;

        Self::parse_post(row)
    }

    /// List live posts, optionally filtered by category or tag, newest first
    pub async fn list(
        &self,
        category_id: Option<i64>,
        tag: Option<&str>,
        limit: i64,
    ) -> HubResult<Vec<KnowledgePost>> {
        let limit = limit.clamp(1, 200);

        let rows = match (category_id, tag) {
            (Some(category_id), _) => {
                sqlx::query(
                    r#"
                    SELECT id, title, body, author_id, category_id, tags,
                           view_count, endorsement_count, created_at, updated_at
                    FROM knowledge_post
                    WHERE category_id = ? AND is_deleted = 0
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(category_id)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
            (None, Some(tag)) => {
                // Tags are a JSON array of lowercase strings
                let needle = format!("%\"{}\"%", tag.to_lowercase());
                sqlx::query(
                    r#"
                    SELECT id, title, body, author_id, category_id, tags,
                           view_count, endorsement_count, created_at, updated_at
                    FROM knowledge_post
                    WHERE tags LIKE ? AND is_deleted = 0
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(needle)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
            (None, None) => {
                sqlx::query(
                    r#"
                    SELECT id, title, body, author_id, category_id, tags,
                           view_count, endorsement_count, created_at, updated_at
                    FROM knowledge_post
                    WHERE is_deleted = 0
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.db)
                .await?
            }
        };

        rows.into_iter().map(Self::parse_post).collect()
    }

    /// Update a post's content. Only the author may edit.
    pub async fn update(
        &self,
        id: i64,
        editor_id: &str,
        title: &str,
        body: &str,
        tags: &[String],
    ) -> HubResult<KnowledgePost> {
        let post = self.get(id).await?;
        if post.author_id != editor_id {
            return Err(HubError::Authorization(
                "Only the author can edit a post".to_string(),
            ));
        }

        let tags: Vec<String> = tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let tags_json = serde_json::to_string(&tags)
            .map_err(|e| HubError::Internal(format!("Failed to encode tags: {}", e)))?;

        sqlx::query(
            "UPDATE knowledge_post SET title = ?, body = ?, tags = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(body)
        .bind(&tags_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.db)
        .await?;

        self.get(id).await
    }

    /// Record a view. Atomic increment; no read-modify-write.
    pub async fn record_view(&self, id: i64) -> HubResult<()> {
        let result = sqlx::query(
            "UPDATE knowledge_post SET view_count = view_count + 1 WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Post {} not found", id)));
        }
        Ok(())
    }

    /// Endorse a post. One endorsement per employee; the counter moves in
    /// the same transaction as the uniqueness row.
    pub async fn endorse(&self, post_id: i64, employee_id: &str) -> HubResult<()> {
        let mut tx = self.db.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM endorsement WHERE post_id = ? AND employee_id = ?",
        )
        .bind(post_id)
        .bind(employee_id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_some() {
            return Err(HubError::Conflict(
                "Post already endorsed by this employee".to_string(),
            ));
        }

        sqlx::query("INSERT INTO endorsement (post_id, employee_id, created_at) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(employee_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "UPDATE knowledge_post SET endorsement_count = endorsement_count + 1 WHERE id = ? AND is_deleted = 0",
        )
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Post {} not found", post_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Soft-delete a post
    pub async fn delete(&self, id: i64) -> HubResult<()> {
        let result =
            sqlx::query("UPDATE knowledge_post SET is_deleted = 1 WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!("Post {} not found", id)));
        }
        Ok(())
    }

    /// Add a comment to a post
    pub async fn comment(&self, post_id: i64, author_id: &str, body: &str) -> HubResult<Comment> {
        if body.trim().is_empty() {
            return Err(HubError::Validation("Comment body is required".to_string()));
        }

        // Post must exist and be live
        self.get(post_id).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO post_comment (post_id, author_id, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(body)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            post_id,
            author_id: author_id.to_string(),
            body: body.to_string(),
            created_at: now,
        })
    }

    /// Comments on a post, oldest first
    pub async fn comments(&self, post_id: i64) -> HubResult<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, author_id, body, created_at
            FROM post_comment
            WHERE post_id = ? AND is_deleted = 0
            ORDER BY id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;

        let mut comments = Vec::new();
        for row in rows {
            let created_at_str: String = row.get("created_at");
            comments.push(Comment {
                id: row.get("id"),
                post_id: row.get("post_id"),
                author_id: row.get("author_id"),
                body: row.get("body"),
                created_at: db::parse_timestamp(&created_at_str)?,
            });
        }
        Ok(comments)
    }

    /// Soft-delete a comment
    pub async fn delete_comment(&self, comment_id: i64) -> HubResult<()> {
        let result =
            sqlx::query("UPDATE post_comment SET is_deleted = 1 WHERE id = ? AND is_deleted = 0")
                .bind(comment_id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::NotFound(format!(
                "Comment {} not found",
                comment_id
            )));
        }
        Ok(())
    }

    fn parse_post(row: sqlx::sqlite::SqliteRow) -> HubResult<KnowledgePost> {
        let tags_json: String = row.get("tags");
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(KnowledgePost {
            id: row.get("id"),
            title: row.get("title"),
            body: row.get("body"),
            author_id: row.get("author_id"),
            category_id: row.get("category_id"),
            tags,
            view_count: row.get("view_count"),
            endorsement_count: row.get("endorsement_count"),
            created_at: db::parse_timestamp(&created_at_str)?,
            updated_at: db::parse_timestamp(&updated_at_str)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_view_counter_is_atomic_increment() {
        let manager = PostManager::new(test_pool().await);

        let post = manager
            .create("Onboarding guide", "Welcome", "emp-1", None, &[])
            .await
            .unwrap();

        for _ in 0..5 {
            manager.record_view(post.id).await.unwrap();
        }

        assert_eq!(manager.get(post.id).await.unwrap().view_count, 5);
    }

    #[tokio::test]
    async fn test_duplicate_endorsement_conflicts() {
        let manager = PostManager::new(test_pool().await);

        let post = manager
            .create("Tips", "Some tips", "emp-1", None, &[])
            .await
            .unwrap();

        manager.endorse(post.id, "emp-2").await.unwrap();
        let err = manager.endorse(post.id, "emp-2").await.unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));

        assert_eq!(manager.get(post.id).await.unwrap().endorsement_count, 1);
    }

    #[tokio::test]
    async fn test_tag_filter() {
        let manager = PostManager::new(test_pool().await);

        manager
            .create("A", "a", "emp-1", None, &["Rust".to_string()])
            .await
            .unwrap();
        manager
            .create("B", "b", "emp-1", None, &["python".to_string()])
            .await
            .unwrap();

        let rust_posts = manager.list(None, Some("rust"), 50).await.unwrap();
        assert_eq!(rust_posts.len(), 1);
        assert_eq!(rust_posts[0].title, "A");
        assert_eq!(rust_posts[0].tags, vec!["rust"]);
    }

    #[tokio::test]
    async fn test_only_author_can_edit() {
        let manager = PostManager::new(test_pool().await);

        let post = manager
            .create("Draft", "v1", "emp-1", None, &[])
            .await
            .unwrap();

        let err = manager
            .update(post.id, "emp-2", "Hijacked", "v2", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Authorization(_)));

        let updated = manager
            .update(post.id, "emp-1", "Draft", "v2", &[])
            .await
            .unwrap();
        assert_eq!(updated.body, "v2");
    }

    #[tokio::test]
    async fn test_comment_on_deleted_post_fails() {
        let manager = PostManager::new(test_pool().await);

        let post = manager
            .create("Gone", "soon", "emp-1", None, &[])
            .await
            .unwrap();
        manager.delete(post.id).await.unwrap();

        let err = manager.comment(post.id, "emp-2", "hello?").await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }
}
