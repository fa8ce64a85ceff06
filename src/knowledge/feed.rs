/// Personalized feed entries
///
/// Each entry references a post with a relevance score, a priority bucket,
/// and a human-readable reason. Scoring happens at rebuild time: recency
/// decay plus endorsement weight plus a same-department bonus. There is no
/// continuous recomputation pipeline; callers rebuild on demand.
use crate::{
    db,
    error::{HubError, HubResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

const RECENCY_HALF_LIFE_DAYS: f64 = 14.0;
const ENDORSEMENT_WEIGHT: f64 = 2.0;
const DEPARTMENT_BONUS: f64 = 1.5;
const HIGH_PRIORITY_THRESHOLD: f64 = 3.0;

/// A ranked reference to a post in an employee's feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: i64,
    pub employee_id: String,
    pub post_id: i64,
    pub relevance_score: f64,
    pub priority: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Feed manager
#[derive(Clone)]
pub struct FeedManager {
    db: SqlitePool,
}

impl FeedManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Rebuild the feed for one employee from recent live posts. Replaces
    /// any previous entries. Returns the number of entries written.
    pub async fn rebuild_for(&self, employee_id: &str, limit: i64) -> HubResult<u64> {
        let limit = limit.clamp(1, 500);

        let department_id: Option<i64> = sqlx::query_scalar(
            "SELECT department_id FROM employee WHERE id = ? AND is_deleted = 0",
        )
        .bind(employee_id)
        .fetch_optional(&self.db)
        .await?
        .flatten();

        let posts = sqlx::query(
            r#"
            SELECT p.id, p.author_id, p.endorsement_count, p.created_at,
                   a.department_id AS author_department
            FROM knowledge_post p
            LEFT JOIN employee a ON a.id = p.author_id
            WHERE p.is_deleted = 0 AND p.author_id != ?
            ORDER BY p.created_at DESC
            LIMIT ?
            "#,
        )
        .bind(employee_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM feed_entry WHERE employee_id = ?")
            .bind(employee_id)
            .execute(&mut *tx)
            .await?;

        let mut written = 0u64;
        for row in posts {
            let post_id: i64 = row.get("id");
            let endorsements: i64 = row.get("endorsement_count");
            let created_at = db::parse_timestamp(&row.get::<String, _>("created_at"))?;
            let author_department: Option<i64> = row.get("author_department");

            let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
            let recency = (-age_days / RECENCY_HALF_LIFE_DAYS).exp();
            let endorsement = ENDORSEMENT_WEIGHT * (1.0 + endorsements as f64).ln();
            let same_department =
                department_id.is_some() && department_id == author_department;
            let bonus = if same_department { DEPARTMENT_BONUS } else { 0.0 };

            let score = recency + endorsement + bonus;
            let priority = if score >= HIGH_PRIORITY_THRESHOLD {
                "high"
            } else {
                "normal"
            };
            let reason = if same_department {
                "Popular in your department"
            } else if endorsements > 0 {
                "Endorsed by colleagues"
            } else {
                "Recently published"
            };

            sqlx::query(
                r#"
                INSERT INTO feed_entry
                (employee_id, post_id, relevance_score, priority, reason, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(employee_id)
            .bind(post_id)
            .bind(score)
            .bind(priority)
            .bind(reason)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Read an employee's feed, highest relevance first
    pub async fn feed(&self, employee_id: &str, limit: i64) -> HubResult<Vec<FeedEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, employee_id, post_id, relevance_score, priority, reason, created_at
            FROM feed_entry
            WHERE employee_id = ?
            ORDER BY relevance_score DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(employee_id)
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.db)
        .await?;

        let mut entries = Vec::new();
        for row in rows {
            let created_at_str: String = row.get("created_at");
            entries.push(FeedEntry {
                id: row.get("id"),
                employee_id: row.get("employee_id"),
                post_id: row.get("post_id"),
                relevance_score: row.get("relevance_score"),
                priority: row.get("priority"),
                reason: row.get("reason"),
                created_at: db::parse_timestamp(&created_at_str)?,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::test_pool;
    use crate::directory::{DepartmentManager, EmployeeManager};
    use crate::knowledge::posts::PostManager;

    #[tokio::test]
    async fn test_rebuild_excludes_own_posts_and_ranks_endorsed_higher() {
        let pool = test_pool().await;
        let departments = DepartmentManager::new(pool.clone());
        let employees = EmployeeManager::new(pool.clone());
        let posts = PostManager::new(pool.clone());
        let feed = FeedManager::new(pool.clone());

        let eng = departments.create("ENG", "Engineering", None).await.unwrap();
        let reader = employees
            .create("Reader", "reader@corp.example", Some(eng.id), Role::Employee)
            .await
            .unwrap();
        let author = employees
            .create("Author", "author@corp.example", Some(eng.id), Role::Employee)
            .await
            .unwrap();

        let own = posts
            .create("My own post", "body", &reader.id, None, &[])
            .await
            .unwrap();
        let plain = posts
            .create("Plain post", "body", &author.id, None, &[])
            .await
            .unwrap();
        let endorsed = posts
            .create("Endorsed post", "body", &author.id, None, &[])
            .await
            .unwrap();
        for i in 0..5 {
            posts
                .endorse(endorsed.id, &format!("emp-fan-{}", i))
                .await
                .unwrap();
        }

        let written = feed.rebuild_for(&reader.id, 100).await.unwrap();
        assert_eq!(written, 2);

        let entries = feed.feed(&reader.id, 50).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.post_id != own.id));
        assert_eq!(entries[0].post_id, endorsed.id);
        assert!(entries[0].relevance_score > entries[1].relevance_score);
        assert_eq!(entries[1].post_id, plain.id);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_entries() {
        let pool = test_pool().await;
        let employees = EmployeeManager::new(pool.clone());
        let posts = PostManager::new(pool.clone());
        let feed = FeedManager::new(pool.clone());

        let reader = employees
            .create("Reader", "reader@corp.example", None, Role::Employee)
            .await
            .unwrap();
        posts
            .create("Post", "body", "someone-else", None, &[])
            .await
            .unwrap();

        feed.rebuild_for(&reader.id, 100).await.unwrap();
        feed.rebuild_for(&reader.id, 100).await.unwrap();

        // No duplicates after a second rebuild
        assert_eq!(feed.feed(&reader.id, 50).await.unwrap().len(), 1);
    }
}
