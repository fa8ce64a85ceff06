/// Appeal management
///
/// An appeal contests a decided moderation record. Submission requires the
/// record to be terminal; an approved appeal with an Overturned decision
/// reopens the record and revokes its linked punishment, all in the
/// reviewer's transaction.
use crate::{
    audit::{AuditAction, AuditCategory, AuditEvent, AuditLogger, AuditSeverity},
    db,
    error::{HubError, HubResult},
    moderation::{
        log as modlog,
        punishments::PunishmentManager,
        records::{ActionTaken, Severity},
        state::{
            appeal_transition, moderation_transition, AppealEvent, AppealStatus, ModerationEvent,
            ModerationStatus,
        },
    },
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Reviewer's judgement on an approved or partially approved appeal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealDecision {
    Upheld,
    Overturned,
    Reduced,
}

impl AppealDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealDecision::Upheld => "upheld",
            AppealDecision::Overturned => "overturned",
            AppealDecision::Reduced => "reduced",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "upheld" => Ok(AppealDecision::Upheld),
            "overturned" => Ok(AppealDecision::Overturned),
            "reduced" => Ok(AppealDecision::Reduced),
            _ => Err(HubError::Validation(format!(
                "Invalid appeal decision: {}",
                s
            ))),
        }
    }
}

/// A contest of a moderation decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppealRecord {
    pub id: i64,
    pub record_id: i64,
    pub employee_id: String,
    pub status: AppealStatus,
    pub reason: String,
    pub evidence: Option<String>,
    pub priority: String,
    pub decision: Option<AppealDecision>,
    pub result_action: Option<ActionTaken>,
    pub response: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an appeal review
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub appeal: AppealRecord,
    /// Punishment revoked by an overturn, if any
    pub revoked_punishment_id: Option<i64>,
    /// True when the moderation record was reopened
    pub record_reopened: bool,
}

/// Appeal manager
#[derive(Clone)]
pub struct AppealManager {
    db: SqlitePool,
    audit: AuditLogger,
}

impl AppealManager {
    pub fn new(db: SqlitePool, audit: AuditLogger) -> Self {
        Self { db, audit }
    }

    /// Submit an appeal against a decided moderation record
    pub async fn submit(
        &self,
        record_id: i64,
        employee_id: &str,
        reason: &str,
        evidence: Option<&str>,
    ) -> HubResult<AppealRecord> {
        if reason.trim().is_empty() {
            return Err(HubError::Validation("Appeal reason is required".to_string()));
        }

        let mut tx = self.db.begin().await?;

        let row = sqlx::query("SELECT status, severity FROM moderation_record WHERE id = ?")
            .bind(record_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                HubError::NotFound(format!("Moderation record {} not found", record_id))
            })?;

        let status = ModerationStatus::from_str(&row.get::<String, _>("status"))?;
        if !status.is_terminal() {
            return Err(HubError::Conflict(format!(
                "Moderation record {} has no decision to appeal",
                record_id
            )));
        }

        let open: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM appeal
            WHERE record_id = ? AND employee_id = ?
              AND status IN ('pending', 'underreview')
            LIMIT 1
            "#,
        )
        .bind(record_id)
        .bind(employee_id)
        .fetch_optional(&mut *tx)
        .await?;
        if open.is_some() {
            return Err(HubError::Conflict(
                "An open appeal already exists for this record".to_string(),
            ));
        }

        let severity = Severity::from_str(&row.get::<String, _>("severity"))?;
        let priority = if severity >= Severity::High { "high" } else { "normal" };
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO appeal
            (record_id, employee_id, status, reason, evidence, priority, created_at)
            VALUES (?, ?, 'pending', ?, ?, ?, ?)
            "#,
        )
        .bind(record_id)
        .bind(employee_id)
        .bind(reason)
        .bind(evidence)
        .bind(priority)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        self.audit
            .append(
                &mut tx,
                AuditEvent {
                    action: AuditAction::Create,
                    resource_type: "appeal",
                    resource_id: Some(&id.to_string()),
                    actor_id: Some(employee_id),
                    details: Some(reason),
                    severity: AuditSeverity::Info,
                    category: AuditCategory::Moderation,
                    success: true,
                    metadata: None,
                },
            )
            .await?;

        tx.commit().await?;

        crate::metrics::APPEALS_TOTAL.with_label_values(&["submitted"]).inc();

        tracing::info!(appeal_id = id, record_id, "appeal submitted");

        Ok(AppealRecord {
            id,
            record_id,
            employee_id: employee_id.to_string(),
            status: AppealStatus::Pending,
            reason: reason.to_string(),
            evidence: evidence.map(String::from),
            priority: priority.to_string(),
            decision: None,
            result_action: None,
            response: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
        })
    }

    /// Review an appeal. An Overturned decision reopens the moderation
    /// record and revokes any active linked punishment in the same
    /// transaction.
    pub async fn review(
        &self,
        appeal_id: i64,
        reviewer_id: &str,
        event: AppealEvent,
        decision: Option<AppealDecision>,
        result_action: Option<ActionTaken>,
        response: Option<&str>,
    ) -> HubResult<ReviewOutcome> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query("SELECT status, record_id, employee_id FROM appeal WHERE id = ?")
            .bind(appeal_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Appeal {} not found", appeal_id)))?;

        let current = AppealStatus::from_str(&row.get::<String, _>("status"))?;
        let record_id: i64 = row.get("record_id");

        let next = appeal_transition(current, event)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE appeal
            SET status = ?, decision = ?, result_action = ?, response = ?,
                reviewed_by = ?, reviewed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(next.as_str())
        .bind(decision.map(|d| d.as_str()))
        .bind(result_action.map(|a| a.as_str()))
        .bind(response)
        .bind(reviewer_id)
        .bind(now.to_rfc3339())
        .bind(appeal_id)
        .execute(&mut *tx)
        .await?;

        // Overturn cascade: reopen the record, revoke the linked sanction
        let mut revoked_punishment_id = None;
        let mut record_reopened = false;
        if next == AppealStatus::Approved && decision == Some(AppealDecision::Overturned) {
            let record_row = sqlx::query("SELECT status FROM moderation_record WHERE id = ?")
                .bind(record_id)
                .fetch_one(&mut *tx)
                .await?;
            let record_status =
                ModerationStatus::from_str(&record_row.get::<String, _>("status"))?;

            let reopened = moderation_transition(record_status, ModerationEvent::Reopen)?;
            sqlx::query("UPDATE moderation_record SET status = ? WHERE id = ?")
                .bind(reopened.as_str())
                .bind(record_id)
                .execute(&mut *tx)
                .await?;

            modlog::append(
                &mut tx,
                record_id,
                ModerationEvent::Reopen.as_str(),
                Some(record_status),
                reopened,
                reviewer_id,
                false,
                Some("Appeal overturned"),
            )
            .await?;
            record_reopened = true;

            if let Some(punishment_id) =
                PunishmentManager::active_for_record(&mut tx, record_id).await?
            {
                PunishmentManager::revoke_on(&mut tx, punishment_id, reviewer_id).await?;
                revoked_punishment_id = Some(punishment_id);
            }
        }

        self.audit
            .append(
                &mut tx,
                AuditEvent {
                    action: AuditAction::Update,
                    resource_type: "appeal",
                    resource_id: Some(&appeal_id.to_string()),
                    actor_id: Some(reviewer_id),
                    details: response,
                    severity: AuditSeverity::Warning,
                    category: AuditCategory::Moderation,
                    success: true,
                    metadata: Some(serde_json::json!({
                        "event": event.as_str(),
                        "previous": current.as_str(),
                        "new": next.as_str(),
                        "decision": decision.map(|d| d.as_str()),
                    })),
                },
            )
            .await?;

        tx.commit().await?;

        crate::metrics::APPEALS_TOTAL
            .with_label_values(&[next.as_str()])
            .inc();

        tracing::info!(
            appeal_id,
            record_id,
            to = next.as_str(),
            reopened = record_reopened,
            "appeal reviewed"
        );

        let appeal = self.get(appeal_id).await?;
        Ok(ReviewOutcome {
            appeal,
            revoked_punishment_id,
            record_reopened,
        })
    }

    /// Get an appeal by id
    pub async fn get(&self, appeal_id: i64) -> HubResult<AppealRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, record_id, employee_id, status, reason, evidence, priority,
                   decision, result_action, response, reviewed_by, reviewed_at, created_at
            FROM appeal
            WHERE id = ?
            "#,
        )
        .bind(appeal_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Appeal {} not found", appeal_id)))?;

        Self::parse_appeal(row)
    }

    /// List appeals, optionally filtered by status, high priority first
    pub async fn list(&self, status: Option<AppealStatus>, limit: i64) -> HubResult<Vec<AppealRecord>> {
        let limit = limit.clamp(1, 200);

        let rows = if let Some(status) = status {
            sqlx::query(
                r#"
                SELECT id, record_id, employee_id, status, reason, evidence, priority,
                       decision, result_action, response, reviewed_by, reviewed_at, created_at
                FROM appeal
                WHERE status = ?
                ORDER BY priority = 'high' DESC, created_at ASC
                LIMIT ?
                "#,
            )
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT id, record_id, employee_id, status, reason, evidence, priority,
                       decision, result_action, response, reviewed_by, reviewed_at, created_at
                FROM appeal
                ORDER BY priority = 'high' DESC, created_at ASC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(&self.db)
            .await?
        };

        rows.into_iter().map(Self::parse_appeal).collect()
    }

    /// Expire pending appeals older than the window. Returns count expired.
    pub async fn expire_stale(&self, older_than_days: i64) -> HubResult<u64> {
        let cutoff = (Utc::now() - Duration::days(older_than_days)).to_rfc3339();
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE appeal
            SET status = 'expired', reviewed_by = 'system', reviewed_at = ?
            WHERE status = 'pending' AND created_at < ?
            "#,
        )
        .bind(&now)
        .bind(&cutoff)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    fn parse_appeal(row: sqlx::sqlite::SqliteRow) -> HubResult<AppealRecord> {
        let status_str: String = row.get("status");
        let decision = row
            .try_get::<Option<String>, _>("decision")?
            .map(|s| AppealDecision::from_str(&s))
            .transpose()?;
        let result_action = row
            .try_get::<Option<String>, _>("result_action")?
            .map(|s| ActionTaken::from_str(&s))
            .transpose()?;
        let created_at_str: String = row.get("created_at");

        Ok(AppealRecord {
            id: row.get("id"),
            record_id: row.get("record_id"),
            employee_id: row.get("employee_id"),
            status: AppealStatus::from_str(&status_str)?,
            reason: row.get("reason"),
            evidence: row.get("evidence"),
            priority: row.get("priority"),
            decision,
            result_action,
            response: row.get("response"),
            reviewed_by: row.get("reviewed_by"),
            reviewed_at: db::parse_opt_timestamp(row.try_get("reviewed_at").ok()),
            created_at: db::parse_timestamp(&created_at_str)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::moderation::records::{ContentCategory, ContentType, ModerationManager};
    use crate::moderation::state::PunishmentStatus;

    async fn setup() -> (ModerationManager, AppealManager, PunishmentManager, SqlitePool) {
        let pool = test_pool().await;
        let audit = AuditLogger::new(pool.clone(), 365);
        (
            ModerationManager::new(pool.clone(), audit.clone()),
            AppealManager::new(pool.clone(), audit),
            PunishmentManager::new(pool.clone()),
            pool,
        )
    }

    async fn decided_record(moderation: &ModerationManager, action: ActionTaken) -> i64 {
        let record = moderation
            .report(
                ContentType::Post,
                "post-1",
                "emp-author",
                Some("emp-reporter"),
                ContentCategory::Harassment,
                "Targeted insults",
                None,
            )
            .await
            .unwrap();
        moderation
            .decide(
                record.id,
                ModerationEvent::Reject,
                Some(action),
                "mod-1",
                None,
            )
            .await
            .unwrap();
        record.id
    }

    #[tokio::test]
    async fn test_appeal_requires_terminal_record() {
        let (moderation, appeals, _punishments, _pool) = setup().await;

        let record = moderation
            .report(
                ContentType::Post,
                "post-1",
                "emp-author",
                Some("emp-reporter"),
                ContentCategory::Spam,
                "spam",
                None,
            )
            .await
            .unwrap();

        // Still pending: nothing to appeal
        let err = appeals
            .submit(record.id, "emp-author", "I disagree", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));

        moderation
            .decide(record.id, ModerationEvent::Reject, None, "mod-1", None)
            .await
            .unwrap();

        let appeal = appeals
            .submit(record.id, "emp-author", "I disagree", Some("chat log"))
            .await
            .unwrap();
        assert_eq!(appeal.status, AppealStatus::Pending);
        assert_eq!(appeal.priority, "high"); // harassment is high severity
    }

    #[tokio::test]
    async fn test_duplicate_open_appeal_conflicts() {
        let (moderation, appeals, _punishments, _pool) = setup().await;
        let record_id = decided_record(&moderation, ActionTaken::ContentRemoval).await;

        appeals
            .submit(record_id, "emp-author", "First", None)
            .await
            .unwrap();
        let err = appeals
            .submit(record_id, "emp-author", "Second", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_overturn_reopens_record_and_revokes_punishment() {
        let (moderation, appeals, punishments, pool) = setup().await;
        let record_id = decided_record(&moderation, ActionTaken::Ban).await;

        assert!(punishments.has_blocking("emp-author").await.unwrap());

        let appeal = appeals
            .submit(record_id, "emp-author", "Mistaken identity", None)
            .await
            .unwrap();

        let outcome = appeals
            .review(
                appeal.id,
                "reviewer-1",
                AppealEvent::Approve,
                Some(AppealDecision::Overturned),
                Some(ActionTaken::NoAction),
                Some("Author was impersonated"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.appeal.status, AppealStatus::Approved);
        assert!(outcome.record_reopened);
        assert!(outcome.revoked_punishment_id.is_some());

        // Sanction lifted, record back under review
        assert!(!punishments.has_blocking("emp-author").await.unwrap());
        let record = moderation.get(record_id).await.unwrap();
        assert_eq!(record.status, ModerationStatus::UnderReview);

        // Revocation is recorded, not deleted
        let history = punishments.history("emp-author").await.unwrap();
        assert_eq!(history[0].status, PunishmentStatus::Revoked);
        assert_eq!(history[0].revoked_by.as_deref(), Some("reviewer-1"));

        // Reopen left a log entry with correct before/after
        let entries = modlog::history(&pool, record_id).await.unwrap();
        let reopen = entries.last().unwrap();
        assert_eq!(reopen.previous_status, Some(ModerationStatus::Rejected));
        assert_eq!(reopen.new_status, ModerationStatus::UnderReview);
    }

    #[tokio::test]
    async fn test_denied_appeal_leaves_sanction_in_place() {
        let (moderation, appeals, punishments, _pool) = setup().await;
        let record_id = decided_record(&moderation, ActionTaken::Suspension).await;

        let appeal = appeals
            .submit(record_id, "emp-author", "Too harsh", None)
            .await
            .unwrap();

        let outcome = appeals
            .review(
                appeal.id,
                "reviewer-1",
                AppealEvent::Deny,
                Some(AppealDecision::Upheld),
                None,
                Some("Decision stands"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.appeal.status, AppealStatus::Denied);
        assert!(!outcome.record_reopened);
        assert!(punishments.has_blocking("emp-author").await.unwrap());
    }

    #[tokio::test]
    async fn test_review_twice_is_illegal() {
        let (moderation, appeals, _punishments, _pool) = setup().await;
        let record_id = decided_record(&moderation, ActionTaken::Warning).await;

        let appeal = appeals
            .submit(record_id, "emp-author", "Please reconsider", None)
            .await
            .unwrap();

        appeals
            .review(appeal.id, "reviewer-1", AppealEvent::Deny, None, None, None)
            .await
            .unwrap();

        let err = appeals
            .review(appeal.id, "reviewer-2", AppealEvent::Approve, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Transition(_)));
    }

    #[tokio::test]
    async fn test_expire_stale_pending_appeals() {
        let (moderation, appeals, _punishments, pool) = setup().await;
        let record_id = decided_record(&moderation, ActionTaken::Warning).await;

        let appeal = appeals
            .submit(record_id, "emp-author", "Old appeal", None)
            .await
            .unwrap();

        let past = (Utc::now() - Duration::days(90)).to_rfc3339();
        sqlx::query("UPDATE appeal SET created_at = ? WHERE id = ?")
            .bind(&past)
            .bind(appeal.id)
            .execute(&pool)
            .await
            .unwrap();

        let expired = appeals.expire_stale(30).await.unwrap();
        assert_eq!(expired, 1);
        assert_eq!(
            appeals.get(appeal.id).await.unwrap().status,
            AppealStatus::Expired
        );
    }
}
