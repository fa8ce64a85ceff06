/// Moderation record management
///
/// One record per flagged piece of content. Status changes run through the
/// transition table in `state`, and every change commits together with its
/// moderation log entry and audit entry.
use crate::{
    audit::{AuditAction, AuditCategory, AuditEvent, AuditLogger, AuditSeverity},
    db,
    error::{HubError, HubResult},
    moderation::{
        log as modlog,
        punishments::{PunishmentKind, PunishmentManager, Sanction},
        state::{moderation_transition, ModerationEvent, ModerationStatus},
    },
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Kind of content under review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Comment,
    Profile,
    Message,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Comment => "comment",
            ContentType::Profile => "profile",
            ContentType::Message => "message",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "post" => Ok(ContentType::Post),
            "comment" => Ok(ContentType::Comment),
            "profile" => Ok(ContentType::Profile),
            "message" => Ok(ContentType::Message),
            _ => Err(HubError::Validation(format!("Invalid content type: {}", s))),
        }
    }
}

/// Violation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Spam,
    Harassment,
    HateSpeech,
    Misinformation,
    Confidential,
    Nsfw,
    Other,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Spam => "spam",
            ContentCategory::Harassment => "harassment",
            ContentCategory::HateSpeech => "hatespeech",
            ContentCategory::Misinformation => "misinformation",
            ContentCategory::Confidential => "confidential",
            ContentCategory::Nsfw => "nsfw",
            ContentCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "spam" => Ok(ContentCategory::Spam),
            "harassment" => Ok(ContentCategory::Harassment),
            "hatespeech" => Ok(ContentCategory::HateSpeech),
            "misinformation" => Ok(ContentCategory::Misinformation),
            "confidential" => Ok(ContentCategory::Confidential),
            "nsfw" => Ok(ContentCategory::Nsfw),
            "other" => Ok(ContentCategory::Other),
            _ => Err(HubError::Validation(format!(
                "Invalid content category: {}",
                s
            ))),
        }
    }

    /// Fixed severity mapping applied at report time
    pub fn severity(&self) -> Severity {
        match self {
            ContentCategory::Spam | ContentCategory::Other => Severity::Low,
            ContentCategory::Misinformation | ContentCategory::Nsfw => Severity::Medium,
            ContentCategory::Harassment | ContentCategory::HateSpeech => Severity::High,
            ContentCategory::Confidential => Severity::Critical,
        }
    }
}

/// Severity of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(HubError::Validation(format!("Invalid severity: {}", s))),
        }
    }
}

/// Action taken by a moderator on a decided record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTaken {
    NoAction,
    Warning,
    ContentRemoval,
    Suspension,
    Ban,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTaken::NoAction => "noaction",
            ActionTaken::Warning => "warning",
            ActionTaken::ContentRemoval => "contentremoval",
            ActionTaken::Suspension => "suspension",
            ActionTaken::Ban => "ban",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "noaction" => Ok(ActionTaken::NoAction),
            "warning" => Ok(ActionTaken::Warning),
            "contentremoval" => Ok(ActionTaken::ContentRemoval),
            "suspension" => Ok(ActionTaken::Suspension),
            "ban" => Ok(ActionTaken::Ban),
            _ => Err(HubError::Validation(format!("Invalid action: {}", s))),
        }
    }

    /// Sanction implied by this action, if any
    fn sanction(&self) -> Option<(PunishmentKind, Sanction)> {
        match self {
            ActionTaken::Warning => Some((PunishmentKind::Warning, Sanction::For(Duration::days(30)))),
            ActionTaken::Suspension => {
                Some((PunishmentKind::Suspension, Sanction::For(Duration::days(7))))
            }
            ActionTaken::Ban => Some((PunishmentKind::Ban, Sanction::Permanent)),
            ActionTaken::NoAction | ActionTaken::ContentRemoval => None,
        }
    }
}

/// A flagged piece of content under review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationRecord {
    pub id: i64,
    pub content_type: ContentType,
    pub content_id: String,
    pub author_id: String,
    pub reported_by: Option<String>,
    pub status: ModerationStatus,
    pub category: ContentCategory,
    pub severity: Severity,
    pub action_taken: Option<ActionTaken>,
    pub reason: String,
    pub confidence: Option<f64>,
    pub moderated_by: Option<String>,
    pub moderation_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a decision, including any sanction it implied
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub record: ModerationRecord,
    pub punishment_id: Option<i64>,
}

/// Per-item result of a bulk operation
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub id: i64,
    pub reason: String,
}

/// Structured bulk result; nothing is silently dropped
#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<i64>,
    pub failed: Vec<BatchFailure>,
}

/// Moderation record manager
#[derive(Clone)]
pub struct ModerationManager {
    db: SqlitePool,
    audit: AuditLogger,
}

impl ModerationManager {
    pub fn new(db: SqlitePool, audit: AuditLogger) -> Self {
        Self { db, audit }
    }

    /// Record a report against a piece of content. Severity is inferred from
    /// the category; `confidence` carries an optional automated-detection
    /// score.
    #[allow(clippy::too_many_arguments)]
    pub async fn report(
        &self,
        content_type: ContentType,
        content_id: &str,
        author_id: &str,
        reported_by: Option<&str>,
        category: ContentCategory,
        reason: &str,
        confidence: Option<f64>,
    ) -> HubResult<ModerationRecord> {
        if reason.trim().is_empty() {
            return Err(HubError::Validation("Report reason is required".to_string()));
        }

        let now = Utc::now();
        let severity = category.severity();
        let is_automatic = reported_by.is_none();
        let actor = reported_by.unwrap_or("system");

        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO moderation_record
            (content_type, content_id, author_id, reported_by, status,
             category, severity, reason, confidence, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?)
            "#,
        )
        .bind(content_type.as_str())
        .bind(content_id)
        .bind(author_id)
        .bind(reported_by)
        .bind(category.as_str())
        .bind(severity.as_str())
        .bind(reason)
        .bind(confidence)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        modlog::append(
            &mut tx,
            id,
            "created",
            None,
            ModerationStatus::Pending,
            actor,
            is_automatic,
            None,
        )
        .await?;

        self.audit
            .append(
                &mut tx,
                AuditEvent {
                    action: AuditAction::Create,
                    resource_type: "moderation_record",
                    resource_id: Some(&id.to_string()),
                    actor_id: Some(actor),
                    details: Some(reason),
                    severity: AuditSeverity::Info,
                    category: AuditCategory::Moderation,
                    success: true,
                    metadata: None,
                },
            )
            .await?;

        tx.commit().await?;

        crate::metrics::MODERATION_REPORTS_TOTAL
            .with_label_values(&[category.as_str()])
            .inc();

        tracing::info!(record_id = id, category = category.as_str(), "content reported");

        Ok(ModerationRecord {
            id,
            content_type,
            content_id: content_id.to_string(),
            author_id: author_id.to_string(),
            reported_by: reported_by.map(String::from),
            status: ModerationStatus::Pending,
            category,
            severity,
            action_taken: None,
            reason: reason.to_string(),
            confidence,
            moderated_by: None,
            moderation_date: None,
            created_at: now,
        })
    }

    /// Apply a moderation decision. The transition is validated against the
    /// state machine before anything is written; Ban/Suspension/Warning
    /// actions create the implied punishment in the same transaction.
    pub async fn decide(
        &self,
        record_id: i64,
        event: ModerationEvent,
        action_taken: Option<ActionTaken>,
        moderator_id: &str,
        notes: Option<&str>,
    ) -> HubResult<DecisionOutcome> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query(
            "SELECT status, author_id, severity FROM moderation_record WHERE id = ?",
        )
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Moderation record {} not found", record_id)))?;

        let current = ModerationStatus::from_str(&row.get::<String, _>("status"))?;
        let author_id: String = row.get("author_id");
        let severity: String = row.get("severity");

        let next = moderation_transition(current, event)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE moderation_record
            SET status = ?, action_taken = ?, moderated_by = ?, moderation_date = ?
            WHERE id = ?
            "#,
        )
        .bind(next.as_str())
        .bind(action_taken.map(|a| a.as_str()))
        .bind(moderator_id)
        .bind(now.to_rfc3339())
        .bind(record_id)
        .execute(&mut *tx)
        .await?;

        modlog::append(
            &mut tx,
            record_id,
            event.as_str(),
            Some(current),
            next,
            moderator_id,
            false,
            notes,
        )
        .await?;

        // Sanctions implied by the action, only once the record is decided
        let punishment_id = if next.is_terminal() {
            if let Some((kind, sanction)) = action_taken.and_then(|a| a.sanction()) {
                let punishment = PunishmentManager::apply_on(
                    &mut tx,
                    &author_id,
                    Some(record_id),
                    kind,
                    &severity,
                    "Moderation decision",
                    sanction,
                )
                .await?;
                Some(punishment.id)
            } else {
                None
            }
        } else {
            None
        };

        self.audit
            .append(
                &mut tx,
                AuditEvent {
                    action: AuditAction::ModerationDecision,
                    resource_type: "moderation_record",
                    resource_id: Some(&record_id.to_string()),
                    actor_id: Some(moderator_id),
                    details: notes,
                    severity: AuditSeverity::Warning,
                    category: AuditCategory::Moderation,
                    success: true,
                    metadata: Some(serde_json::json!({
                        "event": event.as_str(),
                        "previous": current.as_str(),
                        "new": next.as_str(),
                    })),
                },
            )
            .await?;

        tx.commit().await?;

        crate::metrics::MODERATION_DECISIONS_TOTAL
            .with_label_values(&[event.as_str()])
            .inc();

        tracing::info!(
            record_id,
            from = current.as_str(),
            to = next.as_str(),
            "moderation decision applied"
        );

        let record = self.get(record_id).await?;
        Ok(DecisionOutcome {
            record,
            punishment_id,
        })
    }

    /// Escalate a record for senior review
    pub async fn escalate(
        &self,
        record_id: i64,
        reason: &str,
        escalated_by: &str,
    ) -> HubResult<ModerationRecord> {
        let outcome = self
            .decide(
                record_id,
                ModerationEvent::Escalate,
                None,
                escalated_by,
                Some(reason),
            )
            .await?;
        Ok(outcome.record)
    }

    /// Apply the same decision to many records independently. Failures are
    /// collected per item; there is no cross-item rollback.
    pub async fn bulk_decide(
        &self,
        ids: &[i64],
        event: ModerationEvent,
        action_taken: Option<ActionTaken>,
        moderator_id: &str,
    ) -> HubResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for &id in ids {
            match self.decide(id, event, action_taken, moderator_id, None).await {
                Ok(_) => outcome.succeeded.push(id),
                Err(e) => outcome.failed.push(BatchFailure {
                    id,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(outcome)
    }

    /// Get a record by id
    pub async fn get(&self, record_id: i64) -> HubResult<ModerationRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, content_type, content_id, author_id, reported_by, status,
                   category, severity, action_taken, reason, confidence,
                   moderated_by, moderation_date, created_at
            FROM moderation_record
            WHERE id = ?
            "#,
        )
        .bind(record_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Moderation record {} not found", record_id)))?;

        Self::parse_record(row)
    }

    /// Review queue, optionally filtered by status, newest first
    pub async fn queue(
        &self,
        status: Option<ModerationStatus>,
        page: i64,
        page_size: i64,
    ) -> HubResult<Vec<ModerationRecord>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 200);
        let offset = (page - 1) * page_size;

        let rows = if let Some(status) = status {
            sqlx::query(
                r#"
                SELECT id, content_type, content_id, author_id, reported_by, status,
                       category, severity, action_taken, reason, confidence,
                       moderated_by, moderation_date, created_at
                FROM moderation_record
                WHERE status = ?
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(status.as_str())
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT id, content_type, content_id, author_id, reported_by, status,
                       category, severity, action_taken, reason, confidence,
                       moderated_by, moderation_date, created_at
                FROM moderation_record
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.db)
            .await?
        };

        rows.into_iter().map(Self::parse_record).collect()
    }

    fn parse_record(row: sqlx::sqlite::SqliteRow) -> HubResult<ModerationRecord> {
        let content_type_str: String = row.get("content_type");
        let status_str: String = row.get("status");
        let category_str: String = row.get("category");
        let severity_str: String = row.get("severity");
        let action_taken = row
            .try_get::<Option<String>, _>("action_taken")?
            .map(|s| ActionTaken::from_str(&s))
            .transpose()?;
        let created_at_str: String = row.get("created_at");

        Ok(ModerationRecord {
            id: row.get("id"),
            content_type: ContentType::from_str(&content_type_str)?,
            content_id: row.get("content_id"),
            author_id: row.get("author_id"),
            reported_by: row.get("reported_by"),
            status: ModerationStatus::from_str(&status_str)?,
            category: ContentCategory::from_str(&category_str)?,
            severity: Severity::from_str(&severity_str)?,
            action_taken,
            reason: row.get("reason"),
            confidence: row.get("confidence"),
            moderated_by: row.get("moderated_by"),
            moderation_date: db::parse_opt_timestamp(row.try_get("moderation_date").ok()),
            created_at: db::parse_timestamp(&created_at_str)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::moderation::log;

    async fn manager() -> (ModerationManager, SqlitePool) {
        let pool = test_pool().await;
        let audit = AuditLogger::new(pool.clone(), 365);
        (ModerationManager::new(pool.clone(), audit), pool)
    }

    #[tokio::test]
    async fn test_report_writes_exactly_one_created_log_entry() {
        let (manager, pool) = manager().await;

        let record = manager
            .report(
                ContentType::Post,
                "post-1",
                "emp-author",
                Some("emp-reporter"),
                ContentCategory::Harassment,
                "Targeted insults in comments",
                None,
            )
            .await
            .unwrap();

        assert_eq!(record.status, ModerationStatus::Pending);
        assert_eq!(record.severity, Severity::High);

        let entries = log::history(&pool, record.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "created");
        assert_eq!(entries[0].previous_status, None);
        assert_eq!(entries[0].new_status, ModerationStatus::Pending);
        assert!(!entries[0].is_automatic);
    }

    #[tokio::test]
    async fn test_automated_report_marks_log_automatic() {
        let (manager, pool) = manager().await;

        let record = manager
            .report(
                ContentType::Comment,
                "comment-9",
                "emp-author",
                None,
                ContentCategory::Spam,
                "Link farm detected",
                Some(0.93),
            )
            .await
            .unwrap();

        let entries = log::history(&pool, record.id).await.unwrap();
        assert!(entries[0].is_automatic);
        assert_eq!(record.confidence, Some(0.93));
    }

    #[tokio::test]
    async fn test_decide_logs_previous_and_new_status() {
        let (manager, pool) = manager().await;

        let record = manager
            .report(
                ContentType::Post,
                "post-2",
                "emp-author",
                Some("emp-reporter"),
                ContentCategory::Misinformation,
                "Fabricated numbers",
                None,
            )
            .await
            .unwrap();

        let outcome = manager
            .decide(
                record.id,
                ModerationEvent::Reject,
                Some(ActionTaken::ContentRemoval),
                "mod-1",
                Some("confirmed"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.status, ModerationStatus::Rejected);
        assert_eq!(outcome.record.action_taken, Some(ActionTaken::ContentRemoval));
        assert!(outcome.punishment_id.is_none());

        let entries = log::history(&pool, record.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].previous_status, Some(ModerationStatus::Pending));
        assert_eq!(entries[1].new_status, ModerationStatus::Rejected);
    }

    #[tokio::test]
    async fn test_decide_ban_creates_punishment() {
        let (manager, pool) = manager().await;
        let punishments = PunishmentManager::new(pool.clone());

        let record = manager
            .report(
                ContentType::Post,
                "post-3",
                "emp-bad",
                Some("emp-reporter"),
                ContentCategory::HateSpeech,
                "Slurs",
                None,
            )
            .await
            .unwrap();

        let outcome = manager
            .decide(
                record.id,
                ModerationEvent::Reject,
                Some(ActionTaken::Ban),
                "mod-1",
                None,
            )
            .await
            .unwrap();

        assert!(outcome.punishment_id.is_some());
        assert!(punishments.has_blocking("emp-bad").await.unwrap());

        let active = punishments.active_for("emp-bad").await.unwrap();
        assert_eq!(active[0].record_id, Some(record.id));
        assert!(active[0].is_permanent);
    }

    #[tokio::test]
    async fn test_decide_rejects_illegal_transition() {
        let (manager, pool) = manager().await;

        let record = manager
            .report(
                ContentType::Post,
                "post-4",
                "emp-author",
                Some("emp-reporter"),
                ContentCategory::Spam,
                "Ad spam",
                None,
            )
            .await
            .unwrap();

        manager
            .decide(record.id, ModerationEvent::Approve, None, "mod-1", None)
            .await
            .unwrap();

        // Second decision on a terminal record fails and writes nothing
        let err = manager
            .decide(
                record.id,
                ModerationEvent::Reject,
                Some(ActionTaken::Ban),
                "mod-2",
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Transition(_)));

        let entries = log::history(&pool, record.id).await.unwrap();
        assert_eq!(entries.len(), 2); // created + approve only

        let reloaded = manager.get(record.id).await.unwrap();
        assert_eq!(reloaded.status, ModerationStatus::Approved);
    }

    #[tokio::test]
    async fn test_decide_missing_record_is_not_found() {
        let (manager, _pool) = manager().await;

        let err = manager
            .decide(404, ModerationEvent::Approve, None, "mod-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_escalate_then_decide() {
        let (manager, _pool) = manager().await;

        let record = manager
            .report(
                ContentType::Message,
                "msg-1",
                "emp-author",
                Some("emp-reporter"),
                ContentCategory::Confidential,
                "Leaked roadmap",
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.severity, Severity::Critical);

        let escalated = manager
            .escalate(record.id, "Needs legal review", "mod-1")
            .await
            .unwrap();
        assert_eq!(escalated.status, ModerationStatus::Escalated);

        let outcome = manager
            .decide(
                record.id,
                ModerationEvent::Reject,
                Some(ActionTaken::ContentRemoval),
                "mod-senior",
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.record.status, ModerationStatus::Rejected);
    }

    #[tokio::test]
    async fn test_bulk_decide_reports_every_item() {
        let (manager, _pool) = manager().await;

        let a = manager
            .report(
                ContentType::Post,
                "post-a",
                "emp-1",
                Some("emp-r"),
                ContentCategory::Spam,
                "spam",
                None,
            )
            .await
            .unwrap();
        let b = manager
            .report(
                ContentType::Post,
                "post-b",
                "emp-2",
                Some("emp-r"),
                ContentCategory::Spam,
                "spam",
                None,
            )
            .await
            .unwrap();

        // Pre-decide b so the bulk call hits an illegal transition
        manager
            .decide(b.id, ModerationEvent::Approve, None, "mod-1", None)
            .await
            .unwrap();

        let outcome = manager
            .bulk_decide(
                &[a.id, b.id, 9999],
                ModerationEvent::Reject,
                Some(ActionTaken::ContentRemoval),
                "mod-1",
            )
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, vec![a.id]);
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome.failed.iter().any(|f| f.id == b.id));
        assert!(outcome.failed.iter().any(|f| f.id == 9999));
    }

    #[tokio::test]
    async fn test_queue_filters_by_status() {
        let (manager, _pool) = manager().await;

        for i in 0..3 {
            manager
                .report(
                    ContentType::Post,
                    &format!("post-{}", i),
                    "emp-1",
                    Some("emp-r"),
                    ContentCategory::Spam,
                    "spam",
                    None,
                )
                .await
                .unwrap();
        }

        let pending = manager
            .queue(Some(ModerationStatus::Pending), 1, 50)
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);

        let rejected = manager
            .queue(Some(ModerationStatus::Rejected), 1, 50)
            .await
            .unwrap();
        assert!(rejected.is_empty());
    }
}
