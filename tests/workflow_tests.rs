/// End-to-end workflow tests over an in-memory database
///
/// Walks the full trust-and-safety path: report → decide → punish →
/// appeal → overturn, plus the privacy export lifecycle, asserting the
/// audit and transition-log side effects along the way.
use plaza::{
    audit::{AuditAction, AuditCategory, AuditLogger, AuditSearch},
    db,
    moderation::{
        log as modlog, ActionTaken, AppealDecision, AppealEvent, AppealManager, ContentCategory,
        ContentType, ModerationEvent, ModerationManager, ModerationStatus, PunishmentManager,
        PunishmentStatus,
    },
    notify::{channel, EventLog, EventLogConfig, NotificationStore},
    privacy::{PersonalDataCategory, PrivacyRequestManager, RequestStatus},
};
use sqlx::SqlitePool;

struct Harness {
    pool: SqlitePool,
    audit: AuditLogger,
    moderation: ModerationManager,
    appeals: AppealManager,
    punishments: PunishmentManager,
    events: EventLog,
    notifications: NotificationStore,
}

async fn harness() -> Harness {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    db::init_schema(&pool).await.unwrap();

    let audit = AuditLogger::new(pool.clone(), 365);
    let events = EventLog::new(pool.clone(), EventLogConfig::default());

    Harness {
        moderation: ModerationManager::new(pool.clone(), audit.clone()),
        appeals: AppealManager::new(pool.clone(), audit.clone()),
        punishments: PunishmentManager::new(pool.clone()),
        notifications: NotificationStore::new(pool.clone(), events.clone()),
        audit,
        events,
        pool,
    }
}

#[tokio::test]
async fn report_decide_appeal_overturn_round_trip() {
    let h = harness().await;

    // Report post P1 for harassment
    let record = h
        .moderation
        .report(
            ContentType::Post,
            "post-p1",
            "emp-author",
            Some("emp-reporter"),
            ContentCategory::Harassment,
            "Repeated targeted insults",
            None,
        )
        .await
        .unwrap();
    assert_eq!(record.status, ModerationStatus::Pending);

    // Moderator rejects the content with removal plus a warning sanction
    let outcome = h
        .moderation
        .decide(
            record.id,
            ModerationEvent::Reject,
            Some(ActionTaken::Warning),
            "mod-1",
            Some("Clear policy violation"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.record.status, ModerationStatus::Rejected);
    let punishment_id = outcome.punishment_id.expect("warning sanction created");

    // Exactly two log entries so far, with consistent before/after statuses
    let entries = modlog::history(&h.pool, record.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, "created");
    assert_eq!(entries[1].previous_status, Some(ModerationStatus::Pending));
    assert_eq!(entries[1].new_status, ModerationStatus::Rejected);

    // The author appeals; a reviewer overturns
    let appeal = h
        .appeals
        .submit(record.id, "emp-author", "Context was missing", Some("full thread"))
        .await
        .unwrap();

    let review = h
        .appeals
        .review(
            appeal.id,
            "reviewer-1",
            AppealEvent::Approve,
            Some(AppealDecision::Overturned),
            Some(ActionTaken::NoAction),
            Some("Context changes the reading"),
        )
        .await
        .unwrap();

    assert!(review.record_reopened);
    assert_eq!(review.revoked_punishment_id, Some(punishment_id));

    // Record reopened, sanction revoked but retained
    let record = h.moderation.get(record.id).await.unwrap();
    assert_eq!(record.status, ModerationStatus::UnderReview);
    let history = h.punishments.history("emp-author").await.unwrap();
    assert_eq!(history[0].status, PunishmentStatus::Revoked);

    // The reopened record can be decided again, and the log shows the
    // complete path
    h.moderation
        .decide(record.id, ModerationEvent::Approve, None, "mod-2", None)
        .await
        .unwrap();
    let entries = modlog::history(&h.pool, record.id).await.unwrap();
    let statuses: Vec<_> = entries.iter().map(|e| e.new_status).collect();
    assert_eq!(
        statuses,
        vec![
            ModerationStatus::Pending,
            ModerationStatus::Rejected,
            ModerationStatus::UnderReview,
            ModerationStatus::Approved,
        ]
    );

    // Every workflow step left an audit trail
    let moderation_audit = h
        .audit
        .search(
            &AuditSearch {
                category: Some(AuditCategory::Moderation),
                ..Default::default()
            },
            1,
            50,
        )
        .await
        .unwrap();
    assert!(moderation_audit.len() >= 4); // report, decide, appeal, review
}

#[tokio::test]
async fn ban_blocks_until_overturned() {
    let h = harness().await;

    let record = h
        .moderation
        .report(
            ContentType::Comment,
            "comment-1",
            "emp-troll",
            Some("emp-reporter"),
            ContentCategory::HateSpeech,
            "Slurs in thread",
            None,
        )
        .await
        .unwrap();

    h.moderation
        .decide(
            record.id,
            ModerationEvent::Reject,
            Some(ActionTaken::Ban),
            "mod-1",
            None,
        )
        .await
        .unwrap();

    assert!(h.punishments.has_blocking("emp-troll").await.unwrap());

    let active = h.punishments.active_for("emp-troll").await.unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].is_permanent);
    assert!(active[0].end_date.is_none());

    // Appeal and overturn lifts the ban
    let appeal = h
        .appeals
        .submit(record.id, "emp-troll", "Account was compromised", None)
        .await
        .unwrap();
    h.appeals
        .review(
            appeal.id,
            "reviewer-1",
            AppealEvent::Approve,
            Some(AppealDecision::Overturned),
            None,
            None,
        )
        .await
        .unwrap();

    assert!(!h.punishments.has_blocking("emp-troll").await.unwrap());
}

#[tokio::test]
async fn bulk_decide_reports_per_item_outcomes() {
    let h = harness().await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let record = h
            .moderation
            .report(
                ContentType::Post,
                &format!("post-{}", i),
                &format!("emp-{}", i),
                Some("emp-reporter"),
                ContentCategory::Spam,
                "Link farm",
                Some(0.88),
            )
            .await
            .unwrap();
        ids.push(record.id);
    }
    // One unknown id mixed in
    ids.push(99999);

    let outcome = h
        .moderation
        .bulk_decide(
            &ids,
            ModerationEvent::Reject,
            Some(ActionTaken::ContentRemoval),
            "mod-1",
        )
        .await
        .unwrap();

    assert_eq!(outcome.succeeded.len(), 3);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].id, 99999);
    assert!(outcome.failed[0].reason.contains("not found"));
}

#[tokio::test]
async fn export_request_completes_with_verifiable_digest() {
    let h = harness().await;
    let dir = tempfile::tempdir().unwrap();
    let privacy = PrivacyRequestManager::new(h.pool.clone(), h.audit.clone(), dir.path().to_path_buf());

    sqlx::query(
        "INSERT INTO employee (id, name, email, role, created_at) VALUES ('emp-1', 'Sam', 'sam@corp.example', 'employee', ?)",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&h.pool)
    .await
    .unwrap();

    let request = privacy
        .request_export("emp-1", &[PersonalDataCategory::Profile, PersonalDataCategory::Usage])
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    let done = privacy.process_export(request.id, "admin-1").await.unwrap();
    assert_eq!(done.status, RequestStatus::Completed);
    assert!(done.completion_date.is_some());

    // The recorded digest matches the bytes on disk
    use sha2::{Digest, Sha256};
    let bytes = std::fs::read(done.file_path.as_ref().unwrap()).unwrap();
    assert_eq!(done.file_hash.unwrap(), hex::encode(Sha256::digest(&bytes)));

    // Privacy audit entry exists
    let audit = h
        .audit
        .search(
            &AuditSearch {
                action: Some(AuditAction::DataExport),
                ..Default::default()
            },
            1,
            10,
        )
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].success);
}

#[tokio::test]
async fn notification_events_reach_subscribed_channels_only() {
    let h = harness().await;

    h.notifications
        .notify("emp-1", "moderation", "Decision on your post", None)
        .await
        .unwrap();
    h.notifications
        .broadcast(channel::CORPORATE, "announcement", "All hands Friday", None)
        .await
        .unwrap();
    h.notifications
        .broadcast(&channel::department(9), "announcement", "Dept only", None)
        .await
        .unwrap();

    // emp-1 subscribes to their personal channel plus corporate
    let subscription = vec![channel::employee("emp-1"), channel::CORPORATE.to_string()];
    let events = h.events.events_after(0, &subscription, 100).await.unwrap();

    let titles: Vec<_> = events.iter().map(|e| e.payload.title.as_str()).collect();
    assert_eq!(titles, vec!["Decision on your post", "All hands Friday"]);

    // Unread state is tracked by the store, not the stream
    assert_eq!(h.notifications.unread_count("emp-1").await.unwrap(), 1);
}
