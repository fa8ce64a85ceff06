/// Moderation, appeal, and punishment endpoints
use crate::{
    auth::{AuthContext, ModeratorAuthContext},
    context::AppContext,
    error::{HubError, HubResult},
    moderation::{
        log as modlog, ActionTaken, AppealDecision, AppealEvent, AppealRecord, AppealStatus,
        BatchOutcome, ContentCategory, ContentType, DecisionOutcome, ModerationEvent,
        ModerationLogEntry, ModerationRecord, ModerationStatus, PunishmentRecord, ReviewOutcome,
    },
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build moderation routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/moderation/reports", post(submit_report))
        .route("/api/moderation/records", get(queue))
        .route("/api/moderation/records/:id", get(get_record))
        .route("/api/moderation/records/:id/history", get(get_history))
        .route("/api/moderation/records/:id/decide", post(decide))
        .route("/api/moderation/records/:id/escalate", post(escalate))
        .route("/api/moderation/bulk-decide", post(bulk_decide))
        .route("/api/appeals", post(submit_appeal))
        .route("/api/appeals", get(list_appeals))
        .route("/api/appeals/:id/review", post(review_appeal))
        .route("/api/punishments", post(apply_punishment))
        .route("/api/punishments/employee/:id", get(punishment_history))
        .route("/api/punishments/:id/revoke", post(revoke_punishment))
}

// ========== Moderation records ==========

#[derive(Debug, Deserialize, Validate)]
struct SubmitReportRequest {
    content_type: String,
    #[validate(length(min = 1, max = 256))]
    content_id: String,
    #[validate(length(min = 1, max = 256))]
    author_id: String,
    category: String,
    #[validate(length(min = 3, max = 2000))]
    reason: String,
    #[validate(range(min = 0.0, max = 1.0))]
    confidence: Option<f64>,
}

/// Report a piece of content
async fn submit_report(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<SubmitReportRequest>,
) -> HubResult<Json<ModerationRecord>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let record = ctx
        .moderation
        .report(
            ContentType::from_str(&req.content_type)?,
            &req.content_id,
            &req.author_id,
            Some(&auth.employee_id),
            ContentCategory::from_str(&req.category)?,
            &req.reason,
            req.confidence,
        )
        .await?;

    // Let the moderator channel know there is new work
    let _ = ctx
        .notifications
        .broadcast(
            &crate::notify::channel::role("moderator"),
            "moderation",
            "New content report",
            Some(&format!("{} report on {}", record.category.as_str(), record.content_id)),
        )
        .await;

    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct QueueQuery {
    status: Option<String>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

/// Review queue
async fn queue(
    State(ctx): State<AppContext>,
    _auth: ModeratorAuthContext,
    Query(query): Query<QueueQuery>,
) -> HubResult<Json<Vec<ModerationRecord>>> {
    let status = query
        .status
        .as_deref()
        .map(ModerationStatus::from_str)
        .transpose()?;

    let records = ctx
        .moderation
        .queue(status, query.page, query.page_size)
        .await?;
    Ok(Json(records))
}

/// Get a single record
async fn get_record(
    State(ctx): State<AppContext>,
    _auth: ModeratorAuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<ModerationRecord>> {
    Ok(Json(ctx.moderation.get(id).await?))
}

/// Transition history for a record
async fn get_history(
    State(ctx): State<AppContext>,
    _auth: ModeratorAuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<Vec<ModerationLogEntry>>> {
    // 404 before returning an empty history for an unknown id
    ctx.moderation.get(id).await?;
    Ok(Json(modlog::history(&ctx.db, id).await?))
}

#[derive(Debug, Deserialize)]
struct DecideRequest {
    event: String,
    action_taken: Option<String>,
    notes: Option<String>,
}

/// Decide a record
async fn decide(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Path(id): Path<i64>,
    Json(req): Json<DecideRequest>,
) -> HubResult<Json<DecisionOutcome>> {
    let event = ModerationEvent::from_str(&req.event)?;
    let action = req
        .action_taken
        .as_deref()
        .map(ActionTaken::from_str)
        .transpose()?;

    let outcome = ctx
        .moderation
        .decide(id, event, action, &auth.employee_id, req.notes.as_deref())
        .await?;

    // Tell the author what happened
    let _ = ctx
        .notifications
        .notify(
            &outcome.record.author_id,
            "moderation",
            "Moderation decision on your content",
            Some(&format!(
                "Your {} is now {}",
                outcome.record.content_type.as_str(),
                outcome.record.status.as_str()
            )),
        )
        .await;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, Validate)]
struct EscalateRequest {
    #[validate(length(min = 3, max = 2000))]
    reason: String,
}

/// Escalate a record
async fn escalate(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Path(id): Path<i64>,
    Json(req): Json<EscalateRequest>,
) -> HubResult<Json<ModerationRecord>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let record = ctx
        .moderation
        .escalate(id, &req.reason, &auth.employee_id)
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize, Validate)]
struct BulkDecideRequest {
    #[validate(length(min = 1, max = 100))]
    ids: Vec<i64>,
    event: String,
    action_taken: Option<String>,
}

/// Decide many records at once; the response reports every item
async fn bulk_decide(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Json(req): Json<BulkDecideRequest>,
) -> HubResult<Json<BatchOutcome>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let event = ModerationEvent::from_str(&req.event)?;
    let action = req
        .action_taken
        .as_deref()
        .map(ActionTaken::from_str)
        .transpose()?;

    let outcome = ctx
        .moderation
        .bulk_decide(&req.ids, event, action, &auth.employee_id)
        .await?;
    Ok(Json(outcome))
}

// ========== Appeals ==========

#[derive(Debug, Deserialize, Validate)]
struct SubmitAppealRequest {
    record_id: i64,
    #[validate(length(min = 3, max = 4000))]
    reason: String,
    evidence: Option<String>,
}

/// Submit an appeal against a decided record
async fn submit_appeal(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<SubmitAppealRequest>,
) -> HubResult<Json<AppealRecord>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let appeal = ctx
        .appeals
        .submit(
            req.record_id,
            &auth.employee_id,
            &req.reason,
            req.evidence.as_deref(),
        )
        .await?;
    Ok(Json(appeal))
}

#[derive(Debug, Deserialize)]
struct ListAppealsQuery {
    status: Option<String>,
    #[serde(default = "default_page_size")]
    limit: i64,
}

/// List appeals for review
async fn list_appeals(
    State(ctx): State<AppContext>,
    _auth: ModeratorAuthContext,
    Query(query): Query<ListAppealsQuery>,
) -> HubResult<Json<Vec<AppealRecord>>> {
    let status = query
        .status
        .as_deref()
        .map(AppealStatus::from_str)
        .transpose()?;

    Ok(Json(ctx.appeals.list(status, query.limit).await?))
}

#[derive(Debug, Deserialize)]
struct ReviewAppealRequest {
    event: String,
    decision: Option<String>,
    result_action: Option<String>,
    response: Option<String>,
}

/// Review an appeal
async fn review_appeal(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Path(id): Path<i64>,
    Json(req): Json<ReviewAppealRequest>,
) -> HubResult<Json<ReviewOutcome>> {
    let event = AppealEvent::from_str(&req.event)?;
    let decision = req
        .decision
        .as_deref()
        .map(AppealDecision::from_str)
        .transpose()?;
    let result_action = req
        .result_action
        .as_deref()
        .map(ActionTaken::from_str)
        .transpose()?;

    let outcome = ctx
        .appeals
        .review(
            id,
            &auth.employee_id,
            event,
            decision,
            result_action,
            req.response.as_deref(),
        )
        .await?;

    let _ = ctx
        .notifications
        .notify(
            &outcome.appeal.employee_id,
            "appeal",
            "Your appeal was reviewed",
            Some(&format!("Outcome: {}", outcome.appeal.status.as_str())),
        )
        .await;

    Ok(Json(outcome))
}

// ========== Punishments ==========

#[derive(Debug, Deserialize, Validate)]
struct ApplyPunishmentRequest {
    #[validate(length(min = 1, max = 256))]
    employee_id: String,
    record_id: Option<i64>,
    kind: String,
    severity: String,
    #[validate(length(min = 3, max = 2000))]
    reason: String,
    /// Days until expiry; omitted means permanent
    #[validate(range(min = 1, max = 3650))]
    duration_days: Option<i64>,
}

/// Apply a sanction directly, outside a moderation decision
async fn apply_punishment(
    State(ctx): State<AppContext>,
    _auth: ModeratorAuthContext,
    Json(req): Json<ApplyPunishmentRequest>,
) -> HubResult<Json<PunishmentRecord>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let kind = crate::moderation::PunishmentKind::from_str(&req.kind)?;
    // Severity label is validated even though it is stored as text
    let severity = crate::moderation::Severity::from_str(&req.severity)?;
    let sanction = match req.duration_days {
        Some(days) => crate::moderation::Sanction::For(chrono::Duration::days(days)),
        None => crate::moderation::Sanction::Permanent,
    };

    let record = ctx
        .punishments
        .apply(
            &req.employee_id,
            req.record_id,
            kind,
            severity.as_str(),
            &req.reason,
            sanction,
        )
        .await?;

    let _ = ctx
        .notifications
        .notify(
            &req.employee_id,
            "moderation",
            "A sanction was applied to your account",
            Some(&req.reason),
        )
        .await;

    Ok(Json(record))
}

/// Sanction history for an employee
async fn punishment_history(
    State(ctx): State<AppContext>,
    _auth: ModeratorAuthContext,
    Path(id): Path<String>,
) -> HubResult<Json<Vec<PunishmentRecord>>> {
    Ok(Json(ctx.punishments.history(&id).await?))
}

/// Revoke a punishment
async fn revoke_punishment(
    State(ctx): State<AppContext>,
    auth: ModeratorAuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<serde_json::Value>> {
    ctx.punishments.revoke(id, &auth.employee_id).await?;
    Ok(Json(serde_json::json!({ "revoked": id })))
}
