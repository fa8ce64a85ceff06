/// Audit log endpoints
use crate::{
    audit::{AuditAction, AuditCategory, AuditLogEntry, AuditSearch, AuditSeverity},
    auth::AdminAuthContext,
    context::AppContext,
    error::{HubError, HubResult},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build audit routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/audit", get(search_logs))
        .route("/api/audit/:id/review", post(review_entry))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    action: Option<String>,
    category: Option<String>,
    severity: Option<String>,
    actor_id: Option<String>,
    resource_type: Option<String>,
    since: Option<chrono::DateTime<chrono::Utc>>,
    until: Option<chrono::DateTime<chrono::Utc>>,
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

/// Paginated filtered audit search
async fn search_logs(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<SearchQuery>,
) -> HubResult<Json<Vec<AuditLogEntry>>> {
    let filters = AuditSearch {
        action: query.action.as_deref().map(AuditAction::from_str).transpose()?,
        category: query
            .category
            .as_deref()
            .map(AuditCategory::from_str)
            .transpose()?,
        severity: query
            .severity
            .as_deref()
            .map(AuditSeverity::from_str)
            .transpose()?,
        actor_id: query.actor_id,
        resource_type: query.resource_type,
        since: query.since,
        until: query.until,
    };

    let entries = ctx.audit.search(&filters, query.page, query.page_size).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize, Validate)]
struct ReviewRequest {
    #[validate(length(max = 2000))]
    notes: Option<String>,
}

/// Record the review of an audit entry
async fn review_entry(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
    Json(req): Json<ReviewRequest>,
) -> HubResult<Json<serde_json::Value>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    ctx.audit
        .review(id, &auth.employee_id, req.notes.as_deref())
        .await?;
    Ok(Json(serde_json::json!({})))
}
