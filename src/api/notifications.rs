/// Persistent notification endpoints
use crate::{
    auth::{AdminAuthContext, AuthContext},
    context::AppContext,
    error::{HubError, HubResult},
    notify::{channel, Notification},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build notification routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/:id/read", post(mark_read))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/broadcast", post(broadcast))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    unread_only: bool,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// The caller's notifications
async fn list_notifications(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> HubResult<Json<Vec<Notification>>> {
    let notifications = ctx
        .notifications
        .list(&auth.employee_id, query.unread_only, query.limit)
        .await?;
    Ok(Json(notifications))
}

/// Unread count for the caller
async fn unread_count(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<serde_json::Value>> {
    let count = ctx.notifications.unread_count(&auth.employee_id).await?;
    Ok(Json(serde_json::json!({ "unread": count })))
}

/// Mark one notification read
async fn mark_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<serde_json::Value>> {
    ctx.notifications.mark_read(&auth.employee_id, id).await?;
    Ok(Json(serde_json::json!({})))
}

/// Mark all read
async fn mark_all_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<serde_json::Value>> {
    let marked = ctx.notifications.mark_all_read(&auth.employee_id).await?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}

#[derive(Debug, Deserialize, Validate)]
struct BroadcastRequest {
    /// "corporate", "department:{id}", "team:{id}", "role:{role}", "topic:{tag}"
    #[validate(length(min = 1, max = 128))]
    channel: String,
    #[validate(length(min = 1, max = 300))]
    title: String,
    body: Option<String>,
}

/// Broadcast an announcement to a channel. Corporate announcements and
/// targeted group pushes both go through here.
async fn broadcast(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Json(req): Json<BroadcastRequest>,
) -> HubResult<Json<serde_json::Value>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let valid = req.channel == channel::CORPORATE
        || req.channel.starts_with("department:")
        || req.channel.starts_with("team:")
        || req.channel.starts_with("role:")
        || req.channel.starts_with("topic:");
    if !valid {
        return Err(HubError::Validation(format!(
            "Unknown channel: {}",
            req.channel
        )));
    }

    let seq = ctx
        .notifications
        .broadcast(&req.channel, "announcement", &req.title, req.body.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "seq": seq })))
}
