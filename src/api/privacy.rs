/// Privacy and compliance endpoints
use crate::{
    auth::{AdminAuthContext, AuthContext},
    context::AppContext,
    error::{HubError, HubResult},
    privacy::{
        ConsentRecord, DataDeletionRequest, DataExportRequest, PersonalDataCategory,
    },
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build privacy routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/privacy/consents", get(current_consents))
        .route("/api/privacy/consents/grant", post(grant_consent))
        .route("/api/privacy/consents/withdraw", post(withdraw_consent))
        .route("/api/privacy/requests/exports", post(request_export))
        .route("/api/privacy/requests/exports/:id", get(get_export))
        .route("/api/privacy/requests/exports/:id/process", post(process_export))
        .route("/api/privacy/requests/exports/:id/reject", post(reject_export))
        .route("/api/privacy/requests/deletions", post(request_deletion))
        .route("/api/privacy/requests/deletions/:id/process", post(process_deletion))
        .route("/api/privacy/requests/deletions/:id/reject", post(reject_deletion))
}

// ========== Consent ==========

#[derive(Debug, Deserialize)]
struct ConsentRequest {
    category: String,
}

/// Current consent state for the caller
async fn current_consents(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> HubResult<Json<Vec<ConsentRecord>>> {
    Ok(Json(ctx.consents.current(&auth.employee_id).await?))
}

/// Grant consent for a category
async fn grant_consent(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ConsentRequest>,
) -> HubResult<Json<ConsentRecord>> {
    let category = PersonalDataCategory::from_str(&req.category)?;
    Ok(Json(ctx.consents.grant(&auth.employee_id, category).await?))
}

/// Withdraw consent for a category
async fn withdraw_consent(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ConsentRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let category = PersonalDataCategory::from_str(&req.category)?;
    ctx.consents.withdraw(&auth.employee_id, category).await?;
    Ok(Json(serde_json::json!({})))
}

// ========== Export requests ==========

#[derive(Debug, Deserialize, Default)]
struct ExportRequest {
    #[serde(default)]
    categories: Vec<String>,
}

/// Request an export of the caller's data
async fn request_export(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ExportRequest>,
) -> HubResult<Json<DataExportRequest>> {
    let categories = req
        .categories
        .iter()
        .map(|c| PersonalDataCategory::from_str(c))
        .collect::<HubResult<Vec<_>>>()?;

    let request = ctx
        .privacy_requests
        .request_export(&auth.employee_id, &categories)
        .await?;
    Ok(Json(request))
}

/// Get an export request. Admins can read any; employees only their own.
async fn get_export(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<DataExportRequest>> {
    let request = ctx.privacy_requests.get_export(id).await?;
    if request.employee_id != auth.employee_id
        && !auth.role.can_act_as(crate::auth::Role::Admin)
    {
        return Err(HubError::Authorization(
            "Not your export request".to_string(),
        ));
    }
    Ok(Json(request))
}

/// Process an export request
async fn process_export(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<DataExportRequest>> {
    let request = ctx
        .privacy_requests
        .process_export(id, &auth.employee_id)
        .await?;

    let _ = ctx
        .notifications
        .notify(
            &request.employee_id,
            "privacy",
            "Your data export is ready",
            None,
        )
        .await;

    Ok(Json(request))
}

#[derive(Debug, Deserialize, Validate)]
struct RejectRequest {
    #[validate(length(min = 3, max = 2000))]
    reason: String,
}

/// Reject an export request
async fn reject_export(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
    Json(req): Json<RejectRequest>,
) -> HubResult<Json<DataExportRequest>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let request = ctx
        .privacy_requests
        .reject_export(id, &auth.employee_id, &req.reason)
        .await?;
    Ok(Json(request))
}

// ========== Deletion requests ==========

#[derive(Debug, Deserialize, Default)]
struct DeletionRequest {
    reason: Option<String>,
}

/// Request deletion of the caller's data
async fn request_deletion(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<DeletionRequest>,
) -> HubResult<Json<DataDeletionRequest>> {
    let request = ctx
        .privacy_requests
        .request_deletion(&auth.employee_id, req.reason.as_deref())
        .await?;
    Ok(Json(request))
}

/// Process a deletion request
async fn process_deletion(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<DataDeletionRequest>> {
    let request = ctx
        .privacy_requests
        .process_deletion(id, &auth.employee_id)
        .await?;
    Ok(Json(request))
}

/// Reject a deletion request
async fn reject_deletion(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
    Json(req): Json<RejectRequest>,
) -> HubResult<Json<DataDeletionRequest>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let request = ctx
        .privacy_requests
        .reject_deletion(id, &auth.employee_id, &req.reason)
        .await?;
    Ok(Json(request))
}
