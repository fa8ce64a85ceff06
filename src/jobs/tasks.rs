/// Background task implementations
use crate::{context::AppContext, error::HubResult};

/// Appeals pending longer than this are expired by the sweep
const APPEAL_EXPIRY_DAYS: i64 = 30;

/// Mark stale active punishments as expired
pub async fn sweep_expired_punishments(ctx: &AppContext) -> HubResult<u64> {
    ctx.punishments.sweep_expired().await
}

/// Expire appeals that sat pending past the review window
pub async fn expire_stale_appeals(ctx: &AppContext) -> HubResult<u64> {
    ctx.appeals.expire_stale(APPEAL_EXPIRY_DAYS).await
}

/// Hard-delete audit entries past their retention date
pub async fn cleanup_audit_log(ctx: &AppContext) -> HubResult<u64> {
    ctx.audit.cleanup().await
}

/// Prune channel events past the event retention window
pub async fn prune_channel_events(ctx: &AppContext) -> HubResult<u64> {
    ctx.events.prune(ctx.config.retention.event_days).await
}

/// Health check - verify the database is reachable
pub async fn health_check(ctx: &AppContext) -> HubResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}
