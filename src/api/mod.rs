/// API routes and handlers
pub mod audit;
pub mod directory;
pub mod health;
pub mod knowledge;
pub mod middleware;
pub mod moderation;
pub mod notifications;
pub mod privacy;
pub mod stream;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(moderation::routes())
        .merge(audit::routes())
        .merge(privacy::routes())
        .merge(directory::routes())
        .merge(knowledge::routes())
        .merge(notifications::routes())
        .merge(stream::routes())
}
