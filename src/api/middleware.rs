/// Request middleware
use crate::{auth, context::AppContext, error::HubError};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

/// Sanction enforcement middleware
///
/// An employee with an active ban or suspension is blocked from mutating
/// endpoints. Reads stay available so the employee can see their own case
/// and appeal it. Moderators and admins are exempt.
pub async fn enforce_sanctions(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Result<Response, HubError> {
    let method = req.method();
    let is_mutation =
        !(method == Method::GET || method == Method::HEAD || method == Method::OPTIONS);
    // Appeals must remain reachable for sanctioned employees
    let is_appeal = req.uri().path().starts_with("/api/appeals");

    if is_mutation && !is_appeal {
        if let Some(token) = auth::extract_bearer_token(req.headers()) {
            if let Ok(claims) =
                auth::validate_token(&ctx.config.authentication.jwt_secret, &token)
            {
                let is_staff = claims.role.can_act_as(auth::Role::Moderator);
                if !is_staff && ctx.punishments.has_blocking(&claims.sub).await? {
                    return Err(HubError::Sanctioned(
                        "Account is banned or suspended".to_string(),
                    ));
                }
            }
        }
    }

    Ok(next.run(req).await)
}

/// Record request metrics
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(req).await;

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();
    crate::metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}
