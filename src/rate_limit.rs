/// Rate Limiting System
use crate::{
    config::RateLimitSettings,
    error::{HubError, HubResult},
};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    unauthenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    moderator: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let auth_quota = Quota::per_second(
            NonZeroU32::new(settings.authenticated_rps).unwrap_or(NonZeroU32::new(100).unwrap()),
        )
        .allow_burst(NonZeroU32::new(settings.burst_size).unwrap_or(NonZeroU32::new(50).unwrap()));

        let unauth_quota = Quota::per_second(
            NonZeroU32::new(settings.unauthenticated_rps).unwrap_or(NonZeroU32::new(10).unwrap()),
        )
        .allow_burst(
            NonZeroU32::new(settings.burst_size / 5).unwrap_or(NonZeroU32::new(10).unwrap()),
        );

        let moderator_quota = Quota::per_second(
            NonZeroU32::new(settings.moderator_rps).unwrap_or(NonZeroU32::new(1000).unwrap()),
        )
        .allow_burst(
            NonZeroU32::new(settings.burst_size * 2).unwrap_or(NonZeroU32::new(100).unwrap()),
        );

        Self {
            enabled: settings.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
            moderator: Arc::new(GovernorLimiter::direct(moderator_quota)),
        }
    }

    /// Check rate limit for authenticated requests
    pub fn check_authenticated(&self) -> HubResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.authenticated.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(HubError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }

    /// Check rate limit for unauthenticated requests
    pub fn check_unauthenticated(&self) -> HubResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.unauthenticated.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(HubError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }

    /// Check rate limit for moderator/admin endpoints
    pub fn check_moderator(&self) -> HubResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.moderator.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(HubError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path();
    let is_staff_endpoint = path.starts_with("/api/moderation")
        || path.starts_with("/api/appeals")
        || path.starts_with("/api/audit")
        || path.starts_with("/api/privacy/requests");

    let has_auth_header = request.headers().get("authorization").is_some();

    let rate_limit_result = if is_staff_endpoint && has_auth_header {
        ctx.rate_limiter.check_moderator()
    } else if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_unauthenticated()
    };

    match rate_limit_result {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool) -> RateLimitSettings {
        RateLimitSettings {
            enabled,
            authenticated_rps: 10,
            unauthenticated_rps: 5,
            moderator_rps: 100,
            burst_size: 5,
        }
    }

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&settings(true));

        for _ in 0..5 {
            assert!(limiter.check_authenticated().is_ok());
        }
        assert!(limiter.check_authenticated().is_err());
    }

    #[test]
    fn test_disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(&settings(false));

        for _ in 0..100 {
            assert!(limiter.check_unauthenticated().is_ok());
        }
    }
}
