//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use evidenceforge_common::errors::AppError;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Global rate limiter shared by every route
pub type GlobalRateLimiter = DefaultDirectRateLimiter;

/// Shared limiter together with the configured rate for error reporting
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

/// Create a new rate limiter. Zero values are raised to one.
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> RateLimitState {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    let quota = Quota::per_second(rate).allow_burst(burst);

    RateLimitState {
        limiter: Arc::new(RateLimiter::direct(quota)),
        requests_per_second: rate.get(),
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match state.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited {
                limit: state.requests_per_second,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::router_with;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use evidenceforge_common::AppConfig;
    use tower::ServiceExt;

    #[test]
    fn test_rate_limiter_creation() {
        let state = create_rate_limiter(100, 200);
        assert!(state.limiter.check().is_ok());
        assert_eq!(state.requests_per_second, 100);
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let state = create_rate_limiter(0, 0);
        assert_eq!(state.requests_per_second, 1);
        assert!(state.limiter.check().is_ok());
        assert!(state.limiter.check().is_err());
    }

    #[tokio::test]
    async fn test_burst_exhaustion_returns_429() {
        let mut config = AppConfig::default();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = router_with(Vec::new(), config);

        let first = app
            .clone()
            .oneshot(Request::get("/v2/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(Request::get("/v2/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
