use crate::error::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{hash::Hash, net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

/// Rate limiter keyed by an arbitrary hashable key (IP, chat id, ...).
pub type KeyedRateLimiter<K> = Arc<RateLimiter<K, DashMapStateStore<K>, DefaultClock>>;

/// Rate limiter keyed by IP address.
pub type IpRateLimiter = KeyedRateLimiter<SocketAddr>;

/// Create a keyed rate limiter allowing `attempts` per `window_seconds`,
/// with the full allowance available as a burst.
pub fn create_keyed_rate_limiter<K>(attempts: u32, window_seconds: u64) -> KeyedRateLimiter<K>
where
    K: Hash + Eq + Clone,
{
    let attempts = attempts.max(1);
    // A zero period is rejected by governor; clamp to 1ms so a zero
    // window from configuration cannot abort startup.
    let period_ms = ((window_seconds * 1000) / u64::from(attempts)).max(1);
    let quota = Quota::with_period(Duration::from_millis(period_ms))
        .expect("period is clamped to at least 1ms")
        .allow_burst(NonZeroU32::new(attempts).expect("attempts is guaranteed to be non-zero"));

    Arc::new(RateLimiter::dashmap(quota))
}

/// Create a keyed rate limiter (by IP).
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    create_keyed_rate_limiter(attempts, window_seconds)
}

/// Middleware for IP-based rate limiting.
///
/// Prefers x-forwarded-for (first hop) so the limiter works behind a
/// reverse proxy, falling back to the socket peer address.
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());

    let addr = if let Some(ip) = forwarded_ip {
        Some(SocketAddr::new(ip, 0))
    } else {
        request
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|axum::extract::ConnectInfo(addr)| *addr)
    };

    match addr {
        Some(addr) => match limiter.check_key(&addr) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs()),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_limiter_blocks_after_allowance() {
        let limiter = create_keyed_rate_limiter::<i64>(3, 60);
        for _ in 0..3 {
            assert!(limiter.check_key(&7).is_ok());
        }
        assert!(limiter.check_key(&7).is_err());
        // A different key has its own allowance.
        assert!(limiter.check_key(&8).is_ok());
    }

    #[test]
    fn zero_window_is_usable() {
        let limiter = create_keyed_rate_limiter::<i64>(5, 0);
        assert!(limiter.check_key(&1).is_ok());
    }
}
