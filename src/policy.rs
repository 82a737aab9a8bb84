//! Picks the rate limit policy that applies to a request.

use chrono::{DateTime, Utc};

use crate::rate_limit_config::{RateLimitConfig, RateLimitPolicy};

/// Policy chosen for a request and whether a promotional override supplied it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPolicy<'a> {
    pub policy: &'a RateLimitPolicy,
    pub is_override: bool,
}

/// The first override (in configured order) that matches `path` exactly and is
/// active at `now` wins, regardless of auth state. Otherwise the auth tier applies.
pub fn resolve<'a>(
    path: &str,
    is_authenticated: bool,
    now: DateTime<Utc>,
    config: &'a RateLimitConfig,
) -> ResolvedPolicy<'a> {
    if let Some(event) = config.overrides().iter().find(|event| event.is_active(path, now)) {
        return ResolvedPolicy {
            policy: &event.policy,
            is_override: true,
        };
    }

    let policy = if is_authenticated {
        config.authenticated()
    } else {
        config.unauthenticated()
    };

    ResolvedPolicy {
        policy,
        is_override: false,
    }
}
