//! Exponential backoff with jitter for broker API retries.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delay before retry number `attempt` (1-based: attempt 1 is the first
/// retry). Grows geometrically, capped at the policy ceiling, with uniform
/// jitter of ±`jitter_factor` applied last.
#[must_use]
pub fn delay_for_attempt(policy: &RetryConfig, attempt: u32) -> Duration {
    let base = policy.initial_backoff().as_millis() as f64;
    let exp = policy.multiplier.powi(attempt.saturating_sub(1) as i32);
    let capped = (base * exp).min(policy.max_backoff().as_millis() as f64);

    let jittered = if policy.jitter_factor > 0.0 {
        let spread = capped * policy.jitter_factor;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        (capped + offset).max(0.0)
    } else {
        capped
    };

    Duration::from_millis(jittered as u64)
}
