//! Linear backoff between retry attempts.

use std::time::Duration;

/// Delay after failed attempt `attempt` (zero-based): `base * (attempt + 1)`.
pub fn linear_backoff(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(attempt.saturating_add(1))
}
