//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before reconnect attempt `attempt` (1-based; 0 means no delay).
/// Doubles from `base_ms`, is capped at `max_ms`, then up to 10% jitter is added.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth() {
        assert_eq!(calculate_backoff(0, 100, 5000), Duration::ZERO);

        let first = calculate_backoff(1, 100, 5000).as_millis();
        assert!((100..110).contains(&first));

        let third = calculate_backoff(3, 100, 5000).as_millis();
        assert!((400..440).contains(&third));
    }

    #[test]
    fn test_backoff_cap() {
        let capped = calculate_backoff(40, 100, 5000).as_millis();
        assert!((5000..5500).contains(&capped));
    }
}
