//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is the number of attempts already made; zero means no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    // Up to half the delay again, so concurrent retries spread out
    let jitter_range = capped_delay / 2;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter).min(Duration::from_millis(max_ms.max(base_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, 25, 250), Duration::ZERO);

        let first = calculate_backoff(1, 25, 250);
        assert!(first >= Duration::from_millis(25) && first < Duration::from_millis(38));

        let second = calculate_backoff(2, 25, 250);
        assert!(second >= Duration::from_millis(50));

        let capped = calculate_backoff(10, 25, 250);
        assert_eq!(capped, Duration::from_millis(250));
    }
}
