//! Auto-retry backoff policy (spec §4.1.6)

use crate::core::config::SchedulerConfig;
use std::time::Duration;

/// Whether `attempt` (the attempt number that just failed) is still eligible
/// for an automatic retry under `config`.
pub fn eligible_for_auto_retry(config: &SchedulerConfig, retriable: bool, attempt: u32) -> bool {
    retriable && attempt <= config.max_auto_retries
}

/// Whether a failure is final — no automatic path back to `Queued` (spec
/// §4.1.6). Non-retriable errors are always terminal. Retriable errors are
/// terminal once the configured retry budget is exhausted, with one
/// exception: `max_auto_retries == 0` means no automatic retry ever
/// *exists*, so a retriable failure stays non-terminal and can only be
/// revived by `retry_page` or by the page leaving and re-entering the
/// desired set (spec §8 boundary behavior for `MAX_AUTO_RETRIES = 0`).
pub fn is_terminal(config: &SchedulerConfig, retriable: bool, attempt: u32) -> bool {
    if !retriable {
        return true;
    }
    if config.max_auto_retries == 0 {
        return false;
    }
    !eligible_for_auto_retry(config, retriable, attempt)
}

/// Backoff duration before the automatic retry for the attempt that just
/// failed. `attempt` is 1-based; index is `min(attempt-1, len-1)`.
pub fn backoff_for_attempt(config: &SchedulerConfig, attempt: u32) -> Duration {
    let schedule = if config.auto_retry_backoff_ms.is_empty() {
        &[750, 2000][..]
    } else {
        &config.auto_retry_backoff_ms[..]
    };
    let index = ((attempt.max(1) - 1) as usize).min(schedule.len() - 1);
    Duration::from_millis(schedule[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    #[test]
    fn first_attempt_uses_first_backoff_slot() {
        assert_eq!(backoff_for_attempt(&config(), 1), Duration::from_millis(750));
    }

    #[test]
    fn attempts_beyond_schedule_clamp_to_last_slot() {
        assert_eq!(backoff_for_attempt(&config(), 99), Duration::from_millis(2000));
    }

    #[test]
    fn non_retriable_never_eligible() {
        assert!(!eligible_for_auto_retry(&config(), false, 1));
    }

    #[test]
    fn retriable_stops_after_max_auto_retries() {
        let config = config();
        assert!(eligible_for_auto_retry(&config, true, config.max_auto_retries));
        assert!(!eligible_for_auto_retry(&config, true, config.max_auto_retries + 1));
    }

    #[test]
    fn non_retriable_is_always_terminal() {
        assert!(is_terminal(&config(), false, 1));
    }

    #[test]
    fn retriable_is_non_terminal_while_retries_remain() {
        let config = config();
        assert!(!is_terminal(&config, true, config.max_auto_retries));
    }

    #[test]
    fn retriable_becomes_terminal_once_retry_budget_is_exhausted() {
        let config = config();
        assert!(is_terminal(&config, true, config.max_auto_retries + 1));
    }

    #[test]
    fn zero_max_auto_retries_never_terminates_a_retriable_error() {
        let config = SchedulerConfig { max_auto_retries: 0, ..SchedulerConfig::default() };
        assert!(!is_terminal(&config, true, 1));
        assert!(!is_terminal(&config, true, 50));
    }
}
