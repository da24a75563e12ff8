use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Fixed-interval, fixed-attempt wait used to confirm a funding transfer
/// has landed before staking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Why a poll stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed { attempts: u32 },
    Exhausted,
    Cancelled,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 6,
        }
    }
}

impl PollPolicy {
    /// Zero-interval policy for tests
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            interval: Duration::ZERO,
            max_attempts,
        }
    }

    /// Upper bound on how long `poll` can block, saturating at `Duration::MAX`
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }

    /// Sleep one interval, then ask `check`, up to `max_attempts` times.
    ///
    /// `check` returns `Some(true)` once satisfied; `Some(false)` and `None`
    /// (a failed check) both count as a spent attempt. A `true` on
    /// `shutdown` ends the wait early.
    pub async fn poll<F, Fut>(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        mut check: F,
    ) -> PollOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<bool>>,
    {
        for attempt in 1..=self.max_attempts {
            if *shutdown.borrow() {
                return PollOutcome::Cancelled;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    // a dropped sender can't signal shutdown any more; keep polling
                    if changed.is_ok() && *shutdown.borrow() {
                        return PollOutcome::Cancelled;
                    }
                    tokio::time::sleep(self.interval).await;
                }
            }

            if check(attempt).await == Some(true) {
                return PollOutcome::Confirmed { attempts: attempt };
            }
            debug!("Poll attempt {}/{} not yet satisfied", attempt, self.max_attempts);
        }

        PollOutcome::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_confirms_on_matching_attempt() {
        let (_tx, mut rx) = watch::channel(false);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let outcome = PollPolicy::immediate(6)
            .poll(&mut rx, move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Some(attempt == 3) }
            })
            .await;

        assert_eq!(outcome, PollOutcome::Confirmed { attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_checks_spend_attempts() {
        let (_tx, mut rx) = watch::channel(false);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let outcome = PollPolicy::immediate(4)
            .poll(&mut rx, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { None }
            })
            .await;

        assert_eq!(outcome, PollOutcome::Exhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_waits_between_attempts() {
        let (_tx, mut rx) = watch::channel(false);
        let policy = PollPolicy::default();
        assert_eq!(policy.budget(), Duration::from_secs(60));

        let started = tokio::time::Instant::now();
        let outcome = policy.poll(&mut rx, |_| async { Some(false) }).await;

        assert_eq!(outcome, PollOutcome::Exhausted);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[test]
    fn test_budget_saturates() {
        let huge = PollPolicy {
            interval: Duration::from_secs(u64::MAX / 2),
            max_attempts: 6,
        };
        assert_eq!(huge.budget(), Duration::MAX);
        assert_eq!(PollPolicy::immediate(6).budget(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_wait() {
        let (tx, mut rx) = watch::channel(false);
        let policy = PollPolicy::default();

        let handle = tokio::spawn(async move {
            policy.poll(&mut rx, |_| async { Some(false) }).await
        });

        tokio::time::sleep(Duration::from_secs(15)).await;
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), PollOutcome::Cancelled);
    }
}
