use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use sparkify_core::ProvisioningError;

/// Exponential backoff with a hard deadline for cluster state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub initial_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub deadline: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            factor: 2,
            max_delay: Duration::from_secs(60),
            deadline: Duration::from_secs(30 * 60),
        }
    }
}

impl WaitPolicy {
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(self.factor).min(self.max_delay)
    }
}

/// Poll `check` until it reports the target state.
///
/// The check runs once immediately, then after each backoff delay. Once the
/// deadline has passed without success the wait fails with
/// [`ProvisioningError::Timeout`]. Check errors end the wait at once.
pub async fn wait_until<F, Fut>(
    policy: &WaitPolicy,
    cluster: &str,
    target: &str,
    mut check: F,
) -> Result<(), ProvisioningError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ProvisioningError>>,
{
    let started = Instant::now();
    let mut delay = policy.initial_delay;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        if check().await? {
            info!(
                cluster,
                target,
                attempt,
                waited_secs = started.elapsed().as_secs(),
                "Cluster reached target state"
            );
            return Ok(());
        }

        let waited = started.elapsed();
        if waited >= policy.deadline {
            return Err(ProvisioningError::Timeout {
                cluster: cluster.to_string(),
                target: target.to_string(),
                waited,
            });
        }
        let sleep_for = delay.min(policy.deadline - waited);
        debug!(
            cluster,
            target,
            attempt,
            delay_secs = sleep_for.as_secs(),
            "Waiting for cluster"
        );
        tokio::time::sleep(sleep_for).await;
        delay = policy.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_double_up_to_the_cap() {
        let policy = WaitPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = vec![delay.as_secs()];
        for _ in 0..5 {
            delay = policy.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![5, 10, 20, 40, 60, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_target_state_is_reached() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = Instant::now();
        wait_until(&WaitPolicy::default(), "dwhcluster", "available", || async move {
            Ok::<_, ProvisioningError>(calls.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .expect("reached");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // 5 s + 10 s of backoff before the third check
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_the_deadline() {
        let policy = WaitPolicy::with_deadline(Duration::from_secs(100));
        let started = Instant::now();
        let err = wait_until(&policy, "dwhcluster", "deleted", || async {
            Ok::<_, ProvisioningError>(false)
        })
            .await
            .expect_err("never reaches state");
        match err {
            ProvisioningError::Timeout { cluster, target, waited } => {
                assert_eq!(cluster, "dwhcluster");
                assert_eq!(target, "deleted");
                assert!(waited >= Duration::from_secs(100));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(101));
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_stop_the_wait() {
        let err = wait_until(&WaitPolicy::default(), "dwhcluster", "available", || async {
            Err::<bool, _>(ProvisioningError::api("DescribeClusters", "access denied"))
        })
        .await
        .expect_err("check failed");
        assert!(matches!(err, ProvisioningError::Api { .. }));
    }
}
