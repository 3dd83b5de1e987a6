use std::fmt::Display;
use std::future::Future;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Runs `task` until it succeeds, each attempt bounded by `policy.timeout()`,
/// sleeping with exponential backoff (capped at `policy.max_delay()`) in
/// between. Gives up after `policy.max_retries` attempts.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P, E>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = std::result::Result<P, E>>,
    E: Display,
{
    let mut retries = 0;
    let mut delay = policy.base_delay();
    let mut last = String::from("no attempt made");

    while retries < policy.max_retries {
        match timeout(policy.timeout(), task()).await {
            Ok(Ok(r)) => {
                return Ok(r);
            }
            Ok(Err(error)) => {
                warn!(attempt = retries + 1, "task failed: {}", error);
                last = error.to_string();
            }
            Err(_) => {
                warn!(attempt = retries + 1, "task timed out after {:?}", policy.timeout());
                last = format!("timed out after {:?}", policy.timeout());
            }
        };

        retries += 1;
        if retries < policy.max_retries {
            sleep(delay).await;
            delay = (delay * 2).min(policy.max_delay());
        }
    }

    warn!("task failed after {} retries", retries);
    Err(Error::RetryExhausted { retries, last })
}
