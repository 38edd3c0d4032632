use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Outcome of one attempt of a retried task
#[derive(Debug, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    /// Lost a race; run again after the backoff
    Retry,
}

/// Runs `task` until it is done, fails, or the policy's retries run out.
///
/// `Err` from the task is returned immediately. `Attempt::Retry` sleeps with
/// exponential backoff and jitter, capped at `max_delay_ms`.
/// `max_retries == 0` retries forever.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: BackoffPolicy,
    mut task: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let mut retries = 0usize;
    let mut delay = policy.base_delay_ms;

    loop {
        match task().await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Retry => {
                retries += 1;
                if policy.max_retries > 0 && retries >= policy.max_retries {
                    warn!("Task failed after {} retries", retries);
                    return Err(Error::RetryTaskFailed(format!(
                        "gave up after {retries} retries"
                    )));
                }
                if delay > 0 {
                    let jitter = rand::thread_rng().gen_range(0..=delay / 2);
                    let wait = (delay + jitter).min(policy.max_delay_ms);
                    debug!(retries, wait_ms = wait, "retrying task");
                    sleep(Duration::from_millis(wait)).await;
                    delay = (delay * 2).min(policy.max_delay_ms);
                }
            }
        }
    }
}

// Helper function to spawn tasks and track their JoinHandles
pub(crate) async fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<tokio::task::JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}
