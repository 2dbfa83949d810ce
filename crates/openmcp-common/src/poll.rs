//! Poller: drives a predicate to success, failure or timeout

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::conditions::{ConditionCheck, WaitCondition};
use crate::resource::{ResourceGateway, ResourceRef};
use crate::{Error, Result};

/// Default time between attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time budget for one wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline used when `timeout` does not fit in an [`Instant`]
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Time budget and cadence of one wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Total budget
    pub timeout: Duration,
    /// Sleep between attempts
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    /// Budget of `timeout` with the given interval
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Same cadence, different budget
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

/// Poll `check_fn` until it returns `Ok(true)`.
///
/// The predicate is always evaluated at least once. An `Err` from the
/// predicate aborts the wait immediately and is returned unchanged. When the
/// budget is spent, fails with [`Error::Timeout`] naming `description`.
pub async fn poll_until<F, Fut>(
    description: impl Into<String>,
    config: PollConfig,
    mut check_fn: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let description = description.into();
    let start = Instant::now();
    let deadline = start
        .checked_add(config.timeout)
        .unwrap_or_else(|| start + FAR_FUTURE);
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if check_fn().await? {
            debug!(%description, attempts, "wait satisfied");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::timeout(description, config.timeout));
        }
        trace!(%description, attempts, "not satisfied yet, retrying");
        tokio::time::sleep(config.interval.min(deadline - now)).await;
    }
}

/// Poll a [`ConditionCheck`] against `gateway`
pub async fn wait_for(
    gateway: &dyn ResourceGateway,
    check: &ConditionCheck,
    config: PollConfig,
) -> Result<()> {
    poll_until(check.to_string(), config, move || check.evaluate(gateway)).await
}

/// Wait until `resource` reaches `condition`
pub async fn wait_for_condition(
    gateway: &dyn ResourceGateway,
    resource: &ResourceRef,
    condition: WaitCondition,
    config: PollConfig,
) -> Result<()> {
    wait_for(gateway, &condition.on(resource.clone()), config).await
}

/// Wait until every object in `resources` can be fetched
pub async fn wait_for_all_present(
    gateway: &dyn ResourceGateway,
    resources: &[ResourceRef],
    config: PollConfig,
) -> Result<()> {
    poll_until(
        format!("{} objects to exist", resources.len()),
        config,
        move || async move {
            for resource in resources {
                match gateway.get(resource).await {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {
                        trace!(resource = %resource, "not present yet");
                        return Ok(false);
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(true)
        },
    )
    .await
}
