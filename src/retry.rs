use crate::coordination::{Coordination, Session};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Wait between failed session-creation attempts.
pub const SESSION_RETRY_INTERVAL: Duration = Duration::from_millis(200);
/// Bounded budget used at startup; failure is surfaced to the caller.
pub const DEFAULT_SESSION_RETRY: usize = 3;

/// Attempt budget for classified retries. `Bounded(0)` permits no attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Bounded(usize),
    Unlimited,
}

impl RetryBudget {
    fn take(&mut self) -> bool {
        match self {
            RetryBudget::Bounded(0) => false,
            RetryBudget::Bounded(n) => {
                *n -= 1;
                true
            }
            RetryBudget::Unlimited => true,
        }
    }
}

/// Creates a new session whose lease is bound to a child of `cancel`,
/// retrying on failure every
/// [`SESSION_RETRY_INTERVAL`] up to `budget` attempts. Cancellation aborts
/// immediately without consuming remaining attempts; any other failure is
/// retried until the budget runs out, at which point [`Error::Session`]
/// carries the attempt count and last cause.
pub async fn acquire_session(
    coordination: &Arc<dyn Coordination>,
    cancel: &CancellationToken,
    mut budget: RetryBudget,
    ttl: Duration,
) -> Result<Arc<Session>> {
    let mut attempts = 0usize;
    let mut last: Option<Error> = None;
    while budget.take() {
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }
        attempts += 1;
        match coordination.new_session(ttl, cancel.child_token()).await {
            Ok(session) => return Ok(session),
            Err(err) if err.is_canceled() => return Err(Error::Canceled),
            Err(err) => {
                warn!(attempt = attempts, error = %err, "failed to create session");
                last = Some(err);
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Canceled),
            _ = tokio::time::sleep(SESSION_RETRY_INTERVAL) => {}
        }
    }
    Err(Error::Session {
        attempts,
        source: match last {
            Some(err) => anyhow::Error::new(err),
            None => anyhow::anyhow!("no attempts permitted"),
        },
    })
}
