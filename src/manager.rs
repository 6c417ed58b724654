//! Owner election manager: one session, two concurrent campaign loops, and
//! the role-state surface the rest of the process reads.

use crate::coordination::{Coordination, EventKind, Session, SESSION_TTL};
use crate::retry::{acquire_session, RetryBudget, DEFAULT_SESSION_RETRY};
use crate::state::{Duty, RoleState};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Campaigns for the two duty keys and tracks which duties this process
/// currently owns. Cheap to clone; clones share all state.
///
/// A duty flag is true only while an unbroken chain of won campaign,
/// confirmed leader query, and live watch holds for that duty. Both duty
/// loops campaign on a single shared session, so losing that session drops
/// both duties until it is re-acquired (see DESIGN.md for the trade-off).
#[derive(Clone)]
pub struct OwnerManager {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    state: RoleState,
    coordination: Arc<dyn Coordination>,
    // Replaced wholesale under the write lock; loops clone the Arc out
    // under the read lock and never observe a half-updated handle.
    session: RwLock<Option<Arc<Session>>>,
    cancel: CancellationToken,
}

impl OwnerManager {
    pub fn new(coordination: Arc<dyn Coordination>, id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                state: RoleState::new(),
                coordination,
                session: RwLock::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// The fixed process identity used as the campaign value. Uniqueness
    /// within the fleet is the caller's responsibility.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_owner(&self) -> bool {
        self.inner.state.is(Duty::Primary)
    }

    pub fn is_background_owner(&self) -> bool {
        self.inner.state.is(Duty::Background)
    }

    pub fn set_owner(&self, is_owner: bool) {
        self.inner.state.set(Duty::Primary, is_owner);
    }

    pub fn set_background_owner(&self, is_owner: bool) {
        self.inner.state.set(Duty::Background, is_owner);
    }

    /// Signals both campaign loops to stop at their next suspension point.
    /// Does not wait for them; await the handles from [`campaign_owners`]
    /// for that.
    ///
    /// [`campaign_owners`]: OwnerManager::campaign_owners
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Creates the initial session with the bounded retry budget, then
    /// starts one campaign loop per duty. Each returned handle resolves
    /// exactly once when its loop exits; awaiting both is awaiting full
    /// shutdown. Fails with [`Error::Session`] if the initial session cannot
    /// be created within the budget, or [`Error::Canceled`] if cancellation
    /// fires first.
    pub async fn campaign_owners(&self) -> Result<Vec<JoinHandle<()>>> {
        let session = acquire_session(
            &self.inner.coordination,
            &self.inner.cancel,
            RetryBudget::Bounded(DEFAULT_SESSION_RETRY),
            SESSION_TTL,
        )
        .await?;
        self.inner.replace_session(session);

        let handles = [Duty::Primary, Duty::Background]
            .into_iter()
            .map(|duty| {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.campaign_loop(duty).await })
            })
            .collect();
        Ok(handles)
    }
}

impl Inner {
    fn current_session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    fn replace_session(&self, session: Arc<Session>) {
        *self.session.write() = Some(session);
    }

    async fn campaign_loop(&self, duty: Duty) {
        let key = duty.key();
        loop {
            if self.cancel.is_cancelled() {
                info!(key, id = %self.id, "break campaign loop");
                return;
            }
            let Some(session) = self.current_session() else {
                return;
            };
            if session.is_done() {
                info!(key, id = %self.id, "session is done, creating a new one");
                match acquire_session(
                    &self.coordination,
                    &self.cancel,
                    RetryBudget::Unlimited,
                    SESSION_TTL,
                )
                .await
                {
                    Ok(session) => {
                        self.replace_session(session);
                        continue;
                    }
                    Err(err) => {
                        info!(key, id = %self.id, error = %err, "break campaign loop");
                        return;
                    }
                }
            }

            let result = tokio::select! {
                res = self.coordination.campaign(&session, key, &self.id) => res,
                _ = self.cancel.cancelled() => Err(Error::Canceled),
                _ = session.done() => continue,
            };
            if let Err(err) = result {
                info!(key, id = %self.id, error = %err, "failed to campaign");
                if err.is_canceled() {
                    warn!(key, id = %self.id, "break campaign loop");
                    return;
                }
                continue;
            }

            // Winning the campaign call is not enough; only the recorded
            // winner counts.
            let record = tokio::select! {
                res = self.coordination.leader(key) => res,
                _ = self.cancel.cancelled() => Err(Error::Canceled),
            };
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    info!(key, id = %self.id, error = %err, "failed to get leader");
                    continue;
                }
            };
            if record.value != self.id {
                warn!(key, id = %self.id, leader = %record.value, "not the owner");
                continue;
            }
            info!(key, id = %self.id, "became owner");

            self.state.set(duty, true);
            self.watch_owner(&session, &record.key).await;
            self.state.set(duty, false);
        }
    }

    /// Blocks until leadership over `record_key` is lost: the record is
    /// deleted, the subscription is canceled by the service, the session
    /// dies, or cancellation fires. Value updates on the key are ignored.
    async fn watch_owner(&self, session: &Session, record_key: &str) {
        debug!(key = record_key, id = %self.id, "watching owner record");
        let mut watch = self.coordination.watch(record_key);
        loop {
            tokio::select! {
                resp = watch.recv() => {
                    let Some(resp) = resp else {
                        info!(key = record_key, id = %self.id, "watch stream closed");
                        return;
                    };
                    if resp.canceled {
                        info!(key = record_key, id = %self.id, "watch canceled, no owner");
                        return;
                    }
                    if resp.events.iter().any(|ev| ev.kind == EventKind::Delete) {
                        info!(key = record_key, id = %self.id, "owner record deleted");
                        return;
                    }
                }
                _ = session.done() => {
                    info!(key = record_key, id = %self.id, "session done while watching");
                    return;
                }
                _ = self.cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemCoordination;

    #[test]
    fn setters_drive_the_flags() {
        let manager = OwnerManager::new(Arc::new(MemCoordination::new()), "p1");
        assert_eq!(manager.id(), "p1");
        assert!(!manager.is_owner());

        manager.set_owner(true);
        assert!(manager.is_owner());
        assert!(!manager.is_background_owner());

        manager.set_background_owner(true);
        manager.set_owner(false);
        assert!(!manager.is_owner());
        assert!(manager.is_background_owner());
    }

    #[test]
    fn clones_share_state_and_cancellation() {
        let manager = OwnerManager::new(Arc::new(MemCoordination::new()), "p1");
        let other = manager.clone();
        manager.set_owner(true);
        assert!(other.is_owner());

        other.cancel();
        assert!(manager.cancellation().is_cancelled());
    }
}
