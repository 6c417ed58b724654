//! In-memory coordination service with etcd-like single-winner elections.
//!
//! Candidates for a key queue in registration order; the head of the queue
//! is the recorded winner and everyone else's `campaign` stays pending.
//! Leases live until the cancellation signal they were bound to fires or
//! [`MemCoordination::expire_session`] simulates a TTL lapse. Used by the
//! integration tests and wherever a process-local stand-in for the real
//! service is enough.

use crate::coordination::{
    Coordination, EventKind, LeaderRecord, LeaseId, Session, WatchEvent, WatchResponse, WatchStream,
};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct SessionEntry {
    done: CancellationToken,
}

#[derive(Debug, Clone)]
struct Candidate {
    lease: LeaseId,
    value: String,
    record_key: String,
}

#[derive(Debug)]
struct ElectionState {
    candidates: VecDeque<Candidate>,
    // Bumped whenever the queue changes; pending campaigns re-check on it.
    version: watch::Sender<u64>,
}

impl Default for ElectionState {
    fn default() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            candidates: VecDeque::new(),
            version,
        }
    }
}

impl ElectionState {
    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[derive(Debug, Default)]
struct Inner {
    sessions: DashMap<LeaseId, SessionEntry>,
    elections: DashMap<String, ElectionState>,
    watchers: DashMap<String, Vec<mpsc::UnboundedSender<WatchResponse>>>,
    fail_sessions: AtomicBool,
    session_attempts: AtomicU64,
    ops: AtomicU64,
    seq: AtomicU64,
}

#[derive(Debug, Default)]
pub struct MemCoordination {
    inner: Arc<Inner>,
}

impl MemCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `new_session` fail until reset; simulates an unreachable
    /// coordination service.
    pub fn set_fail_sessions(&self, fail: bool) {
        self.inner.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Number of `new_session` calls observed, successful or not.
    pub fn session_attempts(&self) -> u64 {
        self.inner.session_attempts.load(Ordering::SeqCst)
    }

    /// Total service calls observed across all operations.
    pub fn op_count(&self) -> u64 {
        self.inner.ops.load(Ordering::SeqCst)
    }

    /// Simulates the lease lapsing: fires the session's done signal, removes
    /// its candidates from every election, and emits deletion events for
    /// their records.
    pub fn expire_session(&self, lease: LeaseId) {
        self.inner.expire_session(lease);
    }

    /// Terminates every subscription on `record_key` with a canceled
    /// response; simulates record history compaction.
    pub fn cancel_watch(&self, record_key: &str) {
        if let Some((_, senders)) = self.inner.watchers.remove(record_key) {
            let resp = WatchResponse {
                canceled: true,
                events: Vec::new(),
            };
            for tx in senders {
                let _ = tx.send(resp.clone());
            }
        }
    }

    /// Lease currently holding the recorded win for `key`, if any.
    pub fn holder_of(&self, key: &str) -> Option<LeaseId> {
        self.inner
            .elections
            .get(key)
            .and_then(|election| election.candidates.front().map(|head| head.lease))
    }

    /// Record keys with live subscriptions.
    pub fn watched_keys(&self) -> usize {
        self.inner.watchers.len()
    }
}

impl Inner {
    fn expire_session(&self, lease: LeaseId) {
        if let Some((_, entry)) = self.sessions.remove(&lease) {
            entry.done.cancel();
        }
        let mut removed = Vec::new();
        for mut election in self.elections.iter_mut() {
            let before = election.candidates.len();
            election.candidates.retain(|c| {
                if c.lease == lease {
                    removed.push(c.record_key.clone());
                    false
                } else {
                    true
                }
            });
            if election.candidates.len() != before {
                election.bump();
            }
        }
        debug!(%lease, records = removed.len(), "expired session");
        for record_key in removed {
            self.emit(&record_key, EventKind::Delete);
        }
    }

    fn emit(&self, record_key: &str, kind: EventKind) {
        let resp = WatchResponse {
            canceled: false,
            events: vec![WatchEvent {
                kind,
                key: record_key.to_string(),
            }],
        };
        // A deleted record gets no further events; its subscriptions end
        // with this notification.
        if kind == EventKind::Delete {
            if let Some((_, senders)) = self.watchers.remove(record_key) {
                for tx in senders {
                    let _ = tx.send(resp.clone());
                }
            }
            return;
        }
        let mut drained = false;
        if let Some(mut senders) = self.watchers.get_mut(record_key) {
            senders.retain(|tx| tx.send(resp.clone()).is_ok());
            drained = senders.is_empty();
        }
        if drained {
            self.watchers
                .remove_if(record_key, |_, senders| senders.is_empty());
        }
    }

    fn head_record(&self, key: &str) -> Option<LeaderRecord> {
        self.elections.get(key).and_then(|election| {
            election.candidates.front().map(|head| LeaderRecord {
                key: head.record_key.clone(),
                value: head.value.clone(),
            })
        })
    }

    fn is_head(&self, key: &str, lease: LeaseId) -> bool {
        self.elections
            .get(key)
            .and_then(|election| election.candidates.front().map(|head| head.lease == lease))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Coordination for MemCoordination {
    async fn new_session(&self, _ttl: Duration, cancel: CancellationToken) -> Result<Arc<Session>> {
        self.inner.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.session_attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_sessions.load(Ordering::SeqCst) {
            return Err(Error::Transport(anyhow::anyhow!(
                "coordination service unavailable"
            )));
        }
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }
        let lease = LeaseId::new();
        let done = CancellationToken::new();
        self.inner.sessions.insert(lease, SessionEntry { done: done.clone() });

        // The lease lives only as long as the signal it was bound to; when
        // the holder shuts down its records are deleted so a successor can
        // win.
        let inner = Arc::clone(&self.inner);
        let lease_done = done.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => inner.expire_session(lease),
                _ = lease_done.cancelled() => {}
            }
        });
        debug!(%lease, "created session");
        Ok(Arc::new(Session::new(lease, done)))
    }

    async fn campaign(&self, session: &Session, key: &str, value: &str) -> Result<()> {
        self.inner.ops.fetch_add(1, Ordering::SeqCst);
        if session.is_done() {
            return Err(Error::Election(anyhow::anyhow!(
                "session {} expired",
                session.lease()
            )));
        }

        // Register once per (session, key); a candidate that was deleted
        // re-registers at the tail with a fresh record.
        let (mut version, put_key) = {
            let mut election = self.inner.elections.entry(key.to_string()).or_default();
            let version = election.version.subscribe();
            let put_key = if election
                .candidates
                .iter()
                .any(|c| c.lease == session.lease())
            {
                None
            } else {
                let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
                let record_key = format!("{key}/{seq}");
                election.candidates.push_back(Candidate {
                    lease: session.lease(),
                    value: value.to_string(),
                    record_key: record_key.clone(),
                });
                election.bump();
                Some(record_key)
            };
            (version, put_key)
        };
        if let Some(record_key) = put_key {
            self.inner.emit(&record_key, EventKind::Put);
        }

        loop {
            if self.inner.is_head(key, session.lease()) {
                return Ok(());
            }
            tokio::select! {
                changed = version.changed() => {
                    if changed.is_err() {
                        return Err(Error::Transport(anyhow::anyhow!("election dropped")));
                    }
                }
                _ = session.done() => {
                    return Err(Error::Election(anyhow::anyhow!(
                        "session {} expired while campaigning",
                        session.lease()
                    )));
                }
            }
        }
    }

    async fn leader(&self, key: &str) -> Result<LeaderRecord> {
        self.inner.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.head_record(key).ok_or(Error::NoLeader)
    }

    fn watch(&self, key: &str) -> WatchStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.watchers.entry(key.to_string()).or_default().push(tx);
        rx
    }

    async fn resign(&self, session: &Session, key: &str) -> Result<()> {
        self.inner.ops.fetch_add(1, Ordering::SeqCst);
        let removed = self.inner.elections.get_mut(key).and_then(|mut election| {
            let pos = election
                .candidates
                .iter()
                .position(|c| c.lease == session.lease())?;
            let candidate = election.candidates.remove(pos)?;
            election.bump();
            Some(candidate.record_key)
        });
        if let Some(record_key) = removed {
            self.inner.emit(&record_key, EventKind::Delete);
        }
        Ok(())
    }
}
