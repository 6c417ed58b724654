use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Session lease TTL; a session dies if the service cannot keep its lease
/// alive within this window.
pub const SESSION_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(pub Uuid);

impl LeaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A lease-backed liveness token. Replaced wholesale on expiry, never
/// mutated in place.
#[derive(Debug)]
pub struct Session {
    lease: LeaseId,
    done: CancellationToken,
}

impl Session {
    pub fn new(lease: LeaseId, done: CancellationToken) -> Self {
        Self { lease, done }
    }

    pub fn lease(&self) -> LeaseId {
        self.lease
    }

    /// Resolves when the lease is lost from this process's perspective.
    pub fn done(&self) -> WaitForCancellationFuture<'_> {
        self.done.cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub key: String,
}

/// One batch of change notifications. `canceled` marks the subscription as
/// terminated by the service (e.g. record history compacted).
#[derive(Debug, Clone)]
pub struct WatchResponse {
    pub canceled: bool,
    pub events: Vec<WatchEvent>,
}

pub type WatchStream = mpsc::UnboundedReceiver<WatchResponse>;

/// The currently recorded winner of an election. `key` is the unique
/// per-election record the service assigned under the election namespace,
/// not the namespace itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderRecord {
    pub key: String,
    pub value: String,
}

/// The capability set required from the coordination service: lease-backed
/// sessions, a single-winner election primitive, and key-change
/// notifications. Blocking operations are cancelled by dropping their
/// futures; callers race them against their own cancellation signals.
#[async_trait]
pub trait Coordination: Send + Sync + 'static {
    /// Creates a lease-backed session. The lease is bound to `cancel`:
    /// implementations must expire it, deleting any records it holds, once
    /// the signal fires, so a stopped process releases leadership instead
    /// of stranding it.
    async fn new_session(&self, ttl: Duration, cancel: CancellationToken) -> Result<Arc<Session>>;

    /// Blocks until `value` is the recorded winner for `key`'s election.
    async fn campaign(&self, session: &Session, key: &str, value: &str) -> Result<()>;

    /// Returns `Error::NoLeader` when no winner is recorded.
    async fn leader(&self, key: &str) -> Result<LeaderRecord>;

    /// Ordered change notifications for exactly `key`.
    fn watch(&self, key: &str) -> WatchStream;

    /// Deletes this session's record under `key`, releasing leadership early.
    async fn resign(&self, session: &Session, key: &str) -> Result<()>;
}
