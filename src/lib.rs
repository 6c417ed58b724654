#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod coordination;
pub mod error;
pub mod manager;
pub mod mem;
pub mod retry;
pub mod state;

pub mod test_utils;

pub use coordination::{
    Coordination, EventKind, LeaderRecord, LeaseId, Session, WatchEvent, WatchResponse,
    WatchStream, SESSION_TTL,
};
pub use error::{Error, Result};
pub use manager::OwnerManager;
pub use mem::MemCoordination;
pub use retry::{RetryBudget, DEFAULT_SESSION_RETRY, SESSION_RETRY_INTERVAL};
pub use state::{Duty, RoleState, BG_OWNER_KEY, OWNER_KEY};
