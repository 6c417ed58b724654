use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Election namespace for the primary coordination duty.
pub const OWNER_KEY: &str = "/tenure/owner";
/// Election namespace for the background-task duty.
pub const BG_OWNER_KEY: &str = "/tenure/bg/owner";

/// One of the two independently elected responsibilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Duty {
    Primary,
    Background,
}

impl Duty {
    pub fn key(self) -> &'static str {
        match self {
            Duty::Primary => OWNER_KEY,
            Duty::Background => BG_OWNER_KEY,
        }
    }
}

impl fmt::Display for Duty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The only state visible to external callers: one flag per duty. Each flag
/// is mutated solely by the campaign loop owning that duty and may be read
/// by any thread at any time without blocking.
#[derive(Debug, Default)]
pub struct RoleState {
    owner: AtomicBool,
    background_owner: AtomicBool,
}

impl RoleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is(&self, duty: Duty) -> bool {
        self.flag(duty).load(Ordering::SeqCst)
    }

    pub fn set(&self, duty: Duty, val: bool) {
        self.flag(duty).store(val, Ordering::SeqCst);
    }

    fn flag(&self, duty: Duty) -> &AtomicBool {
        match duty {
            Duty::Primary => &self.owner,
            Duty::Background => &self.background_owner,
        }
    }
}
