use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The governing cancellation signal fired or the session used by an
    /// operation was already gone. Never retried.
    #[error("operation canceled")]
    Canceled,

    #[error("session acquisition failed after {attempts} attempts")]
    Session {
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },

    /// No winner currently recorded for an election key. A normal transient
    /// state, not a failure.
    #[error("no leader elected")]
    NoLeader,

    #[error("election error: {0}")]
    Election(#[source] anyhow::Error),

    #[error("coordination error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl Error {
    /// Distinguishes terminal cancellation from retryable failures.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_is_terminal() {
        assert!(Error::Canceled.is_canceled());
        assert!(!Error::NoLeader.is_canceled());
        assert!(!Error::Election(anyhow::anyhow!("boom")).is_canceled());
    }
}
