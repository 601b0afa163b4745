use thiserror::Error;

/// Fatal stream errors. Per-record errors never surface as [Error].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("connection exhausted after {attempts} attempt(s): {reason}")]
    ConnectionExhausted { attempts: u32, reason: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}
