//! Error types for the pet core.
//!
//! None of these are fatal. The session and app layers turn every variant into a
//! diagnostic line and fall back to a safe value.

use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum PetError {
    /// Reading or writing the backing store failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record or dataset is not valid JSON.
    #[error("corrupt data: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The dialogue dataset could not be used.
    #[error("dialogue dataset unavailable: {0}")]
    Dialogue(String),

    /// The dialogue loader did not answer within its time budget.
    #[error("dialogue dataset timed out after {0}ms")]
    DialogueTimeout(u64),
}

pub(crate) type Result<T> = std::result::Result<T, PetError>;
