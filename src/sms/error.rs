use crate::sms::storage::Storage;
use thiserror::Error;

/// Closed set of domain failures an SMS operation can produce, kept separate
/// from [`anyhow::Error`] so HTTP handlers can match on a specific cause
/// rather than string-sniff a message.
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("a destination number is required to build an SMS")]
    MissingNumber,

    #[error("either text or data content is required to build an SMS")]
    MissingContent,

    #[error("operation is not supported by this modem")]
    Unsupported,

    #[error("storage '{requested}' is not writable by this modem")]
    UnsupportedStorage { requested: Storage },

    #[error("SMS is already stored in '{current}'")]
    AlreadyStoredElsewhere { current: Storage },

    #[error("cannot send an SMS that was received")]
    CannotSendReceived,

    #[error("take_part called on a singlepart SMS")]
    NotMultipart,

    #[error("multipart SMS already has all {max} parts")]
    Saturated { max: u8 },

    #[error("duplicate part with sequence {sequence}")]
    DuplicateSequence { sequence: u8 },

    #[error("part sequence {sequence} is out of range 1..={max}")]
    SequenceOutOfRange { sequence: u8, max: u8 },

    #[error("part set incomplete, missing sequence {missing}")]
    IncompletePartSet { missing: u8 },

    #[error("part at sequence {sequence} has neither text nor data")]
    EmptyPart { sequence: u8 },

    #[error("part index {index} is invalid for a {max}-part message")]
    InvalidPartIndex { index: u8, max: u8 },

    #[error("modem returned a malformed store index: {0:?}")]
    StoreIndexParseError(String),

    #[error("{failed} of {total} parts failed to delete")]
    PartialDeleteFailure { failed: usize, total: usize },

    #[error("authorization failed")]
    AuthFailure,

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl SmsError {
    /// Whether retrying the exact same operation could plausibly succeed.
    /// Used by HTTP handlers to pick a status code; argument-shaped failures
    /// are 4xx, transport/unsupported failures are 5xx.
    pub fn is_client_fault(&self) -> bool {
        !matches!(self, SmsError::Transport(_) | SmsError::Unsupported)
    }
}
