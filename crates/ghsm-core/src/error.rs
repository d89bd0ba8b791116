use thiserror::Error;

use crate::model::{RecordOutcome, UpsertOutcome};

/// Errors from reading a scope's public key. All of them are fatal to a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyFetchError {
    /// Connectivity failure, timeout, or an unexpected response status.
    #[error("transport error: {reason}")]
    Transport { reason: String },
    /// Credential lacks permission for the scope.
    #[error("not authorized for {scope}: {message}")]
    Authorization { scope: String, message: String },
    /// Scope does not exist or is not visible to the credential.
    #[error("{scope} not found or inaccessible")]
    NotFound { scope: String },
    /// Store returned a key that cannot be used for sealing.
    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial { reason: String },
}

impl From<SealError> for KeyFetchError {
    fn from(err: SealError) -> Self {
        KeyFetchError::InvalidKeyMaterial {
            reason: err.to_string(),
        }
    }
}

/// Errors produced while sealing a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    #[error("invalid key material: expected a 32-byte public key, got {len} bytes")]
    InvalidKeyMaterial { len: usize },
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },
}

/// Per-record input problems.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("malformed input: missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("malformed input: invalid secret name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("malformed input: invalid {kind} name `{value}`: {reason}")]
    InvalidScope {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("malformed input: {reason}")]
    Unreadable { reason: String },
}

/// Per-record write failures. `Display` is the reason reported to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpsertError {
    #[error("transport error: {reason}")]
    Transport { reason: String },
    /// Store answered with a status other than created/updated.
    #[error("{body}")]
    Rejected { status: u16, body: String },
}

impl From<UpsertError> for UpsertOutcome {
    fn from(err: UpsertError) -> Self {
        UpsertOutcome::Failed {
            reason: err.to_string(),
        }
    }
}

impl From<InputError> for UpsertOutcome {
    fn from(err: InputError) -> Self {
        UpsertOutcome::Failed {
            reason: err.to_string(),
        }
    }
}

/// Conditions that stop a batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("failed to fetch public key: {0}")]
    KeyFetch(#[from] KeyFetchError),
    /// Sealing failed; the cause is the key, so every later record would fail too.
    #[error("aborted at `{name}` after {} record(s): {source}", .completed.len())]
    Seal {
        name: String,
        #[source]
        source: SealError,
        completed: Vec<RecordOutcome>,
    },
}
