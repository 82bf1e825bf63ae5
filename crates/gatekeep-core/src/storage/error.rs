use thiserror::Error;

use crate::auth::DenialReason;

/// Errors produced by the secure storage facade and its backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecureStoreError {
    /// The user-presence check did not succeed; no backend I/O took place.
    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: DenialReason },
    /// The backing store rejected or failed an operation.
    #[error("backend failure [{code}]: {message}")]
    Backend { code: String, message: String },
    /// Rejected before any authentication attempt.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl SecureStoreError {
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Machine-readable code for backend failures.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Backend { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Rejects empty accounts and blobs over the backend limit.
pub(crate) fn validate(
    account: &str,
    blob: Option<&[u8]>,
    max_blob_len: Option<usize>,
) -> Result<(), SecureStoreError> {
    if account.is_empty() {
        return Err(SecureStoreError::InvalidInput {
            reason: "account identifier must not be empty".to_string(),
        });
    }

    if let (Some(blob), Some(limit)) = (blob, max_blob_len) {
        if blob.len() > limit {
            return Err(SecureStoreError::InvalidInput {
                reason: format!("blob of {} bytes exceeds limit of {limit}", blob.len()),
            });
        }
    }

    Ok(())
}
