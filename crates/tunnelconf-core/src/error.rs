use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced by the tunnel configuration store and its collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfError {
    /// The tunnel name (or the name derived from a path) is not acceptable.
    #[error("tunnel name is not valid: {name:?}")]
    InvalidName { name: String },
    /// Open, read, write, remove or listing failure.
    #[error("i/o failure on {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
    /// Another writer still holds the file open.
    #[error("{} is locked by another writer", path.display())]
    SharingViolation { path: PathBuf },
    /// Create-only write found an existing file.
    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },
    /// The configuration text could not be decoded.
    #[error("failed to decode configuration {name:?}: {reason}")]
    DecodeFailed { name: String, reason: String },
    /// Sealed bytes could not be opened under this name.
    #[error("failed to decrypt configuration {name:?}: {reason}")]
    DecryptionFailed { name: String, reason: String },
    #[error("failed to encrypt configuration {name:?}: {reason}")]
    EncryptionFailed { name: String, reason: String },
}

impl ConfError {
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    /// Wraps an OS error for `path`.
    pub fn io(path: impl AsRef<Path>, err: impl ToString) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            reason: err.to_string(),
        }
    }

    pub fn sharing_violation(path: impl AsRef<Path>) -> Self {
        Self::SharingViolation {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn already_exists(path: impl AsRef<Path>) -> Self {
        Self::AlreadyExists {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn decode(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::DecodeFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decryption(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::DecryptionFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn encryption(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::EncryptionFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// True for plain I/O failures and for sharing violations, which are a
    /// more specific kind of I/O failure.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::SharingViolation { .. })
    }

    pub fn is_sharing_violation(&self) -> bool {
        matches!(self, Self::SharingViolation { .. })
    }
}
