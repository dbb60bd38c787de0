use thiserror::Error;

/// Closed error taxonomy shared by every entry-verification component.
///
/// Rejections (root mismatch, replayed nullifier, invalid proof) are not
/// errors; they are carried by the backend's verdict type instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateError {
    /// Malformed input at the subsystem boundary. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced event, ticket, leaf or root does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation reported by the nullifier ledger.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Storage, hash-primitive or proof-checker failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// The caller cancelled the operation or its deadline passed.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl GateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

pub type GateResult<T> = Result<T, GateError>;
