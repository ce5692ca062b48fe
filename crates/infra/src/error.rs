//! Error surface of the approval subsystem.
//!
//! Domain, persistence and lock failures are folded into one tagged enum so
//! callers can tell retry-worthy outcomes (`Conflict`, `Internal`) apart from
//! permanent ones.

use thiserror::Error;

use warehousex_core::DomainError;

use crate::lock::LockError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApprovalError {
    /// Item or request missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed identifiers or quantities.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Role check or self-approval failure.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Lifecycle violation.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Outbound quantity exceeds current stock.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// Coordination lease busy (or another writer won a uniqueness race).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence, transaction or lock backend failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApprovalError {
    /// Stable snake_case tag for transports and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ApprovalError::NotFound(_) => "not_found",
            ApprovalError::InvalidInput(_) => "invalid_input",
            ApprovalError::PermissionDenied(_) => "permission_denied",
            ApprovalError::InvalidTransition(_) => "invalid_transition",
            ApprovalError::InsufficientStock { .. } => "insufficient_stock",
            ApprovalError::Conflict(_) => "conflict",
            ApprovalError::Internal(_) => "internal",
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApprovalError::Conflict(_) | ApprovalError::Internal(_))
    }
}

impl From<DomainError> for ApprovalError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(msg) => ApprovalError::NotFound(msg),
            DomainError::InvalidInput(msg) => ApprovalError::InvalidInput(msg),
            DomainError::PermissionDenied(msg) => ApprovalError::PermissionDenied(msg),
            DomainError::SelfApproval => {
                ApprovalError::PermissionDenied("cannot approve your own request".to_string())
            }
            DomainError::InvalidTransition { from, to } => {
                ApprovalError::InvalidTransition(format!("cannot move request from {from} to {to}"))
            }
            DomainError::InsufficientStock {
                available,
                requested,
            } => ApprovalError::InsufficientStock {
                available,
                requested,
            },
            DomainError::Conflict(msg) => ApprovalError::Conflict(msg),
        }
    }
}

impl From<StoreError> for ApprovalError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate(msg) => ApprovalError::Conflict(msg),
            other => ApprovalError::Internal(other.to_string()),
        }
    }
}

impl From<LockError> for ApprovalError {
    fn from(value: LockError) -> Self {
        match value {
            busy @ LockError::Busy(_) => ApprovalError::Conflict(busy.to_string()),
            LockError::Backend(msg) => ApprovalError::Internal(format!("lock backend: {msg}")),
        }
    }
}
