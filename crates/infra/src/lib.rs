//! Infrastructure layer: persistence, coordination lock, and the approval
//! transaction coordinator built on top of them.

pub mod approval;
pub mod audit;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use approval::{ApprovalCoordinator, ListRequests, NewRequest, RequestPage};
pub use audit::{AuditAction, AuditEntry};
pub use config::{Config, ConfigError};
pub use error::ApprovalError;
pub use lock::{CoordinationLock, InMemoryLock, Lease, LockError};
pub use store::{
    InMemoryStore, PostgresStore, RequestDetails, RequestFilter, Store, StoreError,
    StoreTransaction,
};
