//! Stock movement requests and their lifecycle.
//!
//! Pure decision logic: which status changes are legal and who may make
//! them. Persisting the outcome is the coordinator's job.

pub mod request;

pub use request::{Request, RequestStatus, RequestType};
