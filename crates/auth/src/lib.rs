//! `warehousex-auth`: authorization inputs for the approval path.
//!
//! Credentials and role assignment are handled elsewhere; this crate only
//! models who is acting and which roles may review requests.

pub mod principal;
pub mod roles;
pub mod user;

pub use principal::Reviewer;
pub use roles::{Role, RolePolicy, RolePolicyError};
pub use user::User;
