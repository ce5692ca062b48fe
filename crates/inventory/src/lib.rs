//! Inventory domain module.
//!
//! Business rules for a single stock record, implemented as deterministic
//! domain logic (no IO, no storage). Locking and persistence of the record
//! live in the infrastructure layer.

pub mod item;

pub use item::{DEFAULT_UNIT, InventoryItem};
