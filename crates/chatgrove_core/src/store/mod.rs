//! Persistence layer for the organization document.
//!
//! # Responsibility
//! - Define the storage contract consumed by the organizer façade.
//! - Keep file-format and durability details inside the store boundary.
//!
//! # Invariants
//! - A committed document on disk is never observable half-written.
//! - Corruption is recoverable (backup, then empty state), never fatal;
//!   only an unrecognized future schema version fails a load.

pub mod metadata_store;
