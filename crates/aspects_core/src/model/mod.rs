//! Domain model for the aspect taxonomy.
//!
//! # Responsibility
//! - Define canonical persisted read models and write DTOs for aspects.
//! - Define the immutable nested tree representation returned to readers.
//!
//! # Invariants
//! - Every aspect, property and edge carries a stable `Uuid` identity.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Edge identities are opaque and never reused for another link.

pub mod aspect;
pub mod measure;
