//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage capability consumed by validators and services.
//! - Isolate SQLite query details from business orchestration.
//!
//! # Invariants
//! - Mutation methods are atomic: either all statements of one write
//!   apply, or none do.
//! - Repository APIs return semantic errors (`AspectNotFound`,
//!   `PropertyNotFound`) in addition to DB transport errors.

pub mod aspect_repo;
