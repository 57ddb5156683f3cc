//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite statement details from the client facade.
//!
//! # Invariants
//! - Repository writes validate against the entity definition before
//!   persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to
//!   store errors.

pub mod user_repo;
