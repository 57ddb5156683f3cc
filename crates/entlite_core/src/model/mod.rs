//! Entity definitions and domain records.
//!
//! # Responsibility
//! - Hold the single source of truth for entity shape and validity.
//! - Define the records returned to callers.
//!
//! # Invariants
//! - Adding a field or constraint touches only the entity definition.

pub mod entity;
pub mod user;
