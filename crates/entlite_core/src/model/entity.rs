//! Declarative entity definitions.
//!
//! # Responsibility
//! - Describe the shape of an entity: ordered fields, semantic types and
//!   per-field constraints.
//! - Validate candidate values before they reach the store.
//!
//! # Invariants
//! - Every field has exactly one `FieldKind`.
//! - `NotEmpty` and `Positive` are pure predicates; `Unique` is enforced by
//!   the store through an index created by the schema manager.
//! - Definitions are `static` values and never change at runtime.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Semantic type of one entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// UTF-8 string, stored as `TEXT`.
    Text,
    /// Signed 64-bit integer, stored as `INTEGER`.
    Integer,
}

impl FieldKind {
    /// SQLite column type used for this kind.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
        }
    }

    /// Whether ordering comparisons and numeric aggregates apply.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer)
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
        }
    }
}

/// Declared constraint on one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Text value must contain at least one character.
    NotEmpty,
    /// Integer value must be greater than zero.
    Positive,
    /// No two stored instances may share the value.
    Unique,
}

impl Constraint {
    /// Evaluates the constraint against a candidate value.
    ///
    /// `Unique` always passes here; the store rejects duplicates on write.
    pub fn check(self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::NotEmpty, FieldValue::Text(text)) => !text.is_empty(),
            (Self::Positive, FieldValue::Integer(number)) => *number > 0,
            (Self::Unique, _) => true,
            // Constraint/kind pairs are fixed by the definition; a mismatched
            // pair is reported as a type error before reaching this point.
            (Self::NotEmpty, FieldValue::Integer(_)) | (Self::Positive, FieldValue::Text(_)) => {
                true
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotEmpty => "not_empty",
            Self::Positive => "positive",
            Self::Unique => "unique",
        }
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime value for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text(_) => FieldKind::Text,
            Self::Integer(_) => FieldKind::Integer,
        }
    }

    /// Converts into a bindable SQLite value.
    pub fn to_sql_value(&self) -> rusqlite::types::Value {
        match self {
            Self::Text(text) => rusqlite::types::Value::Text(text.clone()),
            Self::Integer(number) => rusqlite::types::Value::Integer(*number),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

/// One declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub constraints: &'static [Constraint],
}

impl FieldDef {
    pub fn is_unique(&self) -> bool {
        self.constraints.contains(&Constraint::Unique)
    }
}

/// Outgoing relationship to another entity.
///
/// No entity declares edges yet; the schema manager does not materialize them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeDef {
    pub name: &'static str,
    pub target: &'static str,
}

/// Static description of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDef {
    /// Entity name used in errors and logs.
    pub name: &'static str,
    /// Backing table name.
    pub table: &'static str,
    /// Fields in declaration order. The identity column is implicit.
    pub fields: &'static [FieldDef],
    pub edges: &'static [EdgeDef],
}

/// Name of the implicit store-assigned identity column.
pub const ID_COLUMN: &str = "id";

impl EntityDef {
    /// Looks up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Validates supplied values in declaration order.
    ///
    /// Fields missing from `values` are skipped, which gives update paths
    /// partial-validation semantics. Fails on the first violation.
    pub fn validate(&self, values: &[(&str, &FieldValue)]) -> Result<(), ValidationError> {
        for field in self.fields {
            let Some((_, value)) = values.iter().find(|(name, _)| *name == field.name) else {
                continue;
            };

            if value.kind() != field.kind {
                return Err(ValidationError::TypeMismatch {
                    field: field.name,
                    expected: field.kind,
                });
            }

            for constraint in field.constraints {
                if !constraint.check(value) {
                    return Err(ValidationError::ConstraintViolated {
                        field: field.name,
                        constraint: *constraint,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Input value rejected by an entity definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A declared constraint does not hold for the supplied value.
    ConstraintViolated {
        field: &'static str,
        constraint: Constraint,
    },
    /// Supplied value kind differs from the declared field kind.
    TypeMismatch {
        field: &'static str,
        expected: FieldKind,
    },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::ConstraintViolated { field, .. } | Self::TypeMismatch { field, .. } => field,
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstraintViolated { field, constraint } => {
                write!(f, "field `{field}` violates constraint `{constraint}`")
            }
            Self::TypeMismatch { field, expected } => {
                write!(f, "field `{field}` expects a {expected} value")
            }
        }
    }
}

impl Error for ValidationError {}
