//! Field predicates and their SQL rendering.
//!
//! # Invariants
//! - A `Predicate` is unchecked until a `Query` resolves it against an
//!   entity definition; only resolved predicates are rendered to SQL.
//! - Text matching operators are case-sensitive except `ContainsFold`.

use super::QueryError;
use crate::model::entity::{FieldDef, FieldKind, FieldValue};
use rusqlite::types::Value;

/// Comparison operator applied to one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// Case-sensitive substring match.
    Contains,
    /// ASCII case-insensitive substring match.
    ContainsFold,
    HasPrefix,
    HasSuffix,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Contains => "contains",
            Self::ContainsFold => "contains_fold",
            Self::HasPrefix => "has_prefix",
            Self::HasSuffix => "has_suffix",
        }
    }

    /// Whether the operator accepts fields of `kind`.
    fn applies_to(self, kind: FieldKind) -> bool {
        match self {
            Self::Eq | Self::Ne => true,
            Self::Gt | Self::Ge | Self::Lt | Self::Le => kind.is_numeric(),
            Self::Contains | Self::ContainsFold | Self::HasPrefix | Self::HasSuffix => {
                kind == FieldKind::Text
            }
        }
    }
}

/// Boolean test over one field's value, addressed by field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub op: Op,
    pub value: FieldValue,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, Op::Eq, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, Op::Gt, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, Op::Lt, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Op::Contains, FieldValue::Text(value.into()))
    }
}

/// Predicate checked against a declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedPredicate {
    field: &'static FieldDef,
    op: Op,
    value: FieldValue,
}

impl ResolvedPredicate {
    pub(crate) fn resolve(
        predicate: Predicate,
        field: &'static FieldDef,
    ) -> Result<Self, QueryError> {
        if !predicate.op.applies_to(field.kind) {
            return Err(QueryError::InvalidPredicate {
                field: field.name.to_string(),
                reason: format!(
                    "operator `{}` does not apply to {} fields",
                    predicate.op.as_str(),
                    field.kind
                ),
            });
        }

        if predicate.value.kind() != field.kind {
            return Err(QueryError::InvalidPredicate {
                field: field.name.to_string(),
                reason: format!(
                    "expected a {} operand, got {}",
                    field.kind,
                    predicate.value.kind()
                ),
            });
        }

        Ok(Self {
            field,
            op: predicate.op,
            value: predicate.value,
        })
    }

    /// Appends the SQL fragment and its bind values.
    pub(crate) fn push_sql(&self, sql: &mut String, binds: &mut Vec<Value>) {
        let column = self.field.name;
        let value = self.value.to_sql_value();
        match self.op {
            Op::Eq => push_comparison(sql, binds, column, "=", value),
            Op::Ne => push_comparison(sql, binds, column, "<>", value),
            Op::Gt => push_comparison(sql, binds, column, ">", value),
            Op::Ge => push_comparison(sql, binds, column, ">=", value),
            Op::Lt => push_comparison(sql, binds, column, "<", value),
            Op::Le => push_comparison(sql, binds, column, "<=", value),
            Op::Contains => {
                sql.push_str(&format!("instr({column}, ?) > 0"));
                binds.push(value);
            }
            Op::ContainsFold => {
                sql.push_str(&format!("instr(lower({column}), lower(?)) > 0"));
                binds.push(value);
            }
            Op::HasPrefix => {
                sql.push_str(&format!("instr({column}, ?) = 1"));
                binds.push(value);
            }
            Op::HasSuffix => {
                sql.push_str(&format!(
                    "substr({column}, length({column}) - length(?) + 1) = ?"
                ));
                binds.push(value.clone());
                binds.push(value);
            }
        }
    }
}

fn push_comparison(
    sql: &mut String,
    binds: &mut Vec<Value>,
    column: &str,
    operator: &str,
    value: Value,
) {
    sql.push_str(&format!("{column} {operator} ?"));
    binds.push(value);
}
