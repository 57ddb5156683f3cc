//! Scalar aggregation over a filtered entity set.
//!
//! # Invariants
//! - `Count` and `Sum` have a neutral value (`0`) and never fail on an empty
//!   set.
//! - `Avg`, `Min` and `Max` are undefined for an empty set and report
//!   `QueryError::EmptySet`.

use super::{Query, QueryError};

/// Aggregation expression, addressing its field by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    pub fn sum(field: impl Into<String>) -> Self {
        Self::Sum(field.into())
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Self::Avg(field.into())
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self::Min(field.into())
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self::Max(field.into())
    }

    /// Resolves the expression into a SQL projection over `query`'s entity.
    pub(crate) fn resolve(&self, query: &Query) -> Result<ResolvedAggregate, QueryError> {
        let (function, field) = match self {
            Self::Count => {
                return Ok(ResolvedAggregate {
                    column: "id",
                    projection: "COUNT(*)".to_string(),
                    empty_value: Some(0.0),
                })
            }
            Self::Sum(field) => ("SUM", field),
            Self::Avg(field) => ("AVG", field),
            Self::Min(field) => ("MIN", field),
            Self::Max(field) => ("MAX", field),
        };

        let def = query.resolve_field(field)?;
        if !def.kind.is_numeric() {
            return Err(QueryError::InvalidPredicate {
                field: def.name.to_string(),
                reason: format!("{function} requires a numeric field, got {}", def.kind),
            });
        }

        Ok(ResolvedAggregate {
            column: def.name,
            projection: format!("{function}({})", def.name),
            empty_value: matches!(self, Self::Sum(_)).then_some(0.0),
        })
    }
}

/// Aggregate checked against the entity definition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedAggregate {
    /// Column selected by the inner filtered query.
    pub(crate) column: &'static str,
    /// Outer projection, e.g. `AVG(age)`.
    pub(crate) projection: String,
    /// Result used when the engine yields `NULL` (empty input).
    pub(crate) empty_value: Option<f64>,
}

impl ResolvedAggregate {
    /// Maps a possibly-`NULL` engine result onto the empty-set policy.
    pub(crate) fn finish(&self, raw: Option<f64>) -> Result<f64, QueryError> {
        raw.or(self.empty_value).ok_or(QueryError::EmptySet)
    }
}

#[cfg(test)]
mod tests {
    use super::Aggregate;
    use crate::model::user::USER;
    use crate::query::{Query, QueryError};

    #[test]
    fn average_of_empty_set_is_an_error() {
        let resolved = Aggregate::avg("age").resolve(&Query::new(&USER)).unwrap();
        assert_eq!(resolved.finish(None), Err(QueryError::EmptySet));
        assert_eq!(resolved.finish(Some(31.5)), Ok(31.5));
    }

    #[test]
    fn sum_and_count_of_empty_set_are_zero() {
        let query = Query::new(&USER);
        let sum = Aggregate::sum("age").resolve(&query).unwrap();
        let count = Aggregate::Count.resolve(&query).unwrap();
        assert_eq!(sum.finish(None), Ok(0.0));
        assert_eq!(count.finish(None), Ok(0.0));
    }

    #[test]
    fn text_field_cannot_be_averaged() {
        let err = Aggregate::avg("name").resolve(&Query::new(&USER)).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPredicate { field, .. } if field == "name"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = Aggregate::max("height").resolve(&Query::new(&USER)).unwrap_err();
        assert_eq!(err, QueryError::UnknownField("height".to_string()));
    }
}
