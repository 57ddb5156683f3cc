//! Immutable query descriptors.
//!
//! # Responsibility
//! - Compose conjunctive predicates, ordering and pagination into a `Query`
//!   value through pure transformations.
//! - Render the descriptor to SQL for the repository to execute.
//!
//! # Invariants
//! - Predicates and order keys reference declared fields (or the identity
//!   column); unknown names fail when they are added, not on execution.
//! - Ordered queries break ties by `id ASC`.
//! - Limit and offset are unsigned, so they can never be negative.

pub mod aggregate;
pub mod predicate;

pub use aggregate::Aggregate;
pub use predicate::{Op, Predicate};

use crate::model::entity::{EntityDef, FieldDef, FieldKind, ID_COLUMN};
use predicate::ResolvedPredicate;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

static ID_FIELD: FieldDef = FieldDef {
    name: ID_COLUMN,
    kind: FieldKind::Integer,
    constraints: &[],
};

/// Malformed or inapplicable query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Field name is not declared by the target entity.
    UnknownField(String),
    /// Operator, operand or aggregate does not fit the field type.
    InvalidPredicate { field: String, reason: String },
    /// Aggregate has no defined value over an empty set.
    EmptySet,
    /// Query targets a different entity than the executing repository.
    EntityMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(field) => write!(f, "unknown field `{field}`"),
            Self::InvalidPredicate { field, reason } => {
                write!(f, "invalid predicate on `{field}`: {reason}")
            }
            Self::EmptySet => write!(f, "aggregate over an empty set"),
            Self::EntityMismatch { expected, found } => {
                write!(f, "query targets {found}, expected {expected}")
            }
        }
    }
}

impl Error for QueryError {}

/// Sort direction for `Query::order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Order {
    field: &'static str,
    direction: Direction,
}

/// Query descriptor for one entity kind.
///
/// Every builder method consumes the descriptor and returns a new one, so a
/// partially built query can be cloned and reused without shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    def: &'static EntityDef,
    predicates: Vec<ResolvedPredicate>,
    order: Option<Order>,
    limit: Option<u32>,
    offset: u32,
}

impl Query {
    /// Creates an unfiltered, unordered, unpaginated query.
    pub fn new(def: &'static EntityDef) -> Self {
        Self {
            def,
            predicates: Vec::new(),
            order: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn entity(&self) -> &'static EntityDef {
        self.def
    }

    /// Adds one predicate, combined conjunctively with existing ones.
    pub fn filter(mut self, predicate: Predicate) -> Result<Self, QueryError> {
        let field = self.resolve_field(&predicate.field)?;
        self.predicates
            .push(ResolvedPredicate::resolve(predicate, field)?);
        Ok(self)
    }

    /// Adds several predicates; all must hold.
    pub fn filter_all(
        self,
        predicates: impl IntoIterator<Item = Predicate>,
    ) -> Result<Self, QueryError> {
        predicates
            .into_iter()
            .try_fold(self, |query, predicate| query.filter(predicate))
    }

    /// Sets the ordering key, replacing any previous one.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Result<Self, QueryError> {
        let field = self.resolve_field(field)?;
        self.order = Some(Order {
            field: field.name,
            direction,
        });
        Ok(self)
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Drops limit and offset.
    pub fn unpaginated(mut self) -> Self {
        self.limit = None;
        self.offset = 0;
        self
    }

    /// Copy whose limit is at most `max`.
    pub(crate) fn capped(&self, max: u32) -> Self {
        let mut capped = self.clone();
        capped.limit = Some(self.limit.map_or(max, |limit| limit.min(max)));
        capped
    }

    pub(crate) fn resolve_field(&self, name: &str) -> Result<&'static FieldDef, QueryError> {
        if name == ID_COLUMN {
            return Ok(&ID_FIELD);
        }
        self.def
            .field(name)
            .ok_or_else(|| QueryError::UnknownField(name.to_string()))
    }

    /// Renders `SELECT <columns> FROM <table> ...` with bind values.
    pub(crate) fn to_select_sql(&self, columns: &str) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {columns} FROM {}", self.def.table);
        let mut binds = Vec::new();

        for (index, predicate) in self.predicates.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            predicate.push_sql(&mut sql, &mut binds);
        }

        if let Some(order) = self.order {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                order.field,
                order.direction.as_sql()
            ));
            if order.field != ID_COLUMN {
                sql.push_str(", id ASC");
            }
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Value::Integer(i64::from(limit)));
            if self.offset > 0 {
                sql.push_str(" OFFSET ?");
                binds.push(Value::Integer(i64::from(self.offset)));
            }
        } else if self.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(Value::Integer(i64::from(self.offset)));
        }

        (sql, binds)
    }
}
