//! Crate-level error taxonomy.
//!
//! # Responsibility
//! - Give every failed call exactly one error value.
//! - Keep caller-fixable input errors distinguishable from store failures.
//!
//! # Invariants
//! - No variant is retried or recovered automatically by core.

use crate::db::{SchemaError, StoreError};
use crate::model::entity::ValidationError;
use crate::query::QueryError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EntResult<T> = Result<T, EntError>;

/// Addressed instance (or single-result query) did not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    /// No instance carries this identity.
    Identity { entity: &'static str, id: i64 },
    /// `one()` matched zero or more than one instance. `matched` stops
    /// counting at two.
    NoSingleMatch { entity: &'static str, matched: usize },
}

impl Display for NotFoundError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::NoSingleMatch { entity, matched } => {
                write!(f, "expected exactly one {entity}, matched {matched}")
            }
        }
    }
}

impl Error for NotFoundError {}

/// Transaction lifecycle failure.
#[derive(Debug)]
pub enum TransactionError {
    /// A transaction is already open on this connection for the calling thread.
    AlreadyOpen,
    /// `COMMIT` failed; the transaction was rolled back.
    CommitFailed(StoreError),
    /// The unit of work failed and the rollback failed too.
    RollbackFailed {
        original: Box<EntError>,
        rollback: StoreError,
    },
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyOpen => write!(f, "a transaction is already open on this connection"),
            Self::CommitFailed(err) => write!(f, "committing transaction: {err}"),
            Self::RollbackFailed { original, rollback } => {
                write!(f, "{original}: rolling back transaction: {rollback}")
            }
        }
    }
}

impl Error for TransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AlreadyOpen => None,
            Self::CommitFailed(err) => Some(err),
            Self::RollbackFailed { original, .. } => Some(original.as_ref()),
        }
    }
}

/// Error returned by every core operation.
#[derive(Debug)]
pub enum EntError {
    Validation(ValidationError),
    NotFound(NotFoundError),
    Store(StoreError),
    Query(QueryError),
    Schema(SchemaError),
    Transaction(TransactionError),
    /// Persisted row cannot be mapped back onto the entity.
    InvalidData(String),
    /// Logical failure reported by a caller's unit of work.
    Aborted(String),
}

impl EntError {
    /// Reports a logical failure from inside `Client::with_tx`.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    /// Whether the caller can fix the failure by changing its input.
    pub fn is_caller_fixable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound(_) | Self::Query(_) | Self::Aborted(_)
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Store(StoreError::UniqueViolation { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for EntError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::Transaction(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

impl Error for EntError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::NotFound(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::Transaction(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::Aborted(_) => None,
        }
    }
}

impl From<ValidationError> for EntError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<NotFoundError> for EntError {
    fn from(value: NotFoundError) -> Self {
        Self::NotFound(value)
    }
}

impl From<StoreError> for EntError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<rusqlite::Error> for EntError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(StoreError::from(value))
    }
}

impl From<QueryError> for EntError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<SchemaError> for EntError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<TransactionError> for EntError {
    fn from(value: TransactionError) -> Self {
        Self::Transaction(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{EntError, NotFoundError, TransactionError};
    use crate::db::StoreError;
    use crate::model::entity::{Constraint, ValidationError};
    use std::error::Error;

    #[test]
    fn caller_fixable_errors_are_separated_from_store_errors() {
        let validation = EntError::from(ValidationError::ConstraintViolated {
            field: "age",
            constraint: Constraint::Positive,
        });
        let unique = EntError::from(StoreError::UniqueViolation {
            table: "users".to_string(),
            column: "email".to_string(),
        });

        assert!(validation.is_caller_fixable());
        assert!(!unique.is_caller_fixable());
        assert!(unique.is_unique_violation());
    }

    #[test]
    fn rollback_failure_keeps_original_error_as_source() {
        let original = EntError::from(NotFoundError::Identity {
            entity: "User",
            id: 7,
        });
        let err = EntError::from(TransactionError::RollbackFailed {
            original: Box::new(original),
            rollback: StoreError::Other(rusqlite::Error::InvalidQuery),
        });

        let message = err.to_string();
        assert!(message.contains("User not found: 7"));
        assert!(message.contains("rolling back transaction"));

        let tx_source = err.source().expect("transaction error source");
        assert!(tx_source.source().is_some());
    }
}
