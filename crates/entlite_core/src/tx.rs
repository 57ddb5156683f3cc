//! Transaction coordinator.
//!
//! # Responsibility
//! - Run one caller-supplied unit of work inside a SQLite transaction.
//! - Resolve every transaction to exactly one of commit or rollback.
//!
//! # Invariants
//! - `Open -> Committed | RolledBack`; both end states are terminal.
//! - A panicking unit of work is rolled back before the panic leaves the
//!   coordinator; the original payload is re-raised unchanged.
//! - A failed commit leaves the transaction rolled back.

use crate::db::StoreError;
use crate::error::{EntError, EntResult, TransactionError};
use crate::repo::user_repo::SqliteUserRepository;
use log::{debug, error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::any::Any;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// Panic payload carried back to the caller for re-raising.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Lifecycle state of one coordinated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    RolledBack,
}

impl Display for TxState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Transaction-scoped handle passed to a unit of work.
///
/// Everything issued through it stays invisible to other connections until
/// the coordinator commits.
pub struct Tx<'conn> {
    inner: Transaction<'conn>,
}

impl Tx<'_> {
    /// User repository bound to this transaction.
    pub fn users(&self) -> SqliteUserRepository<'_> {
        SqliteUserRepository::new(&self.inner)
    }
}

/// Runs `unit` in an immediate transaction on `conn`.
///
/// Returns `Err(payload)` only when `unit` panicked; the transaction has
/// already been rolled back at that point and the caller must re-raise.
pub(crate) fn run<T, F>(conn: &mut Connection, unit: F) -> Result<EntResult<T>, PanicPayload>
where
    F: FnOnce(&Tx<'_>) -> EntResult<T>,
{
    let started_at = Instant::now();
    let inner = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(inner) => inner,
        Err(err) => {
            error!("event=tx_begin module=tx status=error error={}", err);
            return Ok(Err(err.into()));
        }
    };
    debug!("event=tx_begin module=tx status=ok state={}", TxState::Open);

    let tx = Tx { inner };
    match catch_unwind(AssertUnwindSafe(|| unit(&tx))) {
        Ok(Ok(value)) => Ok(commit(tx, started_at).map(|()| value)),
        Ok(Err(err)) => Ok(Err(rollback_after_error(tx, err, started_at))),
        Err(payload) => {
            rollback_after_panic(tx, started_at);
            Err(payload)
        }
    }
}

fn commit(tx: Tx<'_>, started_at: Instant) -> EntResult<()> {
    match tx.inner.commit() {
        Ok(()) => {
            info!(
                "event=tx_commit module=tx status=ok state={} duration_ms={}",
                TxState::Committed,
                started_at.elapsed().as_millis()
            );
            Ok(())
        }
        Err(err) => {
            // Dropping a `Transaction` whose COMMIT failed rolls it back.
            error!(
                "event=tx_commit module=tx status=error state={} duration_ms={} error={}",
                TxState::RolledBack,
                started_at.elapsed().as_millis(),
                err
            );
            Err(TransactionError::CommitFailed(StoreError::from(err)).into())
        }
    }
}

fn rollback_after_error(tx: Tx<'_>, original: EntError, started_at: Instant) -> EntError {
    match tx.inner.rollback() {
        Ok(()) => {
            info!(
                "event=tx_rollback module=tx status=ok state={} cause=error duration_ms={}",
                TxState::RolledBack,
                started_at.elapsed().as_millis()
            );
            original
        }
        Err(err) => {
            error!(
                "event=tx_rollback module=tx status=error cause=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            TransactionError::RollbackFailed {
                original: Box::new(original),
                rollback: StoreError::from(err),
            }
            .into()
        }
    }
}

fn rollback_after_panic(tx: Tx<'_>, started_at: Instant) {
    match tx.inner.rollback() {
        Ok(()) => warn!(
            "event=tx_rollback module=tx status=ok state={} cause=panic duration_ms={}",
            TxState::RolledBack,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=tx_rollback module=tx status=error cause=panic duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
}
