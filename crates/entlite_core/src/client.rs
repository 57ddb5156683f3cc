//! Client facade over the embedded store.
//!
//! # Responsibility
//! - Own the store connection for its whole lifetime (open once, close once).
//! - Ensure entity tables before any operation is accepted.
//! - Expose user mutations, queries and transactions from one entry point.
//!
//! # Invariants
//! - Every operation holds the connection lock for its duration; SQLite
//!   serializes conflicting writes.
//! - While a thread runs a unit of work, further calls through this client
//!   from that same thread fail with `TransactionError::AlreadyOpen`
//!   instead of deadlocking on the connection lock.

use crate::db::{open_db, StoreConfig};
use crate::error::{EntError, EntResult, NotFoundError, TransactionError};
use crate::model::entity::EntityDef;
use crate::model::user::{NewUser, User, UserId, UserUpdate, USER};
use crate::query::{Aggregate, Query};
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::tx::{self, Tx};
use log::{error, info};
use rusqlite::Connection;
use std::panic::resume_unwind;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Entities whose tables the client ensures on open.
pub static ENTITIES: &[&EntityDef] = &[&USER];

/// Entry point owning one store connection.
pub struct Client {
    conn: Mutex<Connection>,
    tx_owner: Mutex<Option<ThreadId>>,
}

impl Client {
    /// Opens the configured store and ensures every entity table.
    ///
    /// The connection is released on every failure path before returning.
    pub fn open(config: &StoreConfig) -> EntResult<Self> {
        let conn = open_db(config, ENTITIES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            tx_owner: Mutex::new(None),
        })
    }

    /// Opens a private in-memory store with default options.
    pub fn open_in_memory() -> EntResult<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Closes the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> EntResult<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match conn.close() {
            Ok(()) => {
                info!("event=db_close module=client status=ok");
                Ok(())
            }
            Err((_conn, err)) => {
                error!("event=db_close module=client status=error error={}", err);
                Err(err.into())
            }
        }
    }

    pub fn create_user(&self, input: &NewUser) -> EntResult<User> {
        self.with_repo(|repo| repo.create_user(input))
    }

    /// Creates all users or none.
    pub fn create_users(&self, inputs: &[NewUser]) -> EntResult<Vec<User>> {
        self.with_repo(|repo| repo.create_users(inputs))
    }

    pub fn update_user(&self, id: UserId, update: &UserUpdate) -> EntResult<User> {
        self.with_repo(|repo| repo.update_user(id, update))
    }

    pub fn delete_user(&self, id: UserId) -> EntResult<()> {
        self.with_repo(|repo| repo.delete_user(id))
    }

    /// Loads one user, failing with `NotFound` when the id does not resolve.
    pub fn get_user(&self, id: UserId) -> EntResult<User> {
        self.find_user(id)?.ok_or_else(|| {
            NotFoundError::Identity {
                entity: USER.name,
                id,
            }
            .into()
        })
    }

    pub fn find_user(&self, id: UserId) -> EntResult<Option<User>> {
        self.with_repo(|repo| repo.get_user(id))
    }

    pub fn exists(&self, id: UserId) -> EntResult<bool> {
        self.with_repo(|repo| repo.exists(id))
    }

    pub fn all(&self, query: &Query) -> EntResult<Vec<User>> {
        self.with_repo(|repo| repo.all(query))
    }

    pub fn one(&self, query: &Query) -> EntResult<User> {
        self.with_repo(|repo| repo.one(query))
    }

    pub fn count(&self, query: &Query) -> EntResult<u64> {
        self.with_repo(|repo| repo.count(query))
    }

    pub fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> EntResult<f64> {
        self.with_repo(|repo| repo.aggregate(query, aggregate))
    }

    /// Runs `unit` as one atomic unit of work.
    ///
    /// Commits when `unit` returns `Ok`, rolls back when it returns `Err` or
    /// panics. A panic is re-raised after the rollback has completed and the
    /// connection lock has been released.
    pub fn with_tx<T, F>(&self, unit: F) -> EntResult<T>
    where
        F: FnOnce(&Tx<'_>) -> EntResult<T>,
    {
        self.ensure_no_open_tx()?;
        let outcome = {
            let mut conn = self.lock_conn();
            let _owner = TxOwner::claim(&self.tx_owner);
            tx::run(&mut conn, unit)
        };

        match outcome {
            Ok(result) => result,
            Err(payload) => resume_unwind(payload),
        }
    }

    fn with_repo<T>(
        &self,
        op: impl FnOnce(&SqliteUserRepository<'_>) -> EntResult<T>,
    ) -> EntResult<T> {
        self.ensure_no_open_tx()?;
        let conn = self.lock_conn();
        op(&SqliteUserRepository::new(&conn))
    }

    fn ensure_no_open_tx(&self) -> Result<(), EntError> {
        let owner = self
            .tx_owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *owner == Some(thread::current().id()) {
            return Err(TransactionError::AlreadyOpen.into());
        }
        Ok(())
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the current thread as the transaction owner until dropped.
///
/// Only the thread holding the connection lock ever sets the owner.
struct TxOwner<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> TxOwner<'a> {
    fn claim(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for TxOwner<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
