//! Declarative entities over an embedded SQLite store.
//! Entity definitions drive schema creation, validation and typed queries.

pub mod client;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod tx;

pub use client::Client;
pub use db::{ensure_schema, open_db, SchemaError, StoreConfig, StoreError};
pub use error::{EntError, EntResult, NotFoundError, TransactionError};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig};
pub use model::entity::{
    Constraint, EdgeDef, EntityDef, FieldDef, FieldKind, FieldValue, ValidationError,
};
pub use model::user::{NewUser, User, UserId, UserUpdate, USER};
pub use query::{Aggregate, Direction, Op, Predicate, Query, QueryError};
pub use repo::user_repo::{SqliteUserRepository, UserRepository};
pub use tx::{Tx, TxState};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
