//! User repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/update/delete and query execution over `users` storage.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths validate input against the `User` definition before any
//!   SQL is issued.
//! - Bulk create is all-or-nothing: a savepoint wraps the batch, so it nests
//!   inside an open transaction and opens its own otherwise.
//! - Read paths reject persisted rows that violate the definition instead of
//!   masking them.

use crate::db::schema::{table_exists, verify_table, SchemaError};
use crate::error::{EntError, EntResult, NotFoundError};
use crate::model::entity::{EntityDef, FieldValue, ID_COLUMN};
use crate::model::user::{NewUser, User, UserId, UserUpdate, USER};
use crate::query::{Aggregate, Query, QueryError};
use log::{error, info};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, name, age, email";
const BULK_SAVEPOINT: &str = "user_create_bulk";

/// Repository interface for user mutations and queries.
pub trait UserRepository {
    fn create_user(&self, input: &NewUser) -> EntResult<User>;
    fn create_users(&self, inputs: &[NewUser]) -> EntResult<Vec<User>>;
    fn update_user(&self, id: UserId, update: &UserUpdate) -> EntResult<User>;
    fn delete_user(&self, id: UserId) -> EntResult<()>;
    fn get_user(&self, id: UserId) -> EntResult<Option<User>>;
    fn exists(&self, id: UserId) -> EntResult<bool>;
    fn all(&self, query: &Query) -> EntResult<Vec<User>>;
    fn one(&self, query: &Query) -> EntResult<User>;
    fn count(&self, query: &Query) -> EntResult<u64>;
    fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> EntResult<f64>;
}

/// SQLite-backed user repository bound to one connection or transaction.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Binds to a connection whose schema is already ensured.
    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Binds to an arbitrary connection after checking the `users` table.
    pub fn try_new(conn: &'conn Connection) -> EntResult<Self> {
        if !table_exists(conn, USER.table)? {
            return Err(SchemaError::MissingTable(USER.table.to_string()).into());
        }
        verify_table(conn, &USER)?;
        Ok(Self { conn })
    }

    fn insert(&self, input: &NewUser) -> EntResult<User> {
        self.conn.execute(
            &insert_sql(&USER),
            params![input.name.as_str(), input.age, input.email.as_str()],
        )?;

        Ok(User {
            id: self.conn.last_insert_rowid(),
            name: input.name.clone(),
            age: input.age,
            email: input.email.clone(),
        })
    }

    fn insert_batch(&self, inputs: &[NewUser]) -> EntResult<Vec<User>> {
        let savepoint = BatchSavepoint::open(self.conn)?;
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            created.push(self.insert(input)?);
        }
        savepoint.release()?;
        Ok(created)
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, input: &NewUser) -> EntResult<User> {
        input.validate()?;
        self.insert(input)
    }

    fn create_users(&self, inputs: &[NewUser]) -> EntResult<Vec<User>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        for (index, input) in inputs.iter().enumerate() {
            if let Err(err) = input.validate() {
                info!(
                    "event=user_create_bulk module=repo status=rejected size={} index={} field={}",
                    inputs.len(),
                    index,
                    err.field()
                );
                return Err(err.into());
            }
        }

        match self.insert_batch(inputs) {
            Ok(created) => {
                info!(
                    "event=user_create_bulk module=repo status=ok size={}",
                    created.len()
                );
                Ok(created)
            }
            Err(err) => {
                error!(
                    "event=user_create_bulk module=repo status=error size={} error={}",
                    inputs.len(),
                    err
                );
                Err(err)
            }
        }
    }

    fn update_user(&self, id: UserId, update: &UserUpdate) -> EntResult<User> {
        update.validate()?;

        let assignments = update.assignments();
        if !assignments.is_empty() {
            let columns = assignments
                .iter()
                .map(|(field, _)| format!("{field} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut binds: Vec<_> = assignments
                .iter()
                .map(|(_, value)| value.to_sql_value())
                .collect();
            binds.push(FieldValue::Integer(id).to_sql_value());

            let changed = self.conn.execute(
                &format!("UPDATE {} SET {columns} WHERE id = ?;", USER.table),
                params_from_iter(binds),
            )?;
            if changed == 0 {
                return Err(not_found(id));
            }
        }

        self.get_user(id)?.ok_or_else(|| not_found(id))
    }

    fn delete_user(&self, id: UserId) -> EntResult<()> {
        let changed = self
            .conn
            .execute(&format!("DELETE FROM {} WHERE id = ?1;", USER.table), [id])?;

        if changed == 0 {
            return Err(not_found(id));
        }

        Ok(())
    }

    fn get_user(&self, id: UserId) -> EntResult<Option<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM {} WHERE id = ?1;",
            USER.table
        ))?;
        let user = stmt.query_row([id], |row| Ok(read_user_row(row))).optional()?;
        user.transpose()
    }

    fn exists(&self, id: UserId) -> EntResult<bool> {
        let exists: i64 = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1);", USER.table),
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn all(&self, query: &Query) -> EntResult<Vec<User>> {
        ensure_user_query(query)?;
        let (sql, binds) = query.to_select_sql(USER_COLUMNS);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(read_user_row(row)?);
        }

        Ok(users)
    }

    fn one(&self, query: &Query) -> EntResult<User> {
        // Two rows are enough to tell "exactly one" from "several".
        let mut users = self.all(&query.capped(2))?;
        if users.len() != 1 {
            return Err(NotFoundError::NoSingleMatch {
                entity: USER.name,
                matched: users.len(),
            }
            .into());
        }
        Ok(users.remove(0))
    }

    fn count(&self, query: &Query) -> EntResult<u64> {
        ensure_user_query(query)?;
        let (inner, binds) = query.to_select_sql(ID_COLUMN);
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM ({inner});"),
            params_from_iter(binds),
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| EntError::InvalidData(format!("negative row count {count}")))
    }

    fn aggregate(&self, query: &Query, aggregate: &Aggregate) -> EntResult<f64> {
        ensure_user_query(query)?;
        let resolved = aggregate.resolve(query)?;
        let (inner, binds) = query.to_select_sql(resolved.column);
        let sql = format!("SELECT {} FROM ({inner});", resolved.projection);

        let raw: Option<f64> = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(resolved.finish(raw)?)
    }
}

/// Savepoint scoped to one bulk write; rolled back unless released.
struct BatchSavepoint<'conn> {
    conn: &'conn Connection,
    released: bool,
}

impl<'conn> BatchSavepoint<'conn> {
    fn open(conn: &'conn Connection) -> EntResult<Self> {
        conn.execute_batch(&format!("SAVEPOINT {BULK_SAVEPOINT};"))?;
        Ok(Self {
            conn,
            released: false,
        })
    }

    fn release(mut self) -> EntResult<()> {
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {BULK_SAVEPOINT};"))?;
        self.released = true;
        Ok(())
    }
}

impl Drop for BatchSavepoint<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let rollback = format!(
            "ROLLBACK TO SAVEPOINT {BULK_SAVEPOINT}; RELEASE SAVEPOINT {BULK_SAVEPOINT};"
        );
        if let Err(err) = self.conn.execute_batch(&rollback) {
            error!(
                "event=user_create_bulk module=repo status=error error_code=savepoint_rollback_failed error={}",
                err
            );
        }
    }
}

fn insert_sql(def: &EntityDef) -> String {
    let columns = def
        .fields
        .iter()
        .map(|field| field.name)
        .collect::<Vec<_>>();
    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        def.table,
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn ensure_user_query(query: &Query) -> Result<(), QueryError> {
    let entity = query.entity();
    if entity.table != USER.table {
        return Err(QueryError::EntityMismatch {
            expected: USER.name,
            found: entity.name,
        });
    }
    Ok(())
}

fn not_found(id: UserId) -> EntError {
    NotFoundError::Identity {
        entity: USER.name,
        id,
    }
    .into()
}

fn read_user_row(row: &Row<'_>) -> EntResult<User> {
    let user = User {
        id: row.get("id")?,
        name: row.get("name")?,
        age: row.get("age")?,
        email: row.get("email")?,
    };

    NewUser::new(user.name.as_str(), user.age, user.email.as_str())
        .validate()
        .map_err(|err| {
            EntError::InvalidData(format!("users row {} is invalid: {err}", user.id))
        })?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::insert_sql;
    use crate::model::user::USER;

    #[test]
    fn insert_sql_follows_declaration_order() {
        assert_eq!(
            insert_sql(&USER),
            "INSERT INTO users (name, age, email) VALUES (?1, ?2, ?3);"
        );
    }
}
