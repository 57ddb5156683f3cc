//! Entity-driven schema creation.
//!
//! # Responsibility
//! - Derive table structure from entity definitions.
//! - Create missing tables; verify existing ones match the definition.
//!
//! # Invariants
//! - All tables are ensured in one deferred transaction: either every
//!   missing table is created or none is. Verifying existing tables only
//!   reads, so the write lock is taken only when a table is created.
//! - An existing table whose columns, types, nullability or unique indexes
//!   differ from the definition is never altered; it is reported as
//!   `SchemaError::IncompatibleChange`.
//! - The identity column must be declared `AUTOINCREMENT` so ids are never
//!   reused after a delete.

use crate::error::EntResult;
use crate::model::entity::{EntityDef, ID_COLUMN};
use log::{error, info};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Stored structure cannot be reconciled with an entity definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    IncompatibleChange { table: String, detail: String },
    /// Entity table has not been created on this connection.
    MissingTable(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompatibleChange { table, detail } => {
                write!(f, "table `{table}` is incompatible with its entity: {detail}")
            }
            Self::MissingTable(table) => write!(f, "required table `{table}` does not exist"),
        }
    }
}

impl Error for SchemaError {}

/// Column shape as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnShape {
    name: String,
    sql_type: String,
    not_null: bool,
    primary_key: bool,
}

/// Ensures a table exists for every definition.
///
/// Calling this twice with the same definitions is a no-op the second time.
pub fn ensure_schema(conn: &mut Connection, entities: &[&EntityDef]) -> EntResult<()> {
    let started_at = Instant::now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

    let mut created = 0usize;
    for def in entities {
        let outcome = if table_exists(&tx, def.table)? {
            verify_table(&tx, def)
        } else {
            create_table(&tx, def).map(|()| created += 1)
        };

        if let Err(err) = outcome {
            error!(
                "event=schema_ensure module=db status=error table={} duration_ms={} error={}",
                def.table,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
    }

    tx.commit()?;
    info!(
        "event=schema_ensure module=db status=ok entities={} created={} duration_ms={}",
        entities.len(),
        created,
        started_at.elapsed().as_millis()
    );
    Ok(())
}

/// Returns whether `table` exists in the main schema.
pub fn table_exists(conn: &Connection, table: &str) -> EntResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Renders the `CREATE TABLE` statement for a definition.
pub fn create_table_sql(def: &EntityDef) -> String {
    let mut columns = vec![format!("{ID_COLUMN} INTEGER PRIMARY KEY AUTOINCREMENT")];
    for field in def.fields {
        let unique = if field.is_unique() { " UNIQUE" } else { "" };
        columns.push(format!(
            "{} {} NOT NULL{unique}",
            field.name,
            field.kind.sql_type()
        ));
    }

    format!(
        "CREATE TABLE {} (\n    {}\n);",
        def.table,
        columns.join(",\n    ")
    )
}

fn create_table(conn: &Connection, def: &EntityDef) -> EntResult<()> {
    conn.execute_batch(&create_table_sql(def))?;
    Ok(())
}

pub(crate) fn verify_table(conn: &Connection, def: &EntityDef) -> EntResult<()> {
    let incompatible = |detail: String| SchemaError::IncompatibleChange {
        table: def.table.to_string(),
        detail,
    };

    if !declares_autoincrement(conn, def.table)? {
        return Err(incompatible(format!(
            "column `{ID_COLUMN}` must be INTEGER PRIMARY KEY AUTOINCREMENT"
        ))
        .into());
    }

    let actual = table_columns(conn, def.table)?;
    let mut expected = vec![ColumnShape {
        name: ID_COLUMN.to_string(),
        sql_type: "INTEGER".to_string(),
        not_null: false,
        primary_key: true,
    }];
    expected.extend(def.fields.iter().map(|field| ColumnShape {
        name: field.name.to_string(),
        sql_type: field.kind.sql_type().to_string(),
        not_null: true,
        primary_key: false,
    }));

    for column in &expected {
        let Some(found) = actual.iter().find(|item| item.name == column.name) else {
            return Err(incompatible(format!("missing column `{}`", column.name)).into());
        };
        if found.sql_type != column.sql_type {
            return Err(incompatible(format!(
                "column `{}` has type {}, expected {}",
                column.name, found.sql_type, column.sql_type
            ))
            .into());
        }
        // INTEGER PRIMARY KEY aliases rowid and reports notnull=0.
        if !column.primary_key && found.not_null != column.not_null {
            return Err(incompatible(format!("column `{}` must be NOT NULL", column.name)).into());
        }
        if found.primary_key != column.primary_key {
            return Err(incompatible(format!(
                "column `{}` primary key mismatch",
                column.name
            ))
            .into());
        }
    }

    if let Some(extra) = actual
        .iter()
        .find(|item| !expected.iter().any(|column| column.name == item.name))
    {
        return Err(incompatible(format!("unexpected column `{}`", extra.name)).into());
    }

    let unique_columns = unique_single_columns(conn, def.table)?;
    for field in def.fields {
        let stored_unique = unique_columns.contains(field.name);
        if field.is_unique() != stored_unique {
            let expectation = if field.is_unique() {
                "requires"
            } else {
                "must not have"
            };
            return Err(incompatible(format!(
                "column `{}` {expectation} a unique index",
                field.name
            ))
            .into());
        }
    }

    Ok(())
}

/// Whether the stored `CREATE TABLE` text declares `AUTOINCREMENT`.
///
/// SQLite keeps no other trace of the keyword per table; a table with only
/// `INTEGER PRIMARY KEY` reuses the largest rowid after a delete.
fn declares_autoincrement(conn: &Connection, table: &str) -> EntResult<bool> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            [table],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();
    Ok(sql.is_some_and(|sql| sql.to_ascii_uppercase().contains("AUTOINCREMENT")))
}

fn table_columns(conn: &Connection, table: &str) -> EntResult<Vec<ColumnShape>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        let sql_type: String = row.get("type")?;
        columns.push(ColumnShape {
            name: row.get("name")?,
            sql_type: sql_type.to_ascii_uppercase(),
            not_null: row.get::<_, i64>("notnull")? == 1,
            primary_key: row.get::<_, i64>("pk")? > 0,
        });
    }
    Ok(columns)
}

/// Columns covered by a single-column unique index (declared or explicit).
fn unique_single_columns(conn: &Connection, table: &str) -> EntResult<BTreeSet<String>> {
    let mut index_stmt = conn.prepare(&format!("PRAGMA index_list({table});"))?;
    let mut index_rows = index_stmt.query([])?;
    let mut unique_indexes = Vec::new();
    while let Some(row) = index_rows.next()? {
        let unique: i64 = row.get("unique")?;
        let origin: String = row.get("origin")?;
        // The rowid primary key never appears here; `pk` indexes belong to
        // non-integer primary keys, which entity tables do not use.
        if unique == 1 && origin != "pk" {
            unique_indexes.push(row.get::<_, String>("name")?);
        }
    }

    let mut columns = BTreeSet::new();
    for index in unique_indexes {
        let mut info_stmt = conn.prepare(&format!("PRAGMA index_info(\"{index}\");"))?;
        let mut info_rows = info_stmt.query([])?;
        let mut indexed = Vec::new();
        while let Some(row) = info_rows.next()? {
            // Expression index terms have no column name.
            indexed.push(row.get::<_, Option<String>>("name")?);
        }
        if let [Some(single)] = indexed.as_slice() {
            columns.insert(single.clone());
        }
    }

    Ok(columns)
}
