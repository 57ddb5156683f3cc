//! User entity.
//!
//! # Responsibility
//! - Declare the `User` definition (fields, constraints, edges).
//! - Provide input models for create/update and typed predicate helpers.
//!
//! # Invariants
//! - `name` and `email` are non-empty, `age` is positive, `email` is unique.
//! - `id` is assigned by the store and never reused.

use crate::model::entity::{Constraint, EntityDef, FieldDef, FieldKind, FieldValue, ValidationError};
use crate::query::{Op, Predicate, Query};
use serde::{Deserialize, Serialize};

/// Store-assigned identity of a persisted user.
pub type UserId = i64;

pub const FIELD_NAME: &str = "name";
pub const FIELD_AGE: &str = "age";
pub const FIELD_EMAIL: &str = "email";

/// Definition of the `User` entity.
pub static USER: EntityDef = EntityDef {
    name: "User",
    table: "users",
    fields: &[
        FieldDef {
            name: FIELD_NAME,
            kind: FieldKind::Text,
            constraints: &[Constraint::NotEmpty],
        },
        FieldDef {
            name: FIELD_AGE,
            kind: FieldKind::Integer,
            constraints: &[Constraint::Positive],
        },
        FieldDef {
            name: FIELD_EMAIL,
            kind: FieldKind::Text,
            constraints: &[Constraint::NotEmpty, Constraint::Unique],
        },
    ],
    edges: &[],
};

/// Persisted user snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub age: i64,
    pub email: String,
}

impl User {
    /// Starts a query over all users.
    pub fn query() -> Query {
        Query::new(&USER)
    }
}

/// Field values for a user that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub age: i64,
    pub email: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, age: i64, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            email: email.into(),
        }
    }

    /// Checks every field against the `User` definition.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = FieldValue::from(self.name.as_str());
        let age = FieldValue::from(self.age);
        let email = FieldValue::from(self.email.as_str());
        USER.validate(&[(FIELD_NAME, &name), (FIELD_AGE, &age), (FIELD_EMAIL, &email)])
    }
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub email: Option<String>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn age(mut self, age: i64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.email.is_none()
    }

    /// Supplied columns with their values, in declaration order.
    pub fn assignments(&self) -> Vec<(&'static str, FieldValue)> {
        let mut values = Vec::new();
        if let Some(name) = self.name.as_deref() {
            values.push((FIELD_NAME, FieldValue::from(name)));
        }
        if let Some(age) = self.age {
            values.push((FIELD_AGE, FieldValue::from(age)));
        }
        if let Some(email) = self.email.as_deref() {
            values.push((FIELD_EMAIL, FieldValue::from(email)));
        }
        values
    }

    /// Checks only the supplied fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let assignments = self.assignments();
        let values: Vec<(&str, &FieldValue)> = assignments
            .iter()
            .map(|(field, value)| (*field, value))
            .collect();
        USER.validate(&values)
    }
}

pub fn id_eq(id: UserId) -> Predicate {
    Predicate::new("id", Op::Eq, id)
}

pub fn name_eq(name: impl Into<String>) -> Predicate {
    Predicate::new(FIELD_NAME, Op::Eq, FieldValue::Text(name.into()))
}

pub fn name_contains(needle: impl Into<String>) -> Predicate {
    Predicate::new(FIELD_NAME, Op::Contains, FieldValue::Text(needle.into()))
}

pub fn name_contains_fold(needle: impl Into<String>) -> Predicate {
    Predicate::new(FIELD_NAME, Op::ContainsFold, FieldValue::Text(needle.into()))
}

pub fn name_has_prefix(prefix: impl Into<String>) -> Predicate {
    Predicate::new(FIELD_NAME, Op::HasPrefix, FieldValue::Text(prefix.into()))
}

pub fn age_eq(age: i64) -> Predicate {
    Predicate::new(FIELD_AGE, Op::Eq, age)
}

pub fn age_gt(age: i64) -> Predicate {
    Predicate::new(FIELD_AGE, Op::Gt, age)
}

pub fn age_ge(age: i64) -> Predicate {
    Predicate::new(FIELD_AGE, Op::Ge, age)
}

pub fn age_lt(age: i64) -> Predicate {
    Predicate::new(FIELD_AGE, Op::Lt, age)
}

pub fn age_le(age: i64) -> Predicate {
    Predicate::new(FIELD_AGE, Op::Le, age)
}

pub fn email_eq(email: impl Into<String>) -> Predicate {
    Predicate::new(FIELD_EMAIL, Op::Eq, FieldValue::Text(email.into()))
}

pub fn email_has_suffix(suffix: impl Into<String>) -> Predicate {
    Predicate::new(FIELD_EMAIL, Op::HasSuffix, FieldValue::Text(suffix.into()))
}
