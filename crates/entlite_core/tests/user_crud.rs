use entlite_core::model::user;
use entlite_core::{
    Client, Constraint, EntError, FieldKind, NewUser, NotFoundError, StoreError, User,
    UserUpdate, ValidationError,
};

fn seeded_client() -> (Client, Vec<User>) {
    let client = Client::open_in_memory().unwrap();
    let users = client
        .create_users(&[
            NewUser::new("Alice", 30, "alice@example.com"),
            NewUser::new("Bob", 32, "bob@example.com"),
            NewUser::new("Charlie", 35, "charlie@example.com"),
        ])
        .unwrap();
    (client, users)
}

fn names(users: &[User]) -> Vec<&str> {
    users.iter().map(|user| user.name.as_str()).collect()
}

#[test]
fn create_and_get_roundtrip() {
    let client = Client::open_in_memory().unwrap();
    let created = client
        .create_user(&NewUser::new("Alice", 30, "alice@example.com"))
        .unwrap();

    assert!(created.id > 0);
    assert_eq!(created.name, "Alice");
    assert_eq!(created.age, 30);
    assert_eq!(created.email, "alice@example.com");

    let loaded = client.get_user(created.id).unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn bulk_create_returns_users_in_input_order_with_distinct_ids() {
    let (_client, users) = seeded_client();

    assert_eq!(names(&users), vec!["Alice", "Bob", "Charlie"]);
    assert!(users[0].id < users[1].id && users[1].id < users[2].id);
}

#[test]
fn empty_bulk_create_is_a_no_op() {
    let client = Client::open_in_memory().unwrap();
    assert!(client.create_users(&[]).unwrap().is_empty());
    assert_eq!(client.count(&User::query()).unwrap(), 0);
}

#[test]
fn create_rejects_non_positive_age() {
    let client = Client::open_in_memory().unwrap();
    let err = client
        .create_user(&NewUser::new("Zed", 0, "zed@example.com"))
        .unwrap_err();

    assert!(matches!(
        err,
        EntError::Validation(ValidationError::ConstraintViolated {
            field: "age",
            constraint: Constraint::Positive,
        })
    ));
    assert!(err.is_caller_fixable());
    assert_eq!(client.count(&User::query()).unwrap(), 0);
}

#[test]
fn create_rejects_empty_name_and_email() {
    let client = Client::open_in_memory().unwrap();

    let err = client
        .create_user(&NewUser::new("", 20, "nameless@example.com"))
        .unwrap_err();
    assert!(matches!(
        err,
        EntError::Validation(ValidationError::ConstraintViolated {
            field: "name",
            constraint: Constraint::NotEmpty,
        })
    ));

    let err = client
        .create_user(&NewUser::new("Mailless", 20, ""))
        .unwrap_err();
    assert!(matches!(
        err,
        EntError::Validation(ValidationError::ConstraintViolated {
            field: "email",
            constraint: Constraint::NotEmpty,
        })
    ));
}

#[test]
fn duplicate_email_is_rejected_and_first_row_survives() {
    let client = Client::open_in_memory().unwrap();
    let first = client
        .create_user(&NewUser::new("Alice", 30, "alice@example.com"))
        .unwrap();

    let err = client
        .create_user(&NewUser::new("Impostor", 40, "alice@example.com"))
        .unwrap_err();

    assert!(err.is_unique_violation());
    match err {
        EntError::Store(StoreError::UniqueViolation { table, column }) => {
            assert_eq!(table, "users");
            assert_eq!(column, "email");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(client.count(&User::query()).unwrap(), 1);
    assert_eq!(client.get_user(first.id).unwrap().name, "Alice");
}

#[test]
fn bulk_create_with_invalid_entry_persists_nothing() {
    let client = Client::open_in_memory().unwrap();
    let err = client
        .create_users(&[
            NewUser::new("Alice", 30, "alice@example.com"),
            NewUser::new("Bob", -2, "bob@example.com"),
        ])
        .unwrap_err();

    assert!(matches!(
        err,
        EntError::Validation(ValidationError::ConstraintViolated { field: "age", .. })
    ));
    assert_eq!(client.count(&User::query()).unwrap(), 0);
}

#[test]
fn bulk_create_with_duplicate_inside_batch_persists_nothing() {
    let client = Client::open_in_memory().unwrap();
    let err = client
        .create_users(&[
            NewUser::new("Alice", 30, "shared@example.com"),
            NewUser::new("Bob", 32, "bob@example.com"),
            NewUser::new("Carol", 33, "shared@example.com"),
        ])
        .unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(client.count(&User::query()).unwrap(), 0);

    // Savepoint was released; the connection accepts new writes.
    client
        .create_user(&NewUser::new("Alice", 30, "shared@example.com"))
        .unwrap();
    assert_eq!(client.count(&User::query()).unwrap(), 1);
}

#[test]
fn bulk_create_colliding_with_stored_row_persists_nothing_new() {
    let (client, _) = seeded_client();
    let err = client
        .create_users(&[
            NewUser::new("Dora", 41, "dora@example.com"),
            NewUser::new("Bobby", 22, "bob@example.com"),
        ])
        .unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(client.count(&User::query()).unwrap(), 3);
}

#[test]
fn update_changes_only_supplied_fields() {
    let (client, users) = seeded_client();
    let alice = &users[0];

    let updated = client
        .update_user(alice.id, &UserUpdate::new().age(31))
        .unwrap();

    assert_eq!(updated.id, alice.id);
    assert_eq!(updated.name, "Alice");
    assert_eq!(updated.age, 31);
    assert_eq!(updated.email, "alice@example.com");
    assert_eq!(client.get_user(alice.id).unwrap(), updated);
}

#[test]
fn update_age_and_email_together() {
    let (client, users) = seeded_client();

    let updated = client
        .update_user(
            users[0].id,
            &UserUpdate::new().age(31).email("alice_new@example.com"),
        )
        .unwrap();

    assert_eq!(updated.age, 31);
    assert_eq!(updated.email, "alice_new@example.com");
    let found = client
        .one(&User::query().filter(user::email_eq("alice_new@example.com")).unwrap())
        .unwrap();
    assert_eq!(found.id, users[0].id);
}

#[test]
fn empty_update_returns_current_snapshot() {
    let (client, users) = seeded_client();
    let unchanged = client.update_user(users[1].id, &UserUpdate::new()).unwrap();
    assert_eq!(unchanged, users[1]);
}

#[test]
fn update_validates_supplied_fields_only() {
    let (client, users) = seeded_client();

    let err = client
        .update_user(users[0].id, &UserUpdate::new().age(-1))
        .unwrap_err();
    assert!(matches!(
        err,
        EntError::Validation(ValidationError::ConstraintViolated {
            field: "age",
            constraint: Constraint::Positive,
        })
    ));

    assert_eq!(client.get_user(users[0].id).unwrap().age, 30);
}

#[test]
fn update_to_taken_email_is_rejected() {
    let (client, users) = seeded_client();
    let err = client
        .update_user(users[0].id, &UserUpdate::new().email("bob@example.com"))
        .unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(client.get_user(users[0].id).unwrap().email, "alice@example.com");
}

#[test]
fn update_missing_user_is_not_found() {
    let client = Client::open_in_memory().unwrap();
    let err = client
        .update_user(404, &UserUpdate::new().age(20))
        .unwrap_err();

    assert!(matches!(
        err,
        EntError::NotFound(NotFoundError::Identity { entity: "User", id: 404 })
    ));
}

#[test]
fn delete_removes_exactly_one_user() {
    let (client, users) = seeded_client();

    client.delete_user(users[2].id).unwrap();

    let remaining = client.all(&User::query()).unwrap();
    assert_eq!(names(&remaining), vec!["Alice", "Bob"]);
    assert!(client.find_user(users[2].id).unwrap().is_none());
    assert!(!client.exists(users[2].id).unwrap());
    assert!(client.exists(users[0].id).unwrap());

    let err = client.delete_user(users[2].id).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn deleted_identity_is_never_reused() {
    let client = Client::open_in_memory().unwrap();
    let first = client
        .create_user(&NewUser::new("Alice", 30, "alice@example.com"))
        .unwrap();
    client.delete_user(first.id).unwrap();

    let second = client
        .create_user(&NewUser::new("Bob", 32, "bob@example.com"))
        .unwrap();
    assert!(second.id > first.id);
}

#[test]
fn get_missing_user_is_not_found() {
    let client = Client::open_in_memory().unwrap();
    assert!(client.get_user(7).unwrap_err().is_not_found());
    assert!(client.find_user(7).unwrap().is_none());
}

#[test]
fn stored_rows_violating_definition_are_rejected_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tampered.sqlite3");

    let client = Client::open(&entlite_core::StoreConfig::file(&path)).unwrap();
    let alice = client
        .create_user(&NewUser::new("Alice", 30, "alice@example.com"))
        .unwrap();
    client.close().unwrap();

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute("UPDATE users SET age = 0 WHERE id = ?1;", [alice.id])
            .unwrap();
    }

    let reopened = Client::open(&entlite_core::StoreConfig::file(&path)).unwrap();
    let err = reopened.get_user(alice.id).unwrap_err();
    assert!(matches!(err, EntError::InvalidData(_)));
}

#[test]
fn user_models_serialize_with_field_names() {
    let user = User {
        id: 1,
        name: "Alice".to_string(),
        age: 30,
        email: "alice@example.com".to_string(),
    };

    let value = serde_json::to_value(&user).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "id": 1,
            "name": "Alice",
            "age": 30,
            "email": "alice@example.com"
        })
    );

    let parsed: NewUser =
        serde_json::from_str(r#"{"name":"Bob","age":32,"email":"bob@example.com"}"#).unwrap();
    assert_eq!(parsed, NewUser::new("Bob", 32, "bob@example.com"));
}

#[test]
fn field_kinds_match_user_definition() {
    let kinds: Vec<_> = entlite_core::USER
        .fields
        .iter()
        .map(|field| (field.name, field.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("name", FieldKind::Text),
            ("age", FieldKind::Integer),
            ("email", FieldKind::Text),
        ]
    );
}
