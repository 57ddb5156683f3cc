use entlite_core::model::user;
use entlite_core::{
    Client, EntError, NewUser, StoreConfig, TransactionError, User, UserRepository, UserUpdate,
};
use std::panic::{catch_unwind, AssertUnwindSafe};

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

#[test]
fn committed_unit_persists_every_change() {
    let (client, users) = seeded_client();

    let david = client
        .with_tx(|tx| {
            let repo = tx.users();
            let david = repo.create_user(&NewUser::new("David", 28, "david@example.com"))?;
            repo.update_user(users[1].id, &UserUpdate::new().age(33))?;
            Ok(david)
        })
        .unwrap();

    assert_eq!(client.get_user(david.id).unwrap().name, "David");
    assert_eq!(client.get_user(users[1].id).unwrap().age, 33);
    assert_eq!(client.count(&User::query()).unwrap(), 4);
}

#[test]
fn logical_failure_rolls_back_and_returns_the_error() {
    let (client, users) = seeded_client();

    let err = client
        .with_tx(|tx| -> Result<(), EntError> {
            let repo = tx.users();
            repo.create_user(&NewUser::new("Eve", 29, "eve@example.com"))?;
            repo.update_user(users[0].id, &UserUpdate::new().age(99))?;
            Err(EntError::aborted("quota exceeded"))
        })
        .unwrap_err();

    assert!(matches!(err, EntError::Aborted(ref reason) if reason == "quota exceeded"));
    assert_eq!(client.count(&User::query()).unwrap(), 3);
    assert_eq!(client.get_user(users[0].id).unwrap().age, 30);
    assert!(client
        .all(&User::query().filter(user::name_eq("Eve")).unwrap())
        .unwrap()
        .is_empty());
}

#[test]
fn failing_operation_inside_unit_rolls_back_earlier_writes() {
    let (client, _) = seeded_client();

    let err = client
        .with_tx(|tx| {
            let repo = tx.users();
            repo.create_user(&NewUser::new("Frank", 50, "frank@example.com"))?;
            repo.create_user(&NewUser::new("Bobby", 21, "bob@example.com"))
        })
        .unwrap_err();

    assert!(err.is_unique_violation());
    assert_eq!(client.count(&User::query()).unwrap(), 3);
}

#[test]
fn panic_rolls_back_and_propagates() {
    let (client, _) = seeded_client();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        client.with_tx(|tx| -> Result<(), EntError> {
            tx.users()
                .create_user(&NewUser::new("Grace", 44, "grace@example.com"))?;
            panic!("unit of work exploded");
        })
    }));

    let payload = outcome.expect_err("panic should reach the caller");
    assert_eq!(
        payload.downcast_ref::<&str>().copied(),
        Some("unit of work exploded")
    );

    assert_eq!(client.count(&User::query()).unwrap(), 3);
    client
        .create_user(&NewUser::new("Grace", 44, "grace@example.com"))
        .unwrap();
    assert_eq!(client.count(&User::query()).unwrap(), 4);
}

#[test]
fn client_calls_inside_unit_report_open_transaction() {
    let (client, _) = seeded_client();

    let (nested_tx, nested_read) = client
        .with_tx(|_tx| {
            let nested_tx = client.with_tx(|_| Ok(()));
            let nested_read = client.count(&User::query());
            Ok((nested_tx, nested_read))
        })
        .unwrap();

    assert!(matches!(
        nested_tx,
        Err(EntError::Transaction(TransactionError::AlreadyOpen))
    ));
    assert!(matches!(
        nested_read,
        Err(EntError::Transaction(TransactionError::AlreadyOpen))
    ));

    // Ownership is released once the unit finishes.
    assert_eq!(client.count(&User::query()).unwrap(), 3);
}

#[test]
fn bulk_create_inside_unit_rolls_back_with_it() {
    let client = Client::open_in_memory().unwrap();

    let err = client
        .with_tx(|tx| -> Result<(), EntError> {
            let created = tx.users().create_users(&[
                NewUser::new("Hank", 31, "hank@example.com"),
                NewUser::new("Ivy", 27, "ivy@example.com"),
            ])?;
            assert_eq!(created.len(), 2);
            assert_eq!(tx.users().count(&User::query())?, 2);
            Err(EntError::aborted("undo batch"))
        })
        .unwrap_err();

    assert!(matches!(err, EntError::Aborted(_)));
    assert_eq!(client.count(&User::query()).unwrap(), 0);
}

#[test]
fn failed_bulk_inside_unit_keeps_earlier_writes_of_the_unit() {
    let client = Client::open_in_memory().unwrap();

    let kept = client
        .with_tx(|tx| {
            let repo = tx.users();
            let kept = repo.create_user(&NewUser::new("Jack", 36, "jack@example.com"))?;
            let batch = repo.create_users(&[
                NewUser::new("Kim", 24, "kim@example.com"),
                NewUser::new("Kimberly", 25, "kim@example.com"),
            ]);
            assert!(batch.unwrap_err().is_unique_violation());
            Ok(kept)
        })
        .unwrap();

    let all = client.all(&User::query()).unwrap();
    assert_eq!(all, vec![kept]);
}

#[test]
fn uncommitted_writes_are_invisible_to_other_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("isolation.sqlite3");
    let writer = Client::open(&StoreConfig::file(&path)).unwrap();
    let reader = Client::open(&StoreConfig::file(&path)).unwrap();

    let seen_during = writer
        .with_tx(|tx| {
            tx.users()
                .create_user(&NewUser::new("Liam", 38, "liam@example.com"))?;
            reader.count(&User::query())
        })
        .unwrap();

    assert_eq!(seen_during, 0);
    assert_eq!(reader.count(&User::query()).unwrap(), 1);
}

#[test]
fn concurrent_callers_share_one_client() {
    let client = Client::open_in_memory().unwrap();

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let client = &client;
            scope.spawn(move || {
                for index in 0..5 {
                    let email = format!("worker{worker}_{index}@example.com");
                    client
                        .create_user(&NewUser::new(format!("W{worker}"), 20 + index, email))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(client.count(&User::query()).unwrap(), 20);
}

#[test]
fn concurrent_units_of_work_do_not_interleave() {
    let client = Client::open_in_memory().unwrap();

    std::thread::scope(|scope| {
        for worker in 0..3 {
            let client = &client;
            scope.spawn(move || {
                client
                    .with_tx(|tx| {
                        tx.users().create_users(&[
                            NewUser::new("A", 20, format!("a{worker}@example.com")),
                            NewUser::new("B", 21, format!("b{worker}@example.com")),
                        ])
                    })
                    .unwrap();
            });
        }
    });

    assert_eq!(client.count(&User::query()).unwrap(), 6);
}
