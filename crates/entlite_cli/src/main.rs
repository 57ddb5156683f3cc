//! Command-line walkthrough of the entity client.
//!
//! # Responsibility
//! - Open a store (file or in-memory) and run the user lifecycle against it:
//!   bulk create, filtered query, update, paging, aggregation, a transaction
//!   and a delete.
//! - Print each step as plain text or JSON lines.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use entlite_core::model::user::{self, FIELD_AGE};
use entlite_core::{
    core_version, default_log_level, init_logging, Aggregate, Client, Direction, LogConfig,
    NewUser, StoreConfig, User, UserRepository, UserUpdate,
};
use log::info;
use serde_json::json;
use std::path::PathBuf;

const PAGE_SIZE: u32 = 2;

#[derive(Parser)]
#[command(name = "entlite")]
#[command(about = "Declarative entities over embedded SQLite")]
struct Cli {
    /// Database file; a private in-memory store is used when omitted.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Absolute directory for rolling log files; logging stays off when omitted.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Log level (trace|debug|info|warn|error); requires `--log-dir`.
    #[arg(long, global = true, requires = "log_dir")]
    log_level: Option<String>,
    /// Print one JSON object per step.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full user lifecycle (default).
    Demo,
    /// List stored users ordered by id.
    List,
    Version,
}

struct Printer {
    json: bool,
}

impl Printer {
    fn users(&self, step: &str, users: &[User]) {
        if self.json {
            println!("{}", json!({ "step": step, "users": users }));
            return;
        }
        println!("{step}:");
        for user in users {
            println!(
                "  #{} name={} age={} email={}",
                user.id, user.name, user.age, user.email
            );
        }
    }

    fn user(&self, step: &str, user: &User) {
        self.users(step, std::slice::from_ref(user))
    }

    fn value(&self, step: &str, value: f64) {
        if self.json {
            println!("{}", json!({ "step": step, "value": value }));
        } else {
            println!("{step}: {value:.2}");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or_else(|| default_log_level());
        let config = LogConfig::new(level, dir).map_err(|err| anyhow!(err))?;
        init_logging(&config).map_err(|err| anyhow!(err))?;
    }

    let printer = Printer { json: cli.json };
    match cli.command.unwrap_or(Command::Demo) {
        Command::Version => {
            println!("entlite_core {}", core_version());
            Ok(())
        }
        Command::List => {
            let client = open_client(cli.db)?;
            let users = client.all(&User::query().order_by("id", Direction::Asc)?)?;
            printer.users("list", &users);
            client.close()?;
            Ok(())
        }
        Command::Demo => {
            let client = open_client(cli.db)?;
            run_demo(&client, &printer)?;
            client.close()?;
            Ok(())
        }
    }
}

fn open_client(db: Option<PathBuf>) -> Result<Client> {
    let config = match db {
        Some(path) => StoreConfig::file(path),
        None => StoreConfig::in_memory(),
    };
    Client::open(&config).context("failed to open store")
}

fn run_demo(client: &Client, printer: &Printer) -> Result<()> {
    info!("event=demo module=cli status=start");

    let users = client
        .create_users(&[
            NewUser::new("Alice", 30, "alice@example.com"),
            NewUser::new("Bob", 32, "bob@example.com"),
            NewUser::new("Charlie", 35, "charlie@example.com"),
        ])
        .context("creating users")?;
    printer.users("created", &users);

    let older_with_a = User::query()
        .filter_all([user::age_gt(30), user::name_contains("a")])?
        .order_by(FIELD_AGE, Direction::Desc)?;
    printer.users("age>30 and name contains \"a\"", &client.all(&older_with_a)?);

    let updated = client
        .update_user(
            users[0].id,
            &UserUpdate::new().age(31).email("alice_new@example.com"),
        )
        .context("updating first user")?;
    printer.user("updated", &updated);

    let ordered = User::query().order_by("id", Direction::Asc)?;
    let mut offset = 0;
    loop {
        let page = client.all(&ordered.clone().limit(PAGE_SIZE).offset(offset))?;
        if page.is_empty() {
            break;
        }
        printer.users(&format!("page {}", offset / PAGE_SIZE + 1), &page);
        offset += PAGE_SIZE;
    }

    let average = client.aggregate(&User::query(), &Aggregate::avg(FIELD_AGE))?;
    printer.value("average age", average);

    let second = users[1].id;
    let david = client
        .with_tx(|tx| {
            let repo = tx.users();
            let david = repo.create_user(&NewUser::new("David", 28, "david@example.com"))?;
            repo.update_user(second, &UserUpdate::new().age(33))?;
            Ok(david)
        })
        .context("running transaction")?;
    printer.user("created in transaction", &david);

    client
        .delete_user(users[2].id)
        .context("deleting third user")?;

    printer.users("final", &client.all(&ordered)?);
    info!("event=demo module=cli status=ok");
    Ok(())
}
