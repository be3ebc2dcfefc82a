use chrono::{NaiveDateTime, Utc};
use rowmap::{Handle, OrmError, Registry, Result, Value};
use std::process::ExitCode;
use tracing::{error, info};

rowmap::record! {
    #[derive(Debug, Default)]
    struct UpdatePerson {
        id: i64 => "column=id primarykey=yes table=Users",
        name: String => "column=name",
        dtadded: NaiveDateTime => "column=dtadded",
        status: i32 => "column=status",
        ignored: i32 => "column=ignored omit=yes",
    }
}

rowmap::record! {
    #[derive(Debug, Default)]
    struct InsertPerson {
        id: i64 => "column=id primarykey=yes table=Users",
        name: String => "column=name",
        dtadded: NaiveDateTime => "column=dtadded",
        status: i32 => "column=status",
        ignored: i32 => "column=ignored omit=yes",
    }
}

rowmap::record! {
    #[derive(Debug, Default)]
    struct ExampleSelect {
        id: i64 => "column=id primarykey=yes table=Users",
        name: String => "column=name",
        dtadded: NaiveDateTime => "column=dtadded",
    }
}

const USERS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS Users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    dtadded TEXT NOT NULL,
    status INTEGER NOT NULL DEFAULT 0
)"#;

fn create_users_table(handle: &Handle) -> Result<()> {
    rowmap::execute_sql(handle, USERS_TABLE_SQL, &[])?;
    Ok(())
}

/// Inserts a single row into Users unless an earlier run already did
fn insert_one_example(handle: &Handle) -> Result<()> {
    match rowmap::find_by_key::<ExampleSelect, _>(handle, &12i64) {
        Ok(existing) => {
            info!("Item with ID {} already exists, skipping insert", existing.id);
            return Ok(());
        }
        Err(OrmError::NotFound { .. }) => {}
        Err(e) => return Err(e),
    }

    let entry = InsertPerson {
        id: 12,
        name: "Test".to_string(),
        dtadded: Utc::now().naive_utc(),
        status: 1,
        ..InsertPerson::default()
    };

    let statement = rowmap::build_insert(&entry)?;
    let result = rowmap::execute(handle, &statement)?;
    info!(
        "Item with ID {} was inserted. {} rows were affected",
        result.last_insert_id, result.rows_affected
    );
    Ok(())
}

/// Updates the row written by `insert_one_example`
fn update_example(handle: &Handle) -> Result<()> {
    let person = UpdatePerson {
        id: 12,
        name: "Test".to_string(),
        dtadded: Utc::now().naive_utc(),
        status: 2,
        ..UpdatePerson::default()
    };

    let statement = rowmap::build_update(&person)?;
    let result = rowmap::execute(handle, &statement)?;
    info!(
        "Item with ID {} was updated. {} rows were affected",
        person.id, result.rows_affected
    );
    Ok(())
}

/// Works with two databases side by side through explicit handles
fn multiple_connections_example(registry: &mut Registry) -> Result<()> {
    let database_a = registry.open("testA", ":memory:")?;
    let database_b = registry.open("testB", ":memory:")?;

    for (handle, names) in [(&database_a, ["Ada", "Alan"]), (&database_b, ["Grace", "Linus"])] {
        create_users_table(handle)?;
        for (offset, name) in names.iter().enumerate() {
            rowmap::insert(
                handle,
                &InsertPerson {
                    id: 5 + offset as i64,
                    name: name.to_string(),
                    dtadded: Utc::now().naive_utc(),
                    status: 1,
                    ..InsertPerson::default()
                },
            )?;
        }
    }

    let result: ExampleSelect =
        rowmap::query_single(&database_a, "SELECT * FROM Users WHERE id=?", &[Value::Int(5)])?;
    info!("Result: {:?}", result);

    let results: Vec<ExampleSelect> = rowmap::query_many(&database_b, "SELECT * FROM Users", &[])?;
    for r in results {
        info!("Result: {:?}", r);
    }
    Ok(())
}

fn run(dsn: &str) -> Result<()> {
    let mut registry = Registry::new();
    let handle = registry.open("main", dsn)?;
    create_users_table(&handle)?;

    insert_one_example(&handle)?;
    update_example(&handle)?;
    multiple_connections_example(&mut registry)
}

fn main() -> ExitCode {
    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt::init();

    let dsn = std::env::args().nth(1).unwrap_or_else(|| ":memory:".to_string());
    info!("Starting rowmap demo against {}", dsn);

    match run(&dsn) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
