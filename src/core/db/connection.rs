/// Connection Management Module
///
/// This module provides the transport seam, DSN parsing, and the registry of
/// named database handles.
///
/// A [`Handle`] is a cheap clonable reference to one open database. The
/// [`Registry`] keeps handles by name and remembers the most recently opened
/// one as "current", so callers pass handles explicitly instead of reaching
/// for process-wide state.

use super::value::Value;
use crate::config::Config;
use crate::core::{OrmError, Result, TransportError};
use rusqlite::{params_from_iter, Connection};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a mutating statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    /// Row id generated by the last insert on this connection
    pub last_insert_id: i64,
    /// Number of rows changed by the statement
    pub rows_affected: u64,
}

/// A fully materialised result set
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rows {
    /// Column names as reported by the driver
    pub columns: Vec<String>,
    /// Row values, one entry per column
    pub rows: Vec<Vec<Value>>,
}

/// The operations required from an underlying database driver.
///
/// Implementations must be safe to call from several threads at once.
pub trait Transport: Send + Sync {
    /// Runs a mutating statement
    fn exec(&self, sql: &str, args: &[Value]) -> std::result::Result<ExecResult, TransportError>;

    /// Runs a query and returns every row
    fn query(&self, sql: &str, args: &[Value]) -> std::result::Result<Rows, TransportError>;
}

/// Parsed data source name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dsn {
    /// Private in-memory database
    Memory,
    /// Database file path
    File(String),
    /// SQLite `file:` URI
    Uri(String),
}

impl Dsn {
    /// Parses a DSN.
    ///
    /// Accepted forms: `:memory:`, `sqlite::memory:`, `sqlite://<path>`,
    /// `sqlite:<path>` and `file:<uri>`.
    ///
    /// # Errors
    ///
    /// `OrmError::Connection` for an empty DSN or an unsupported scheme.
    pub fn parse(dsn: &str) -> Result<Self> {
        let trimmed = dsn.trim();
        if trimmed.is_empty() {
            return Err(OrmError::connection(dsn, "empty DSN"));
        }

        if trimmed == ":memory:" || trimmed == "sqlite::memory:" {
            return Ok(Dsn::Memory);
        }
        if trimmed.starts_with("file:") {
            return Ok(Dsn::Uri(trimmed.to_string()));
        }

        let path = trimmed
            .strip_prefix("sqlite://")
            .or_else(|| trimmed.strip_prefix("sqlite:"));
        match path {
            Some("") => Err(OrmError::connection(dsn, "missing database path")),
            Some(":memory:") => Ok(Dsn::Memory),
            Some(path) => Ok(Dsn::File(path.to_string())),
            None => match trimmed.split_once("://") {
                Some((scheme, _)) => Err(OrmError::connection(
                    dsn,
                    format!("unsupported DSN scheme `{}`", scheme),
                )),
                None => Err(OrmError::connection(
                    dsn,
                    "expected `sqlite://<path>`, `file:<uri>` or `:memory:`",
                )),
            },
        }
    }
}

/// Settings applied to a connection right after it is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            foreign_keys: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// SQLite transport backed by `rusqlite`
pub struct SqliteTransport {
    conn: Mutex<Connection>,
}

impl SqliteTransport {
    /// Opens the database named by `dsn` and applies `options`
    pub fn open(dsn: &Dsn, options: &ConnectionOptions) -> rusqlite::Result<Self> {
        let conn = match dsn {
            Dsn::Memory => Connection::open_in_memory()?,
            Dsn::File(path) | Dsn::Uri(path) => Connection::open(path)?,
        };

        conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
        conn.execute_batch(if options.foreign_keys {
            "PRAGMA foreign_keys = ON;"
        } else {
            "PRAGMA foreign_keys = OFF;"
        })?;
        // Reads the header, so a file that is not a database fails here
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))?;

        Ok(SqliteTransport {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a batch of semicolon separated statements without parameters
    pub fn execute_batch(&self, sql: &str) -> std::result::Result<(), TransportError> {
        let conn = self.conn.lock().map_err(|_| "connection lock poisoned")?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

impl Transport for SqliteTransport {
    fn exec(&self, sql: &str, args: &[Value]) -> std::result::Result<ExecResult, TransportError> {
        let conn = self.conn.lock().map_err(|_| "connection lock poisoned")?;
        let mut stmt = conn.prepare(sql)?;
        let changed = stmt.execute(params_from_iter(args.iter()))?;
        Ok(ExecResult {
            last_insert_id: conn.last_insert_rowid(),
            rows_affected: changed as u64,
        })
    }

    fn query(&self, sql: &str, args: &[Value]) -> std::result::Result<Rows, TransportError> {
        let conn = self.conn.lock().map_err(|_| "connection lock poisoned")?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(args.iter()))?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(Value::from(row.get_ref(i)?));
            }
            rows.push(values);
        }

        Ok(Rows { columns, rows })
    }
}

struct HandleInner {
    name: String,
    dsn: String,
    transport: Box<dyn Transport>,
}

/// A named, open database target
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    /// Wraps a transport into a handle without registering it
    pub fn new(name: &str, dsn: &str, transport: Box<dyn Transport>) -> Self {
        Handle {
            inner: Arc::new(HandleInner {
                name: name.to_string(),
                dsn: dsn.to_string(),
                transport,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn dsn(&self) -> &str {
        &self.inner.dsn
    }

    pub fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    /// Whether both handles refer to the same open database
    pub fn same_as(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.inner.name)
            .field("dsn", &self.inner.dsn)
            .finish()
    }
}

/// Named handles plus the current one
#[derive(Debug, Default)]
pub struct Registry {
    handles: HashMap<String, Handle>,
    current: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Opens a database with default options and makes it current.
    ///
    /// # Arguments
    ///
    /// * `name` - Slot name; an existing handle under this name is replaced
    /// * `dsn` - Data source name, see [`Dsn::parse`]
    ///
    /// # Errors
    ///
    /// `OrmError::Connection` if the DSN is malformed or the driver fails to
    /// open the database.
    pub fn open(&mut self, name: &str, dsn: &str) -> Result<Handle> {
        self.open_with(name, dsn, &ConnectionOptions::default())
    }

    /// Like [`Registry::open`] with explicit connection options
    pub fn open_with(&mut self, name: &str, dsn: &str, options: &ConnectionOptions) -> Result<Handle> {
        let parsed = Dsn::parse(dsn)?;
        let transport =
            SqliteTransport::open(&parsed, options).map_err(|e| OrmError::connection(dsn, e))?;
        info!(name, dsn, "opened database handle");
        Ok(self.attach(name, dsn, Box::new(transport)))
    }

    /// Registers a caller-supplied transport under `name` and makes it current
    pub fn attach(&mut self, name: &str, dsn: &str, transport: Box<dyn Transport>) -> Handle {
        let handle = Handle::new(name, dsn, transport);
        if self.handles.insert(name.to_string(), handle.clone()).is_some() {
            warn!(name, "replaced existing database handle");
        }
        self.current = Some(name.to_string());
        debug!(name, "current database handle set");
        handle
    }

    /// The most recently opened handle.
    ///
    /// # Errors
    ///
    /// `OrmError::Connection` if nothing is open.
    pub fn current(&self) -> Result<Handle> {
        self.current
            .as_ref()
            .and_then(|name| self.handles.get(name))
            .cloned()
            .ok_or_else(|| OrmError::connection("", "no current database handle"))
    }

    /// Makes an already registered handle current
    pub fn set_current(&mut self, name: &str) -> Result<Handle> {
        let handle = self
            .get(name)
            .ok_or_else(|| OrmError::connection("", format!("no database handle named `{}`", name)))?;
        self.current = Some(name.to_string());
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<Handle> {
        self.handles.get(name).cloned()
    }

    /// Registered handle names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops the registry's reference to `name`. Returns whether it existed.
    ///
    /// Closing the current handle leaves the registry without one.
    pub fn close(&mut self, name: &str) -> bool {
        let removed = self.handles.remove(name).is_some();
        if removed {
            info!(name, "closed database handle");
            if self.current.as_deref() == Some(name) {
                self.current = None;
            }
        }
        removed
    }

    /// Opens every connection listed in `config`, then selects its default.
    ///
    /// Without a `default`, the last listed connection is current.
    ///
    /// # Errors
    ///
    /// `OrmError::Config` for duplicate names or an unknown default, and
    /// `OrmError::Connection` for any connection that fails to open.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Registry::new();
        for connection in &config.connections {
            if registry.handles.contains_key(&connection.name) {
                return Err(OrmError::Config(format!(
                    "duplicate connection name `{}`",
                    connection.name
                )));
            }
            registry.open_with(&connection.name, &connection.dsn, &connection.options())?;
        }

        if let Some(default) = &config.default {
            if !registry.handles.contains_key(default) {
                return Err(OrmError::Config(format!(
                    "default connection `{}` is not defined",
                    default
                )));
            }
            registry.current = Some(default.clone());
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dsn_parsing() {
        assert_eq!(Dsn::parse(":memory:").unwrap(), Dsn::Memory);
        assert_eq!(Dsn::parse("sqlite::memory:").unwrap(), Dsn::Memory);
        assert_eq!(
            Dsn::parse("sqlite:///tmp/app.db").unwrap(),
            Dsn::File("/tmp/app.db".to_string())
        );
        assert_eq!(
            Dsn::parse("sqlite:data/app.db").unwrap(),
            Dsn::File("data/app.db".to_string())
        );
        assert_eq!(
            Dsn::parse("file:app.db?mode=ro").unwrap(),
            Dsn::Uri("file:app.db?mode=ro".to_string())
        );
    }

    #[test]
    fn test_dsn_rejects_malformed_input() {
        for dsn in ["", "   ", "sqlite://", "testA", "user:pw@tcp(localhost:3306)/db"] {
            assert!(
                matches!(Dsn::parse(dsn), Err(OrmError::Connection { .. })),
                "expected connection error for {dsn:?}"
            );
        }
        let err = Dsn::parse("mysql://root@localhost/app").unwrap_err();
        assert!(err.to_string().contains("unsupported DSN scheme `mysql`"));
    }

    #[test]
    fn test_open_sets_current() {
        let mut registry = Registry::new();
        assert!(registry.current().is_err());

        let a = registry.open("testA", ":memory:").unwrap();
        assert!(registry.current().unwrap().same_as(&a));

        let b = registry.open("testB", ":memory:").unwrap();
        assert!(registry.current().unwrap().same_as(&b));
        assert!(!a.same_as(&b));
        assert_eq!(registry.names(), vec!["testA", "testB"]);

        registry.set_current("testA").unwrap();
        assert!(registry.current().unwrap().same_as(&a));
        assert!(registry.set_current("missing").is_err());
    }

    #[test]
    fn test_reopen_replaces_slot_but_keeps_old_handle_usable() {
        let mut registry = Registry::new();
        let first = registry.open("main", ":memory:").unwrap();
        first.transport().exec("CREATE TABLE t (id INTEGER)", &[]).unwrap();

        let second = registry.open("main", ":memory:").unwrap();
        assert!(!first.same_as(&second));
        assert!(registry.get("main").unwrap().same_as(&second));
        assert_eq!(registry.names().len(), 1);

        let result = first.transport().exec("INSERT INTO t VALUES (1)", &[]).unwrap();
        assert_eq!(result.rows_affected, 1);
    }

    #[test]
    fn test_close_clears_current() {
        let mut registry = Registry::new();
        registry.open("main", ":memory:").unwrap();
        assert!(registry.close("main"));
        assert!(!registry.close("main"));
        assert!(registry.current().is_err());
        assert!(registry.get("main").is_none());
    }

    #[test]
    fn test_open_failure_is_connection_error() {
        let mut registry = Registry::new();
        let result = registry.open("bad", "sqlite:///nonexistent/path/database.db");
        match result {
            Err(OrmError::Connection { dsn, .. }) => {
                assert_eq!(dsn, "sqlite:///nonexistent/path/database.db")
            }
            other => panic!("Expected Connection error, got {other:?}"),
        }
        assert!(registry.current().is_err());
    }

    #[test]
    fn test_open_rejects_file_that_is_not_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![b'z'; 4096]).unwrap();
        let dsn = format!("sqlite://{}", path.display());

        let mut registry = Registry::new();
        match registry.open("garbage", &dsn) {
            Err(OrmError::Connection { dsn: reported, reason }) => {
                assert_eq!(reported, dsn);
                assert!(!reason.is_empty());
            }
            other => panic!("Expected Connection error, got {other:?}"),
        }
        assert!(registry.get("garbage").is_none());
    }

    #[test]
    fn test_missing_handle_errors_render_without_empty_dsn() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.current().unwrap_err().to_string(),
            "Connection error: no current database handle"
        );
        assert_eq!(
            registry.set_current("reports").unwrap_err().to_string(),
            "Connection error: no database handle named `reports`"
        );
    }

    #[test]
    fn test_sqlite_transport_exec_and_query() {
        let transport = SqliteTransport::open(&Dsn::Memory, &ConnectionOptions::default()).unwrap();
        transport
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();

        let result = transport
            .exec("INSERT INTO t (name) VALUES (?)", &[Value::from("a")])
            .unwrap();
        assert_eq!(result, ExecResult { last_insert_id: 1, rows_affected: 1 });

        let rows = transport
            .query("SELECT id, name FROM t WHERE id = ?", &[Value::Int(1)])
            .unwrap();
        assert_eq!(rows.columns, vec!["id", "name"]);
        assert_eq!(rows.rows, vec![vec![Value::Int(1), Value::Text("a".into())]]);

        assert!(transport.query("SELECT * FROM missing", &[]).is_err());
    }

    #[test]
    fn test_foreign_keys_option_applied() {
        let transport = SqliteTransport::open(&Dsn::Memory, &ConnectionOptions::default()).unwrap();
        let rows = transport.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(rows.rows[0][0], Value::Int(1));

        let options = ConnectionOptions { foreign_keys: false, ..ConnectionOptions::default() };
        let transport = SqliteTransport::open(&Dsn::Memory, &options).unwrap();
        let rows = transport.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(rows.rows[0][0], Value::Int(0));
    }

    #[test]
    fn test_handle_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Handle>();
    }
}
