//! libSQL connector. One live connection per process, reconnected on demand.

use std::path::Path;
use std::sync::LazyLock;

use libsql::params::IntoParams;
use libsql::{Connection, Database as LibSqlDatabase, Row, Value};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;

/// Text libSQL/SQLite put in unique and primary-key violations.
static UNIQUE_VIOLATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)UNIQUE constraint failed|duplicate key value violates unique constraint")
        .expect("valid regex")
});

/// Owns the database handle and the single connection used for all statements.
///
/// Statements share the connection through [`Connector::acquire`], which
/// opens a new one only when the slot is empty. A statement that fails on a
/// connection that no longer answers empties the slot, so the next statement
/// reconnects.
///
/// `gate` is held shared by ordinary statements and exclusively by
/// [`Connector::exclusive_transaction`], so a schema reset never interleaves
/// with a concurrent write on the same connection.
pub struct Connector {
    db: LibSqlDatabase,
    conn: Mutex<Option<Connection>>,
    gate: RwLock<()>,
    target: String,
}

impl Connector {
    /// Open the database described by `url` and establish the first connection.
    ///
    /// Accepts a local path (optionally `file:`-prefixed), `:memory:`, or a
    /// `libsql://` / `http(s)://` URL for a remote database.
    pub async fn connect(
        url: &str,
        auth_token: Option<&SecretString>,
    ) -> Result<Self, DatabaseError> {
        let db = if is_remote(url) {
            let token = auth_token
                .map(|t| t.expose_secret().to_string())
                .unwrap_or_default();
            libsql::Builder::new_remote(url.to_string(), token)
                .build()
                .await
                .map_err(|e| DatabaseError::Connection(format!("Failed to open {url}: {e}")))?
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            if path != ":memory:" {
                if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
                {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DatabaseError::Connection(format!(
                            "Failed to create database directory: {e}"
                        ))
                    })?;
                }
            }
            libsql::Builder::new_local(path)
                .build()
                .await
                .map_err(|e| {
                    DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
                })?
        };

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        info!(target_db = %redact(url), "Database connected");
        Ok(Self {
            db,
            conn: Mutex::new(Some(conn)),
            gate: RwLock::new(()),
            target: redact(url),
        })
    }

    /// In-memory database, for tests.
    pub async fn memory() -> Result<Self, DatabaseError> {
        Self::connect(":memory:", None).await
    }

    /// Return the live connection, opening a new one if the slot is empty.
    async fn acquire(&self) -> Result<Connection, DatabaseError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        debug!(target_db = %self.target, "Connection closed, reopening");
        let fresh = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Reconnect failed: {e}")))?;
        fresh
            .query("SELECT 1", ())
            .await
            .map_err(|e| DatabaseError::Connection(format!("Reconnect failed: {e}")))?;

        info!(target_db = %self.target, "Database reconnected");
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// After a failed statement, drop `conn` from the slot if it no longer answers.
    ///
    /// Ordinary SQL errors leave a working connection in place.
    async fn discard_if_dead(&self, conn: &Connection) {
        if let Err(e) = conn.query("SELECT 1", ()).await {
            warn!(target_db = %self.target, error = %e, "Connection lost, will reconnect");
            self.conn.lock().await.take();
        }
    }

    /// Run a single statement, returning the number of affected rows.
    ///
    /// Unique-constraint violations come back as [`DatabaseError::Constraint`].
    pub async fn execute(&self, sql: &str, params: impl IntoParams) -> Result<u64, DatabaseError> {
        let _shared = self.gate.read().await;
        let conn = self.acquire().await?;
        match conn.execute(sql, params).await {
            Ok(affected) => Ok(affected),
            Err(e) => {
                self.discard_if_dead(&conn).await;
                Err(classify(e))
            }
        }
    }

    /// Run several `;`-separated statements.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        let _shared = self.gate.read().await;
        let conn = self.acquire().await?;
        if let Err(e) = conn.execute_batch(sql).await {
            self.discard_if_dead(&conn).await;
            return Err(DatabaseError::Query(e.to_string()));
        }
        Ok(())
    }

    /// Run `sql` inside `BEGIN`/`COMMIT` with every other statement held off.
    ///
    /// Waits for in-flight statements to finish and blocks new ones until the
    /// transaction has committed or been rolled back.
    pub async fn exclusive_transaction(&self, sql: &str) -> Result<(), DatabaseError> {
        let _exclusive = self.gate.write().await;
        let conn = self.acquire().await?;
        let batch = format!("BEGIN;\n{sql}\nCOMMIT;");
        if let Err(e) = conn.execute_batch(&batch).await {
            // Fails harmlessly when no transaction is open.
            let _ = conn.execute_batch("ROLLBACK;").await;
            self.discard_if_dead(&conn).await;
            return Err(DatabaseError::Query(e.to_string()));
        }
        Ok(())
    }

    /// Map the first row of a query, or `None` when it yields no rows.
    ///
    /// `map` runs while the statement still holds its share of the connection.
    pub async fn query_row<T>(
        &self,
        sql: &str,
        params: impl IntoParams,
        map: impl FnOnce(&Row) -> Result<T, DatabaseError>,
    ) -> Result<Option<T>, DatabaseError> {
        let _shared = self.gate.read().await;
        let conn = self.acquire().await?;
        let mut rows = match conn.query(sql, params).await {
            Ok(rows) => rows,
            Err(e) => {
                self.discard_if_dead(&conn).await;
                return Err(DatabaseError::Query(e.to_string()));
            }
        };
        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        row.as_ref().map(map).transpose()
    }

    /// First column of the first row, or `None` when the query yields no rows.
    pub async fn query_scalar(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Option<Value>, DatabaseError> {
        self.query_row(sql, params, |row| {
            row.get_value(0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    /// Version string reported by the engine.
    pub async fn version(&self) -> Result<String, DatabaseError> {
        match self.query_scalar("SELECT sqlite_version()", ()).await? {
            Some(Value::Text(v)) => Ok(v),
            other => Err(DatabaseError::Query(format!(
                "Unexpected version value: {other:?}"
            ))),
        }
    }

    /// Drop the live connection. The next statement reconnects.
    ///
    /// For `:memory:` databases this discards the data along with the connection.
    pub async fn close(&self) {
        if self.conn.lock().await.take().is_some() {
            info!(target_db = %self.target, "Database connection closed");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.conn.lock().await.is_some()
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("libsql://") || url.starts_with("http://") || url.starts_with("https://")
}

/// Strip any query string (which may carry credentials) for logging.
fn redact(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

fn classify(e: libsql::Error) -> DatabaseError {
    let text = e.to_string();
    if UNIQUE_VIOLATION.is_match(&text) {
        DatabaseError::Constraint(text)
    } else {
        DatabaseError::Query(text)
    }
}
