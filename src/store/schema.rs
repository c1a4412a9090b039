//! Conversation table schema: idempotent create and destructive reset.

use libsql::Value;

use crate::error::DatabaseError;
use crate::store::connector::Connector;

pub const TABLE: &str = "conversations";

/// `messages` holds the whole ordered message list as one JSON array.
const CREATE_CONVERSATIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY NOT NULL,
        "user" TEXT NOT NULL,
        messages TEXT NOT NULL DEFAULT '[]'
            CHECK (json_valid(messages) AND json_type(messages) = 'array'),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations("user");
"#;

/// Create the conversation table if it does not exist yet.
pub async fn ensure_schema(conn: &Connector) -> Result<(), DatabaseError> {
    conn.execute_batch(CREATE_CONVERSATIONS)
        .await
        .map_err(|e| DatabaseError::Schema(format!("create {TABLE}: {e}")))?;
    tracing::debug!(table = TABLE, "Schema ensured");
    Ok(())
}

/// Drop and recreate the conversation table in one transaction.
///
/// Every stored conversation is lost. Concurrent statements wait until the
/// reset has committed or rolled back.
pub async fn reset_schema(conn: &Connector) -> Result<(), DatabaseError> {
    let sql = format!("DROP TABLE IF EXISTS {TABLE};\n{CREATE_CONVERSATIONS}");
    conn.exclusive_transaction(&sql)
        .await
        .map_err(|e| DatabaseError::Schema(format!("reset {TABLE}: {e}")))?;
    tracing::warn!(table = TABLE, "Conversation table reset");
    Ok(())
}

/// Whether a table with the given name exists.
pub async fn table_exists(conn: &Connector, name: &str) -> Result<bool, DatabaseError> {
    let count = conn
        .query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            libsql::params![name],
        )
        .await?;
    Ok(matches!(count, Some(Value::Integer(n)) if n > 0))
}
