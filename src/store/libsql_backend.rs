//! libSQL backend: `ConversationStore` implementation.
//!
//! Each conversation is one row whose `messages` column is a JSON array.
//! Appends are expressed as `json_insert(messages, '$[#]', ...)` inside the
//! same statement that would otherwise insert the row, so the store decides
//! insert-vs-append atomically. libSQL admits one writer at a time, so
//! concurrent appends to the same id are all kept, in lock-acquisition order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Value, params};
use tracing::{debug, info};

use crate::error::{CollectError, DatabaseError};
use crate::model::{Conversation, Message, validate_append, validate_new, validate_upsert};
use crate::store::connector::Connector;
use crate::store::schema;
use crate::store::traits::ConversationStore;

const INSERT_CONVERSATION: &str = r#"
    INSERT INTO conversations (id, "user", messages, created_at, updated_at)
    VALUES (?1, ?2, json(?3), ?4, ?4)
"#;

const UPSERT_MESSAGE: &str = r#"
    INSERT INTO conversations (id, "user", messages, created_at, updated_at)
    VALUES (?1, ?2, json_array(json(?3)), ?4, ?4)
    ON CONFLICT (id) DO UPDATE SET
        messages = json_insert(conversations.messages, '$[#]', json(?3)),
        updated_at = ?4
"#;

const APPEND_MESSAGE: &str = r#"
    UPDATE conversations
    SET messages = json_insert(messages, '$[#]', json(?2)),
        updated_at = ?3
    WHERE id = ?1
"#;

const SELECT_CONVERSATION: &str = r#"
    SELECT id, "user", messages, created_at, updated_at
    FROM conversations
    WHERE id = ?1
"#;

/// libSQL-backed conversation store.
pub struct LibSqlBackend {
    conn: Connector,
}

impl LibSqlBackend {
    pub fn new(conn: Connector) -> Self {
        Self { conn }
    }

    /// Connect to `url` and ensure the schema exists.
    pub async fn open(
        url: &str,
        auth_token: Option<&secrecy::SecretString>,
    ) -> Result<Self, DatabaseError> {
        let backend = Self::new(Connector::connect(url, auth_token).await?);
        let version = backend.conn.version().await?;
        info!(version = %version, "libSQL engine ready");
        backend.ensure_schema().await?;
        Ok(backend)
    }

    /// In-memory store with the schema in place (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let backend = Self::new(Connector::memory().await?);
        backend.ensure_schema().await?;
        Ok(backend)
    }

    pub fn connector(&self) -> &Connector {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, DatabaseError> {
    let text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("column {idx}: {e}")))
    };

    let messages_json = text(2)?;
    let messages: Vec<Message> = serde_json::from_str(&messages_json)
        .map_err(|e| DatabaseError::Serialization(format!("messages: {e}")))?;

    Ok(Conversation {
        id: text(0)?,
        user: text(1)?,
        messages,
        created_at: parse_datetime(&text(3)?),
        updated_at: parse_datetime(&text(4)?),
    })
}

#[async_trait]
impl ConversationStore for LibSqlBackend {
    async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        schema::ensure_schema(&self.conn).await
    }

    async fn reset(&self) -> Result<(), DatabaseError> {
        schema::reset_schema(&self.conn).await
    }

    async fn create_conversation(
        &self,
        id: &str,
        user: &str,
        messages: &[Message],
    ) -> Result<(), CollectError> {
        validate_new(id, user, messages)?;
        let payload = to_json(messages)?;
        match self
            .conn
            .execute(INSERT_CONVERSATION, params![id, user, payload, now()])
            .await
        {
            Ok(_) => {
                debug!(id, user, count = messages.len(), "Conversation created");
                Ok(())
            }
            Err(DatabaseError::Constraint(_)) => Err(CollectError::Conflict(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_message(
        &self,
        id: &str,
        user: &str,
        message: &Message,
    ) -> Result<(), CollectError> {
        validate_upsert(id, user, message)?;
        let payload = to_json(message)?;
        self.conn
            .execute(UPSERT_MESSAGE, params![id, user, payload, now()])
            .await?;
        debug!(id, user, "Message upserted");
        Ok(())
    }

    async fn append_message(&self, id: &str, message: &Message) -> Result<(), CollectError> {
        validate_append(id, message)?;
        let payload = to_json(message)?;
        let affected = self
            .conn
            .execute(APPEND_MESSAGE, params![id, payload, now()])
            .await?;
        if affected == 0 {
            return Err(CollectError::UnknownConversation(id.to_string()));
        }
        debug!(id, "Message appended");
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DatabaseError> {
        self.conn
            .query_row(SELECT_CONVERSATION, params![id], row_to_conversation)
            .await
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        match self
            .conn
            .query_scalar("SELECT COUNT(*) FROM conversations", ())
            .await?
        {
            Some(Value::Integer(n)) => Ok(n.max(0) as u64),
            other => Err(DatabaseError::Query(format!(
                "Unexpected count value: {other:?}"
            ))),
        }
    }

    async fn close(&self) {
        self.conn.close().await;
    }
}
