//! Persistence layer: libSQL-backed conversation storage.

pub mod connector;
pub mod libsql_backend;
pub mod schema;
pub mod traits;

pub use connector::Connector;
pub use libsql_backend::LibSqlBackend;
pub use traits::ConversationStore;
