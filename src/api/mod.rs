//! HTTP surface: collection endpoints plus the admin-gated reset/exit controls.

pub mod admin;
pub mod routes;

use std::sync::Arc;

use secrecy::SecretString;

use crate::store::ConversationStore;

pub use admin::{AdminCheck, check_admin};
pub use routes::collector_routes;

/// Called by `/exit` after the store is closed. Receives the exit status.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    /// Secret compared against the `Authorization` header on admin routes.
    pub admin_token: Arc<SecretString>,
    pub exit: ExitHook,
}

impl AppState {
    /// State whose `/exit` terminates the process.
    pub fn new(store: Arc<dyn ConversationStore>, admin_token: SecretString) -> Self {
        Self::with_exit_hook(store, admin_token, Arc::new(|code| std::process::exit(code)))
    }

    pub fn with_exit_hook(
        store: Arc<dyn ConversationStore>,
        admin_token: SecretString,
        exit: ExitHook,
    ) -> Self {
        Self {
            store,
            admin_token: Arc::new(admin_token),
            exit,
        }
    }
}
