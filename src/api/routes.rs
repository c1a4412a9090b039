//! REST endpoints for conversation collection and admin control.

use std::any::Any;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::AppState;
use super::admin::require_admin;
use crate::error::CollectError;
use crate::model::{MessageInstance, NewConversation};

/// Build the router. `/reset` and `/exit` sit behind the admin gate.
pub fn collector_routes(state: AppState) -> Router {
    let admin = Router::new()
        .route("/reset", post(reset))
        .route("/exit", post(exit))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/ping", get(ping))
        .route("/collect", post(collect))
        .route("/analytics/new_convo", post(collect))
        .route("/analytics/message", post(add_message))
        .route("/analytics/add_message", post(add_message))
        .merge(admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response)),
        )
        .with_state(state)
}

fn success() -> Json<Value> {
    Json(json!({ "message": "success" }))
}

/// Decode a JSON body regardless of `Content-Type`.
///
/// Bodies axum refused to buffer (over the size limit, aborted uploads) keep
/// their status but get the JSON error shape.
fn decode<T: DeserializeOwned>(body: Result<Bytes, BytesRejection>) -> Result<T, CollectError> {
    let body = body?;
    serde_json::from_slice(&body).map_err(|e| CollectError::InvalidJson(e.to_string()))
}

/// A handler panic becomes a 500 with the usual `{"error": ...}` body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(detail, "Handler panicked");
    CollectError::Internal.into_response()
}

// ── Public ──────────────────────────────────────────────────────────────

async fn ping() -> impl IntoResponse {
    Json(json!({ "message": "pong" }))
}

/// POST /collect, /analytics/new_convo
///
/// Create-only: a duplicate id is 409 and the stored row is left alone.
async fn collect(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, CollectError> {
    let convo: NewConversation = decode(body)?;
    convo.validate()?;

    state
        .store
        .create_conversation(&convo.id, &convo.user, &convo.messages)
        .await?;

    info!(
        id = %convo.id,
        user = %convo.user,
        messages = convo.messages.len(),
        "Conversation collected"
    );
    Ok(success())
}

/// POST /analytics/message, /analytics/add_message
///
/// With `user`: insert-or-append. Without: append to an existing conversation.
async fn add_message(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, CollectError> {
    let instance: MessageInstance = decode(body)?;
    instance.validate()?;

    match instance.user.as_deref() {
        Some(user) => {
            state
                .store
                .upsert_message(&instance.id, user, &instance.message)
                .await?
        }
        None => {
            state
                .store
                .append_message(&instance.id, &instance.message)
                .await?
        }
    }

    info!(id = %instance.id, "Message recorded");
    Ok(success())
}

// ── Admin ───────────────────────────────────────────────────────────────

/// POST /reset: drop and recreate the conversation table.
async fn reset(State(state): State<AppState>) -> Result<Json<Value>, CollectError> {
    state.store.reset().await?;
    warn!("All conversations deleted by admin reset");
    Ok(success())
}

/// POST /exit: close the store and terminate without draining in-flight requests.
async fn exit(State(state): State<AppState>) -> impl IntoResponse {
    warn!("Exit requested by admin");
    state.store.close().await;
    (state.exit)(0);
    Json(json!({ "message": "exiting" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI32, Ordering};

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use async_trait::async_trait;

    use super::*;
    use crate::error::DatabaseError;
    use crate::model::{Conversation, Message};
    use crate::store::{ConversationStore, LibSqlBackend};

    const TOKEN: &str = "admin-secret";

    async fn test_app() -> (Router, Arc<LibSqlBackend>, Arc<AtomicI32>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let exit_code = Arc::new(AtomicI32::new(-1));
        let recorded = Arc::clone(&exit_code);
        let state = AppState::with_exit_hook(
            store.clone(),
            SecretString::from(TOKEN),
            Arc::new(move |code| recorded.store(code, Ordering::SeqCst)),
        );
        (collector_routes(state), store, exit_code)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let (app, _, _) = test_app().await;
        let response = app
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "pong" }));
    }

    #[tokio::test]
    async fn collect_creates_conversation() {
        let (app, store, _) = test_app().await;
        let response = app
            .oneshot(post_json(
                "/collect",
                r#"{"id":"c1","user":"u1","messages":[{"prompt":"hi","response":"hello"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "success" }));

        let convo = store.get_conversation("c1").await.unwrap().unwrap();
        assert_eq!(convo.messages.len(), 1);
        assert_eq!(convo.messages[0].prompt, "hi");
    }

    #[tokio::test]
    async fn collect_duplicate_is_conflict() {
        let (app, _, _) = test_app().await;
        let body = r#"{"id":"c1","user":"u1","messages":[{"prompt":"a","response":"b"}]}"#;

        let first = app.clone().oneshot(post_json("/analytics/new_convo", body)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(post_json("/collect", body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(second).await,
            json!({ "error": "Conversation already exists" })
        );
    }

    #[tokio::test]
    async fn collect_rejects_bad_json_and_missing_fields() {
        let (app, store, _) = test_app().await;

        let response = app.clone().oneshot(post_json("/collect", "{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({ "error": "Invalid JSON" }));

        let response = app
            .oneshot(post_json("/collect", r#"{"id":"c1","messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Missing fields: user, messages" })
        );

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn message_twice_appends_two_entries() {
        let (app, store, _) = test_app().await;
        let body = r#"{"id":"c1","user":"u1","message":{"prompt":"hi","response":"hello"}}"#;

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_json("/analytics/message", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(store.count().await.unwrap(), 1);
        let convo = store.get_conversation("c1").await.unwrap().unwrap();
        assert_eq!(convo.messages.len(), 2);
        assert!(
            convo
                .messages
                .iter()
                .all(|m| m.prompt == "hi" && m.response == "hello")
        );
    }

    #[tokio::test]
    async fn add_message_without_user_needs_existing_conversation() {
        let (app, store, _) = test_app().await;
        let append = r#"{"convo_id":"c1","message":{"prompt":"p","response":"r"}}"#;

        let response = app
            .clone()
            .oneshot(post_json("/analytics/add_message", append))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.count().await.unwrap(), 0);

        store
            .upsert_message("c1", "u1", &crate::model::Message::new("a", "b"))
            .await
            .unwrap();
        let response = app
            .oneshot(post_json("/analytics/add_message", append))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let convo = store.get_conversation("c1").await.unwrap().unwrap();
        assert_eq!(convo.messages.len(), 2);
    }

    #[tokio::test]
    async fn message_with_empty_fields_is_rejected() {
        let (app, store, _) = test_app().await;
        let response = app
            .oneshot(post_json(
                "/analytics/message",
                r#"{"id":"","user":"u1","message":{"prompt":"","response":""}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_requires_admin_header() {
        let (app, store, _) = test_app().await;
        store
            .upsert_message("c1", "u1", &crate::model::Message::new("a", "b"))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(Request::post("/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.count().await.unwrap(), 1);

        let response = app
            .oneshot(
                Request::post("/reset")
                    .header(header::AUTHORIZATION, TOKEN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.get_conversation("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exit_with_wrong_token_keeps_running() {
        let (app, store, exit_code) = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::post("/exit")
                    .header(header::AUTHORIZATION, "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(exit_code.load(Ordering::SeqCst), -1);
        assert!(store.connector().is_open().await);

        let response = app
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn exit_with_token_closes_store_and_calls_hook() {
        let (app, store, exit_code) = test_app().await;

        let response = app
            .oneshot(
                Request::post("/exit")
                    .header(header::AUTHORIZATION, TOKEN)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(exit_code.load(Ordering::SeqCst), 0);
        assert!(!store.connector().is_open().await);
    }

    /// Store whose every operation fails, as if the database went away.
    struct BrokenStore;

    #[async_trait]
    impl ConversationStore for BrokenStore {
        async fn ensure_schema(&self) -> Result<(), DatabaseError> {
            Err(DatabaseError::Schema("disk I/O error".into()))
        }

        async fn reset(&self) -> Result<(), DatabaseError> {
            Err(DatabaseError::Schema("reset conversations: disk I/O error".into()))
        }

        async fn create_conversation(
            &self,
            _id: &str,
            _user: &str,
            _messages: &[Message],
        ) -> Result<(), CollectError> {
            Err(DatabaseError::Schema("no such table: conversations".into()).into())
        }

        async fn upsert_message(
            &self,
            _id: &str,
            _user: &str,
            _message: &Message,
        ) -> Result<(), CollectError> {
            Err(DatabaseError::Connection("Reconnect failed: unable to open database file".into())
                .into())
        }

        async fn append_message(&self, _id: &str, _message: &Message) -> Result<(), CollectError> {
            Err(DatabaseError::Query("database is locked".into()).into())
        }

        async fn get_conversation(&self, _id: &str) -> Result<Option<Conversation>, DatabaseError> {
            Err(DatabaseError::Query("database is locked".into()))
        }

        async fn count(&self) -> Result<u64, DatabaseError> {
            Err(DatabaseError::Query("database is locked".into()))
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn store_failures_are_generic_500s_and_service_keeps_running() {
        let state = AppState::with_exit_hook(
            Arc::new(BrokenStore),
            SecretString::from(TOKEN),
            Arc::new(|_code: i32| {}),
        );
        let app = collector_routes(state);

        let requests = [
            Request::post("/reset")
                .header(header::AUTHORIZATION, TOKEN)
                .body(Body::empty())
                .unwrap(),
            post_json(
                "/analytics/message",
                r#"{"id":"c1","user":"u1","message":{"prompt":"p","response":"r"}}"#,
            ),
            post_json(
                "/analytics/add_message",
                r#"{"id":"c1","message":{"prompt":"p","response":"r"}}"#,
            ),
            post_json(
                "/collect",
                r#"{"id":"c1","user":"u1","messages":[{"prompt":"p","response":"r"}]}"#,
            ),
        ];
        for request in requests {
            let uri = request.uri().to_string();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(
                body_json(response).await,
                json!({ "error": "Internal storage error" }),
                "{uri}"
            );
        }

        let response = app
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_body_is_413_with_json_error() {
        let (app, store, _) = test_app().await;
        let prompt = "x".repeat(3 * 1024 * 1024);
        let body = format!(
            r#"{{"id":"c1","user":"u1","message":{{"prompt":"{prompt}","response":"r"}}}}"#
        );

        let response = app
            .oneshot(post_json("/analytics/message", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = body_json(response).await;
        assert!(body["error"].is_string(), "{body}");
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handler_panic_is_500_with_json_error() {
        let app: Router = Router::new()
            .route(
                "/boom",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Internal server error" })
        );
    }
}
