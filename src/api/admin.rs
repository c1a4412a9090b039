//! Admin gate: static-secret check on the `Authorization` header.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use super::AppState;
use crate::error::CollectError;

/// Outcome of comparing a request header against the admin secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCheck {
    Authorized,
    Unauthorized,
}

/// Verbatim comparison. A missing header or an empty secret never authorizes.
pub fn check_admin(secret: &SecretString, header_value: Option<&str>) -> AdminCheck {
    let secret = secret.expose_secret();
    match header_value {
        Some(value) if !secret.is_empty() && value == secret => AdminCheck::Authorized,
        _ => AdminCheck::Unauthorized,
    }
}

/// Route layer for admin endpoints: 401 before the handler runs on mismatch.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let header_present = value.is_some();
    let decision = check_admin(&state.admin_token, value);

    match decision {
        AdminCheck::Authorized => next.run(request).await,
        AdminCheck::Unauthorized => {
            warn!(
                path = %request.uri().path(),
                header_present,
                "Rejected admin request"
            );
            CollectError::Unauthorized.into_response()
        }
    }
}
