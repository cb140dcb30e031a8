//! Route handlers.
//!
//! Owner-scoped handlers follow one shape: the verify stage has already
//! produced a [`Principal`], the handler calls [`authorize`] with the owner
//! the request names, and only the resulting [`OwnerScope`] is used to build
//! store filters.

pub mod courses;
pub mod enrollments;
pub mod reviews;
pub mod system;
pub mod users;

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{Decision, OwnerScope, OwnershipGuard, Principal};
use crate::database::Document;
use crate::error::{ApiError, FORBIDDEN_MESSAGE};

/// `?email=` owner scoping accepted by protected routes.
#[derive(Debug, Default, Deserialize)]
pub struct OwnerQuery {
    pub email: Option<String>,
}

/// Authorize stage: map the guard's decision onto the request outcome.
pub fn authorize(principal: &Principal, requested_owner: Option<&str>) -> Result<OwnerScope, ApiError> {
    match OwnershipGuard::authorize(principal, requested_owner) {
        Decision::Allowed(scope) => Ok(scope),
        Decision::Denied => Err(ApiError::forbidden(FORBIDDEN_MESSAGE)),
    }
}

/// Parse a path id. A malformed id cannot name any record, so it is a 404.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::not_found(format!("{} not found", what)))
}

/// RFC 3339 UTC timestamp with fixed width so string order is time order.
pub fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Insert `value` under `key` when present.
pub fn set_opt<T: Into<Value>>(doc: &mut Document, key: &str, value: Option<T>) {
    if let Some(value) = value {
        doc.insert(key.to_string(), value.into());
    }
}

pub fn into_document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
