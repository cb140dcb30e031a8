use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::{guard::owner_field, Principal};
use crate::database::{Collection, DocFilter, Document, StoreError};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

use super::{authorize, non_blank, parse_id, set_opt, timestamp, OwnerQuery};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserPayload {
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserPayload {
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub bio: Option<String>,
}

fn already_exists() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "created": false,
        "message": "User already exists",
    })))
}

/// POST /users - open; insert-if-absent keyed by email
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserPayload>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(payload) = payload?;
    let email = non_blank(payload.email).ok_or_else(|| ApiError::field_error("email", "is required"))?;
    if !email.contains('@') {
        return Err(ApiError::field_error("email", "must be an email address"));
    }

    let existing = DocFilter::new().with_eq(owner_field::USER, email.as_str());
    if state.db.find_one(Collection::Users, &existing).await?.is_some() {
        return already_exists();
    }

    let mut user = Document::new();
    user.insert(owner_field::USER.to_string(), json!(email));
    set_opt(&mut user, "name", non_blank(payload.name));
    set_opt(&mut user, "photoURL", non_blank(payload.photo_url));
    user.insert("createdAt".to_string(), timestamp());

    // The unique key on email settles a race between two first logins
    match state.db.insert_one(Collection::Users, user).await {
        Ok(id) => Ok(ApiResponse::created(json!({ "created": true, "insertedId": id }))),
        Err(StoreError::Duplicate { .. }) => already_exists(),
        Err(e) => Err(e.into()),
    }
}

/// GET /users/:id?email= - the caller's own profile
pub async fn get(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> ApiResult<Document> {
    let Query(query) = query?;
    let scope = authorize(&principal, query.email.as_deref())?;
    let id = parse_id(&id, "User")?;

    let filter = scope.restrict(DocFilter::by_id(id), owner_field::USER);
    let user = state.db.find_404(Collection::Users, &filter, "User").await?;
    Ok(ApiResponse::success(user))
}

/// PATCH /users/:id - update the caller's own profile
pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
    payload: Result<Json<UpdateUserPayload>, JsonRejection>,
) -> ApiResult<Value> {
    let Query(query) = query?;
    let Json(payload) = payload?;
    let requested = payload.email.clone().or(query.email);
    let scope = authorize(&principal, requested.as_deref())?;
    let id = parse_id(&id, "User")?;

    let mut fields = Document::new();
    set_opt(&mut fields, "name", payload.name);
    set_opt(&mut fields, "photoURL", payload.photo_url);
    set_opt(&mut fields, "bio", payload.bio);
    if fields.is_empty() {
        return Err(ApiError::bad_request("No updatable fields supplied"));
    }
    fields.insert("updatedAt".to_string(), timestamp());

    let filter = scope.restrict(DocFilter::by_id(id), owner_field::USER);
    if !state.db.update_set(Collection::Users, &filter, fields).await? {
        return Err(ApiError::not_found("User not found"));
    }
    let user = state.db.find_404(Collection::Users, &filter, "User").await?;

    Ok(ApiResponse::success(json!({ "updated": true, "user": user })))
}
