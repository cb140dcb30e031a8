use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::{guard::owner_field, Principal};
use crate::database::{Collection, DocFilter, Document, FindOptions, SortKey, StoreError, ID_FIELD};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

use super::{authorize, parse_id, set_opt, timestamp, OwnerQuery};

#[derive(Debug, Deserialize)]
pub struct EnrollPayload {
    #[serde(rename = "courseId")]
    pub course_id: String,
    pub enrolled_by: Option<String>,
}

/// POST /enrollments - enroll the caller in a course
///
/// The (courseId, enrolled_by) pair is a unique key in the store, so a
/// repeated or concurrent enrollment is rejected by the insert itself and
/// the course counter is only bumped by the one insert that succeeds.
pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    payload: Result<Json<EnrollPayload>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(payload) = payload?;
    let scope = authorize(&principal, payload.enrolled_by.as_deref())?;
    let course_id = parse_id(&payload.course_id, "Course")?;

    let course = state
        .db
        .find_404(Collection::Courses, &DocFilter::by_id(course_id), "Course")
        .await?;

    let mut enrollment = Document::new();
    enrollment.insert("courseId".to_string(), json!(course_id.to_string()));
    enrollment.insert(owner_field::ENROLLMENT.to_string(), json!(scope.email()));
    set_opt(&mut enrollment, "courseTitle", course.get("title").cloned());
    set_opt(&mut enrollment, "courseImage", course.get("image").cloned());
    set_opt(&mut enrollment, "instructorName", course.get("instructorName").cloned());
    enrollment.insert("enrolledAt".to_string(), timestamp());

    let id = match state.db.insert_one(Collection::Enrolled, enrollment.clone()).await {
        Ok(id) => id,
        Err(StoreError::Duplicate { .. }) => {
            tracing::debug!("{} already enrolled in {}", scope.email(), course_id);
            return Err(ApiError::conflict("Already enrolled in this course"));
        }
        Err(e) => return Err(e.into()),
    };

    if !state
        .db
        .update_inc(Collection::Courses, &DocFilter::by_id(course_id), "enrollCount", 1)
        .await?
    {
        tracing::warn!("Course {} vanished before its enrollment count was updated", course_id);
    }

    enrollment.insert(ID_FIELD.to_string(), json!(id.to_string()));
    tracing::info!("{} enrolled in course {}", scope.email(), course_id);
    Ok(ApiResponse::created(json!({ "insertedId": id, "enrollment": enrollment })))
}

/// GET /myEnrollments?email= - the caller's enrollments, newest first
pub async fn mine(
    State(state): State<AppState>,
    principal: Principal,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> ApiResult<Vec<Document>> {
    let Query(query) = query?;
    let scope = authorize(&principal, query.email.as_deref())?;

    let filter = scope.restrict(DocFilter::new(), owner_field::ENROLLMENT);
    let options = FindOptions::sorted(vec![SortKey::desc("enrolledAt")]);
    let enrollments = state.db.find_many(Collection::Enrolled, &filter, &options).await?;
    Ok(ApiResponse::success(enrollments))
}

/// DELETE /enrollments/:id?email= - drop one of the caller's enrollments
pub async fn delete(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query?;
    let scope = authorize(&principal, query.email.as_deref())?;
    let id = parse_id(&id, "Enrollment")?;

    let filter = scope.restrict(DocFilter::by_id(id), owner_field::ENROLLMENT);
    let removed = state
        .db
        .delete_one(Collection::Enrolled, &filter)
        .await?
        .ok_or_else(|| ApiError::not_found("Enrollment not found"))?;

    let course_id = removed
        .get("courseId")
        .and_then(Value::as_str)
        .and_then(|raw| uuid::Uuid::parse_str(raw).ok());
    if let Some(course_id) = course_id {
        state
            .db
            .update_inc(Collection::Courses, &DocFilter::by_id(course_id), "enrollCount", -1)
            .await?;
    }

    tracing::info!("{} dropped enrollment {}", scope.email(), id);
    Ok(ApiResponse::success(json!({ "deleted": true, "id": id })))
}
