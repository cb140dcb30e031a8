use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::{Collection, DocFilter, Document, FindOptions, SortKey, ID_FIELD};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

use super::{non_blank, parse_id, set_opt, timestamp};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPayload {
    pub course_id: String,
    #[serde(default)]
    pub rating: Value,
    pub comment: Option<String>,
    pub reviewer_name: Option<String>,
    pub reviewer_email: Option<String>,
}

fn validate_rating(rating: &Value) -> Result<i64, ApiError> {
    rating
        .as_i64()
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| ApiError::field_error("rating", "must be an integer between 1 and 5"))
}

/// Review as shown publicly: the reviewer's email is withheld.
pub fn public_review(mut doc: Document) -> Document {
    doc.remove("reviewerEmail");
    doc
}

/// POST /reviews - open; adds a review and updates the course's rating counters
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<ReviewPayload>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(payload) = payload?;
    let rating = validate_rating(&payload.rating)?;
    let course_id = parse_id(&payload.course_id, "Course")?;
    let course_filter = DocFilter::by_id(course_id);

    state.db.find_404(Collection::Courses, &course_filter, "Course").await?;

    let mut review = Document::new();
    review.insert("courseId".to_string(), json!(course_id.to_string()));
    review.insert("rating".to_string(), json!(rating));
    review.insert("comment".to_string(), json!(payload.comment.unwrap_or_default()));
    set_opt(&mut review, "reviewerName", non_blank(payload.reviewer_name));
    set_opt(&mut review, "reviewerEmail", non_blank(payload.reviewer_email));
    review.insert("createdAt".to_string(), timestamp());

    let id = state.db.insert_one(Collection::Reviews, review.clone()).await?;
    state.db.update_inc(Collection::Courses, &course_filter, "reviewCount", 1).await?;
    state.db.update_inc(Collection::Courses, &course_filter, "ratingTotal", rating).await?;

    review.insert(ID_FIELD.to_string(), json!(id.to_string()));
    Ok(ApiResponse::created(json!({ "insertedId": id, "review": public_review(review) })))
}

/// GET /reviews/:courseId - open; newest first
pub async fn list_for_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> ApiResult<Vec<Document>> {
    let filter = DocFilter::new().with_eq("courseId", course_id.trim());
    let options = FindOptions::sorted(vec![SortKey::desc("createdAt")]);
    let reviews = state.db.find_many(Collection::Reviews, &filter, &options).await?;
    Ok(ApiResponse::success(reviews.into_iter().map(public_review).collect()))
}
