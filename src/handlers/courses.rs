use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::{guard::owner_field, Principal};
use crate::database::{Collection, Condition, DocFilter, Document, FindOptions, SortKey, ID_FIELD};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

use super::{authorize, non_blank, parse_id, set_opt, timestamp, OwnerQuery};

/// Fields a caller may sort the public listing by.
const SORTABLE_FIELDS: &[&str] = &["title", "price", "createdAt", "enrollCount", "reviewCount"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl CourseQuery {
    fn filter(&self) -> DocFilter {
        let mut filter = DocFilter::new();
        if let Some(search) = non_blank(self.search.clone()) {
            filter = filter.with(Condition::Contains("title".to_string(), search));
        }
        if let Some(category) = non_blank(self.category.clone()) {
            filter = filter.with_eq("category", category);
        }
        if let Some(level) = non_blank(self.level.clone()) {
            filter = filter.with_eq("level", level);
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            filter = filter.with(Condition::Range {
                field: "price".to_string(),
                min: self.min_price,
                max: self.max_price,
            });
        }
        filter
    }
}

/// Resolve a sort alias or `"<field> asc|desc"` list against the whitelist.
pub fn parse_sort(sort: Option<&str>) -> Result<Vec<SortKey>, ApiError> {
    let keys = match sort.map(str::trim).filter(|s| !s.is_empty()) {
        None | Some("newest") => vec![SortKey::desc("createdAt")],
        Some("oldest") => vec![SortKey::asc("createdAt")],
        Some("price_asc") | Some("price-asc") => vec![SortKey::asc("price")],
        Some("price_desc") | Some("price-desc") => vec![SortKey::desc("price")],
        Some("popular") => vec![SortKey::desc("enrollCount")],
        Some("title") => vec![SortKey::asc("title")],
        Some(list) => {
            let keys = SortKey::parse_list(list);
            if let Some(bad) = keys.iter().find(|k| !SORTABLE_FIELDS.contains(&k.field.as_str())) {
                return Err(ApiError::field_error("sort", format!("cannot sort by '{}'", bad.field)));
            }
            keys
        }
    };
    Ok(keys)
}

/// Rows to skip before `page`. Offsets past what a store can address are rejected.
fn page_offset(page: u64, limit: u64) -> Result<u64, ApiError> {
    (page - 1)
        .checked_mul(limit)
        .filter(|skip| i64::try_from(*skip).is_ok())
        .ok_or_else(|| ApiError::field_error("page", "is too large"))
}

/// Course as shown on open routes: no owner email, derived average rating.
pub fn public_course(mut doc: Document) -> Document {
    doc.remove(owner_field::COURSE);
    let total = doc.remove("ratingTotal").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let count = doc.get("reviewCount").and_then(Value::as_f64).unwrap_or(0.0);
    let average = if count > 0.0 { (total / count * 10.0).round() / 10.0 } else { 0.0 };
    doc.insert("averageRating".to_string(), json!(average));
    doc
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub price: Option<f64>,
    pub duration: Option<Value>,
    pub image: Option<String>,
    pub instructor_name: Option<String>,
    pub instructor_email: Option<String>,
    pub is_featured: Option<bool>,
}

impl CoursePayload {
    /// Editable fields present in the payload. The owner field is never included.
    fn editable_fields(self) -> Result<Document, ApiError> {
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(ApiError::field_error("price", "must be a non-negative number"));
            }
        }
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(ApiError::field_error("title", "must not be blank"));
        }

        let mut doc = Document::new();
        set_opt(&mut doc, "title", self.title.map(|t| t.trim().to_string()));
        set_opt(&mut doc, "description", self.description);
        set_opt(&mut doc, "category", non_blank(self.category));
        set_opt(&mut doc, "level", non_blank(self.level));
        set_opt(&mut doc, "price", self.price);
        set_opt(&mut doc, "duration", self.duration);
        set_opt(&mut doc, "image", self.image);
        set_opt(&mut doc, "instructorName", self.instructor_name);
        set_opt(&mut doc, "isFeatured", self.is_featured);
        Ok(doc)
    }
}

/// GET /courses - public, filterable, paginated listing
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<CourseQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query?;
    let api = &state.config.api;

    let filter = query.filter();
    let sort = parse_sort(query.sort.as_deref())?;
    let limit = query.limit.unwrap_or(api.default_page_size as u64).clamp(1, api.max_page_size as u64);
    let page = query.page.unwrap_or(1).max(1);
    let skip = page_offset(page, limit)?;

    let total = state.db.count(Collection::Courses, &filter).await?;
    let options = FindOptions::sorted(sort).limit(limit).skip(skip);
    let courses: Vec<Document> = state
        .db
        .find_many(Collection::Courses, &filter, &options)
        .await?
        .into_iter()
        .map(public_course)
        .collect();

    Ok(ApiResponse::success(json!({
        "courses": courses,
        "total": total,
        "page": page,
        "limit": limit,
        "totalPages": total.div_ceil(limit),
    })))
}

/// GET /featured-courses
pub async fn featured(State(state): State<AppState>) -> ApiResult<Vec<Document>> {
    let filter = DocFilter::new().with_eq("isFeatured", true);
    let options = FindOptions::sorted(vec![SortKey::desc("createdAt")]).limit(state.config.api.featured_limit as u64);
    let courses = state.db.find_many(Collection::Courses, &filter, &options).await?;
    Ok(ApiResponse::success(courses.into_iter().map(public_course).collect()))
}

/// GET /popular-courses
pub async fn popular(State(state): State<AppState>) -> ApiResult<Vec<Document>> {
    let options = FindOptions::sorted(vec![SortKey::desc("enrollCount"), SortKey::desc("createdAt")])
        .limit(state.config.api.featured_limit as u64);
    let courses = state.db.find_many(Collection::Courses, &DocFilter::new(), &options).await?;
    Ok(ApiResponse::success(courses.into_iter().map(public_course).collect()))
}

/// GET /courses/:id - public course detail
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Document> {
    let id = parse_id(&id, "Course")?;
    let course = state.db.find_404(Collection::Courses, &DocFilter::by_id(id), "Course").await?;
    Ok(ApiResponse::success(public_course(course)))
}

/// GET /myCourses?email= - the caller's own courses, all fields
pub async fn mine(
    State(state): State<AppState>,
    principal: Principal,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> ApiResult<Vec<Document>> {
    let Query(query) = query?;
    let scope = authorize(&principal, query.email.as_deref())?;

    let filter = scope.restrict(DocFilter::new(), owner_field::COURSE);
    let options = FindOptions::sorted(vec![SortKey::desc("createdAt")]);
    let courses = state.db.find_many(Collection::Courses, &filter, &options).await?;
    Ok(ApiResponse::success(courses))
}

/// POST /courses - create a course owned by the caller
pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    payload: Result<Json<CoursePayload>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(payload) = payload?;
    let scope = authorize(&principal, payload.instructor_email.as_deref())?;

    if non_blank(payload.title.clone()).is_none() {
        return Err(ApiError::field_error("title", "is required"));
    }

    let mut course = payload.editable_fields()?;
    course.entry("price").or_insert(json!(0));
    course.entry("isFeatured").or_insert(json!(false));
    course.insert(owner_field::COURSE.to_string(), json!(scope.email()));
    course.insert("enrollCount".to_string(), json!(0));
    course.insert("reviewCount".to_string(), json!(0));
    course.insert("ratingTotal".to_string(), json!(0));
    course.insert("createdAt".to_string(), timestamp());

    let id = state.db.insert_one(Collection::Courses, course.clone()).await?;
    course.insert(ID_FIELD.to_string(), json!(id.to_string()));
    tracing::info!("Course {} created by {}", id, scope.email());

    Ok(ApiResponse::created(json!({ "insertedId": id, "course": course })))
}

/// PUT/PATCH /courses/:id - update the caller's course
pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
    payload: Result<Json<CoursePayload>, JsonRejection>,
) -> ApiResult<Value> {
    let Query(query) = query?;
    let Json(payload) = payload?;
    let requested = payload.instructor_email.clone().or(query.email);
    let scope = authorize(&principal, requested.as_deref())?;
    let id = parse_id(&id, "Course")?;

    let mut fields = payload.editable_fields()?;
    if fields.is_empty() {
        return Err(ApiError::bad_request("No updatable fields supplied"));
    }
    fields.insert("updatedAt".to_string(), timestamp());

    let filter = scope.restrict(DocFilter::by_id(id), owner_field::COURSE);
    if !state.db.update_set(Collection::Courses, &filter, fields).await? {
        return Err(ApiError::not_found("Course not found"));
    }
    let course = state.db.find_404(Collection::Courses, &filter, "Course").await?;

    Ok(ApiResponse::success(json!({ "updated": true, "course": course })))
}

/// DELETE /courses/:id?email= - delete the caller's course
pub async fn delete(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query?;
    let scope = authorize(&principal, query.email.as_deref())?;
    let id = parse_id(&id, "Course")?;

    let filter = scope.restrict(DocFilter::by_id(id), owner_field::COURSE);
    if state.db.delete_one(Collection::Courses, &filter).await?.is_none() {
        return Err(ApiError::not_found("Course not found"));
    }
    tracing::info!("Course {} deleted by {}", id, scope.email());

    Ok(ApiResponse::success(json!({ "deleted": true, "id": id })))
}
