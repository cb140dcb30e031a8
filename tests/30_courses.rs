mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use skillverse_api::database::Collection;

use common::{bearer, body, TestServer};

async fn seed_catalog(server: &TestServer) -> Result<()> {
    let catalog = [
        ("Rust Basics", "programming", "beginner", 10, 5, true, "2026-01-01T00:00:00.000Z"),
        ("Advanced Rust", "programming", "advanced", 50, 40, false, "2026-01-02T00:00:00.000Z"),
        ("Watercolor", "art", "beginner", 20, 12, true, "2026-01-03T00:00:00.000Z"),
        ("Rusty Bikes", "hobby", "beginner", 0, 1, false, "2026-01-04T00:00:00.000Z"),
    ];
    for (title, category, level, price, enrolls, featured, created) in catalog {
        server
            .seed_course(
                "instructor@x.com",
                title,
                json!({
                    "category": category,
                    "level": level,
                    "price": price,
                    "enrollCount": enrolls,
                    "isFeatured": featured,
                    "createdAt": created,
                }),
            )
            .await?;
    }
    Ok(())
}

fn titles(list: &Value) -> Vec<String> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c["title"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn listing_is_paginated_and_newest_first() -> Result<()> {
    let server = TestServer::start().await?;
    seed_catalog(&server).await?;

    let res = server.client.get(server.url("/courses?page=1&limit=3")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body(res).await?;
    let data = &body["data"];
    assert_eq!(data["total"], json!(4));
    assert_eq!(data["totalPages"], json!(2));
    assert_eq!(titles(&data["courses"]), vec!["Rusty Bikes", "Watercolor", "Advanced Rust"]);

    let res = server.client.get(server.url("/courses?page=2&limit=3")).send().await?;
    let body = common::body(res).await?;
    assert_eq!(titles(&body["data"]["courses"]), vec!["Rust Basics"]);
    Ok(())
}

#[tokio::test]
async fn listing_filters_and_sorts() -> Result<()> {
    let server = TestServer::start().await?;
    seed_catalog(&server).await?;

    let res = server
        .client
        .get(server.url("/courses?search=RUST&sort=price_asc"))
        .send()
        .await?;
    let body = body(res).await?;
    assert_eq!(titles(&body["data"]["courses"]), vec!["Rusty Bikes", "Rust Basics", "Advanced Rust"]);

    let res = server
        .client
        .get(server.url("/courses?category=programming&maxPrice=20"))
        .send()
        .await?;
    let body = common::body(res).await?;
    assert_eq!(titles(&body["data"]["courses"]), vec!["Rust Basics"]);
    Ok(())
}

#[tokio::test]
async fn unaddressable_page_is_a_bad_request() -> Result<()> {
    let server = TestServer::start().await?;
    seed_catalog(&server).await?;

    let res = server
        .client
        .get(server.url(&format!("/courses?page={}&limit=10", u64::MAX)))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server.client.get(server.url("/courses?page=1000&limit=10")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(res).await?["data"]["courses"], json!([]));
    Ok(())
}

#[tokio::test]
async fn unknown_sort_field_is_a_bad_request() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server
        .client
        .get(server.url("/courses?sort=instructorEmail"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn featured_and_popular() -> Result<()> {
    let server = TestServer::start().await?;
    seed_catalog(&server).await?;

    let res = server.client.get(server.url("/featured-courses")).send().await?;
    let body = body(res).await?;
    assert_eq!(titles(&body["data"]), vec!["Watercolor", "Rust Basics"]);

    let res = server.client.get(server.url("/popular-courses")).send().await?;
    let body = common::body(res).await?;
    let popular = titles(&body["data"]);
    assert_eq!(popular.first().map(String::as_str), Some("Advanced Rust"));
    assert_eq!(popular.len(), 4);
    Ok(())
}

#[tokio::test]
async fn public_views_hide_the_instructor_email() -> Result<()> {
    let server = TestServer::start().await?;
    let id = server.seed_course("instructor@x.com", "Rust Basics", json!({})).await?;

    let res = server.client.get(server.url(&format!("/courses/{}", id))).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body(res).await?;
    assert_eq!(body["data"]["title"], json!("Rust Basics"));
    assert!(body["data"].get("instructorEmail").is_none());
    assert_eq!(body["data"]["averageRating"], json!(0.0));

    let res = server.client.get(server.url("/courses")).send().await?;
    let body = common::body(res).await?;
    assert!(body["data"]["courses"][0].get("instructorEmail").is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_or_malformed_course_is_not_found() -> Result<()> {
    let server = TestServer::start().await?;

    for id in [uuid::Uuid::new_v4().to_string(), "not-an-id".to_string()] {
        let res = server.client.get(server.url(&format!("/courses/{}", id))).send().await?;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(res).await?["message"], json!("Course not found"));
    }
    Ok(())
}

#[tokio::test]
async fn create_assigns_the_caller_as_instructor() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server
        .client
        .post(server.url("/courses"))
        .header("Authorization", bearer("a@x.com"))
        .json(&json!({ "title": "Rust Basics", "price": 15, "category": "programming" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = body(res).await?;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["course"]["instructorEmail"], json!("a@x.com"));
    assert_eq!(body["data"]["course"]["enrollCount"], json!(0));

    server.store.reset();
    let res = server
        .client
        .post(server.url("/courses"))
        .header("Authorization", bearer("a@x.com"))
        .json(&json!({ "title": "Theirs", "instructorEmail": "b@x.com" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(server.store_calls(), 0);
    assert_eq!(server.count(Collection::Courses).await?, 1);

    let res = server
        .client
        .post(server.url("/courses"))
        .header("Authorization", bearer("a@x.com"))
        .json(&json!({ "price": 15 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn reviews_update_course_rating() -> Result<()> {
    let server = TestServer::start().await?;
    let id = server.seed_course("instructor@x.com", "Rust Basics", json!({})).await?;

    for (rating, name) in [(5, "Ann"), (4, "Bo")] {
        let res = server
            .client
            .post(server.url("/reviews"))
            .json(&json!({
                "courseId": id.to_string(),
                "rating": rating,
                "comment": "good",
                "reviewerName": name,
                "reviewerEmail": format!("{}@x.com", name.to_lowercase()),
            }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = server
        .client
        .post(server.url("/reviews"))
        .json(&json!({ "courseId": id.to_string(), "rating": 9 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server.client.get(server.url(&format!("/reviews/{}", id))).send().await?;
    let body = body(res).await?;
    let reviews = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(reviews.len(), 2);
    assert!(reviews.iter().all(|r| r.get("reviewerEmail").is_none()));

    let res = server.client.get(server.url(&format!("/courses/{}", id))).send().await?;
    let course = common::body(res).await?;
    assert_eq!(course["data"]["reviewCount"], json!(2));
    assert_eq!(course["data"]["averageRating"], json!(4.5));
    Ok(())
}
