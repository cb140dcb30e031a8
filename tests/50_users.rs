mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

use skillverse_api::database::Collection;

use common::{bearer, body, TestServer};

#[tokio::test]
async fn user_create_is_idempotent() -> Result<()> {
    let server = TestServer::start().await?;
    let payload = json!({ "email": "a@x.com", "name": "Ann" });

    let first = server.client.post(server.url("/users")).json(&payload).send().await?;
    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(body(first).await?["data"]["created"], json!(true));
    assert_eq!(server.count(Collection::Users).await?, 1);

    let second = server.client.post(server.url("/users")).json(&payload).send().await?;
    assert_eq!(second.status(), StatusCode::OK);
    let second = body(second).await?;
    assert_eq!(second["data"]["created"], json!(false));
    assert_eq!(second["data"]["message"], json!("User already exists"));
    assert_eq!(server.count(Collection::Users).await?, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_first_logins_create_one_user() -> Result<()> {
    let server = TestServer::start().await?;

    let requests = (0..8).map(|_| {
        server
            .client
            .post(server.url("/users"))
            .json(&json!({ "email": "a@x.com" }))
            .send()
    });
    for res in futures::future::join_all(requests).await {
        let status = res?.status();
        assert!(status == StatusCode::CREATED || status == StatusCode::OK);
    }
    assert_eq!(server.count(Collection::Users).await?, 1);
    Ok(())
}

#[tokio::test]
async fn user_create_requires_an_email() -> Result<()> {
    let server = TestServer::start().await?;

    for payload in [json!({ "name": "Ann" }), json!({ "email": "  " }), json!({ "email": "nope" })] {
        let res = server.client.post(server.url("/users")).json(&payload).send().await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(server.count(Collection::Users).await?, 0);
    Ok(())
}

#[tokio::test]
async fn profile_is_owner_scoped() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server
        .client
        .post(server.url("/users"))
        .json(&json!({ "email": "a@x.com", "name": "Ann" }))
        .send()
        .await?;
    let id = body(res).await?["data"]["insertedId"].as_str().unwrap_or_default().to_string();
    let path = format!("/users/{}", id);

    let res = server
        .client
        .get(server.url(&path))
        .header("Authorization", bearer("a@x.com"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(res).await?["data"]["name"], json!("Ann"));

    let res = server
        .client
        .get(server.url(&format!("{}?email=a@x.com", path)))
        .header("Authorization", bearer("b@x.com"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server
        .client
        .get(server.url(&path))
        .header("Authorization", bearer("b@x.com"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server.client.get(server.url(&path)).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn profile_update_touches_only_own_record() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server
        .client
        .post(server.url("/users"))
        .json(&json!({ "email": "a@x.com", "name": "Ann" }))
        .send()
        .await?;
    let id = body(res).await?["data"]["insertedId"].as_str().unwrap_or_default().to_string();
    let path = format!("/users/{}", id);

    let res = server
        .client
        .patch(server.url(&path))
        .header("Authorization", bearer("b@x.com"))
        .json(&json!({ "name": "Mallory" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server
        .client
        .patch(server.url(&path))
        .header("Authorization", bearer("b@x.com"))
        .json(&json!({ "email": "a@x.com", "name": "Mallory" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server
        .client
        .patch(server.url(&path))
        .header("Authorization", bearer("a@x.com"))
        .json(&json!({ "name": "Ann Lee", "bio": "Rustacean" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let updated = body(res).await?;
    assert_eq!(updated["data"]["user"]["name"], json!("Ann Lee"));
    assert_eq!(updated["data"]["user"]["email"], json!("a@x.com"));
    Ok(())
}
