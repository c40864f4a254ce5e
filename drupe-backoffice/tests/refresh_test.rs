mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn refresh_rotates_the_token_pair() {
    let app = TestApp::spawn();
    let data = app.login("manager1", "manager123").await;
    let old_refresh = data["refresh_token"].as_str().expect("refresh token");

    let (status, body) = app
        .post("/auth/refresh", None, json!({ "refresh_token": old_refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_access = body["data"]["access_token"].as_str().expect("access token");
    let new_refresh = body["data"]["refresh_token"].as_str().expect("refresh token");
    assert_ne!(new_refresh, old_refresh);

    // The rotated pair is live: the access token passes the gate, and the
    // refresh token can rotate again.
    let (status, _) = app.post("/session/lock", Some(new_access), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post("/auth/refresh", None, json!({ "refresh_token": new_refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn replayed_refresh_token_is_rejected() {
    let app = TestApp::spawn();
    let data = app.login("manager1", "manager123").await;
    let old_refresh = data["refresh_token"].as_str().expect("refresh token");

    let (status, _) = app
        .post("/auth/refresh", None, json!({ "refresh_token": old_refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post("/auth/refresh", None, json!({ "refresh_token": old_refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_refresh_token");
}

#[tokio::test]
async fn refresh_keeps_the_original_session() {
    let app = TestApp::spawn();
    let sessions_before = app.state.sessions.len();
    let data = app.login("manager1", "manager123").await;
    assert_eq!(app.state.sessions.len(), sessions_before + 1);

    let refresh = data["refresh_token"].as_str().expect("refresh token");
    let (status, _) = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Rotation renews credentials, it does not open a second session.
    assert_eq!(app.state.sessions.len(), sessions_before + 1);
}

#[tokio::test]
async fn access_token_cannot_be_used_to_refresh() {
    let app = TestApp::spawn();
    let token = app.access_token("manager1", "manager123").await;

    let (status, body) = app
        .post("/auth/refresh", None, json!({ "refresh_token": token }))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token_kind_mismatch");
}

#[tokio::test]
async fn refresh_fails_after_logout() {
    let app = TestApp::spawn();
    let data = app.login("manager1", "manager123").await;
    let access = data["access_token"].as_str().expect("access token");
    let refresh = data["refresh_token"].as_str().expect("refresh token");

    let (status, _) = app
        .post(
            "/auth/logout",
            Some(access),
            json!({ "refresh_token": refresh }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
