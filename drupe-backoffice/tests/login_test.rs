mod common;

use axum::http::StatusCode;
use common::TestApp;
use drupe_backoffice::models::Role;
use drupe_backoffice::repository::make_user;
use serde_json::json;

#[tokio::test]
async fn login_returns_token_pair_envelope() {
    let app = TestApp::spawn();

    let data = app.login("manager1", "manager123").await;

    assert!(data["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(data["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(data["token_type"], "bearer");
    assert_eq!(data["expires_in"], 1800);
    assert_eq!(data["user"]["username"], "manager1");
    assert_eq!(data["user"]["role"], "manager");
    assert_eq!(data["user"]["branch_memberships"], json!(["B1", "B2"]));
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_indistinguishable() {
    let app = TestApp::spawn();

    let (status_a, body_a) = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "manager1", "password": "wrong" }),
        )
        .await;
    let (status_b, body_b) = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "no-such-user", "password": "wrong" }),
        )
        .await;

    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_b, StatusCode::UNAUTHORIZED);
    assert_eq!(body_a["error"], "invalid_credentials");
    assert_eq!(body_a, body_b);
}

#[tokio::test]
async fn empty_credentials_are_rejected_by_validation() {
    let app = TestApp::spawn();

    let (status, _) = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "", "password": "" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let app = TestApp::spawn();

    for _ in 0..5 {
        let (status, _) = app
            .post(
                "/auth/login",
                None,
                json!({ "username": "staff1", "password": "wrong" }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // The correct password no longer helps, and the reason is explicit.
    let (status, body) = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "staff1", "password": "staff123" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "account_locked");
}

#[tokio::test]
async fn successful_login_resets_the_failure_counter() {
    let app = TestApp::spawn();

    for _ in 0..4 {
        app.post(
            "/auth/login",
            None,
            json!({ "username": "sales1", "password": "wrong" }),
        )
        .await;
    }
    app.login("sales1", "sales123").await;

    // Four more failures sit below the threshold again.
    for _ in 0..4 {
        let (_, body) = app
            .post(
                "/auth/login",
                None,
                json!({ "username": "sales1", "password": "wrong" }),
            )
            .await;
        assert_eq!(body["error"], "invalid_credentials");
    }
    app.login("sales1", "sales123").await;
}

#[tokio::test]
async fn twofa_account_gets_interstitial_then_token_pair() {
    let app = TestApp::spawn();
    let mut user = make_user("vault1", "vault-pass-1", Role::Manager, &["B1"]);
    user.twofa_required = true;
    user.twofa_code = Some("483920".to_string());
    app.repo.insert_user(user);

    let (status, body) = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "vault1", "password": "vault-pass-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["requires_2fa"], true);
    let temp_token = body["data"]["temp_token"].as_str().expect("staging token");
    assert!(body["data"].get("access_token").is_none());

    // Wrong code first.
    let (status, body) = app
        .post(
            "/auth/2fa/verify",
            None,
            json!({ "temp_token": temp_token, "code": "000000" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_code");

    // Then the right one completes the login.
    let (status, body) = app
        .post(
            "/auth/2fa/verify",
            None,
            json!({ "temp_token": temp_token, "code": "483920" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["access_token"].as_str().is_some());
    assert_eq!(body["data"]["user"]["username"], "vault1");
}

#[tokio::test]
async fn access_token_does_not_pass_as_a_staging_token() {
    let app = TestApp::spawn();
    let token = app.access_token("manager1", "manager123").await;

    let (status, body) = app
        .post(
            "/auth/2fa/verify",
            None,
            json!({ "temp_token": token, "code": "483920" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token_kind_mismatch");
}
