mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;

async fn select_branch(app: &TestApp, token: &str, branch_id: &str) -> (StatusCode, serde_json::Value) {
    app.post(
        "/branch/select",
        Some(token),
        json!({ "branch_id": branch_id }),
    )
    .await
}

fn sale_body() -> serde_json::Value {
    json!({
        "lines": [
            { "product_id": "dried-mango", "quantity": 2, "unit_price_cents": 450 }
        ]
    })
}

#[tokio::test]
async fn sale_requires_a_selected_branch() {
    let app = TestApp::spawn();
    let token = app.access_token("staff1", "staff123").await;

    let (status, body) = app.post("/sales", Some(&token), sale_body()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "branch_not_selected");
}

#[tokio::test]
async fn staff_records_a_sale_in_their_branch() {
    let app = TestApp::spawn();
    let token = app.access_token("staff1", "staff123").await;

    let (status, body) = select_branch(&app, &token, "B1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["branch_id"], "B1");
    assert_eq!(body["data"]["branch_name"], "Downtown");

    let (status, body) = app.post("/sales", Some(&token), sale_body()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["branch_id"], "B1");
    assert_eq!(body["data"]["total_cents"], 900);
    assert_eq!(body["data"]["line_count"], 1);
}

#[tokio::test]
async fn staff_cannot_select_a_branch_they_are_not_a_member_of() {
    let app = TestApp::spawn();
    let token = app.access_token("staff1", "staff123").await;

    let (status, body) = select_branch(&app, &token, "B2").await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn managerial_roles_select_any_existing_branch() {
    let app = TestApp::spawn();
    let admin = app.access_token("admin", "admin123").await;

    // Admin has no memberships at all, and still gets in.
    let (status, body) = select_branch(&app, &admin, "B2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["branch_name"], "Harbourside");

    // But not into a branch that does not exist.
    let (status, _) = select_branch(&app, &admin, "B9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn driver_cannot_process_sales() {
    let app = TestApp::spawn();
    let token = app.access_token("driver1", "driver123").await;
    select_branch(&app, &token, "B1").await;

    let (status, body) = app.post("/sales", Some(&token), sale_body()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn driver_records_deliveries_in_their_branch() {
    let app = TestApp::spawn();
    let token = app.access_token("driver1", "driver123").await;

    let (status, body) = app
        .post(
            "/branches/B1/deliveries",
            Some(&token),
            json!({ "reference": "PO-2041" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["branch_id"], "B1");
    assert_eq!(body["data"]["reference"], "PO-2041");

    let (status, body) = app
        .post(
            "/branches/B2/deliveries",
            Some(&token),
            json!({ "reference": "PO-2042" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn inventory_adjustment_is_scoped_to_the_path_branch() {
    let app = TestApp::spawn();
    let token = app.access_token("staff1", "staff123").await;

    let (status, body) = app
        .post(
            "/branches/B1/inventory/adjust",
            Some(&token),
            json!({ "product_id": "dried-apricot", "delta": -5 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], 40);

    // Same capability, wrong branch.
    let (status, body) = app
        .post(
            "/branches/B2/inventory/adjust",
            Some(&token),
            json!({ "product_id": "dried-mango", "delta": -5 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn manager_adjusts_stock_in_any_branch() {
    let app = TestApp::spawn();
    let token = app.access_token("manager1", "manager123").await;

    let (status, body) = app
        .post(
            "/branches/B2/inventory/adjust",
            Some(&token),
            json!({ "product_id": "dried-mango", "delta": 20 }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["branch_id"], "B2");
    assert_eq!(body["data"]["quantity"], 100);
}

#[tokio::test]
async fn sales_role_cannot_touch_inventory() {
    let app = TestApp::spawn();
    let token = app.access_token("sales1", "sales123").await;

    let (status, body) = app
        .post(
            "/branches/B1/inventory/adjust",
            Some(&token),
            json!({ "product_id": "dried-mango", "delta": 1 }),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}
