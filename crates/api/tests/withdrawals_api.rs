//! Integration tests for seller withdrawals and their admin review.

mod common;

use agora_db::models::model::CreateModel;
use agora_db::models::purchase::CreatePurchase;
use agora_db::models::user::User;
use agora_db::repositories::{EarningRepo, ModelRepo, PurchaseRepo};
use agora_events::bus::WITHDRAWAL_DECIDED;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{
    app_from_state, body_json, build_test_app, create_user, get_auth, post_json_auth,
    put_json_auth, test_state, token_for,
};
use serde_json::json;
use sqlx::PgPool;

/// Give `seller` an earning that is already past its release time.
async fn credit_released(pool: &PgPool, seller: &User, order_id: &str, amount_cents: i64) {
    let model = ModelRepo::create(
        pool,
        &CreateModel {
            author_id: seller.id,
            name: format!("Model {order_id}"),
            description: "Classifies support tickets".to_string(),
            price_cents: 1000,
            variant_id: "877785".to_string(),
            tags: vec![],
            features: vec![],
            use_cases: vec![],
            setup: String::new(),
            file_path: format!("{}/{order_id}.zip", seller.id),
            file_name: format!("{order_id}.zip"),
            file_size_bytes: 1024,
            image_path: None,
            validation_result: None,
        },
    )
    .await
    .unwrap();
    let purchase = PurchaseRepo::create(
        pool,
        &CreatePurchase {
            order_id: order_id.to_string(),
            model_id: model.id,
            buyer_id: None,
            buyer_email: "buyer@example.com".to_string(),
            model_name: model.name.clone(),
            total_cents: 1000,
        },
    )
    .await
    .unwrap()
    .unwrap();
    EarningRepo::create(
        pool,
        seller.id,
        purchase.id,
        amount_cents,
        Utc::now() - Duration::hours(1),
    )
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_fields_are_rejected(pool: PgPool) {
    let seller = create_user(&pool, "seller", "user").await;
    let app = build_test_app(pool);

    let response = post_json_auth(
        app,
        "/api/v1/withdraw",
        json!({ "amount": 500 }),
        &token_for(&seller),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Missing required fields: paypal_email and amount are required"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_email_and_amount_are_rejected(pool: PgPool) {
    let seller = create_user(&pool, "seller", "user").await;
    let (state, _) = test_state(pool);
    let token = token_for(&seller);

    let response = post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/withdraw",
        json!({ "paypal_email": "not-an-email", "amount": 500 }),
        &token,
    )
    .await;
    assert_eq!(
        body_json(response).await["error"],
        "Please enter a valid email address"
    );

    let response = post_json_auth(
        app_from_state(state),
        "/api/v1/withdraw",
        json!({ "paypal_email": "pay@example.com", "amount": 0 }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Amount must be greater than 0");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn amount_above_balance_is_rejected(pool: PgPool) {
    let seller = create_user(&pool, "seller", "user").await;
    credit_released(&pool, &seller, "order-1", 800).await;
    let app = build_test_app(pool);

    let response = post_json_auth(
        app,
        "/api/v1/withdraw",
        json!({ "paypal_email": "pay@example.com", "amount": 801 }),
        &token_for(&seller),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Amount exceeds available balance of $8.00"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn pending_request_reserves_the_balance(pool: PgPool) {
    let seller = create_user(&pool, "seller", "user").await;
    credit_released(&pool, &seller, "order-1", 800).await;
    credit_released(&pool, &seller, "order-2", 800).await;
    let (state, _) = test_state(pool);
    let token = token_for(&seller);

    let response = post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/withdraw",
        json!({ "paypal_email": "pay@example.com", "amount": 1000 }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert!(created["request_id"].is_number());
    assert_eq!(created["message"], "Withdrawal request for $10.00 submitted");

    let balance = body_json(
        get_auth(app_from_state(state.clone()), "/api/v1/withdraw/available-balance", &token).await,
    )
    .await;
    assert_eq!(balance["data"]["total_earnings"], 1600);
    assert_eq!(balance["data"]["pending_withdrawals"], 1000);
    assert_eq!(balance["data"]["available"], 600);

    let history = body_json(get_auth(app_from_state(state.clone()), "/api/v1/withdraw", &token).await).await;
    assert_eq!(history["data"].as_array().unwrap().len(), 1);
    assert_eq!(history["data"][0]["status"], "pending");

    // The reserved amount cannot be requested a second time.
    let response = post_json_auth(
        app_from_state(state),
        "/api/v1/withdraw",
        json!({ "paypal_email": "pay@example.com", "amount": 700 }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Admin review
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn approval_moves_amount_to_withdrawn(pool: PgPool) {
    let seller = create_user(&pool, "seller", "user").await;
    let admin = create_user(&pool, "admin", "admin").await;
    credit_released(&pool, &seller, "order-1", 800).await;
    let (state, services) = test_state(pool);
    let mut events = services.event_bus.subscribe();

    let created = body_json(
        post_json_auth(
            app_from_state(state.clone()),
            "/api/v1/withdraw",
            json!({ "paypal_email": "pay@example.com", "amount": 500 }),
            &token_for(&seller),
        )
        .await,
    )
    .await;
    let id = created["request_id"].as_i64().unwrap();
    let uri = format!("/api/v1/admin/withdrawals/{id}");

    let response = put_json_auth(
        app_from_state(state.clone()),
        &uri,
        json!({ "status": "approved" }),
        &token_for(&admin),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "approved");
    assert_eq!(json["data"]["decided_by"], admin.id);

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, WITHDRAWAL_DECIDED);
    assert_eq!(event.actor_user_id, Some(seller.id));

    let balance = body_json(
        get_auth(
            app_from_state(state.clone()),
            "/api/v1/withdraw/available-balance",
            &token_for(&seller),
        )
        .await,
    )
    .await;
    assert_eq!(balance["data"]["withdrawn"], 500);
    assert_eq!(balance["data"]["pending_withdrawals"], 0);
    assert_eq!(balance["data"]["available"], 300);

    // A decided request cannot be flipped.
    let response = put_json_auth(
        app_from_state(state),
        &uri,
        json!({ "status": "rejected", "rejected_reason": "late" }),
        &token_for(&admin),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_list_filters_by_status(pool: PgPool) {
    let seller = create_user(&pool, "seller", "user").await;
    let admin = create_user(&pool, "admin", "admin").await;
    credit_released(&pool, &seller, "order-1", 800).await;
    let (state, _) = test_state(pool);

    post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/withdraw",
        json!({ "paypal_email": "pay@example.com", "amount": 200 }),
        &token_for(&seller),
    )
    .await;

    let pending = body_json(
        get_auth(
            app_from_state(state.clone()),
            "/api/v1/admin/withdrawals?status=pending",
            &token_for(&admin),
        )
        .await,
    )
    .await;
    assert_eq!(pending["data"].as_array().unwrap().len(), 1);
    assert_eq!(pending["data"][0]["username"], "seller");

    let approved = body_json(
        get_auth(
            app_from_state(state.clone()),
            "/api/v1/admin/withdrawals?status=approved",
            &token_for(&admin),
        )
        .await,
    )
    .await;
    assert!(approved["data"].as_array().unwrap().is_empty());

    let response = get_auth(
        app_from_state(state),
        "/api/v1/admin/withdrawals?status=paid",
        &token_for(&admin),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn sellers_cannot_review_withdrawals(pool: PgPool) {
    let seller = create_user(&pool, "seller", "user").await;
    let app = build_test_app(pool);

    let response = put_json_auth(
        app,
        "/api/v1/admin/withdrawals/1",
        json!({ "status": "approved" }),
        &token_for(&seller),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_request_is_404(pool: PgPool) {
    let admin = create_user(&pool, "admin", "admin").await;
    let app = build_test_app(pool);

    let response = put_json_auth(
        app,
        "/api/v1/admin/withdrawals/999999",
        json!({ "status": "approved" }),
        &token_for(&admin),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
