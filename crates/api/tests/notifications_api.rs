//! Integration tests for the notification inbox.

mod common;

use agora_db::models::notification::CreateNotification;
use agora_db::models::user::User;
use agora_db::repositories::NotificationRepo;
use axum::http::StatusCode;
use common::{
    app_from_state, body_json, create_user, delete_json_auth, get_auth, post_json_auth,
    test_state, token_for,
};
use serde_json::json;
use sqlx::PgPool;

async fn notify(pool: &PgPool, user: &User, title: &str) -> i64 {
    NotificationRepo::create(
        pool,
        &CreateNotification {
            user_id: user.id,
            notification_type: "model_approved".to_string(),
            title: title.to_string(),
            message: format!("{title} is live"),
            entity_type: Some("model".to_string()),
            entity_id: Some(1),
        },
    )
    .await
    .unwrap()
    .id
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn inbox_lists_newest_first_and_counts_unread(pool: PgPool) {
    let user = create_user(&pool, "seller", "user").await;
    notify(&pool, &user, "First").await;
    notify(&pool, &user, "Second").await;
    let (state, _) = test_state(pool);
    let token = token_for(&user);

    let list = body_json(get_auth(app_from_state(state.clone()), "/api/v1/notifications", &token).await).await;
    let items = list["data"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["title"], "Second");
    assert_eq!(items[0]["is_read"], false);

    let count = body_json(
        get_auth(app_from_state(state), "/api/v1/notifications/unread-count", &token).await,
    )
    .await;
    assert_eq!(count["data"]["count"], 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn marking_read_updates_the_count(pool: PgPool) {
    let user = create_user(&pool, "seller", "user").await;
    let first = notify(&pool, &user, "First").await;
    notify(&pool, &user, "Second").await;
    notify(&pool, &user, "Third").await;
    let (state, _) = test_state(pool);
    let token = token_for(&user);

    let response = post_json_auth(
        app_from_state(state.clone()),
        &format!("/api/v1/notifications/{first}/read"),
        json!({}),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let unread = body_json(
        get_auth(
            app_from_state(state.clone()),
            "/api/v1/notifications?unread_only=true",
            &token,
        )
        .await,
    )
    .await;
    assert_eq!(unread["data"].as_array().unwrap().len(), 2);

    let all = body_json(
        post_json_auth(
            app_from_state(state.clone()),
            "/api/v1/notifications/read-all",
            json!({}),
            &token,
        )
        .await,
    )
    .await;
    assert_eq!(all["data"]["marked_read"], 2);

    let count = body_json(
        get_auth(app_from_state(state), "/api/v1/notifications/unread-count", &token).await,
    )
    .await;
    assert_eq!(count["data"]["count"], 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn another_users_notification_is_404(pool: PgPool) {
    let owner = create_user(&pool, "owner", "user").await;
    let other = create_user(&pool, "other", "user").await;
    let id = notify(&pool, &owner, "Private").await;
    let (state, _) = test_state(pool);

    let response = post_json_auth(
        app_from_state(state),
        &format!("/api/v1/notifications/{id}/read"),
        json!({}),
        &token_for(&other),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_skips_foreign_ids(pool: PgPool) {
    let owner = create_user(&pool, "owner", "user").await;
    let other = create_user(&pool, "other", "user").await;
    let mine = notify(&pool, &owner, "Mine").await;
    let theirs = notify(&pool, &other, "Theirs").await;
    let (state, _) = test_state(pool);
    let token = token_for(&owner);

    let response = delete_json_auth(
        app_from_state(state.clone()),
        "/api/v1/notifications",
        json!({ "ids": [mine, theirs] }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["deleted"], 1);

    let remaining = body_json(
        get_auth(app_from_state(state.clone()), "/api/v1/notifications", &token_for(&other)).await,
    )
    .await;
    assert_eq!(remaining["data"].as_array().unwrap().len(), 1);

    let response = delete_json_auth(
        app_from_state(state),
        "/api/v1/notifications",
        json!({ "ids": [] }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
