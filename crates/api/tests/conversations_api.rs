//! Integration tests for saved assistant conversations.

mod common;

use axum::http::StatusCode;
use common::{
    app_from_state, body_json, create_user, get_auth, post_json_auth, test_state, token_for,
};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn conversation_keeps_messages_in_order(pool: PgPool) {
    let user = create_user(&pool, "chatter", "user").await;
    let (state, _) = test_state(pool);
    let token = token_for(&user);

    let response = post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/conversations",
        json!({}),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let conversation = body_json(response).await;
    assert_eq!(conversation["data"]["title"], "New conversation");
    let id = conversation["data"]["id"].as_i64().unwrap();
    let messages_uri = format!("/api/v1/conversations/{id}/messages");

    for (role, content) in [("user", "Find me an OCR model"), ("assistant", "Here are three.")] {
        let response = post_json_auth(
            app_from_state(state.clone()),
            &messages_uri,
            json!({ "role": role, "content": content }),
            &token,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let messages = body_json(get_auth(app_from_state(state.clone()), &messages_uri, &token).await).await;
    let messages = messages["data"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["content"], "Here are three.");

    let list = body_json(get_auth(app_from_state(state), "/api/v1/conversations", &token).await).await;
    assert_eq!(list["data"][0]["id"], id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn message_role_and_content_are_checked(pool: PgPool) {
    let user = create_user(&pool, "chatter", "user").await;
    let (state, _) = test_state(pool);
    let token = token_for(&user);
    let created = body_json(
        post_json_auth(
            app_from_state(state.clone()),
            "/api/v1/conversations",
            json!({ "title": "Pricing" }),
            &token,
        )
        .await,
    )
    .await;
    let uri = format!("/api/v1/conversations/{}/messages", created["data"]["id"]);

    let response = post_json_auth(
        app_from_state(state.clone()),
        &uri,
        json!({ "role": "system", "content": "hi" }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json_auth(
        app_from_state(state.clone()),
        &uri,
        json!({ "role": "user", "content": "   " }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json_auth(
        app_from_state(state),
        &uri,
        json!({ "role": "user", "content": "x".repeat(32001) }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["fields"]["content"],
        "Message is too long"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn conversations_are_private(pool: PgPool) {
    let owner = create_user(&pool, "owner", "user").await;
    let other = create_user(&pool, "other", "user").await;
    let (state, _) = test_state(pool);
    let created = body_json(
        post_json_auth(
            app_from_state(state.clone()),
            "/api/v1/conversations",
            json!({ "title": "Mine" }),
            &token_for(&owner),
        )
        .await,
    )
    .await;
    let uri = format!("/api/v1/conversations/{}", created["data"]["id"]);

    let response = get_auth(app_from_state(state.clone()), &uri, &token_for(&other)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = common::delete_json_auth(
        app_from_state(state.clone()),
        &uri,
        json!({}),
        &token_for(&other),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response =
        common::delete_json_auth(app_from_state(state), &uri, json!({}), &token_for(&owner)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
