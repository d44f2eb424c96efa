//! Integration tests for automation browsing, installs and uploads.

mod common;

use std::sync::{Arc, Mutex};

use agora_api::services::n8n::N8nClient;
use agora_core::crypto::Encryptor;
use agora_core::hashing::hmac_sha256_hex;
use agora_db::models::automation::{Automation, CreateAutomation};
use agora_db::models::user::User;
use agora_db::repositories::{AutomationRepo, NotificationRepo, UserAutomationRepo};
use agora_events::Notifier;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use common::{
    app_from_state, body_json, build_test_app, create_user, get, get_auth, multipart_body,
    post_json_auth, post_multipart_auth, post_raw, test_state, token_for, ENCRYPTION_KEY,
    RUNNER_WEBHOOK_SECRET,
};
use serde_json::{json, Value};
use sqlx::PgPool;

async fn publish(pool: &PgPool, developer: &User, name: &str, system_config: Value) -> Automation {
    AutomationRepo::create(
        pool,
        &CreateAutomation {
            developer_id: developer.id,
            name: name.to_string(),
            description: format!("{name} for small teams"),
            price_cents: 500,
            workflow: json!({ "nodes": [], "connections": {} }),
            user_inputs: vec!["BILLING_EMAIL".to_string()],
            required_inputs: vec!["BILLING_EMAIL".to_string()],
            required_connectors: vec![],
            developer_keys: json!({}),
            google_scopes: json!([]),
            system_config,
            image_path: None,
        },
    )
    .await
    .unwrap()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn search_matches_name_and_hides_workflow(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    publish(&pool, &developer, "Invoice Bot", json!([])).await;
    publish(&pool, &developer, "Lead Scraper", json!([])).await;
    let (state, _) = test_state(pool);

    let all = body_json(get(app_from_state(state.clone()), "/api/v1/automations").await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let found = body_json(
        get(app_from_state(state.clone()), "/api/v1/automations/search?q=invoice").await,
    )
    .await;
    let found = found["data"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["name"], "Invoice Bot");
    assert!(found[0].get("workflow").is_none());
    assert!(found[0].get("developer_keys").is_none());

    let id = found[0]["id"].as_i64().unwrap();
    let one = body_json(get(app_from_state(state), &format!("/api/v1/automations/{id}")).await).await;
    assert_eq!(one["data"]["required_inputs"], json!(["BILLING_EMAIL"]));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn toggle_without_install_is_404(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let user = create_user(&pool, "user", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let app = build_test_app(pool);

    let response = post_json_auth(
        app,
        &format!("/api/v1/automations/{}/toggle", automation.id),
        json!({ "enabled": false }),
        &token_for(&user),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn execute_requires_fields_and_a_runner(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let (state, _) = test_state(pool);
    let token = token_for(&developer);

    let response = post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/automations/execute",
        json!({ "automation_id": automation.id }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json_auth(
        app_from_state(state),
        "/api/v1/automations/execute",
        json!({ "automation_id": automation.id, "config": { "BILLING_EMAIL": "a@b.co" } }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn upload_lands_in_the_configured_bucket(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let user = create_user(&pool, "user", "user").await;
    let automation = publish(
        &pool,
        &developer,
        "Clip Cutter",
        json!([{ "name": "VIDEO_STORAGE_PATH", "bucket": "clips", "mime_type": "video/mp4" }]),
    )
    .await;
    let (state, services) = test_state(pool);

    let response = post_multipart_auth(
        app_from_state(state),
        &format!("/api/v1/automations/{}/files", automation.id),
        multipart_body(&[], &[("file", "my clip.mp4", "video/mp4", &b"not really video"[..])]),
        &token_for(&user),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["bucket"], "clips");
    assert_eq!(json["data"]["mime_type"], "video/mp4");
    let path = json["data"]["path"].as_str().unwrap();
    assert!(services.files.contains("clips", path));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn upload_without_storage_is_400(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let app = build_test_app(pool);

    let response = post_multipart_auth(
        app,
        &format!("/api/v1/automations/{}/files", automation.id),
        multipart_body(&[], &[("file", "a.txt", "text/plain", &b"hello"[..])]),
        &token_for(&developer),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "This automation does not have storage configured"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stats_are_empty_for_a_new_developer(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let app = build_test_app(pool);

    let response = get_auth(app, "/api/v1/automations/stats?days=500", &token_for(&developer)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["total_runs"], 0);
    assert_eq!(json["data"]["success_rate"], 0);
    // Out-of-range windows are clamped to 90 days.
    assert_eq!(json["data"]["daily_runs"].as_array().unwrap().len(), 90);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn developer_sees_own_automations(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let other = create_user(&pool, "other", "user").await;
    publish(&pool, &developer, "Invoice Bot", json!([])).await;
    publish(&pool, &other, "Lead Scraper", json!([])).await;
    let app = build_test_app(pool);

    let json = body_json(get_auth(app, "/api/v1/user/automations", &token_for(&developer)).await).await;

    let mine = json["data"].as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["name"], "Invoice Bot");
}

// ---------------------------------------------------------------------------
// Publishing and n8n import
// ---------------------------------------------------------------------------

fn workflow_export() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "name": "Job Poster",
        "nodes": [
            {"type": "n8n-nodes-base.webhook", "name": "Webhook", "parameters": {"path": "run"}},
            {"type": "n8n-nodes-base.slack", "name": "Post",
             "parameters": {
                 "text": "New opening: <__PLACEHOLDER_VALUE__Job title__>",
                 "token": "{{SLACK_BOT_TOKEN}}"
             }}
        ],
        "connections": {}
    }))
    .unwrap()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn publishing_analyzes_the_workflow_and_seals_keys(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let (state, _) = test_state(pool.clone());
    let export = workflow_export();

    let response = post_multipart_auth(
        app_from_state(state),
        "/api/v1/automations",
        multipart_body(
            &[
                ("name", "Job Poster"),
                ("description", "Posts openings to Slack"),
                ("price", "900"),
                ("developer_keys", r#"{"SLACK_BOT_TOKEN": "xoxb-secret"}"#),
            ],
            &[("json", "job-poster.json", "application/json", &export)],
        ),
        &token_for(&developer),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["required_inputs"], json!(["JOB_TITLE"]));
    assert_eq!(json["data"]["required_connectors"], json!(["webhook", "slack"]));
    assert!(json["data"].get("developer_keys").is_none());
    assert!(json["data"].get("workflow").is_none());

    let id = json["data"]["id"].as_i64().unwrap();
    let stored = AutomationRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(stored.price_cents, 900);
    assert!(stored.workflow["nodes"][1]["parameters"]["text"]
        .as_str()
        .unwrap()
        .contains("{{JOB_TITLE}}"));
    let sealed = stored.developer_keys["SLACK_BOT_TOKEN"].as_str().unwrap();
    assert_ne!(sealed, "xoxb-secret");
    let encryptor = Encryptor::from_hex(ENCRYPTION_KEY).unwrap();
    assert_eq!(encryptor.decrypt(sealed).unwrap(), "xoxb-secret");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn publishing_rejects_a_non_workflow(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let app = build_test_app(pool);

    let response = post_multipart_auth(
        app,
        "/api/v1/automations",
        multipart_body(
            &[("name", "Broken"), ("description", "Nope"), ("price", "500")],
            &[("json", "broken.json", "application/json", &b"{\"a\": 1}"[..])],
        ),
        &token_for(&developer),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Workflow JSON must contain a nodes array"
    );
}

type Received = Arc<Mutex<Vec<(Option<String>, Value)>>>;

async fn create_workflow(
    State(received): State<Received>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let key = headers
        .get("x-n8n-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    received.lock().unwrap().push((key, payload));
    Json(json!({ "id": "wf_42" }))
}

/// A local stand-in for the n8n REST API that records what it receives.
async fn fake_n8n() -> (String, Received) {
    let received = Received::default();
    let app = Router::new()
        .route("/api/v1/workflows", post(create_workflow))
        .with_state(received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (url, received)
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn owner_imports_workflow_into_n8n(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let other = create_user(&pool, "other", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let (url, received) = fake_n8n().await;
    let (mut state, _) = test_state(pool.clone());
    state.integrations.n8n = Some(Arc::new(N8nClient::new(
        reqwest::Client::new(),
        url,
        "n8n-key".to_string(),
    )));
    let uri = format!("/api/v1/automations/{}/n8n/import", automation.id);

    let response = post_json_auth(app_from_state(state.clone()), &uri, json!({}), &token_for(&other)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(received.lock().unwrap().is_empty());

    let response =
        post_json_auth(app_from_state(state), &uri, json!({}), &token_for(&developer)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["workflow_id"], "wf_42");

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0.as_deref(), Some("n8n-key"));
    assert_eq!(received[0].1["name"], "Invoice Bot");
    assert_eq!(received[0].1["active"], false);

    let stored = AutomationRepo::find_by_id(&pool, automation.id).await.unwrap().unwrap();
    assert_eq!(stored.n8n_workflow_id.as_deref(), Some("wf_42"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn import_without_n8n_is_503(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let app = build_test_app(pool);

    let response = post_json_auth(
        app,
        &format!("/api/v1/automations/{}/n8n/import", automation.id),
        json!({}),
        &token_for(&developer),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn activate_installs_with_parameters(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let user = create_user(&pool, "user", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let (state, _) = test_state(pool.clone());
    let token = token_for(&user);

    let response = post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/automations/activate",
        json!({ "parameters": {} }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/automations/activate",
        json!({ "automation_id": 9999 }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Automation template not found");

    let response = post_json_auth(
        app_from_state(state),
        "/api/v1/automations/activate",
        json!({ "automation_id": automation.id, "parameters": { "BILLING_EMAIL": "a@b.co" } }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Automation activated successfully!");
    assert_eq!(json["automation_name"], "Invoice Bot");

    let install = UserAutomationRepo::find(&pool, user.id, automation.id)
        .await
        .unwrap()
        .unwrap();
    assert!(install.is_active);
    assert!(!install.run_in_background);
    assert_eq!(install.parameters, json!({ "BILLING_EMAIL": "a@b.co" }));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn background_activation_needs_a_background_automation(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let user = create_user(&pool, "user", "user").await;
    let plain = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let tracker = publish(&pool, &developer, "Price Tracker", json!([])).await;
    sqlx::query("UPDATE automations SET requires_background = true WHERE id = $1")
        .bind(tracker.id)
        .execute(&pool)
        .await
        .unwrap();
    let (state, _) = test_state(pool.clone());
    let token = token_for(&user);

    let response = post_json_auth(
        app_from_state(state.clone()),
        &format!("/api/v1/automations/{}/activate-background", plain.id),
        json!({ "config": { "BILLING_EMAIL": "a@b.co" } }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "This automation does not require background execution"
    );

    let response = post_json_auth(
        app_from_state(state),
        &format!("/api/v1/automations/{}/activate-background", tracker.id),
        json!({ "config": { "BILLING_EMAIL": "a@b.co" } }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Background execution activated successfully");
    assert_eq!(json["automation_name"], "Price Tracker");

    let install = UserAutomationRepo::find(&pool, user.id, tracker.id)
        .await
        .unwrap()
        .unwrap();
    assert!(install.is_active && install.run_in_background);
    assert_eq!(install.parameters, json!({ "billing_email": "a@b.co" }));
}

// ---------------------------------------------------------------------------
// Runner completion callbacks
// ---------------------------------------------------------------------------

fn signed(body: &Value) -> (Vec<u8>, String) {
    let bytes = serde_json::to_vec(body).unwrap();
    let signature = hmac_sha256_hex(RUNNER_WEBHOOK_SECRET.as_bytes(), &bytes);
    (bytes, signature)
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn completion_report_notifies_the_user(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let user = create_user(&pool, "user", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let (state, services) = test_state(pool.clone());
    let notifier = tokio::spawn(Notifier::new(pool.clone()).run(services.event_bus.subscribe()));

    let (body, signature) = signed(&json!({
        "automation_id": automation.id,
        "user_id": user.id,
        "status": "success",
        "result": { "message": "3 invoices filed" }
    }));
    let response = post_raw(
        app_from_state(state),
        "/api/v1/webhooks/automation-complete",
        body,
        &[("x-signature", &signature)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut inbox = Vec::new();
    for _ in 0..50 {
        inbox = NotificationRepo::list_for_user(&pool, user.id, false, 10, 0)
            .await
            .unwrap();
        if !inbox.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    notifier.abort();

    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_type, "success");
    assert_eq!(
        inbox[0].message,
        "✅ Invoice Bot completed successfully: 3 invoices filed"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn completion_report_is_checked(pool: PgPool) {
    let user = create_user(&pool, "user", "user").await;
    let (state, _) = test_state(pool);
    let uri = "/api/v1/webhooks/automation-complete";

    let (body, _) = signed(&json!({ "automation_id": 1, "user_id": user.id, "status": "success" }));
    let response = post_raw(app_from_state(state.clone()), uri, body, &[("x-signature", "00ff")]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (body, signature) = signed(&json!({ "automation_id": 1, "status": "success" }));
    let response =
        post_raw(app_from_state(state.clone()), uri, body, &[("x-signature", &signature)]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Missing required fields: automation_id, user_id, status"
    );

    let (body, signature) = signed(&json!({ "automation_id": 1, "user_id": 9999, "status": "failed" }));
    let response = post_raw(app_from_state(state), uri, body, &[("x-signature", &signature)]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "User not found");
}

// ---------------------------------------------------------------------------
// Connected accounts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn connecting_stores_encrypted_tokens(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let user = create_user(&pool, "user", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let (state, _) = test_state(pool.clone());
    let token = token_for(&user);

    let response = post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/user/connections",
        json!({
            "provider": "Google",
            "automation_id": automation.id,
            "access_token": "ya29.access",
            "refresh_token": "1//refresh",
            "expires_in": 3600
        }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["provider"], "google");
    assert_eq!(json["data"]["expired"], false);
    assert_eq!(json["data"]["has_refresh_token"], true);
    assert!(!json.to_string().contains("ya29.access"));

    let install = UserAutomationRepo::find(&pool, user.id, automation.id)
        .await
        .unwrap()
        .unwrap();
    let encryptor = Encryptor::from_hex(ENCRYPTION_KEY).unwrap();
    let stored = install.access_token.unwrap();
    assert_ne!(stored, "ya29.access");
    assert_eq!(encryptor.decrypt(&stored).unwrap(), "ya29.access");
    assert_eq!(
        encryptor.decrypt(&install.refresh_token.unwrap()).unwrap(),
        "1//refresh"
    );

    // A reconnect without a refresh token keeps the stored one.
    let response = post_json_auth(
        app_from_state(state.clone()),
        "/api/v1/user/connections",
        json!({ "provider": "google", "automation_id": automation.id, "access_token": "ya29.second" }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let install = UserAutomationRepo::find(&pool, user.id, automation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(encryptor.decrypt(&install.access_token.unwrap()).unwrap(), "ya29.second");
    assert_eq!(
        encryptor.decrypt(&install.refresh_token.unwrap()).unwrap(),
        "1//refresh"
    );

    let response = get_auth(
        app_from_state(state.clone()),
        &format!("/api/v1/user/connections/google?automation_id={}", automation.id),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["automation_id"], automation.id);

    let response = get_auth(app_from_state(state), "/api/v1/user/connections/tiktok", &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn connecting_rejects_unknown_providers(pool: PgPool) {
    let developer = create_user(&pool, "dev", "user").await;
    let automation = publish(&pool, &developer, "Invoice Bot", json!([])).await;
    let app = build_test_app(pool);

    let response = post_json_auth(
        app,
        "/api/v1/user/connections",
        json!({ "provider": "myspace", "automation_id": automation.id, "access_token": "t" }),
        &token_for(&developer),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
