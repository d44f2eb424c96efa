#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agora_api::auth::jwt::{generate_access_token, JwtConfig};
use agora_api::config::{IntegrationsConfig, LemonConfig, ServerConfig};
use agora_api::router::build_app_router;
use agora_api::services::file_store::{FileStore, StorageError};
use agora_api::services::mailer::OtpMailer;
use agora_api::state::AppState;
use agora_db::models::user::{CreateUser, User};
use agora_db::repositories::UserRepo;
use agora_events::{EmailError, EventBus};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const RUNNER_WEBHOOK_SECRET: &str = "test-runner-secret";
pub const ENCRYPTION_KEY: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Build a test `ServerConfig` with safe defaults.
///
/// Payments and runner callbacks are configured so webhook signatures can be
/// checked; no other external service is.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_upload_bytes: 10 * 1024 * 1024,
        storage_root: std::env::temp_dir()
            .join("agora-test-storage")
            .to_string_lossy()
            .into_owned(),
        jwt: JwtConfig {
            secret: "test-secret-for-integration-tests".to_string(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        },
        integrations: IntegrationsConfig {
            lemon: Some(LemonConfig {
                api_key: "test-api-key".to_string(),
                store_id: "12345".to_string(),
                webhook_secret: WEBHOOK_SECRET.to_string(),
            }),
            encryption_key: Some(ENCRYPTION_KEY.to_string()),
            app_url: "http://localhost:3000".to_string(),
            runner_webhook_secret: Some(RUNNER_WEBHOOK_SECRET.to_string()),
            ..Default::default()
        },
        email: None,
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Keeps every code it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    /// The most recent code sent to `email`.
    pub fn last_code(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl OtpMailer for RecordingMailer {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

/// In-memory file store keyed by `bucket/key`.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.files
            .lock()
            .unwrap()
            .contains_key(&format!("{bucket}/{key}"))
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.files
            .lock()
            .unwrap()
            .insert(format!("{bucket}/{key}"), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .lock()
            .unwrap()
            .get(&format!("{bucket}/{key}"))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{key}")))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .unwrap()
            .remove(&format!("{bucket}/{key}"));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App builders
// ---------------------------------------------------------------------------

/// Handles on the fakes behind a test app.
pub struct TestServices {
    pub mailer: Arc<RecordingMailer>,
    pub files: Arc<MemoryFileStore>,
    pub event_bus: Arc<EventBus>,
}

/// State with a recording mailer and an in-memory file store.
pub fn test_state(pool: PgPool) -> (AppState, TestServices) {
    let services = TestServices {
        mailer: Arc::new(RecordingMailer::default()),
        files: Arc::new(MemoryFileStore::default()),
        event_bus: Arc::new(EventBus::default()),
    };
    let state = AppState::new(pool, test_config(), Arc::clone(&services.event_bus))
        .with_mailer(services.mailer.clone())
        .with_files(services.files.clone());
    (state, services)
}

/// The production router and middleware stack around `state`.
pub fn app_from_state(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    build_app_router(state, &config)
}

pub fn build_test_app(pool: PgPool) -> Router {
    app_from_state(test_state(pool).0)
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Insert a verified account directly.
pub async fn create_user(pool: &PgPool, username: &str, role: &str) -> User {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            email: format!("{username}@example.com"),
            username: username.to_string(),
            role: role.to_string(),
        },
    )
    .await
    .expect("user creation should succeed");
    UserRepo::record_verified_login(pool, user.id)
        .await
        .expect("verification should succeed");
    user
}

/// A valid access token for `user`.
pub fn token_for(user: &User) -> String {
    generate_access_token(user.id, &user.role, &test_config().jwt)
        .expect("token generation should succeed")
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("request should be handled")
}

fn json_request(
    method: Method,
    uri: &str,
    body: &serde_json::Value,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, json_request(Method::POST, uri, &body, None)).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, json_request(Method::POST, uri, &body, Some(token))).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, json_request(Method::PUT, uri, &body, Some(token))).await
}

pub async fn patch_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, json_request(Method::PATCH, uri, &body, Some(token))).await
}

pub async fn delete_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, json_request(Method::DELETE, uri, &body, Some(token))).await
}

/// POST a raw body with extra headers, as webhook senders do.
pub async fn post_raw(
    app: Router,
    uri: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::from(body)).unwrap()).await
}

/// Multipart body with text fields and `(field, file_name, content_type, bytes)` files.
pub fn multipart_body(
    fields: &[(&str, &str)],
    files: &[(&str, &str, &str, &[u8])],
) -> (String, Vec<u8>) {
    let boundary = "agora-test-boundary".to_string();
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (boundary, body)
}

pub async fn post_multipart_auth(
    app: Router,
    uri: &str,
    (boundary, body): (String, Vec<u8>),
    token: &str,
) -> Response<Body> {
    let request = Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("body should be JSON")
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("body should be UTF-8")
}
