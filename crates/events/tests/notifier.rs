use agora_db::models::user::CreateUser;
use agora_db::repositories::{NotificationRepo, UserRepo};
use agora_events::bus::MODEL_APPROVED;
use agora_events::{EventBus, Notifier, PlatformEvent};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_notifier_writes_rows_until_bus_closes(pool: PgPool) {
    let user = UserRepo::create(
        &pool,
        &CreateUser {
            email: "author@example.com".to_string(),
            username: "author".to_string(),
            role: "user".to_string(),
        },
    )
    .await
    .unwrap();

    let bus = EventBus::default();
    let handle = tokio::spawn(Notifier::new(pool.clone()).run(bus.subscribe()));

    bus.publish(
        PlatformEvent::new(MODEL_APPROVED)
            .with_source("model", 5)
            .with_actor(user.id)
            .with_payload(json!({"name": "Forecaster"})),
    );
    bus.publish(PlatformEvent::new("unrelated.event").with_actor(user.id));
    drop(bus);
    handle.await.unwrap();

    let rows = NotificationRepo::list_for_user(&pool, user.id, false, 10, 0)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].notification_type, "model_approved");
    assert_eq!(
        rows[0].message,
        "Your model \"Forecaster\" has been approved and is now live."
    );
}
