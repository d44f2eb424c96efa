//! Handlers for Lemon Squeezy checkouts and webhooks.
//!
//! Webhook deliveries are authenticated by the `X-Signature` HMAC over the
//! raw body, so those routes take `Bytes` rather than `Json`.

use agora_core::error::CoreError;
use agora_core::payments::{
    subscription_change, validate_sale, variant_for_price, verify_webhook_signature,
    CheckoutRequest, SubscriptionChange, WebhookPayload, ORDER_CREATED,
};
use agora_core::payouts::{release_at, seller_cut, PLATFORM_FEE};
use agora_core::plans::Plan;
use agora_core::types::DbId;
use agora_db::models::purchase::CreatePurchase;
use agora_db::repositories::{ModelRepo, PurchaseRepo, UserRepo};
use agora_events::bus::PURCHASE_COMPLETED;
use agora_events::PlatformEvent;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::user::load_user;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-signature";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CheckoutInput {
    pub model_id: DbId,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionCheckoutInput {
    pub plan: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutCreated {
    pub checkout_url: String,
}

// ---------------------------------------------------------------------------
// Checkouts
// ---------------------------------------------------------------------------

/// POST /api/v1/checkout
///
/// Hosted checkout for an approved listing. The listing travels in
/// `custom_data` and comes back with the `order_created` webhook.
pub async fn create_checkout(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CheckoutInput>,
) -> AppResult<Json<CheckoutCreated>> {
    let buyer = load_user(&state, auth.user_id).await?;
    let model = ModelRepo::find_by_id(&state.pool, input.model_id)
        .await?
        .filter(|m| m.status == "approved")
        .ok_or_else(|| AppError::not_found("Model", input.model_id))?;
    let author = load_user(&state, model.author_id).await?;
    let (client, lemon) = state.lemon()?;

    let variant_id = model
        .variant_id
        .parse::<i64>()
        .unwrap_or_else(|_| variant_for_price(model.price_cents));

    let checkout_url = client
        .create_checkout(&CheckoutRequest {
            store_id: &lemon.store_id,
            variant_id,
            email: Some(&buyer.email),
            custom: json!({
                "model_id": model.id.to_string(),
                "model_name": model.name,
                "author_email": author.email,
                "user_id": buyer.id.to_string(),
            }),
            redirect_url: state.config.integrations.app_url.clone(),
        })
        .await?;

    tracing::info!(model_id = model.id, buyer_id = buyer.id, variant_id, "Checkout created");
    Ok(Json(CheckoutCreated { checkout_url }))
}

/// POST /api/v1/checkout/subscription
pub async fn create_subscription_checkout(
    State(state): State<AppState>,
    Json(input): Json<SubscriptionCheckoutInput>,
) -> AppResult<Json<CheckoutCreated>> {
    let variant_id = Plan::from_name(&input.plan)
        .variant_id()
        .ok_or_else(|| AppError::BadRequest("Invalid plan".into()))?;
    let (client, lemon) = state.lemon()?;

    let checkout_url = client
        .create_checkout(&CheckoutRequest {
            store_id: &lemon.store_id,
            variant_id,
            email: input.email.as_deref().filter(|e| !e.trim().is_empty()),
            custom: json!({ "plan": input.plan }),
            redirect_url: state.config.integrations.app_url.clone(),
        })
        .await?;

    Ok(Json(CheckoutCreated { checkout_url }))
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// POST /api/v1/webhooks/lemon
///
/// Records the purchase and the seller's earning for `order_created`.
/// Replays of an order already recorded are acknowledged without effect.
pub async fn order_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let payload = verified_payload(&state, &headers, &body)?;
    if payload.event_name() != ORDER_CREATED {
        return Ok(Json(json!({ "received": true, "ignored": true })));
    }

    let sale = validate_sale(&payload).map_err(AppError::BadRequest)?;
    let model_id: DbId = sale
        .model_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid model ID in webhook data".into()))?;
    let model = ModelRepo::find_by_id(&state.pool, model_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Model not found".into()))?;

    let buyer_id = UserRepo::find_by_email(&state.pool, &sale.buyer_email)
        .await?
        .map(|u| u.id);
    let model_name = sale.model_name.clone().unwrap_or_else(|| model.name.clone());

    let amount = seller_cut(sale.total_cents, PLATFORM_FEE);
    let Some(purchase) = PurchaseRepo::record_sale(
        &state.pool,
        &CreatePurchase {
            order_id: sale.order_id.clone(),
            model_id,
            buyer_id,
            buyer_email: sale.buyer_email.clone(),
            model_name: model_name.clone(),
            total_cents: sale.total_cents,
        },
        model.author_id,
        amount,
        release_at(Utc::now()),
    )
    .await?
    else {
        tracing::info!(order_id = %sale.order_id, "Duplicate order webhook");
        return Ok(Json(json!({ "received": true, "duplicate": true })));
    };

    state.event_bus.publish(
        PlatformEvent::new(PURCHASE_COMPLETED)
            .with_source("purchase", purchase.id)
            .with_actor(model.author_id)
            .with_payload(json!({ "model_name": model_name, "amount_cents": amount })),
    );
    tracing::info!(
        order_id = %sale.order_id,
        model_id,
        seller_id = model.author_id,
        amount_cents = amount,
        "Purchase recorded"
    );

    Ok(Json(json!({ "received": true, "purchase_id": purchase.id })))
}

/// POST /api/v1/webhooks/lemon/subscription
pub async fn subscription_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let payload = verified_payload(&state, &headers, &body)?;

    let updated = match subscription_change(&payload).map_err(AppError::BadRequest)? {
        SubscriptionChange::Activate {
            email,
            plan,
            status,
            subscription_id,
        } => {
            tracing::info!(%email, plan = plan.name(), %status, "Subscription updated");
            UserRepo::update_subscription(
                &state.pool,
                &email,
                plan,
                &status,
                subscription_id.as_deref(),
            )
            .await?
        }
        SubscriptionChange::Cancel {
            email,
            subscription_id,
        } => {
            tracing::info!(%email, "Subscription cancelled");
            UserRepo::update_subscription(
                &state.pool,
                &email,
                Plan::Basic,
                "cancelled",
                subscription_id.as_deref(),
            )
            .await?
        }
        SubscriptionChange::Ignore => {
            return Ok(Json(json!({ "received": true, "ignored": true })));
        }
    };

    Ok(Json(json!({ "received": true, "updated": updated })))
}

/// Check the delivery signature, then parse the envelope.
fn verified_payload(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<WebhookPayload> {
    let (_, lemon) = state.lemon()?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_webhook_signature(&lemon.webhook_secret, body, signature) {
        tracing::warn!("Webhook signature mismatch");
        return Err(CoreError::Unauthorized("Invalid webhook signature".into()).into());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {e}")))
}
