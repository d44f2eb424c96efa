//! Lemon Squeezy checkout and webhook handling.
//!
//! Listings are sold through a fixed set of product variants, one per price
//! tier. Checkouts carry the listing id in `custom_data`, and the
//! `order_created` webhook carries it back.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::hashing::verify_hmac_sha256_hex;
use crate::plans::Plan;

/// Price tier (cents) -> Lemon Squeezy variant id.
pub const PRICE_TO_VARIANT: [(i64, i64); 4] = [
    (500, 874721),
    (1000, 877785),
    (1500, 877790),
    (2000, 886672),
];

pub const ORDER_CREATED: &str = "order_created";

/// Subscription events that (re)activate a paid plan.
pub const SUBSCRIPTION_ACTIVATING_EVENTS: [&str; 3] = [
    "subscription_created",
    "subscription_updated",
    "subscription_resumed",
];

/// Subscription events that drop the user back to the free plan.
pub const SUBSCRIPTION_ENDING_EVENTS: [&str; 2] =
    ["subscription_cancelled", "subscription_expired"];

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Variant for the tier closest to `price`.
///
/// Values below 100 are taken as dollars. Ties resolve to the cheaper tier.
pub fn variant_for_price(price: i64) -> i64 {
    let cents = if price >= 100 { price } else { price * 100 };
    let mut best = PRICE_TO_VARIANT[0];
    for tier in PRICE_TO_VARIANT.iter().skip(1) {
        if (tier.0 - cents).abs() < (best.0 - cents).abs() {
            best = *tier;
        }
    }
    best.1
}

/// Pricing block stored alongside a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingData {
    pub variant_id: i64,
    pub price: i64,
    pub display_price: String,
}

impl PricingData {
    pub fn for_price(price_cents: i64) -> Self {
        Self {
            variant_id: variant_for_price(price_cents),
            price: price_cents,
            display_price: format!("{}.{:02}", price_cents / 100, price_cents % 100),
        }
    }
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Verify the `X-Signature` header of a webhook delivery.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    verify_hmac_sha256_hex(secret.as_bytes(), body, signature_hex)
}

// ---------------------------------------------------------------------------
// Webhook payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub model_id: Option<String>,
    pub model_name: Option<String>,
    pub author_email: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookMeta {
    pub event_name: Option<String>,
    pub custom_data: Option<CustomData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookAttributes {
    pub user_email: Option<String>,
    pub customer_email: Option<String>,
    pub total: Option<i64>,
    pub status: Option<String>,
    pub variant_id: Option<i64>,
    pub custom_data: Option<CustomData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: WebhookAttributes,
}

/// A Lemon Squeezy webhook envelope (`{meta, data}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub meta: WebhookMeta,
    #[serde(default)]
    pub data: WebhookData,
}

impl WebhookPayload {
    pub fn event_name(&self) -> &str {
        self.meta.event_name.as_deref().unwrap_or_default()
    }

    /// Custom data from `meta`, falling back to the order attributes.
    pub fn custom_data(&self) -> Option<&CustomData> {
        self.meta
            .custom_data
            .as_ref()
            .or(self.data.attributes.custom_data.as_ref())
    }
}

fn string_or_number<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A validated `order_created` sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    pub buyer_email: String,
    pub model_id: String,
    pub model_name: Option<String>,
    pub author_email: String,
    pub order_id: String,
    pub total_cents: i64,
}

/// Extract the fields needed to record a sale, naming the first one missing.
pub fn validate_sale(payload: &WebhookPayload) -> Result<Sale, String> {
    let custom = payload.custom_data().cloned().unwrap_or_default();
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let buyer_email = non_empty(payload.data.attributes.user_email.clone())
        .ok_or("Missing buyer email in webhook data")?;
    let model_id = non_empty(custom.model_id).ok_or("Missing model ID in webhook data")?;
    let author_email =
        non_empty(custom.author_email).ok_or("Missing author email in webhook data")?;
    let order_id = non_empty(payload.data.id.clone()).ok_or("Missing order ID in webhook data")?;
    let total_cents = payload
        .data
        .attributes
        .total
        .filter(|t| *t > 0)
        .ok_or("Invalid total amount in webhook data")?;

    Ok(Sale {
        buyer_email,
        model_id,
        model_name: custom.model_name,
        author_email,
        order_id,
        total_cents,
    })
}

/// What a subscription webhook asks us to do with the customer's plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
    Activate {
        email: String,
        plan: Plan,
        status: String,
        subscription_id: Option<String>,
    },
    Cancel {
        email: String,
        subscription_id: Option<String>,
    },
    Ignore,
}

pub fn subscription_change(payload: &WebhookPayload) -> Result<SubscriptionChange, String> {
    let attrs = &payload.data.attributes;
    let email = attrs
        .user_email
        .clone()
        .or_else(|| attrs.customer_email.clone())
        .filter(|e| !e.trim().is_empty())
        .ok_or("Missing customer email")?;
    let event = payload.event_name();
    let subscription_id = payload.data.id.clone();

    if SUBSCRIPTION_ACTIVATING_EVENTS.contains(&event) {
        return Ok(SubscriptionChange::Activate {
            email,
            plan: attrs.variant_id.map(Plan::from_variant_id).unwrap_or_default(),
            status: attrs.status.clone().unwrap_or_else(|| "active".into()),
            subscription_id,
        });
    }
    if SUBSCRIPTION_ENDING_EVENTS.contains(&event) {
        return Ok(SubscriptionChange::Cancel {
            email,
            subscription_id,
        });
    }
    Ok(SubscriptionChange::Ignore)
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// Inputs for a hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub store_id: &'a str,
    pub variant_id: i64,
    pub email: Option<&'a str>,
    pub custom: serde_json::Value,
    pub redirect_url: String,
}

/// JSON:API body for `POST /v1/checkouts`.
pub fn checkout_payload(req: &CheckoutRequest<'_>) -> serde_json::Value {
    let mut checkout_data = json!({ "custom": req.custom });
    if let Some(email) = req.email {
        checkout_data["email"] = json!(email);
    }
    json!({
        "data": {
            "type": "checkouts",
            "attributes": {
                "checkout_options": { "embed": false, "media": true, "logo": true },
                "checkout_data": checkout_data,
                "product_options": {
                    "enabled_variants": [req.variant_id],
                    "redirect_url": req.redirect_url,
                    "receipt_button_text": "Go to dashboard",
                },
            },
            "relationships": {
                "store": { "data": { "type": "stores", "id": req.store_id } },
                "variant": { "data": { "type": "variants", "id": req.variant_id.to_string() } },
            },
        }
    })
}

/// Pull the hosted checkout URL out of a `POST /v1/checkouts` response.
pub fn checkout_url(response: &serde_json::Value) -> Option<&str> {
    response
        .pointer("/data/attributes/url")
        .and_then(serde_json::Value::as_str)
}
