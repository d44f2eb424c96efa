//! Subscription plans and their quotas.
//!
//! Plan limits are expressed the way they are shown to users ("250 MB",
//! "1 GB") and parsed on demand, so the catalog below is the single source
//! for both display strings and enforcement.

use serde::{Deserialize, Serialize};

/// Bytes per megabyte as used by every quota computation.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Cap applied when a size string cannot be parsed.
pub const FALLBACK_STORAGE_MB: f64 = 250.0;

/// Lemon Squeezy variants that sell paid plans.
pub const PROFESSIONAL_VARIANT_ID: i64 = 894382;
pub const ENTERPRISE_VARIANT_ID: i64 = 894370;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Subscription tier attached to every user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Basic,
    Professional,
    Enterprise,
}

impl Plan {
    /// Parse a stored plan name. Unknown or empty names fall back to `Basic`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "professional" => Self::Professional,
            "enterprise" => Self::Enterprise,
            _ => Self::Basic,
        }
    }

    /// Machine name as stored in `users.plan`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }

    /// Display name.
    pub fn label(self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Professional => "Professional",
            Self::Enterprise => "Enterprise",
        }
    }

    /// Monthly price in cents.
    pub fn price_cents(self) -> i64 {
        match self {
            Self::Basic => 0,
            Self::Professional => 1450,
            Self::Enterprise => 2450,
        }
    }

    /// Lemon Squeezy variant that sells this plan; `None` for the free tier.
    pub fn variant_id(self) -> Option<i64> {
        match self {
            Self::Basic => None,
            Self::Professional => Some(PROFESSIONAL_VARIANT_ID),
            Self::Enterprise => Some(ENTERPRISE_VARIANT_ID),
        }
    }

    /// Reverse lookup used by subscription webhooks. Unknown variants map to `Basic`.
    pub fn from_variant_id(variant_id: i64) -> Self {
        match variant_id {
            PROFESSIONAL_VARIANT_ID => Self::Professional,
            ENTERPRISE_VARIANT_ID => Self::Enterprise,
            _ => Self::Basic,
        }
    }

    pub fn features(self) -> PlanFeatures {
        match self {
            Self::Basic => PlanFeatures {
                active_storage: "250 MB",
                archive_storage: "100 MB",
                max_models: Limit::Count(4),
                max_file_size: "50 MB",
                buyers_per_model: Limit::Count(10),
                download_limit: Limit::Count(100),
                private_model_access: false,
                download_analytics: false,
                priority_email_support: false,
                early_access: false,
            },
            Self::Professional => PlanFeatures {
                active_storage: "1 GB",
                archive_storage: "500 MB",
                max_models: Limit::Count(12),
                max_file_size: "100 MB",
                buyers_per_model: Limit::Count(50),
                download_limit: Limit::Count(1000),
                private_model_access: true,
                download_analytics: true,
                priority_email_support: true,
                early_access: false,
            },
            Self::Enterprise => PlanFeatures {
                active_storage: "2 GB",
                archive_storage: "1 GB",
                max_models: Limit::Unlimited,
                max_file_size: "150 MB",
                buyers_per_model: Limit::Unlimited,
                download_limit: Limit::Unlimited,
                private_model_access: true,
                download_analytics: true,
                priority_email_support: true,
                early_access: true,
            },
        }
    }

    pub fn all() -> [Plan; 3] {
        [Self::Basic, Self::Professional, Self::Enterprise]
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// A numeric quota that may be lifted entirely on higher tiers.
///
/// Serializes as a number, or as the string `"Unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Count(i64),
    Unlimited,
}

impl Serialize for Limit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Count(n) => serializer.serialize_i64(*n),
            Self::Unlimited => serializer.serialize_str("Unlimited"),
        }
    }
}

impl Limit {
    /// Whether `current` items leave room for one more.
    pub fn allows(self, current: i64) -> bool {
        match self {
            Self::Count(max) => current < max,
            Self::Unlimited => true,
        }
    }
}

/// Per-plan quotas and feature flags.
#[derive(Debug, Clone, Serialize)]
pub struct PlanFeatures {
    pub active_storage: &'static str,
    pub archive_storage: &'static str,
    pub max_models: Limit,
    pub max_file_size: &'static str,
    pub buyers_per_model: Limit,
    /// Downloads per month.
    pub download_limit: Limit,
    pub private_model_access: bool,
    pub download_analytics: bool,
    pub priority_email_support: bool,
    pub early_access: bool,
}

// ---------------------------------------------------------------------------
// Size strings
// ---------------------------------------------------------------------------

/// Parse a display size such as `"1 GB"` or `"250 MB"` into megabytes.
///
/// Unparseable input yields [`FALLBACK_STORAGE_MB`].
pub fn parse_size_mb(size: &str) -> f64 {
    let upper = size.trim().to_ascii_uppercase();
    let (number, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024.0)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1.0)
    } else {
        return FALLBACK_STORAGE_MB;
    };
    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value * multiplier,
        _ => FALLBACK_STORAGE_MB,
    }
}

/// Same as [`parse_size_mb`] but in bytes.
pub fn parse_size_bytes(size: &str) -> u64 {
    (parse_size_mb(size) * BYTES_PER_MB as f64) as u64
}
