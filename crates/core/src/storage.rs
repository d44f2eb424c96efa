//! Storage-quota checks for listing uploads.
//!
//! A user's active storage is the sum of the file sizes of their listings.
//! Before an upload is accepted the new total is compared against the
//! plan's active-storage cap with a three-way outcome: it either exceeds
//! the cap, lands within the last 10% of it, or is comfortably below.

use serde::Serialize;

use crate::plans::{parse_size_bytes, parse_size_mb, Plan, BYTES_PER_MB};

/// Fraction of the cap above which an upload is flagged as near the limit.
pub const NEAR_LIMIT_RATIO: f64 = 0.9;

const KIB: i64 = 1024;
const MIB: i64 = 1024 * 1024;
const GIB: i64 = 1024 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Quota check
// ---------------------------------------------------------------------------

/// Current storage usage of a user, as reported by `GET /user/storage`.
#[derive(Debug, Clone, Serialize)]
pub struct StorageUsage {
    pub plan: Plan,
    pub total_storage_used_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageWarning {
    /// The upload would push usage past the cap. The upload is refused.
    Exceeds,
    /// The upload fits but leaves less than 10% of the cap free.
    NearLimit,
}

/// Usage figures attached to a warning so the client can explain it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageBreakdown {
    pub current_usage_mb: f64,
    pub file_size_mb: f64,
    pub total_after_upload: f64,
    pub storage_cap_mb: f64,
    pub storage_cap_str: &'static str,
    pub plan_name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageValidation {
    pub can_upload: bool,
    pub warning: Option<StorageWarning>,
    #[serde(flatten)]
    pub breakdown: Option<StorageBreakdown>,
}

impl StorageValidation {
    fn ok() -> Self {
        Self {
            can_upload: true,
            warning: None,
            breakdown: None,
        }
    }
}

/// Decide whether a file of `file_size_bytes` fits in the user's plan.
///
/// Without a usage record nothing is known about the user, and the upload
/// is allowed unconditionally.
pub fn calculate_storage_validation(
    file_size_bytes: u64,
    usage: Option<&StorageUsage>,
) -> StorageValidation {
    let Some(usage) = usage else {
        return StorageValidation::ok();
    };

    let storage_cap_str = usage.plan.features().active_storage;
    let storage_cap_mb = parse_size_mb(storage_cap_str);
    let file_size_mb = file_size_bytes as f64 / BYTES_PER_MB as f64;
    let total_after_upload = usage.total_storage_used_mb + file_size_mb;

    let warning = if total_after_upload > storage_cap_mb {
        StorageWarning::Exceeds
    } else if total_after_upload > storage_cap_mb * NEAR_LIMIT_RATIO {
        StorageWarning::NearLimit
    } else {
        return StorageValidation::ok();
    };

    StorageValidation {
        can_upload: warning != StorageWarning::Exceeds,
        warning: Some(warning),
        breakdown: Some(StorageBreakdown {
            current_usage_mb: usage.total_storage_used_mb,
            file_size_mb,
            total_after_upload,
            storage_cap_mb,
            storage_cap_str,
            plan_name: usage.plan.label(),
        }),
    }
}

// ---------------------------------------------------------------------------
// File checks
// ---------------------------------------------------------------------------

/// Per-file size limit for a plan, in bytes, with its display label.
pub fn max_file_size(plan: Plan) -> (u64, &'static str) {
    let label = plan.features().max_file_size;
    (parse_size_bytes(label), label)
}

/// Check an uploaded model archive against the plan's per-file limit.
///
/// Returns the user-facing message of the first failed check.
pub fn validate_model_file(
    size: Option<u64>,
    content_type: &str,
    plan: Plan,
) -> Result<(), String> {
    let Some(size) = size else {
        return Err("File is required".into());
    };
    let (max_bytes, max_label) = max_file_size(plan);
    if size > max_bytes {
        return Err(format!("File size must be less than {max_label}"));
    }
    if !content_type.to_ascii_lowercase().contains("zip") {
        return Err("Only ZIP files are allowed".into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Usage accounting
// ---------------------------------------------------------------------------

/// Interpret a file size recorded by the legacy uploader, returning bytes.
///
/// That uploader stored some sizes in kilobytes. Values between 1 KiB and
/// 1 MiB are read as kilobytes unless that reading would reach 1 GiB.
/// Rows written by this service always hold bytes and skip this step.
pub fn normalize_recorded_size(raw: i64) -> i64 {
    if raw <= 0 {
        return 0;
    }
    if raw < KIB {
        return raw;
    }
    if raw < MIB && raw * KIB < GIB {
        return raw * KIB;
    }
    raw
}

/// A listing's stored file size and whether it came from the legacy uploader.
#[derive(Debug, Clone, Copy)]
pub struct RecordedSize {
    pub value: i64,
    pub legacy: bool,
}

impl RecordedSize {
    pub fn bytes(self) -> i64 {
        if self.legacy {
            normalize_recorded_size(self.value)
        } else {
            self.value.max(0)
        }
    }
}

/// Sum recorded file sizes into megabytes rounded to four decimals.
pub fn total_storage_used_mb(recorded_sizes: impl IntoIterator<Item = RecordedSize>) -> f64 {
    let bytes: i64 = recorded_sizes.into_iter().map(RecordedSize::bytes).sum();
    let mb = bytes as f64 / BYTES_PER_MB as f64;
    (mb * 10_000.0).round() / 10_000.0
}
