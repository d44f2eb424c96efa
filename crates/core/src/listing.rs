//! Listing drafts, upload-wizard validation and moderation status.
//!
//! Model uploads go through three wizard steps (details, metadata, file);
//! automation uploads through two (details, workflow export). Each step is
//! validated independently so the client can block "Next" on the step
//! that failed, and the server re-runs the full form before persisting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Field name -> user-facing message. Empty means valid.
pub type FieldErrors = BTreeMap<&'static str, String>;

pub const MODEL_WIZARD_STEPS: u8 = 3;
pub const AUTOMATION_WIZARD_STEPS: u8 = 2;

pub const MAX_TAGS: usize = 2;
pub const MAX_IMAGE_SIZE_BYTES: u64 = 2 * 1024 * 1024;
pub const MAX_JSON_SIZE_BYTES: u64 = 3 * 1024 * 1024;

/// Price tiers offered by the wizard, in cents.
pub const PRICE_TIERS: [PriceTier; 4] = [
    PriceTier { cents: 500, label: "$5.00", description: "Basic" },
    PriceTier { cents: 1000, label: "$10.00", description: "Standard" },
    PriceTier { cents: 1500, label: "$15.00", description: "Premium" },
    PriceTier { cents: 2000, label: "$20.00", description: "Professional" },
];

pub const PREDEFINED_TAGS: [&str; 5] = [
    "NLP",
    "Computer Vision",
    "Chatbot",
    "Image Generation",
    "Translation",
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PriceTier {
    pub cents: i64,
    pub label: &'static str,
    pub description: &'static str,
}

// ---------------------------------------------------------------------------
// Model wizard
// ---------------------------------------------------------------------------

/// Everything the model wizard collects before submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDraft {
    pub name: String,
    pub description: String,
    /// Price in cents; one of [`PRICE_TIERS`] in practice.
    pub price: Option<i64>,
    pub tags: Vec<String>,
    pub features: Vec<String>,
    pub use_cases: Vec<String>,
    pub setup: String,
    #[serde(default)]
    pub has_file: bool,
}

const MODEL_STEP_FIELDS: [&[&str]; 3] = [
    &["name", "description", "price"],
    &["tags", "features", "use_cases", "setup"],
    &["model_file"],
];

/// Validate one step of the model wizard.
///
/// Steps outside `1..=3` have nothing to check.
pub fn validate_model_step(step: u8, draft: &ModelDraft) -> FieldErrors {
    let mut errors = FieldErrors::new();
    match step {
        1 => {
            if draft.name.trim().is_empty() {
                errors.insert("name", "Model name is required".into());
            }
            if draft.description.trim().is_empty() {
                errors.insert("description", "Description is required".into());
            }
            if !draft.price.is_some_and(|p| p > 0) {
                errors.insert("price", "Please select a valid price tier".into());
            }
        }
        2 => {
            if draft.tags.is_empty() {
                errors.insert("tags", "At least one tag is required".into());
            } else if draft.tags.len() > MAX_TAGS {
                errors.insert("tags", "You can select a maximum of 2 tags".into());
            }
            if draft.features.iter().any(|f| f.trim().is_empty()) {
                errors.insert("features", "All features must be filled out".into());
            }
            if draft.use_cases.iter().any(|u| u.trim().is_empty()) {
                errors.insert("use_cases", "All use cases must be filled out".into());
            }
            if draft.setup.trim().is_empty() {
                errors.insert("setup", "Setup instructions are required".into());
            }
        }
        3 => {
            if !draft.has_file {
                errors.insert("model_file", "Model file is required".into());
            }
        }
        _ => {}
    }
    errors
}

/// Validate every step of the model wizard at once.
pub fn validate_model_form(draft: &ModelDraft) -> FieldErrors {
    (1..=MODEL_WIZARD_STEPS)
        .flat_map(|step| validate_model_step(step, draft))
        .collect()
}

// ---------------------------------------------------------------------------
// Automation wizard
// ---------------------------------------------------------------------------

/// Metadata of an uploaded file, as seen by the validators.
#[derive(Debug, Clone, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutomationDraft {
    pub name: String,
    pub description: String,
    pub price: Option<i64>,
    pub json_file: Option<FileMeta>,
}

const AUTOMATION_STEP_FIELDS: [&[&str]; 2] = [&["name", "description", "price"], &["json_file"]];

pub fn validate_automation_step(step: u8, draft: &AutomationDraft) -> FieldErrors {
    let mut errors = FieldErrors::new();
    match step {
        1 => {
            if draft.name.trim().is_empty() {
                errors.insert("name", "Name is required".into());
            }
            if draft.description.trim().is_empty() {
                errors.insert("description", "Description is required".into());
            }
            if !draft.price.is_some_and(|p| p > 0) {
                errors.insert("price", "Please choose a price tier".into());
            }
        }
        2 => {
            if let Err(msg) = validate_json_file(draft.json_file.as_ref()) {
                errors.insert("json_file", msg);
            }
        }
        _ => {}
    }
    errors
}

pub fn validate_automation_form(draft: &AutomationDraft) -> FieldErrors {
    (1..=AUTOMATION_WIZARD_STEPS)
        .flat_map(|step| validate_automation_step(step, draft))
        .collect()
}

/// Check an n8n workflow export.
pub fn validate_json_file(file: Option<&FileMeta>) -> Result<(), String> {
    let Some(file) = file else {
        return Err("Automation JSON file is required".into());
    };
    let is_json =
        file.content_type == "application/json" || file.name.to_lowercase().ends_with(".json");
    if !is_json {
        return Err("Only .json exports from n8n are supported".into());
    }
    if file.size > MAX_JSON_SIZE_BYTES {
        return Err("JSON file must be smaller than 3MB".into());
    }
    Ok(())
}

/// Check a listing cover image.
pub fn validate_image_file(file: Option<&FileMeta>) -> Result<(), String> {
    let Some(file) = file else {
        return Err("Image is required".into());
    };
    if !file.content_type.starts_with("image/") {
        return Err("Please upload a valid image file".into());
    }
    if file.size > MAX_IMAGE_SIZE_BYTES {
        return Err("Image must be smaller than 2MB".into());
    }
    Ok(())
}

/// Which wizard a step number belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wizard {
    Model,
    Automation,
}

/// Drop the errors that belong to `step`, keeping the rest.
pub fn clear_step_errors(errors: &FieldErrors, wizard: Wizard, step: u8) -> FieldErrors {
    let fields: &[&str] = match wizard {
        Wizard::Model => MODEL_STEP_FIELDS.get(usize::from(step).wrapping_sub(1)),
        Wizard::Automation => AUTOMATION_STEP_FIELDS.get(usize::from(step).wrapping_sub(1)),
    }
    .copied()
    .unwrap_or(&[]);
    errors
        .iter()
        .filter(|(field, _)| !fields.contains(field))
        .map(|(field, msg)| (*field, msg.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Trim and uppercase tags, dropping blanks.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    tags.iter()
        .map(|t| t.as_ref().trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Split a newline-separated textarea into trimmed, non-empty entries.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Moderation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Pending,
    Approved,
    Rejected,
}

impl ListingStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// An admin decision on a pending listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    Approve,
    Reject { reason: String },
}

impl ModerationAction {
    /// Build an action from the admin panel's `{action, rejection_reason}` pair.
    pub fn parse(action: &str, reason: Option<&str>) -> Result<Self, CoreError> {
        match action {
            "approve" => Ok(Self::Approve),
            "reject" => {
                let reason = reason.map(str::trim).unwrap_or_default();
                if reason.is_empty() {
                    return Err(CoreError::Validation(
                        "Rejection reason is required".into(),
                    ));
                }
                Ok(Self::Reject {
                    reason: reason.to_string(),
                })
            }
            _ => Err(CoreError::Validation(
                "Invalid action. Must be approve or reject".into(),
            )),
        }
    }
}

/// Text of the notification sent to an author whose listing was rejected.
pub fn rejection_message(listing_name: &str, reason: &str) -> String {
    format!("Your model \"{listing_name}\" has been rejected. Reason: {reason}")
}

/// Text of the notification sent to an author whose listing went live.
pub fn approval_message(listing_name: &str) -> String {
    format!("Your model \"{listing_name}\" has been approved and is now live.")
}
