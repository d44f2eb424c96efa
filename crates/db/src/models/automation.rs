//! Automation listings, user installs and runs.

use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

/// A row from the `automations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Automation {
    pub id: DbId,
    pub developer_id: DbId,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    #[serde(skip_serializing)]
    pub workflow: Value,
    pub user_inputs: Vec<String>,
    pub required_inputs: Vec<String>,
    pub required_connectors: Vec<String>,
    #[serde(skip_serializing)]
    pub developer_keys: Value,
    pub google_scopes: Value,
    pub system_config: Value,
    pub image_path: Option<String>,
    pub is_active: bool,
    pub requires_background: bool,
    pub n8n_workflow_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug)]
pub struct CreateAutomation {
    pub developer_id: DbId,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub workflow: Value,
    pub user_inputs: Vec<String>,
    pub required_inputs: Vec<String>,
    pub required_connectors: Vec<String>,
    pub developer_keys: Value,
    pub google_scopes: Value,
    pub system_config: Value,
    pub image_path: Option<String>,
}

/// A row from the `user_automations` table. Tokens are stored encrypted.
#[derive(Debug, Clone, FromRow)]
pub struct UserAutomation {
    pub id: DbId,
    pub user_id: DbId,
    pub automation_id: DbId,
    pub provider: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<Timestamp>,
    pub parameters: Value,
    pub is_active: bool,
    pub run_in_background: bool,
    pub schedule_type: Option<String>,
    pub schedule_cron: Option<String>,
    pub schedule_description: Option<String>,
    pub next_run_at: Option<Timestamp>,
    pub last_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A parsed schedule to store on an install.
#[derive(Debug)]
pub struct ScheduleInstall {
    pub schedule_type: &'static str,
    pub cron: Option<String>,
    pub description: String,
    pub next_run_at: Timestamp,
}

/// Connected-account tokens to store for an install.
#[derive(Debug)]
pub struct ConnectAccount {
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<Timestamp>,
}

/// A user's install with its automation and run statistics.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AutomationInstance {
    pub id: DbId,
    pub automation_id: DbId,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub last_run: Option<Timestamp>,
    pub created_at: Timestamp,
    pub config: Value,
    pub background: bool,
    pub schedule: Option<String>,
    pub next_run: Option<Timestamp>,
    pub total_runs: i64,
    pub successful_runs: i64,
    pub price_cents: i64,
}

impl AutomationInstance {
    pub fn success_rate(&self) -> i64 {
        if self.total_runs == 0 {
            0
        } else {
            ((self.successful_runs as f64 / self.total_runs as f64) * 100.0).round() as i64
        }
    }
}

/// A row from the `automation_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AutomationRun {
    pub id: DbId,
    pub automation_id: DbId,
    pub user_id: DbId,
    pub status: String,
    pub config: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub credits_used_cents: i64,
    pub created_at: Timestamp,
}

#[derive(Debug)]
pub struct CreateAutomationRun {
    pub automation_id: DbId,
    pub user_id: DbId,
    pub status: &'static str,
    pub config: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub credits_used_cents: i64,
}

/// Per-day run counts for a developer's automations.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DailyRunStats {
    pub date: chrono::NaiveDate,
    pub runs: i64,
    pub success: i64,
    pub failed: i64,
    pub earnings_cents: i64,
}
