//! Running an automation for a user and recording the outcome.
//!
//! Shared by `POST /automations/execute` and the assistant's
//! `execute_automation` tool.

use agora_core::automation::{RunRequest, RUN_SUCCESS};
use agora_core::chat::events::Config;
use agora_core::types::DbId;
use agora_db::models::automation::{Automation, CreateAutomationRun};
use agora_db::repositories::{AutomationRunRepo, UserAutomationRepo};
use serde_json::Value;
use sqlx::PgPool;

use super::runner::AutomationRunner;

pub const RUN_FAILED: &str = "failed";

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded(Value),
    /// The runner could not be reached or rejected the run.
    Failed(String),
}

/// Submit the run, then store it in `automation_runs`. A successful run also
/// saves its config on the user's install and activates it. Successful runs
/// are billed at the automation's price.
pub async fn run_and_record(
    pool: &PgPool,
    runner: &dyn AutomationRunner,
    automation: &Automation,
    user_id: DbId,
    config: &Config,
) -> Result<RunOutcome, sqlx::Error> {
    let request = RunRequest::new(automation.id, user_id, config);
    let normalized = Value::Object(request.config.clone());

    let outcome = match runner.run(&request).await {
        Ok(result) => RunOutcome::Succeeded(result),
        Err(e) => {
            tracing::warn!(automation_id = automation.id, user_id, error = %e, "Automation run failed");
            RunOutcome::Failed(e.to_string())
        }
    };

    let record = match &outcome {
        RunOutcome::Succeeded(result) => CreateAutomationRun {
            automation_id: automation.id,
            user_id,
            status: RUN_SUCCESS,
            config: normalized.clone(),
            result: Some(result.clone()),
            error: None,
            credits_used_cents: automation.price_cents,
        },
        RunOutcome::Failed(error) => CreateAutomationRun {
            automation_id: automation.id,
            user_id,
            status: RUN_FAILED,
            config: normalized.clone(),
            result: None,
            error: Some(error.clone()),
            credits_used_cents: 0,
        },
    };
    let run = AutomationRunRepo::create(pool, &record).await?;

    if matches!(outcome, RunOutcome::Succeeded(_)) {
        UserAutomationRepo::record_run(pool, user_id, automation.id, &normalized).await?;
        tracing::info!(run_id = run.id, automation_id = automation.id, user_id, "Automation run recorded");
    }

    Ok(outcome)
}
