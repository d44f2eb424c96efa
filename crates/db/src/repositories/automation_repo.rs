//! Repositories for automations, user installs and run history.

use agora_core::types::DbId;
use serde_json::Value;
use sqlx::PgPool;

use crate::models::automation::{
    Automation, AutomationInstance, AutomationRun, ConnectAccount, CreateAutomation,
    CreateAutomationRun, DailyRunStats, ScheduleInstall, UserAutomation,
};

const COLUMNS: &str = "id, developer_id, name, description, price_cents, workflow, user_inputs, \
                       required_inputs, required_connectors, developer_keys, google_scopes, \
                       system_config, image_path, is_active, requires_background, \
                       n8n_workflow_id, created_at, updated_at";

const INSTALL_COLUMNS: &str = "id, user_id, automation_id, provider, access_token, refresh_token, \
                               token_expiry, parameters, is_active, run_in_background, \
                               schedule_type, schedule_cron, schedule_description, next_run_at, \
                               last_run_at, created_at, updated_at";

const RUN_COLUMNS: &str =
    "id, automation_id, user_id, status, config, result, error, credits_used_cents, created_at";

pub struct AutomationRepo;

impl AutomationRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateAutomation,
    ) -> Result<Automation, sqlx::Error> {
        let query = format!(
            "INSERT INTO automations
                (developer_id, name, description, price_cents, workflow, user_inputs,
                 required_inputs, required_connectors, developer_keys, google_scopes,
                 system_config, image_path)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Automation>(&query)
            .bind(input.developer_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.price_cents)
            .bind(&input.workflow)
            .bind(&input.user_inputs)
            .bind(&input.required_inputs)
            .bind(&input.required_connectors)
            .bind(&input.developer_keys)
            .bind(&input.google_scopes)
            .bind(&input.system_config)
            .bind(&input.image_path)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Automation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM automations WHERE id = $1");
        sqlx::query_as::<_, Automation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive exact name match among active automations.
    pub async fn find_active_by_name(
        pool: &PgPool,
        name: &str,
    ) -> Result<Option<Automation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automations
             WHERE is_active = true AND LOWER(name) = LOWER($1)
             ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, Automation>(&query)
            .bind(name.trim())
            .fetch_optional(pool)
            .await
    }

    /// Active automations, newest first, optionally filtered by a `LIKE`
    /// pattern on name or description.
    pub async fn search(
        pool: &PgPool,
        pattern: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Automation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automations
             WHERE is_active = true
               AND ($1::TEXT IS NULL OR name ILIKE $1 OR description ILIKE $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Automation>(&query)
            .bind(pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn list_by_developer(
        pool: &PgPool,
        developer_id: DbId,
    ) -> Result<Vec<Automation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM automations
             WHERE developer_id = $1
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Automation>(&query)
            .bind(developer_id)
            .fetch_all(pool)
            .await
    }

    /// Remember the id n8n assigned when the workflow was imported.
    pub async fn set_n8n_workflow_id(
        pool: &PgPool,
        id: DbId,
        workflow_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE automations SET n8n_workflow_id = $2 WHERE id = $1")
            .bind(id)
            .bind(workflow_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One row per day for the last `days` days, including days without
    /// runs, across every automation the developer owns.
    pub async fn daily_stats(
        pool: &PgPool,
        developer_id: DbId,
        days: i32,
    ) -> Result<Vec<DailyRunStats>, sqlx::Error> {
        sqlx::query_as::<_, DailyRunStats>(
            "SELECT d.day::DATE AS date,
                    COUNT(r.id)::BIGINT AS runs,
                    COUNT(r.id) FILTER (WHERE r.status = 'success')::BIGINT AS success,
                    COUNT(r.id) FILTER (WHERE r.status = 'failed')::BIGINT AS failed,
                    COALESCE(SUM(r.credits_used_cents), 0)::BIGINT AS earnings_cents
             FROM generate_series(
                    (CURRENT_DATE - ($2::INT - 1))::TIMESTAMP,
                    CURRENT_DATE::TIMESTAMP,
                    INTERVAL '1 day'
                  ) AS d(day)
             LEFT JOIN automation_runs r
                    ON r.created_at::DATE = d.day::DATE
                   AND r.automation_id IN (SELECT id FROM automations WHERE developer_id = $1)
             GROUP BY d.day
             ORDER BY d.day ASC",
        )
        .bind(developer_id)
        .bind(days)
        .fetch_all(pool)
        .await
    }
}

pub struct UserAutomationRepo;

impl UserAutomationRepo {
    pub async fn find(
        pool: &PgPool,
        user_id: DbId,
        automation_id: DbId,
    ) -> Result<Option<UserAutomation>, sqlx::Error> {
        let query = format!(
            "SELECT {INSTALL_COLUMNS} FROM user_automations
             WHERE user_id = $1 AND automation_id = $2"
        );
        sqlx::query_as::<_, UserAutomation>(&query)
            .bind(user_id)
            .bind(automation_id)
            .fetch_optional(pool)
            .await
    }

    /// Store connected-account tokens, creating the install when needed.
    /// Tokens must already be encrypted.
    pub async fn upsert_tokens(
        pool: &PgPool,
        user_id: DbId,
        automation_id: DbId,
        account: &ConnectAccount,
    ) -> Result<UserAutomation, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_automations
                (user_id, automation_id, provider, access_token, refresh_token, token_expiry)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT ON CONSTRAINT uq_user_automations_user_automation DO UPDATE SET
                provider = EXCLUDED.provider,
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, user_automations.refresh_token),
                token_expiry = EXCLUDED.token_expiry
             RETURNING {INSTALL_COLUMNS}"
        );
        sqlx::query_as::<_, UserAutomation>(&query)
            .bind(user_id)
            .bind(automation_id)
            .bind(&account.provider)
            .bind(&account.access_token)
            .bind(&account.refresh_token)
            .bind(account.token_expiry)
            .fetch_one(pool)
            .await
    }

    /// A token for `provider` from any of the user's installs, newest first.
    /// Connecting a Google account once serves every automation.
    pub async fn find_provider_token(
        pool: &PgPool,
        user_id: DbId,
        provider: &str,
    ) -> Result<Option<UserAutomation>, sqlx::Error> {
        let query = format!(
            "SELECT {INSTALL_COLUMNS} FROM user_automations
             WHERE user_id = $1 AND provider = $2 AND access_token IS NOT NULL
             ORDER BY updated_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, UserAutomation>(&query)
            .bind(user_id)
            .bind(provider)
            .fetch_optional(pool)
            .await
    }

    /// Enable or pause an install. Returns `false` if the user has none.
    pub async fn set_enabled(
        pool: &PgPool,
        user_id: DbId,
        automation_id: DbId,
        enabled: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_automations SET is_active = $3
             WHERE user_id = $1 AND automation_id = $2",
        )
        .bind(user_id)
        .bind(automation_id)
        .bind(enabled)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remember the config of a successful run and activate the install.
    pub async fn record_run(
        pool: &PgPool,
        user_id: DbId,
        automation_id: DbId,
        parameters: &Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_automations (user_id, automation_id, parameters, is_active, last_run_at)
             VALUES ($1, $2, $3, true, NOW())
             ON CONFLICT ON CONSTRAINT uq_user_automations_user_automation DO UPDATE SET
                parameters = EXCLUDED.parameters,
                is_active = true,
                last_run_at = NOW()",
        )
        .bind(user_id)
        .bind(automation_id)
        .bind(parameters)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Activate an install with `parameters`, creating it when needed.
    /// `background` also turns on background execution.
    pub async fn activate(
        pool: &PgPool,
        user_id: DbId,
        automation_id: DbId,
        parameters: &Value,
        background: bool,
    ) -> Result<UserAutomation, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_automations (user_id, automation_id, parameters, is_active, run_in_background)
             VALUES ($1, $2, $3, true, $4)
             ON CONFLICT ON CONSTRAINT uq_user_automations_user_automation DO UPDATE SET
                parameters = EXCLUDED.parameters,
                is_active = true,
                run_in_background = user_automations.run_in_background OR EXCLUDED.run_in_background
             RETURNING {INSTALL_COLUMNS}"
        );
        sqlx::query_as::<_, UserAutomation>(&query)
            .bind(user_id)
            .bind(automation_id)
            .bind(parameters)
            .bind(background)
            .fetch_one(pool)
            .await
    }

    /// Store a schedule on the install, activating it with `parameters`.
    pub async fn set_schedule(
        pool: &PgPool,
        user_id: DbId,
        automation_id: DbId,
        parameters: &Value,
        schedule: &ScheduleInstall,
    ) -> Result<UserAutomation, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_automations
                (user_id, automation_id, parameters, is_active,
                 schedule_type, schedule_cron, schedule_description, next_run_at)
             VALUES ($1, $2, $3, true, $4, $5, $6, $7)
             ON CONFLICT ON CONSTRAINT uq_user_automations_user_automation DO UPDATE SET
                parameters = EXCLUDED.parameters,
                is_active = true,
                schedule_type = EXCLUDED.schedule_type,
                schedule_cron = EXCLUDED.schedule_cron,
                schedule_description = EXCLUDED.schedule_description,
                next_run_at = EXCLUDED.next_run_at
             RETURNING {INSTALL_COLUMNS}"
        );
        sqlx::query_as::<_, UserAutomation>(&query)
            .bind(user_id)
            .bind(automation_id)
            .bind(parameters)
            .bind(schedule.schedule_type)
            .bind(&schedule.cron)
            .bind(&schedule.description)
            .bind(schedule.next_run_at)
            .fetch_one(pool)
            .await
    }

    /// The user's installs with run statistics, newest first.
    /// `enabled` filters on the install state when set.
    pub async fn list_instances(
        pool: &PgPool,
        user_id: DbId,
        enabled: Option<bool>,
    ) -> Result<Vec<AutomationInstance>, sqlx::Error> {
        sqlx::query_as::<_, AutomationInstance>(
            "SELECT ua.id, ua.automation_id, a.name, a.description,
                    ua.is_active AS enabled, ua.last_run_at AS last_run, ua.created_at,
                    ua.parameters AS config, ua.run_in_background AS background,
                    ua.schedule_description AS schedule, ua.next_run_at AS next_run,
                    (SELECT COUNT(*) FROM automation_runs r
                      WHERE r.automation_id = ua.automation_id AND r.user_id = ua.user_id) AS total_runs,
                    (SELECT COUNT(*) FROM automation_runs r
                      WHERE r.automation_id = ua.automation_id AND r.user_id = ua.user_id
                        AND r.status = 'success') AS successful_runs,
                    a.price_cents
             FROM user_automations ua JOIN automations a ON a.id = ua.automation_id
             WHERE ua.user_id = $1 AND ($2::BOOLEAN IS NULL OR ua.is_active = $2)
             ORDER BY ua.created_at DESC, ua.id DESC",
        )
        .bind(user_id)
        .bind(enabled)
        .fetch_all(pool)
        .await
    }
}

pub struct AutomationRunRepo;

impl AutomationRunRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateAutomationRun,
    ) -> Result<AutomationRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO automation_runs
                (automation_id, user_id, status, config, result, error, credits_used_cents)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, AutomationRun>(&query)
            .bind(input.automation_id)
            .bind(input.user_id)
            .bind(input.status)
            .bind(&input.config)
            .bind(&input.result)
            .bind(&input.error)
            .bind(input.credits_used_cents)
            .fetch_one(pool)
            .await
    }
}
