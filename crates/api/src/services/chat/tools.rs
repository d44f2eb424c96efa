//! The assistant's tools. Each one talks to the user through the [`Emitter`].

use std::sync::Arc;

use agora_core::account::is_valid_email;
use agora_core::automation::{missing_inputs, normalize_run_config, DEFAULT_UPLOAD_MIME};
use agora_core::crypto::Encryptor;
use agora_core::drive::{
    recent_query, search_query, DriveFile, DriveFileType, RECENT_PAGE_SIZE, SEARCH_PAGE_SIZE,
};
use agora_core::error::CoreError;
use agora_core::schedule::parse_time_expression;
use agora_core::chat::context::{background_prompt_marker, ready_to_run_marker};
use agora_core::chat::events::{AutomationCard, Config, SearchStatus};
use agora_core::chat::{ChatEvent, SetupContext, ToolName};
use agora_core::payouts::format_currency;
use agora_core::search::like_pattern;
use agora_core::types::DbId;
use agora_db::models::automation::{Automation, ConnectAccount, ScheduleInstall};
use agora_db::repositories::{AutomationRepo, UserAutomationRepo};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;

use super::{Disconnected, Emitter};
use crate::services::drive::{is_expired_token, GoogleDrive};
use crate::services::execution::{run_and_record, RunOutcome};
use crate::services::runner::AutomationRunner;

const SEARCH_RESULTS: i64 = 3;
const GOOGLE: &str = "google";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Disconnected(#[from] Disconnected),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What a tool may use besides its arguments.
pub struct ToolEnv<'a> {
    pub pool: &'a PgPool,
    pub runner: Option<&'a Arc<dyn AutomationRunner>>,
    pub drive: Option<&'a Arc<dyn GoogleDrive>>,
    pub encryptor: Option<&'a Encryptor>,
    pub user_id: DbId,
    pub setup: Option<&'a SetupContext>,
}

/// Run a known tool. Returns `false` for tools this server does not have.
pub async fn run_tool(
    tool: &ToolName,
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<bool, ToolError> {
    match tool {
        ToolName::SearchAutomations => search_automations(args, env, out).await?,
        ToolName::ShowUserAutomations => show_user_automations(args, env, out).await?,
        ToolName::StartSetup => start_setup(args, env, out).await?,
        ToolName::CollectTextInput => collect_text_input(args, env, out).await?,
        ToolName::ExecuteAutomation => execute_automation(args, env, out).await?,
        ToolName::RequestFileUpload => request_file_upload(args, env, out).await?,
        ToolName::ConnectAccount => connect_account(args, env, out).await?,
        ToolName::SearchUserFiles => search_user_files(args, env, out).await?,
        ToolName::ListUserFiles => list_user_files(args, env, out).await?,
        ToolName::ConfirmFileSelection => confirm_file_selection(args, env, out).await?,
        ToolName::SaveBackgroundConfig => save_background_config(args, env, out).await?,
        ToolName::ScheduleAutomation => schedule_automation(args, env, out).await?,
        ToolName::Unknown(_) => return Ok(false),
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

fn arg_str<'v>(args: &'v Value, key: &str) -> Option<&'v str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Ids arrive as numbers or as numeric strings.
fn arg_id(args: &Value, key: &str) -> Option<DbId> {
    match args.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn arg_object(args: &Value, key: &str) -> Option<Config> {
    args.get(key)
        .and_then(Value::as_object)
        .filter(|o| !o.is_empty())
        .cloned()
}

/// `BILLING_EMAIL` -> `billing email`.
fn spaced_lower(field: &str) -> String {
    field.replace('_', " ").to_lowercase()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn needs_google(automation: &Automation) -> bool {
    automation.required_connectors.iter().any(|c| {
        let c = c.to_lowercase();
        c.contains(GOOGLE) || c.contains("sheets")
    })
}

fn is_file_field(field: &str) -> bool {
    let field = field.to_lowercase();
    ["folder", "spreadsheet", "sheet", "document"]
        .iter()
        .any(|kind| field.contains(kind))
}

/// Drive ids are long and never contain whitespace.
fn looks_like_file_id(value: &str) -> bool {
    value.chars().count() >= 10 && !value.chars().any(char::is_whitespace)
}

fn requirement_label(input: &str) -> String {
    let name = input.to_uppercase();
    if name.contains("FOLDER") {
        "- A folder to store your files".to_string()
    } else if name.contains("SPREADSHEET") || name.contains("SHEET") {
        "- A spreadsheet to track the data".to_string()
    } else if name.contains("DOCUMENT") || name.contains("DOC") {
        "- A document for output".to_string()
    } else if name.contains("EMAIL") {
        "- Your email address for notifications".to_string()
    } else {
        format!("- {}", spaced_lower(&name))
    }
}

fn setup_marker(automation_id: DbId, name: &str, config: &Config) -> String {
    format!(
        "automation_id=\"{automation_id}\" automation_name=\"{name}\" existing_config={}",
        Value::Object(config.clone())
    )
}

// ---------------------------------------------------------------------------
// search_automations
// ---------------------------------------------------------------------------

/// Whole-query match first, then any keyword longer than two characters.
async fn find_automations(pool: &PgPool, query: &str) -> Result<Vec<Automation>, sqlx::Error> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let mut found =
        AutomationRepo::search(pool, Some(&like_pattern(query)), SEARCH_RESULTS, 0).await?;
    if !found.is_empty() {
        return Ok(found);
    }

    let lowered = query.to_lowercase();
    for keyword in lowered.split_whitespace().filter(|w| w.chars().count() > 2) {
        for automation in
            AutomationRepo::search(pool, Some(&like_pattern(keyword)), SEARCH_RESULTS, 0).await?
        {
            if found.len() < SEARCH_RESULTS as usize && !found.iter().any(|a| a.id == automation.id)
            {
                found.push(automation);
            }
        }
    }
    Ok(found)
}

fn requires(automation: &Automation) -> Vec<String> {
    if automation.required_connectors.is_empty() {
        vec!["None".to_string()]
    } else {
        automation.required_connectors.clone()
    }
}

async fn search_automations(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    out.send(ChatEvent::Searching {
        status: SearchStatus::Start,
    })
    .await?;

    let query = arg_str(args, "query").unwrap_or_default();
    let found = find_automations(env.pool, query).await;

    out.send(ChatEvent::Searching {
        status: SearchStatus::End,
    })
    .await?;

    let found = match found {
        Ok(found) => found,
        Err(e) => {
            tracing::error!(error = %e, "Automation search failed");
            out.say("Sorry, I had trouble searching. Please try again.").await?;
            return Ok(());
        }
    };

    if found.is_empty() {
        out.say("I couldn't find automations matching that. Could you describe what you want to automate differently?")
            .await?;
        return Ok(());
    }

    let single = found.len() == 1;
    out.say(if single {
        "I found an automation that can help!\n\n"
    } else {
        "I have some automations that might help!\n\n"
    })
    .await?;

    let cards = found
        .iter()
        .enumerate()
        .map(|(i, a)| AutomationCard {
            index: i + 1,
            name: a.name.clone(),
            price: if a.price_cents == 0 {
                "Free".to_string()
            } else {
                format_currency(a.price_cents)
            },
            description: if a.description.is_empty() {
                "No description".to_string()
            } else {
                a.description.clone()
            },
            requires: requires(a),
        })
        .collect();
    out.send(ChatEvent::AutomationList { automations: cards }).await?;

    out.say(if single {
        "\nWould you like me to set this up for you?"
    } else {
        "\nJust tell me which one you'd like to use!"
    })
    .await?;

    let context = found
        .iter()
        .map(|a| {
            format!(
                "- \"{}\" (ID: {})\n  Description: {}\n  Requires: {}",
                a.name,
                a.id,
                if a.description.is_empty() {
                    "No description available"
                } else {
                    &a.description
                },
                requires(a).join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    out.send(ChatEvent::AutomationContext {
        context: format!("[AVAILABLE AUTOMATIONS]\n{context}"),
    })
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// show_user_automations
// ---------------------------------------------------------------------------

async fn show_user_automations(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let filter = arg_str(args, "status_filter").unwrap_or("all");
    let enabled = match filter {
        "active" => Some(true),
        "paused" => Some(false),
        _ => None,
    };

    let instances = match UserAutomationRepo::list_instances(env.pool, env.user_id, enabled).await
    {
        Ok(instances) => instances,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list automation instances");
            out.say("Sorry, I couldn't fetch your automations. Please try again.")
                .await?;
            return Ok(());
        }
    };

    if instances.is_empty() {
        out.say(match enabled {
            None => "You don't have any automations set up yet. Want to create one?".to_string(),
            Some(_) => format!("You don't have any {filter} automations."),
        })
        .await?;
        return Ok(());
    }

    let active = instances.iter().filter(|i| i.enabled).count();
    let paused = instances.len() - active;
    let rendered = instances
        .iter()
        .map(|i| {
            json!({
                "id": i.id,
                "automation_id": i.automation_id,
                "name": i.name,
                "description": i.description,
                "enabled": i.enabled,
                "last_run": i.last_run,
                "created_at": i.created_at,
                "config": i.config,
                "background": i.background,
                "schedule": i.schedule,
                "next_run": i.next_run,
                "total_runs": i.total_runs,
                "success_rate": i.success_rate(),
                "price_cents": i.price_cents,
            })
        })
        .collect();
    out.send(ChatEvent::AutomationInstances {
        instances: rendered,
    })
    .await?;

    let mut summary = format!(
        "You have {} automation{}",
        instances.len(),
        if instances.len() == 1 { "" } else { "s" }
    );
    if enabled.is_none() {
        summary.push_str(&format!(" ({active} active, {paused} paused)"));
    }
    summary.push_str(". You can enable, disable, or reconfigure any of them.");
    out.say(summary).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// start_setup
// ---------------------------------------------------------------------------

/// By id, then exact name, then partial name.
async fn resolve_automation(
    pool: &PgPool,
    id: Option<DbId>,
    name: Option<&str>,
) -> Result<Option<Automation>, sqlx::Error> {
    if let Some(id) = id {
        if let Some(found) = AutomationRepo::find_by_id(pool, id).await? {
            return Ok(Some(found));
        }
    }
    let Some(name) = name else {
        return Ok(None);
    };
    if let Some(found) = AutomationRepo::find_active_by_name(pool, name).await? {
        return Ok(Some(found));
    }
    Ok(AutomationRepo::search(pool, Some(&like_pattern(name)), 1, 0)
        .await?
        .into_iter()
        .next())
}

/// Reuse a Google connection from another install so the new one is ready.
async fn share_google_connection(
    pool: &PgPool,
    user_id: DbId,
    automation_id: DbId,
) -> Result<(), sqlx::Error> {
    let install = UserAutomationRepo::find(pool, user_id, automation_id).await?;
    if install.is_some_and(|i| i.access_token.is_some()) {
        return Ok(());
    }
    let Some(existing) = UserAutomationRepo::find_provider_token(pool, user_id, GOOGLE).await?
    else {
        return Ok(());
    };
    let Some(access_token) = existing.access_token else {
        return Ok(());
    };
    UserAutomationRepo::upsert_tokens(
        pool,
        user_id,
        automation_id,
        &ConnectAccount {
            provider: GOOGLE.to_string(),
            access_token,
            refresh_token: existing.refresh_token,
            token_expiry: existing.token_expiry,
        },
    )
    .await?;
    Ok(())
}

async fn start_setup(args: &Value, env: &ToolEnv<'_>, out: &mut Emitter) -> Result<(), ToolError> {
    let id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));
    let name = arg_str(args, "automation_name");

    let Some(automation) = resolve_automation(env.pool, id, name).await? else {
        out.say("I couldn't find that automation. Could you tell me which one you'd like to use?")
            .await?;
        return Ok(());
    };

    out.send(ChatEvent::SetupStarted {
        automation_id: automation.id,
        automation_name: automation.name.clone(),
        required_inputs: automation.required_inputs.clone(),
        collected_fields: Some(Config::new()),
    })
    .await?;

    let requirements = automation
        .required_inputs
        .iter()
        .map(|input| requirement_label(input))
        .collect::<Vec<_>>()
        .join("\n");
    out.say(format!(
        "To run \"{}\", I need a few things:\n\n{requirements}\n\nI'll create these for you automatically to ensure everything is configured correctly.\n\nReady to proceed?",
        automation.name
    ))
    .await?;
    out.send(ChatEvent::HiddenContext {
        context: setup_marker(automation.id, &automation.name, &Config::new()),
    })
    .await?;

    if needs_google(&automation) {
        if let Err(e) = share_google_connection(env.pool, env.user_id, automation.id).await {
            tracing::warn!(automation_id = automation.id, error = %e, "Could not reuse Google connection");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// collect_text_input
// ---------------------------------------------------------------------------

async fn collect_text_input(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let field = arg_str(args, "field_name").unwrap_or_default();
    let value = arg_str(args, "value").unwrap_or_default();
    if field.is_empty() || value.is_empty() {
        out.say("I didn't catch that value. Could you say it again?").await?;
        return Ok(());
    }

    if is_file_field(field) && !looks_like_file_id(value) {
        out.say(format!(
            "I need the ID of \"{value}\" rather than its name. You can copy it from the file's link in Google Drive."
        ))
        .await?;
        return Ok(());
    }

    out.send(ChatEvent::FieldCollected {
        field_name: field.to_string(),
        value: Value::String(value.to_string()),
        display_value: None,
    })
    .await?;

    let automation_id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));
    let Some(automation_id) = automation_id else {
        out.say(format!("Got it, saved {}: {value}", spaced_lower(field)))
            .await?;
        return Ok(());
    };

    out.say("Got it! ").await?;

    let existing = arg_object(args, "existing_config")
        .or_else(|| env.setup.map(|s| s.collected_config.clone()))
        .unwrap_or_default();
    let mut merged: Config = existing
        .into_iter()
        .map(|(k, v)| (k.to_uppercase(), v))
        .collect();
    merged.insert(field.to_uppercase(), Value::String(value.to_string()));

    let Some(automation) = AutomationRepo::find_by_id(env.pool, automation_id).await? else {
        out.say("I couldn't find that automation. Could you tell me which one you'd like to use?")
            .await?;
        return Ok(());
    };

    let required: Vec<String> = automation
        .required_inputs
        .iter()
        .map(|r| r.to_uppercase())
        .collect();
    let missing = missing_inputs(&required, &merged);

    if !missing.is_empty() {
        let names = missing
            .iter()
            .map(|m| spaced_lower(m))
            .collect::<Vec<_>>()
            .join(", ");
        out.say(format!("\nI still need: {names}. Could you provide these?"))
            .await?;
        out.send(ChatEvent::AwaitingInput {
            automation_id,
            automation_name: automation.name.clone(),
            missing_fields: missing,
            collected_config: Some(merged.clone()),
        })
        .await?;
        out.send(ChatEvent::HiddenContext {
            context: setup_marker(automation_id, &automation.name, &merged),
        })
        .await?;
        return Ok(());
    }

    let summary = merged
        .iter()
        .map(|(k, v)| format!("• {}: {}", spaced_lower(k), display_value(v)))
        .collect::<Vec<_>>()
        .join("\n");
    out.say("\n✓ All info gathered! Here's what I have:\n\n").await?;
    out.say(summary).await?;
    out.say("\n\nLook good? Say \"run it\" to start, or tell me what to change.")
        .await?;
    out.send(ChatEvent::ReadyToExecute {
        automation_id,
        automation_name: automation.name.clone(),
        config: merged.clone(),
    })
    .await?;
    out.send(ChatEvent::HiddenContext {
        context: ready_to_run_marker(automation_id, &merged),
    })
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// execute_automation
// ---------------------------------------------------------------------------

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => {
            let s = s.trim();
            s.is_empty() || s == "undefined" || s == "null"
        }
        Some(_) => false,
    }
}

/// Missing and malformed fields, named in lowercase with spaces.
fn check_run_config(required: &[String], normalized: &Config) -> (Vec<String>, Vec<String>) {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();
    for input in required {
        let key = input.to_lowercase();
        let value = normalized.get(&key);
        if is_blank(value) {
            missing.push(spaced_lower(&key));
            continue;
        }
        let text = value.map(display_value).unwrap_or_default();
        if key.contains("email") && !is_valid_email(&text) {
            invalid.push(format!("{}: invalid email format", spaced_lower(&key)));
        }
        if (key.contains("folder") || key.contains("spreadsheet") || key.contains("document"))
            && !looks_like_file_id(&text)
        {
            invalid.push(format!("{}: invalid file ID", spaced_lower(&key)));
        }
    }
    (missing, invalid)
}

async fn execute_automation(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let Some(config) = arg_object(args, "config") else {
        out.say("⚠️ I can't run the automation yet - I don't have the configuration. Let's set it up first.")
            .await?;
        return Ok(());
    };

    let automation_id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));
    let automation = match automation_id {
        Some(id) => AutomationRepo::find_by_id(env.pool, id).await?,
        None => None,
    };
    let Some(automation) = automation else {
        out.say("⚠️ I couldn't find that automation. Please try again.")
            .await?;
        return Ok(());
    };

    let normalized = normalize_run_config(&config);
    let (missing, invalid) = check_run_config(&automation.required_inputs, &normalized);

    if !missing.is_empty() {
        let list = missing
            .iter()
            .map(|f| format!("• {f}"))
            .collect::<Vec<_>>()
            .join("\n");
        out.say(format!(
            "⚠️ Hold on! I'm missing some required info:\n\n{list}\n\nPlease provide these before I can run the automation."
        ))
        .await?;
        return Ok(());
    }

    if !invalid.is_empty() {
        let list = invalid
            .iter()
            .map(|f| format!("• {f}"))
            .collect::<Vec<_>>()
            .join("\n");
        out.say(format!(
            "⚠️ Some values don't look right:\n\n{list}\n\nPlease correct these and try again."
        ))
        .await?;
        return Ok(());
    }

    if needs_google(&automation)
        && UserAutomationRepo::find_provider_token(env.pool, env.user_id, GOOGLE)
            .await?
            .is_none()
    {
        out.say("⚠️ I need to connect to your Google account first before running this automation.")
            .await?;
        out.send(ChatEvent::ConnectRequest {
            provider: GOOGLE.to_string(),
            automation_id: Some(automation.id),
            reason: None,
        })
        .await?;
        return Ok(());
    }

    out.say("✓ All checks passed! Running the automation...\n\n")
        .await?;

    let Some(runner) = env.runner else {
        out.say("❌ Something went wrong: Automation runner is not configured. Would you like to try again?")
            .await?;
        return Ok(());
    };

    match run_and_record(env.pool, runner.as_ref(), &automation, env.user_id, &config).await? {
        RunOutcome::Succeeded(result) => {
            let message = result
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            out.say(format!(
                "✅ Success! Your automation ran successfully.\n\n{message}"
            ))
            .await?;
            out.send(ChatEvent::AutomationComplete { result }).await?;

            if automation.requires_background {
                out.say("\n\n⚠️ **Important:** This automation requires background execution to continuously monitor and track changes. Without background mode, it will only run when you manually trigger it.\n\nWould you like to enable background execution so this automation can run automatically?")
                    .await?;
                out.send(ChatEvent::HiddenContext {
                    context: background_prompt_marker(automation.id, &normalized),
                })
                .await?;
            }
        }
        RunOutcome::Failed(error) => {
            out.say(format!(
                "❌ Something went wrong: {error}. Would you like to try again?"
            ))
            .await?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// request_file_upload / connect_account
// ---------------------------------------------------------------------------

async fn request_file_upload(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let automation_id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));
    let field = arg_str(args, "field_name");
    let (Some(automation_id), Some(field)) = (automation_id, field) else {
        out.say("Which automation and input is this file for?").await?;
        return Ok(());
    };

    out.say(format!(
        "Please upload your {} using the button below.",
        spaced_lower(field)
    ))
    .await?;
    out.send(ChatEvent::UploadRequest {
        automation_id,
        field_name: field.to_string(),
        accept: arg_str(args, "accept")
            .unwrap_or(DEFAULT_UPLOAD_MIME)
            .to_string(),
    })
    .await?;
    Ok(())
}

async fn connect_account(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let provider = arg_str(args, "provider")
        .unwrap_or(GOOGLE)
        .to_lowercase();
    let label = match provider.as_str() {
        "google" => "Google",
        "tiktok" => "TikTok",
        _ => {
            out.say("I can only connect Google or TikTok accounts right now.")
                .await?;
            return Ok(());
        }
    };

    out.say(format!(
        "To continue I need access to your {label} account. Use the button below to connect it."
    ))
    .await?;
    out.send(ChatEvent::ConnectRequest {
        provider,
        automation_id: arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id)),
        reason: arg_str(args, "reason").map(str::to_string),
    })
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// search_user_files / list_user_files / confirm_file_selection
// ---------------------------------------------------------------------------

/// The user's decrypted Google access token, or why there is none. Once this
/// returns `None` the user has been told what to do.
async fn drive_token(
    env: &ToolEnv<'_>,
    automation_id: Option<DbId>,
    out: &mut Emitter,
) -> Result<Option<String>, ToolError> {
    let Some(install) = UserAutomationRepo::find_provider_token(env.pool, env.user_id, GOOGLE).await?
    else {
        out.say("I need to connect to your Google account first to search your files.")
            .await?;
        out.send(ChatEvent::ConnectRequest {
            provider: GOOGLE.to_string(),
            automation_id,
            reason: Some("To search your files".to_string()),
        })
        .await?;
        return Ok(None);
    };

    if install.token_expiry.is_some_and(|expiry| expiry <= Utc::now()) {
        reconnect(automation_id, out).await?;
        return Ok(None);
    }

    let token = install
        .access_token
        .as_deref()
        .zip(env.encryptor)
        .map(|(stored, encryptor)| encryptor.decrypt(stored));
    match token {
        Some(Ok(token)) => Ok(Some(token)),
        Some(Err(e)) => {
            tracing::warn!(user_id = env.user_id, error = %e, "Stored Google token is unreadable");
            reconnect(automation_id, out).await?;
            Ok(None)
        }
        None => {
            out.say("Sorry, I can't reach your Google Drive right now.").await?;
            Ok(None)
        }
    }
}

async fn reconnect(automation_id: Option<DbId>, out: &mut Emitter) -> Result<(), ToolError> {
    out.say("Your Google connection has expired. Please reconnect to continue.")
        .await?;
    out.send(ChatEvent::ConnectRequest {
        provider: GOOGLE.to_string(),
        automation_id,
        reason: Some("Connection expired".to_string()),
    })
    .await?;
    Ok(())
}

/// Run a Drive query. `None` means the user has already been told why not.
async fn drive_files(
    env: &ToolEnv<'_>,
    automation_id: Option<DbId>,
    q: &str,
    page_size: u32,
    out: &mut Emitter,
) -> Result<Option<Vec<DriveFile>>, ToolError> {
    let Some(drive) = env.drive else {
        out.say("Sorry, I can't reach your Google Drive right now.").await?;
        return Ok(None);
    };
    let Some(token) = drive_token(env, automation_id, out).await? else {
        return Ok(None);
    };
    match drive.list_files(&token, q, page_size).await {
        Ok(files) => Ok(Some(files)),
        Err(e) if is_expired_token(&e) => {
            reconnect(automation_id, out).await?;
            Ok(None)
        }
        Err(e) => {
            tracing::error!(user_id = env.user_id, error = %e, "Drive lookup failed");
            out.say("Sorry, I had trouble searching your files. Please try again.")
                .await?;
            Ok(None)
        }
    }
}

fn file_entry(file: &DriveFile) -> Value {
    json!({
        "id": file.id,
        "name": file.name,
        "mime_type": file.mime_type,
        "modified_time": file.modified_time,
    })
}

fn numbered(files: &[DriveFile]) -> String {
    files
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. {}", i + 1, f.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ids of offered files, so a later pick by number can be resolved.
fn file_choices_context(files: &[DriveFile], field: Option<&str>) -> String {
    let list = files
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. \"{}\" file_id=\"{}\"", i + 1, f.name, f.id))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "[FILE_CHOICES field_name=\"{}\"]\n{list}",
        field.unwrap_or_default()
    )
}

/// Record a picked file under `field` and keep the setup marker current.
async fn collect_file(
    env: &ToolEnv<'_>,
    args: &Value,
    field: &str,
    file_id: &str,
    file_name: &str,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    out.send(ChatEvent::FieldCollected {
        field_name: field.to_string(),
        value: Value::String(file_id.to_string()),
        display_value: Some(file_name.to_string()),
    })
    .await?;

    let automation_id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));
    let Some(automation_id) = automation_id else {
        return Ok(());
    };
    let mut config = env
        .setup
        .filter(|s| s.automation_id == automation_id)
        .map(|s| s.collected_config.clone())
        .unwrap_or_default();
    config.insert(field.to_uppercase(), Value::String(file_id.to_string()));
    let name = arg_str(args, "automation_name")
        .map(str::to_string)
        .or_else(|| env.setup.and_then(|s| s.automation_name.clone()))
        .unwrap_or_default();
    out.send(ChatEvent::HiddenContext {
        context: setup_marker(automation_id, &name, &config),
    })
    .await?;
    Ok(())
}

async fn search_user_files(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let Some(query) = arg_str(args, "query") else {
        out.say("What's the name of the file or folder?").await?;
        return Ok(());
    };
    let kind = DriveFileType::parse(arg_str(args, "file_type").unwrap_or_default());
    let field = arg_str(args, "field_name").or(kind.default_field());
    let automation_id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));

    let Some(files) = drive_files(
        env,
        automation_id,
        &search_query(query, kind),
        SEARCH_PAGE_SIZE,
        out,
    )
    .await?
    else {
        return Ok(());
    };

    match files.as_slice() {
        [] => {
            out.say(format!(
                "I couldn't find any file or folder named \"{query}\". Could you check the name, or should I list your recent {}?",
                kind.plural()
            ))
            .await?;
        }
        [only] => match field {
            Some(field) => {
                collect_file(env, args, field, &only.id, &only.name, out).await?;
                out.say(format!("Found \"{}\" - using it. ", only.name)).await?;
            }
            None => {
                out.say(format!("Found \"{}\".", only.name)).await?;
            }
        },
        many => {
            out.send(ChatEvent::FileSearchResults {
                files: many.iter().map(file_entry).collect(),
                query: Some(query.to_string()),
                field_name: field.map(str::to_string),
                automation_id,
                automation_name: arg_str(args, "automation_name").map(str::to_string),
            })
            .await?;
            out.say(format!(
                "I found {} matches:\n\n{}\n\nWhich one? (say the number)",
                many.len(),
                numbered(many)
            ))
            .await?;
            out.send(ChatEvent::HiddenContext {
                context: file_choices_context(many, field),
            })
            .await?;
        }
    }
    Ok(())
}

async fn list_user_files(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let kind = DriveFileType::parse(arg_str(args, "file_type").unwrap_or_default());
    let field = arg_str(args, "field_name").or(kind.default_field());
    let automation_id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));

    let Some(files) =
        drive_files(env, automation_id, &recent_query(kind), RECENT_PAGE_SIZE, out).await?
    else {
        return Ok(());
    };

    if files.is_empty() {
        out.say(format!(
            "You don't have any {} yet. Would you like me to create one?",
            kind.plural()
        ))
        .await?;
        return Ok(());
    }

    out.send(ChatEvent::FileSearchResults {
        files: files.iter().map(file_entry).collect(),
        query: None,
        field_name: field.map(str::to_string),
        automation_id,
        automation_name: arg_str(args, "automation_name").map(str::to_string),
    })
    .await?;
    out.say(format!(
        "Here are your recent {}:\n\n{}\n\nWhich one? (say the number)",
        kind.plural(),
        numbered(&files)
    ))
    .await?;
    out.send(ChatEvent::HiddenContext {
        context: file_choices_context(&files, field),
    })
    .await?;
    Ok(())
}

async fn confirm_file_selection(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let (Some(file_id), Some(field)) = (arg_str(args, "file_id"), arg_str(args, "field_name"))
    else {
        out.say("Which file should I use? Tell me the number from the list.")
            .await?;
        return Ok(());
    };
    let name = arg_str(args, "file_name").unwrap_or(file_id);
    collect_file(env, args, field, file_id, name, out).await?;
    out.say(format!("Using \"{name}\". ")).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// save_background_config / schedule_automation
// ---------------------------------------------------------------------------

/// Config from the arguments, else the one collected during setup.
fn run_config(args: &Value, env: &ToolEnv<'_>, automation_id: DbId) -> Config {
    arg_object(args, "config")
        .or_else(|| {
            env.setup
                .filter(|s| s.automation_id == automation_id)
                .map(|s| s.collected_config.clone())
        })
        .unwrap_or_default()
}

async fn save_background_config(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let automation_id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));
    let automation = match automation_id {
        Some(id) => AutomationRepo::find_by_id(env.pool, id).await?,
        None => None,
    };
    let Some(automation) = automation else {
        out.say("⚠️ I couldn't find that automation. Please try again.")
            .await?;
        return Ok(());
    };

    out.say("Setting up background execution...\n\n").await?;
    let config = normalize_run_config(&run_config(args, env, automation.id));
    UserAutomationRepo::activate(
        env.pool,
        env.user_id,
        automation.id,
        &Value::Object(config),
        true,
    )
    .await?;
    tracing::info!(
        user_id = env.user_id,
        automation_id = automation.id,
        "Background execution enabled"
    );
    out.say(format!(
        "✓ Great! I've enabled background execution for \"{}\". It will now run automatically and keep monitoring for changes.",
        automation.name
    ))
    .await?;
    Ok(())
}

async fn schedule_automation(
    args: &Value,
    env: &ToolEnv<'_>,
    out: &mut Emitter,
) -> Result<(), ToolError> {
    let Some(expression) = arg_str(args, "time_expression") else {
        out.say("When should it run? For example \"every day at 9am\" or \"in 2 hours\".")
            .await?;
        return Ok(());
    };

    let automation_id = arg_id(args, "automation_id").or(env.setup.map(|s| s.automation_id));
    let automation = match automation_id {
        Some(id) => AutomationRepo::find_by_id(env.pool, id).await?,
        None => None,
    };
    let Some(automation) = automation else {
        out.say("Which automation should I schedule?").await?;
        return Ok(());
    };

    let schedule = match parse_time_expression(expression, Utc::now()) {
        Ok(schedule) => schedule,
        Err(CoreError::Validation(message)) => {
            out.say(format!("Sorry, I couldn't schedule that: {message}"))
                .await?;
            return Ok(());
        }
        Err(e) => {
            out.say(format!("Sorry, I couldn't schedule that: {e}")).await?;
            return Ok(());
        }
    };

    let config = normalize_run_config(&run_config(args, env, automation.id));
    UserAutomationRepo::set_schedule(
        env.pool,
        env.user_id,
        automation.id,
        &Value::Object(config),
        &ScheduleInstall {
            schedule_type: schedule.kind_name(),
            cron: schedule.cron(),
            description: schedule.description.clone(),
            next_run_at: schedule.next_run,
        },
    )
    .await?;

    out.send(ChatEvent::ScheduleCreated {
        automation_id: automation.id,
        schedule_type: schedule.kind_name().to_string(),
        description: schedule.description.clone(),
        cron: schedule.cron(),
        next_run: schedule.next_run,
    })
    .await?;
    out.say(format!(
        "⏰ Scheduled \"{}\": {}. Next run: {} UTC.",
        automation.name,
        schedule.description,
        schedule.next_run.format("%b %-d, %Y at %H:%M")
    ))
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_from_numbers_or_strings() {
        let args = json!({"a": 7, "b": " 12 ", "c": "x"});
        assert_eq!(arg_id(&args, "a"), Some(7));
        assert_eq!(arg_id(&args, "b"), Some(12));
        assert_eq!(arg_id(&args, "c"), None);
        assert_eq!(arg_id(&args, "d"), None);
    }

    #[test]
    fn requirement_labels() {
        assert_eq!(requirement_label("INVOICE_FOLDER_ID"), "- A folder to store your files");
        assert_eq!(requirement_label("SHEET_ID"), "- A spreadsheet to track the data");
        assert_eq!(requirement_label("BILLING_EMAIL"), "- Your email address for notifications");
        assert_eq!(requirement_label("TIKTOK_URL"), "- tiktok url");
    }

    #[test]
    fn run_config_checks() {
        let required = vec![
            "BILLING_EMAIL".to_string(),
            "FOLDER_ID".to_string(),
            "TOPIC".to_string(),
        ];
        let config = json!({"billing_email": "nope", "folder_id": "short", "topic": "null"});
        let (missing, invalid) = check_run_config(&required, config.as_object().unwrap());
        assert_eq!(missing, vec!["topic"]);
        assert_eq!(
            invalid,
            vec!["billing email: invalid email format", "folder id: invalid file ID"]
        );

        let config = json!({
            "billing_email": "a@b.co",
            "folder_id": "1AbCdEfGhIjKlMn",
            "topic": "ai"
        });
        let (missing, invalid) = check_run_config(&required, config.as_object().unwrap());
        assert!(missing.is_empty() && invalid.is_empty());
    }

    #[test]
    fn file_choices_list_ids() {
        let files = vec![
            DriveFile {
                id: "1abc".into(),
                name: "Invoices".into(),
                mime_type: String::new(),
                modified_time: None,
            },
            DriveFile {
                id: "2def".into(),
                name: "Invoices 2025".into(),
                mime_type: String::new(),
                modified_time: None,
            },
        ];
        assert_eq!(numbered(&files), "1. Invoices\n2. Invoices 2025");
        assert_eq!(
            file_choices_context(&files, Some("FOLDER_ID")),
            "[FILE_CHOICES field_name=\"FOLDER_ID\"]\n1. \"Invoices\" file_id=\"1abc\"\n2. \"Invoices 2025\" file_id=\"2def\""
        );
    }

    #[test]
    fn setup_marker_is_recoverable() {
        let mut config = Config::new();
        config.insert("BILLING_EMAIL".into(), json!("a@b.co"));
        let marker = setup_marker(4, "Invoice Bot", &config);
        let ctx = agora_core::chat::extract_setup_context(&[agora_core::chat::ChatMessage::new(
            agora_core::chat::ROLE_ASSISTANT,
            marker,
        )])
        .unwrap();
        assert_eq!(ctx.automation_id, 4);
        assert_eq!(ctx.automation_name.as_deref(), Some("Invoice Bot"));
        assert_eq!(ctx.collected_config, config);
    }
}
