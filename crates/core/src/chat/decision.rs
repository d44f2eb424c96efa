//! The orchestrator's reply: what to say, and optionally which tool to run.

use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchAutomations,
    StartSetup,
    CollectTextInput,
    ExecuteAutomation,
    ShowUserAutomations,
    RequestFileUpload,
    ConnectAccount,
    SearchUserFiles,
    ListUserFiles,
    ConfirmFileSelection,
    SaveBackgroundConfig,
    ScheduleAutomation,
    Unknown(String),
}

impl ToolName {
    pub const KNOWN: [ToolName; 12] = [
        Self::SearchAutomations,
        Self::StartSetup,
        Self::CollectTextInput,
        Self::ExecuteAutomation,
        Self::ShowUserAutomations,
        Self::RequestFileUpload,
        Self::ConnectAccount,
        Self::SearchUserFiles,
        Self::ListUserFiles,
        Self::ConfirmFileSelection,
        Self::SaveBackgroundConfig,
        Self::ScheduleAutomation,
    ];

    pub fn parse(name: &str) -> Self {
        match name {
            "search_automations" => Self::SearchAutomations,
            "start_setup" => Self::StartSetup,
            "collect_text_input" => Self::CollectTextInput,
            "execute_automation" => Self::ExecuteAutomation,
            "show_user_automations" => Self::ShowUserAutomations,
            "request_file_upload" => Self::RequestFileUpload,
            "connect_account" => Self::ConnectAccount,
            "search_user_files" => Self::SearchUserFiles,
            "list_user_files" => Self::ListUserFiles,
            "confirm_file_selection" => Self::ConfirmFileSelection,
            "save_background_config" => Self::SaveBackgroundConfig,
            "schedule_automation" => Self::ScheduleAutomation,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::SearchAutomations => "search_automations",
            Self::StartSetup => "start_setup",
            Self::CollectTextInput => "collect_text_input",
            Self::ExecuteAutomation => "execute_automation",
            Self::ShowUserAutomations => "show_user_automations",
            Self::RequestFileUpload => "request_file_upload",
            Self::ConnectAccount => "connect_account",
            Self::SearchUserFiles => "search_user_files",
            Self::ListUserFiles => "list_user_files",
            Self::ConfirmFileSelection => "confirm_file_selection",
            Self::SaveBackgroundConfig => "save_background_config",
            Self::ScheduleAutomation => "schedule_automation",
            Self::Unknown(name) => name,
        }
    }

    /// Function-calling definition sent to the provider when the tool's
    /// arguments are generated. `None` for unknown tools.
    pub fn definition(&self) -> Option<Value> {
        let (description, properties, required): (&str, Value, Vec<&str>) = match self {
            Self::SearchAutomations => (
                "Search for available automations matching what the user wants to automate.",
                json!({"query": {"type": "string", "description": "The user's automation requirement"}}),
                vec!["query"],
            ),
            Self::StartSetup => (
                "Start setting up the automation the user selected.",
                json!({
                    "automation_id": {"type": "integer", "description": "Id of the selected automation"},
                    "automation_name": {"type": "string", "description": "Name of the automation"}
                }),
                vec!["automation_name"],
            ),
            Self::CollectTextInput => (
                "Record a text input such as an email address for the automation being set up.",
                json!({
                    "field_name": {"type": "string", "description": "Config field name, e.g. BILLING_EMAIL"},
                    "value": {"type": "string", "description": "The value the user provided"},
                    "automation_id": {"type": "integer", "description": "Automation being set up"},
                    "automation_name": {"type": "string"},
                    "existing_config": {"type": "object", "description": "Every field collected so far"}
                }),
                vec!["field_name", "value"],
            ),
            Self::ExecuteAutomation => (
                "Run the automation with the collected configuration.",
                json!({
                    "automation_id": {"type": "integer"},
                    "config": {"type": "object", "description": "All configuration values"}
                }),
                vec!["automation_id", "config"],
            ),
            Self::ShowUserAutomations => (
                "Show the automations the user already owns with their run statistics.",
                json!({"status_filter": {"type": "string", "enum": ["all", "active", "paused"]}}),
                vec![],
            ),
            Self::RequestFileUpload => (
                "Ask the user to upload a file for an automation input.",
                json!({
                    "automation_id": {"type": "integer"},
                    "field_name": {"type": "string"},
                    "accept": {"type": "string", "description": "Accepted MIME types, e.g. video/*"}
                }),
                vec!["automation_id", "field_name"],
            ),
            Self::ConnectAccount => (
                "Ask the user to connect a third-party account.",
                json!({
                    "provider": {"type": "string", "enum": ["google", "tiktok"]},
                    "automation_id": {"type": "integer"},
                    "reason": {"type": "string"}
                }),
                vec!["provider"],
            ),
            Self::SearchUserFiles => (
                "Search the user's Google Drive for a file or folder by name.",
                json!({
                    "query": {"type": "string", "description": "Name or part of the name"},
                    "file_type": {"type": "string", "enum": ["spreadsheet", "document", "folder", "any"]},
                    "field_name": {"type": "string", "description": "Config field the file fills, e.g. FOLDER_ID"},
                    "automation_id": {"type": "integer"},
                    "automation_name": {"type": "string"}
                }),
                vec!["query"],
            ),
            Self::ListUserFiles => (
                "List the user's recent Google Drive files when they don't know a name.",
                json!({
                    "file_type": {"type": "string", "enum": ["spreadsheet", "document", "folder", "any"]},
                    "field_name": {"type": "string"},
                    "automation_id": {"type": "integer"},
                    "automation_name": {"type": "string"}
                }),
                vec!["file_type"],
            ),
            Self::ConfirmFileSelection => (
                "Use the file the user picked from search results.",
                json!({
                    "file_id": {"type": "string"},
                    "file_name": {"type": "string"},
                    "field_name": {"type": "string"},
                    "automation_id": {"type": "integer"},
                    "automation_name": {"type": "string"}
                }),
                vec!["file_id", "file_name", "field_name"],
            ),
            Self::SaveBackgroundConfig => (
                "Enable background execution for an automation with its configuration.",
                json!({
                    "automation_id": {"type": "integer"},
                    "config": {"type": "object", "description": "Configuration the automation runs with"}
                }),
                vec!["automation_id", "config"],
            ),
            Self::ScheduleAutomation => (
                "Schedule an automation to run later or on a recurring schedule.",
                json!({
                    "automation_id": {"type": "integer"},
                    "time_expression": {"type": "string", "description": "e.g. every 6 hours, daily at 3pm, in 2 days"},
                    "config": {"type": "object", "description": "Configuration to run with"}
                }),
                vec!["time_expression"],
            ),
            Self::Unknown(_) => return None,
        };
        Some(json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolAction {
    pub tool: ToolName,
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorDecision {
    pub response: String,
    pub action: Option<ToolAction>,
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    action: Option<RawAction>,
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

impl OrchestratorDecision {
    /// Parse the model output. Anything that is not a decision object is
    /// taken as a plain reply.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<RawDecision>(raw) {
            Ok(decision) => Self {
                response: decision.response.unwrap_or_default(),
                action: decision.action.and_then(|a| {
                    let tool = a.tool.filter(|t| !t.trim().is_empty())?;
                    Some(ToolAction {
                        tool: ToolName::parse(tool.trim()),
                        hint: a.hint.unwrap_or_default(),
                    })
                }),
            },
            Err(_) => Self {
                response: raw.to_string(),
                action: None,
            },
        }
    }
}
