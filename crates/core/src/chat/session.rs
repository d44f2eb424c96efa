//! Client-side state of one assistant message while it streams in.
//!
//! Text deltas are revealed through a [`Typewriter`]; structured events
//! update the message attachments and the automation setup state. The turn
//! moves `Streaming -> Draining -> Finished`, or to `Cancelled` when the
//! user stops it.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::events::{AutomationCard, ChatEvent, Config, StreamEvent};
use crate::types::DbId;

pub const CHARS_PER_SECOND: u32 = 120;

// ---------------------------------------------------------------------------
// Typewriter
// ---------------------------------------------------------------------------

/// Reveals queued text at a fixed rate.
#[derive(Debug, Default, Clone)]
pub struct Typewriter {
    displayed: String,
    queue: String,
    elapsed: Duration,
}

impl Typewriter {
    pub fn push(&mut self, text: &str) {
        self.queue.push_str(text);
    }

    /// Advance the clock and reveal whole chars earned so far.
    /// Returns how many chars became visible.
    pub fn tick(&mut self, elapsed: Duration) -> usize {
        if self.queue.is_empty() {
            self.elapsed = Duration::ZERO;
            return 0;
        }
        self.elapsed += elapsed;
        let due = (self.elapsed.as_secs_f64() * f64::from(CHARS_PER_SECOND)).floor() as usize;
        if due == 0 {
            return 0;
        }
        let split = self
            .queue
            .char_indices()
            .nth(due)
            .map(|(i, _)| i)
            .unwrap_or(self.queue.len());
        let revealed: String = self.queue.drain(..split).collect();
        self.displayed.push_str(&revealed);
        self.elapsed = Duration::ZERO;
        revealed.chars().count()
    }

    /// Reveal everything queued at once.
    pub fn flush(&mut self) {
        let rest = std::mem::take(&mut self.queue);
        self.displayed.push_str(&rest);
        self.elapsed = Duration::ZERO;
    }

    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    pub fn is_drained(&self) -> bool {
        self.queue.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Setup state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupPhase {
    Collecting,
    AwaitingInput,
    ReadyToExecute,
}

/// Progress of configuring an automation through the conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupState {
    pub automation_id: DbId,
    pub automation_name: String,
    pub phase: SetupPhase,
    pub required_fields: Vec<String>,
    pub collected_fields: Config,
    pub collected_config: Config,
    pub missing_fields: Vec<String>,
    pub ready_config: Option<Config>,
}

impl SetupState {
    fn new(automation_id: DbId, automation_name: String) -> Self {
        Self {
            automation_id,
            automation_name,
            phase: SetupPhase::Collecting,
            required_fields: Vec::new(),
            collected_fields: Config::new(),
            collected_config: Config::new(),
            missing_fields: Vec::new(),
            ready_config: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedAutomation {
    pub id: DbId,
    pub name: String,
    pub required_inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSearch {
    pub files: Vec<Value>,
    pub field_name: Option<String>,
    pub automation_id: Option<DbId>,
    pub automation_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Streaming,
    /// Stream ended; queued text is still being revealed.
    Draining,
    Finished,
    Cancelled,
}

/// Attachments rendered alongside the assistant's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attachments {
    pub automations: Option<Vec<Value>>,
    pub automation_list: Option<Vec<AutomationCard>>,
    pub connect_request: Option<ChatEvent>,
    pub config_request: Option<ChatEvent>,
    pub file_search_results: Option<Vec<Value>>,
    pub automation_instances: Option<Vec<Value>>,
    pub upload_request: Option<ChatEvent>,
    pub schedule: Option<ChatEvent>,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    phase: TurnPhase,
    typewriter: Typewriter,
    pub attachments: Attachments,
    pub is_searching: bool,
    pub hidden_context: Vec<String>,
    pub tool_output: Option<(String, String)>,
    pub automation_context: Option<String>,
    pub setup: Option<SetupState>,
    pub selected_automation: Option<SelectedAutomation>,
    pub last_file_search: Option<FileSearch>,
}

impl Default for ChatTurn {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTurn {
    pub fn new() -> Self {
        Self {
            phase: TurnPhase::Streaming,
            typewriter: Typewriter::default(),
            attachments: Attachments::default(),
            is_searching: false,
            hidden_context: Vec::new(),
            tool_output: None,
            automation_context: None,
            setup: None,
            selected_automation: None,
            last_file_search: None,
        }
    }

    /// Continue from the setup state left by the previous turn.
    pub fn with_setup(mut self, setup: Option<SetupState>) -> Self {
        self.setup = setup;
        self
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn displayed(&self) -> &str {
        self.typewriter.displayed()
    }

    /// Displayed text plus hidden context, as stored in the conversation.
    pub fn transcript(&self) -> String {
        let mut out = self.typewriter.displayed().to_string();
        for ctx in &self.hidden_context {
            out.push('\n');
            out.push_str(ctx);
        }
        out
    }

    /// Apply one decoded event. Events after the stream ended are ignored.
    pub fn apply(&mut self, event: StreamEvent) {
        if self.phase != TurnPhase::Streaming {
            return;
        }
        let event = match event {
            StreamEvent::Content { content } => {
                self.typewriter.push(&content);
                return;
            }
            StreamEvent::Typed(event) => event,
        };

        self.typewriter.flush();
        match event {
            ChatEvent::Automations { automations } => {
                self.automation_context = None;
                self.attachments.automations = Some(automations);
            }
            ChatEvent::AutomationList { automations } => {
                self.automation_context = None;
                self.attachments.automation_list = Some(automations);
            }
            e @ ChatEvent::ConnectRequest { .. } => self.attachments.connect_request = Some(e),
            e @ ChatEvent::ConfigRequest { .. } => self.attachments.config_request = Some(e),
            e @ ChatEvent::UploadRequest { .. } => self.attachments.upload_request = Some(e),
            e @ ChatEvent::ScheduleCreated { .. } => self.attachments.schedule = Some(e),
            ChatEvent::AutomationContext { context } => self.automation_context = Some(context),
            ChatEvent::Searching { status } => {
                self.is_searching = status == super::events::SearchStatus::Start;
            }
            ChatEvent::SetupStarted {
                automation_id,
                automation_name,
                required_inputs,
                collected_fields,
            } => {
                let previous = self.setup.take().map(|s| s.collected_fields);
                let mut setup = SetupState::new(automation_id, automation_name.clone());
                setup.required_fields = required_inputs.clone();
                setup.collected_fields = collected_fields.or(previous).unwrap_or_default();
                self.setup = Some(setup);
                self.selected_automation = Some(SelectedAutomation {
                    id: automation_id,
                    name: automation_name,
                    required_inputs,
                });
            }
            ChatEvent::FileSearchResults {
                files,
                field_name,
                automation_id,
                automation_name,
                ..
            } => {
                self.attachments.file_search_results = Some(files.clone());
                self.last_file_search = Some(FileSearch {
                    files,
                    field_name,
                    automation_id,
                    automation_name,
                });
            }
            ChatEvent::FieldCollected {
                field_name, value, ..
            } => {
                if let Some(setup) = self.setup.as_mut() {
                    setup.collected_fields.insert(field_name, value);
                }
                self.last_file_search = None;
            }
            ChatEvent::AutomationComplete { .. } => {
                self.selected_automation = None;
                self.setup = None;
            }
            ChatEvent::ReadyToExecute {
                automation_id,
                automation_name,
                config,
            } => {
                let mut setup = self
                    .setup
                    .take()
                    .unwrap_or_else(|| SetupState::new(automation_id, automation_name.clone()));
                setup.automation_id = automation_id;
                setup.automation_name = automation_name;
                setup.ready_config = Some(config);
                setup.phase = SetupPhase::ReadyToExecute;
                self.setup = Some(setup);
            }
            ChatEvent::AwaitingInput {
                automation_id,
                automation_name,
                missing_fields,
                collected_config,
            } => {
                let previous = self.setup.take();
                let mut setup = SetupState::new(automation_id, automation_name);
                setup.required_fields = previous
                    .as_ref()
                    .map(|p| p.required_fields.clone())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| missing_fields.clone());
                if let Some(prev) = previous {
                    setup.collected_fields = prev.collected_fields;
                    setup.collected_config = prev.collected_config;
                }
                if let Some(config) = collected_config {
                    setup.collected_config = config;
                }
                setup.missing_fields = missing_fields;
                setup.phase = SetupPhase::AwaitingInput;
                self.setup = Some(setup);
            }
            ChatEvent::AutomationInstances { instances } => {
                self.attachments.automation_instances = Some(instances);
            }
            ChatEvent::HiddenContext { context } => self.hidden_context.push(context),
            ChatEvent::ToolOutput { content, tool } => self.tool_output = Some((tool, content)),
        }
    }

    /// Advance the typewriter; completes a draining turn once the queue empties.
    pub fn tick(&mut self, elapsed: Duration) -> usize {
        if matches!(self.phase, TurnPhase::Finished | TurnPhase::Cancelled) {
            return 0;
        }
        let revealed = self.typewriter.tick(elapsed);
        if self.phase == TurnPhase::Draining && self.typewriter.is_drained() {
            self.phase = TurnPhase::Finished;
        }
        revealed
    }

    /// The server closed the stream (`[DONE]` or EOF).
    pub fn finish(&mut self) {
        if self.phase != TurnPhase::Streaming {
            return;
        }
        self.phase = if self.typewriter.is_drained() {
            TurnPhase::Finished
        } else {
            TurnPhase::Draining
        };
    }

    /// The user stopped generation: show what arrived and stop.
    pub fn cancel(&mut self) {
        if matches!(self.phase, TurnPhase::Finished | TurnPhase::Cancelled) {
            return;
        }
        self.typewriter.flush();
        self.phase = TurnPhase::Cancelled;
    }
}
