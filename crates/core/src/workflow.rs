//! Static analysis of uploaded n8n workflow exports.
//!
//! An automation listing ships a workflow JSON. Before it is stored we
//! work out what the buyer must supply at run time (user inputs), which
//! secrets the seller must provide (developer keys), which services the
//! workflow talks to (connectors) and which Google OAuth scopes it needs.
//! Every pattern is matched against individual string values of the JSON
//! tree, never against the serialized document.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;

pub const N8N_NODE_PREFIX: &str = "n8n-nodes-base.";

/// Input name added when the workflow reads an uploaded file.
pub const FILE_INPUT: &str = "FILE_INPUT";

const FILE_PROCESSING_NODES: [&str; 4] = [
    "n8n-nodes-base.extractFromFile",
    "n8n-nodes-base.readPdf",
    "n8n-nodes-base.readBinaryFile",
    "n8n-nodes-base.spreadsheetFile",
];

/// Substrings that mark a placeholder as a user input rather than a secret.
const USER_INPUT_MARKERS: [&str; 19] = [
    "SHEET_ID",
    "SHEET_NAME",
    "EMAIL",
    "NAME",
    "PHONE",
    "ADDRESS",
    "MESSAGE",
    "SUBJECT",
    "BODY",
    "TITLE",
    "DESCRIPTION",
    "URL",
    "LINK",
    "DATE",
    "TIME",
    "AMOUNT",
    "QUANTITY",
    "USER_",
    "CUSTOMER_",
];

static N8N_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<__PLACEHOLDER_VALUE__(.+?)__>").expect("valid regex"));

static TEMPLATE_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("valid regex"));

static SECRET_PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\{\{([A-Z_]*(?:API_?KEY|SECRET|TOKEN|PASSWORD|AUTH|CREDENTIAL)[A-Z_]*)\}\}",
    )
    .expect("valid regex")
});

static WEBHOOK_FIELD_RES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"\$json\.body\.([a-zA-Z_][a-zA-Z0-9_]*)").expect("valid regex"),
        Regex::new(r#"\$json\["body"\]\["([a-zA-Z_][a-zA-Z0-9_]*)"\]"#).expect("valid regex"),
        Regex::new(r"\$\('Webhook'\)\.(?:item|first\(\))\.json\.body\.([a-zA-Z_][a-zA-Z0-9_]*)")
            .expect("valid regex"),
    ]
});

static CREDENTIAL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)token|key|secret|oauth|bearer|auth|credential|password").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Name conversions
// ---------------------------------------------------------------------------

/// `jobTitle` -> `JOB_TITLE`.
pub fn camel_to_upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
        }
        out.push(ch.to_ascii_uppercase());
    }
    out.strip_prefix('_').map(str::to_string).unwrap_or(out)
}

/// `Job title for the role` -> `JOB_TITLE_FOR_THE_ROLE`.
fn placeholder_variable(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// n8n credential type -> developer key name (`openRouterApi` -> `OPEN_ROUTER_API_KEY`).
pub fn credential_key_name(cred_type: &str) -> String {
    let base = cred_type.strip_suffix("Api").unwrap_or(cred_type);
    format!("{}_API_KEY", camel_to_upper_snake(base))
}

/// Inverse of [`credential_key_name`].
pub fn credential_type_for_key(key: &str) -> String {
    let base = key.strip_suffix("_API_KEY").unwrap_or(key).to_ascii_lowercase();
    let mut out = String::with_capacity(base.len() + 3);
    let mut upper_next = false;
    for ch in base.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out.push_str("Api");
    out
}

// ---------------------------------------------------------------------------
// Tree walking
// ---------------------------------------------------------------------------

fn for_each_string(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter().for_each(|v| for_each_string(v, f)),
        Value::Object(map) => map.values().for_each(|v| for_each_string(v, f)),
        _ => {}
    }
}

fn map_strings(value: &mut Value, f: &mut impl FnMut(&str) -> Option<String>) {
    match value {
        Value::String(s) => {
            if let Some(replaced) = f(s) {
                *s = replaced;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| map_strings(v, f)),
        Value::Object(map) => map.values_mut().for_each(|v| map_strings(v, f)),
        _ => {}
    }
}

fn nodes(workflow: &Value) -> &[Value] {
    workflow
        .get("nodes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn node_type(node: &Value) -> &str {
    node.get("type").and_then(Value::as_str).unwrap_or_default()
}

/// Ordered set that keeps first-seen order.
#[derive(Default)]
struct Ordered(Vec<String>);

impl Ordered {
    fn insert(&mut self, item: String) {
        if !self.0.contains(&item) {
            self.0.push(item);
        }
    }
}

// ---------------------------------------------------------------------------
// User inputs
// ---------------------------------------------------------------------------

/// A workflow with n8n placeholders rewritten and its user inputs listed.
#[derive(Debug, Clone)]
pub struct PlaceholderRewrite {
    pub workflow: Value,
    pub user_inputs: Vec<String>,
}

/// Rewrite `<__PLACEHOLDER_VALUE__desc__>` as `{{DESC}}` and collect inputs.
///
/// File-processing nodes add [`FILE_INPUT`]. Webhook body fields read by
/// expressions become inputs too, unless their name looks like a credential.
pub fn replace_n8n_placeholders(workflow: &Value) -> PlaceholderRewrite {
    let mut inputs = Ordered::default();
    let mut rewritten = workflow.clone();

    map_strings(&mut rewritten, &mut |s| {
        if !N8N_PLACEHOLDER_RE.is_match(s) {
            return None;
        }
        let replaced = N8N_PLACEHOLDER_RE.replace_all(s, |caps: &regex::Captures<'_>| {
            let var = placeholder_variable(&caps[1]);
            inputs.insert(var.clone());
            format!("{{{{{var}}}}}")
        });
        Some(replaced.into_owned())
    });

    if nodes(&rewritten)
        .iter()
        .any(|n| FILE_PROCESSING_NODES.contains(&node_type(n)))
    {
        inputs.insert(FILE_INPUT.to_string());
    }

    for field in webhook_body_fields(&rewritten) {
        inputs.insert(field);
    }

    PlaceholderRewrite {
        workflow: rewritten,
        user_inputs: inputs.0,
    }
}

/// Webhook body fields referenced by expressions, as UPPER_SNAKE names.
pub fn webhook_body_fields(workflow: &Value) -> Vec<String> {
    let mut fields = Ordered::default();
    for_each_string(workflow, &mut |s| {
        for re in WEBHOOK_FIELD_RES.iter() {
            for caps in re.captures_iter(s) {
                let name = &caps[1];
                if CREDENTIAL_NAME_RE.is_match(name) {
                    continue;
                }
                fields.insert(camel_to_upper_snake(name));
            }
        }
    });
    fields.0
}

/// `{{UPPER_SNAKE}}` variables in the workflow that are not developer keys.
pub fn required_inputs(workflow: &Value, developer_keys: &[String]) -> Vec<String> {
    let mut found = Ordered::default();
    for_each_string(workflow, &mut |s| {
        for caps in TEMPLATE_VAR_RE.captures_iter(s) {
            let name = &caps[1];
            if !developer_keys.iter().any(|k| k == name) {
                found.insert(name.to_string());
            }
        }
    });
    found.0
}

/// Service names of every node except the manual start node.
pub fn required_connectors(workflow: &Value) -> Vec<String> {
    let mut connectors = Ordered::default();
    for node in nodes(workflow) {
        let t = node_type(node);
        if t.is_empty() || t == "n8n-nodes-base.start" {
            continue;
        }
        connectors.insert(t.strip_prefix(N8N_NODE_PREFIX).unwrap_or(t).to_string());
    }
    connectors.0
}

// ---------------------------------------------------------------------------
// Developer keys
// ---------------------------------------------------------------------------

/// Secrets the seller must supply, sorted.
pub fn detect_developer_keys(workflow: &Value) -> Vec<String> {
    let mut keys = BTreeSet::new();

    for node in nodes(workflow) {
        if let Some(creds) = node.get("credentials").and_then(Value::as_object) {
            keys.extend(creds.keys().map(|t| credential_key_name(t)));
        }
    }

    for_each_string(workflow, &mut |s| {
        for caps in SECRET_PLACEHOLDER_RE.captures_iter(s) {
            let key = caps[1].to_ascii_uppercase();
            if !USER_INPUT_MARKERS.iter().any(|m| key.contains(m)) {
                keys.insert(key);
            }
        }
    });

    keys.into_iter().collect()
}

/// Point each node credential covered by `keys` at a `{{KEY}}` placeholder.
pub fn replace_credentials_with_placeholders(workflow: &Value, keys: &[String]) -> Value {
    let mut out = workflow.clone();
    let Some(nodes) = out.get_mut("nodes").and_then(Value::as_array_mut) else {
        return out;
    };
    for node in nodes {
        let Some(creds) = node.get_mut("credentials").and_then(Value::as_object_mut) else {
            continue;
        };
        for key in keys {
            if let Some(cred) = creds.get_mut(&credential_type_for_key(key)) {
                if let Some(obj) = cred.as_object_mut() {
                    obj.insert("id".into(), Value::String(format!("{{{{{key}}}}}")));
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Google scopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScopeDetail {
    pub full_scope: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub sensitivity: &'static str,
    pub requires_verification: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GoogleScopes {
    pub scopes: Vec<&'static str>,
    pub scope_details: Vec<ScopeDetail>,
    pub requires_verification: bool,
}

impl GoogleScopes {
    /// One-line summary shown next to the listing.
    pub fn summary(&self) -> String {
        if self.scope_details.is_empty() {
            return "No Google services detected".into();
        }
        let names: Vec<&str> = self.scope_details.iter().map(|d| d.name).collect();
        let note = if self.requires_verification {
            " (requires user authorization)"
        } else {
            ""
        };
        format!("This automation uses: {}{note}", names.join(", "))
    }
}

fn scope_for_node(node_type: &str) -> Option<&'static str> {
    match node_type {
        "n8n-nodes-base.googleDrive" | "n8n-nodes-base.googleDriveTrigger" => Some("drive.file"),
        "n8n-nodes-base.googleSheets" => Some("spreadsheets"),
        "n8n-nodes-base.gmail" | "n8n-nodes-base.gmailTool" => Some("gmail.send"),
        _ => None,
    }
}

fn scope_detail(scope: &str) -> Option<ScopeDetail> {
    Some(match scope {
        "drive.file" => ScopeDetail {
            full_scope: "https://www.googleapis.com/auth/drive.file",
            name: "Google Drive (Per-File)",
            description: "Access only to files created by this app",
            sensitivity: "NON-SENSITIVE",
            requires_verification: false,
        },
        "spreadsheets" => ScopeDetail {
            full_scope: "https://www.googleapis.com/auth/spreadsheets",
            name: "Google Sheets",
            description: "Read and write Google Sheets",
            sensitivity: "SENSITIVE",
            requires_verification: true,
        },
        "gmail.send" => ScopeDetail {
            full_scope: "https://www.googleapis.com/auth/gmail.send",
            name: "Gmail (Send)",
            description: "Send emails on your behalf",
            sensitivity: "SENSITIVE",
            requires_verification: true,
        },
        _ => return None,
    })
}

/// Approved Google OAuth scopes needed by the workflow's nodes.
pub fn detect_google_scopes(workflow: &Value) -> GoogleScopes {
    let mut found = Ordered::default();
    for node in nodes(workflow) {
        if let Some(scope) = scope_for_node(node_type(node)) {
            found.insert(scope.to_string());
        }
    }
    let scope_details: Vec<ScopeDetail> = found.0.iter().filter_map(|s| scope_detail(s)).collect();
    GoogleScopes {
        scopes: scope_details.iter().map(|d| d.full_scope).collect(),
        requires_verification: scope_details.iter().any(|d| d.requires_verification),
        scope_details,
    }
}

// ---------------------------------------------------------------------------
// Combined analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowAnalysis {
    /// Workflow with placeholders rewritten and credentials pointed at keys.
    pub workflow: Value,
    pub user_inputs: Vec<String>,
    pub developer_keys: Vec<String>,
    pub required_inputs: Vec<String>,
    pub required_connectors: Vec<String>,
    pub google: GoogleScopes,
}

/// Parse and analyse an uploaded workflow export.
pub fn analyze_workflow(raw: &[u8]) -> Result<WorkflowAnalysis, CoreError> {
    let parsed: Value = serde_json::from_slice(raw)
        .map_err(|_| CoreError::Validation("Invalid JSON file".into()))?;
    if !parsed.get("nodes").is_some_and(Value::is_array) {
        return Err(CoreError::Validation(
            "Workflow JSON must contain a nodes array".into(),
        ));
    }

    let PlaceholderRewrite {
        workflow,
        user_inputs,
    } = replace_n8n_placeholders(&parsed);
    let developer_keys = detect_developer_keys(&workflow);
    let workflow = replace_credentials_with_placeholders(&workflow, &developer_keys);

    Ok(WorkflowAnalysis {
        required_inputs: required_inputs(&workflow, &developer_keys),
        required_connectors: required_connectors(&workflow),
        google: detect_google_scopes(&workflow),
        workflow,
        user_inputs,
        developer_keys,
    })
}

// ---------------------------------------------------------------------------
// n8n import
// ---------------------------------------------------------------------------

/// Body for creating the workflow in n8n. Exports wrapped in an array or a
/// `{workflow: ...}` object are unwrapped. The workflow is created inactive.
pub fn n8n_import_payload(stored: &Value, name: &str) -> Result<Value, CoreError> {
    let mut wf = stored;
    if let Some(first) = wf.as_array().and_then(|a| a.first()) {
        wf = first;
    }
    if let Some(inner) = wf.get("workflow").filter(|w| w.is_object()) {
        wf = inner;
    }
    let Some(obj) = wf.as_object() else {
        return Err(CoreError::Validation(
            "workflow is empty or not an object".into(),
        ));
    };
    let Some(nodes) = obj.get("nodes").filter(|n| n.is_array()) else {
        return Err(CoreError::Validation(
            "workflow.nodes must be an array".into(),
        ));
    };
    let Some(connections) = obj.get("connections").filter(|c| c.is_object()) else {
        return Err(CoreError::Validation(
            "workflow.connections must be an object".into(),
        ));
    };

    let name = Some(name.trim())
        .filter(|n| !n.is_empty())
        .or_else(|| obj.get("name").and_then(Value::as_str))
        .unwrap_or("Imported workflow");
    let mut payload = serde_json::json!({
        "name": name,
        "nodes": nodes,
        "connections": connections,
        "settings": obj
            .get("settings")
            .filter(|s| s.is_object())
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})),
        "active": false,
    });
    for key in ["staticData", "pinData"] {
        if let Some(v) = obj.get(key).filter(|v| v.is_object()) {
            payload[key] = v.clone();
        }
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "nodes": [
                {"type": "n8n-nodes-base.webhook", "name": "Webhook",
                 "parameters": {"path": "run"}},
                {"type": "n8n-nodes-base.httpRequest", "name": "LLM",
                 "credentials": {"openRouterApi": {"id": "abc", "name": "router"}},
                 "parameters": {
                     "text": "Write about <__PLACEHOLDER_VALUE__Job title__> for {{ $json.body.companyName }}",
                     "auth": "={{ $json.body.apiToken }}",
                     "header": "Bearer {{SLACK_BOT_TOKEN}} {{CUSTOMER_EMAIL}}"
                 }},
                {"type": "n8n-nodes-base.googleSheets", "name": "Sheet"},
                {"type": "n8n-nodes-base.readPdf", "name": "Pdf"},
                {"type": "n8n-nodes-base.gmail", "name": "Mail"}
            ]
        })
    }

    #[test]
    fn name_conversions() {
        assert_eq!(camel_to_upper_snake("jobTitle"), "JOB_TITLE");
        assert_eq!(camel_to_upper_snake("Email"), "EMAIL");
        assert_eq!(placeholder_variable("Job title, senior"), "JOB_TITLE_SENIOR");
        assert_eq!(credential_key_name("openRouterApi"), "OPEN_ROUTER_API_KEY");
        assert_eq!(credential_type_for_key("OPEN_ROUTER_API_KEY"), "openRouterApi");
    }

    #[test]
    fn placeholders_are_rewritten_and_inputs_collected() {
        let out = replace_n8n_placeholders(&sample());
        let text = out.workflow["nodes"][1]["parameters"]["text"].as_str().unwrap();
        assert!(text.starts_with("Write about {{JOB_TITLE}} for"));
        assert_eq!(out.user_inputs, vec!["JOB_TITLE", "FILE_INPUT", "COMPANY_NAME"]);
    }

    #[test]
    fn bracket_and_webhook_call_forms() {
        let wf = json!({"nodes": [], "x": [
            "{{ $json[\"body\"][\"firstName\"] }}",
            "{{ $('Webhook').first().json.body.topic }}",
            "{{ $('Webhook').item.json.body.secretKey }}"
        ]});
        assert_eq!(webhook_body_fields(&wf), vec!["FIRST_NAME", "TOPIC"]);
    }

    #[test]
    fn developer_keys_from_credentials_and_placeholders() {
        let keys = detect_developer_keys(&sample());
        assert_eq!(keys, vec!["OPEN_ROUTER_API_KEY", "SLACK_BOT_TOKEN"]);
    }

    #[test]
    fn credentials_point_at_placeholders() {
        let wf = replace_credentials_with_placeholders(
            &sample(),
            &["OPEN_ROUTER_API_KEY".to_string()],
        );
        assert_eq!(
            wf["nodes"][1]["credentials"]["openRouterApi"]["id"],
            "{{OPEN_ROUTER_API_KEY}}"
        );
    }

    #[test]
    fn google_scopes_for_sheets_and_gmail() {
        let g = detect_google_scopes(&sample());
        assert_eq!(
            g.scopes,
            vec![
                "https://www.googleapis.com/auth/spreadsheets",
                "https://www.googleapis.com/auth/gmail.send"
            ]
        );
        assert!(g.requires_verification);
        assert_eq!(
            g.summary(),
            "This automation uses: Google Sheets, Gmail (Send) (requires user authorization)"
        );
        assert_eq!(
            detect_google_scopes(&json!({})).summary(),
            "No Google services detected"
        );
    }

    #[test]
    fn full_analysis() {
        let raw = serde_json::to_vec(&sample()).unwrap();
        let a = analyze_workflow(&raw).unwrap();
        assert_eq!(
            a.required_connectors,
            vec!["webhook", "httpRequest", "googleSheets", "readPdf", "gmail"]
        );
        assert!(a.required_inputs.contains(&"JOB_TITLE".to_string()));
        assert!(a.required_inputs.contains(&"CUSTOMER_EMAIL".to_string()));
        assert!(!a.required_inputs.contains(&"OPEN_ROUTER_API_KEY".to_string()));
        assert!(!a.required_inputs.contains(&"SLACK_BOT_TOKEN".to_string()));
    }

    #[test]
    fn rejects_non_workflows() {
        assert_matches!(analyze_workflow(b"not json"), Err(CoreError::Validation(_)));
        assert_matches!(analyze_workflow(b"{\"a\":1}"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn n8n_payload_unwraps_exports() {
        let stored = serde_json::json!([{"workflow": {
            "name": "Export",
            "nodes": [{"name": "Start"}],
            "connections": {},
            "pinData": {"a": 1},
            "staticData": null
        }}]);
        let payload = n8n_import_payload(&stored, " ").unwrap();
        assert_eq!(payload["name"], "Export");
        assert_eq!(payload["active"], false);
        assert_eq!(payload["settings"], serde_json::json!({}));
        assert_eq!(payload["pinData"]["a"], 1);
        assert!(payload.get("staticData").is_none());

        assert_matches!(
            n8n_import_payload(&serde_json::json!({"nodes": []}), "x"),
            Err(CoreError::Validation(m)) if m == "workflow.connections must be an object"
        );
    }
}
