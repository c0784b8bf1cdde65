//! Tool definitions and resolution for the compose conversation.
//!
//! Four read-only tools let the reasoning backend pull reference data it
//! needs without stuffing everything into the prompt. Resolution is
//! entirely in-memory against the pre-fetched `ToolData` bundle, so a tool
//! round never touches storage or the network.

use serde_json::{Value, json};
use ridgeline_core::backend::ToolDefinition;

use crate::context::ToolData;

/// Hard cap on timeline entries returned by `get_contact_history`, and
/// the pre-fetch depth used during context assembly.
pub const HISTORY_CAP: usize = 15;

/// The tool surface exposed to the backend during compose.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "search_resource_contacts".to_string(),
            description: "Search the company's directory of third-party resource contacts \
                          (adjusters, suppliers, crews, carriers) by name, company, or role."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "term": {
                        "type": "string",
                        "description": "Search term matched against name, company, role, and type"
                    }
                },
                "required": ["term"]
            }),
        },
        ToolDefinition {
            name: "get_message_templates".to_string(),
            description: "Fetch reusable message templates, optionally filtered by task type. \
                          Falls back to general templates when none match the task type."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "task_type": {
                        "type": "string",
                        "description": "Task type to filter by (e.g. inspection, follow_up)"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "get_contact_history".to_string(),
            description: "Recent activity timeline for this contact, newest first.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Maximum entries to return (capped at 15)"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "list_documents".to_string(),
            description: "Files attached to this contact's record.".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// Resolves tool calls against a pre-fetched data bundle.
pub struct ToolHandler<'a> {
    data: &'a ToolData,
}

impl<'a> ToolHandler<'a> {
    pub fn new(data: &'a ToolData) -> Self {
        Self { data }
    }

    /// Resolve one tool call. Always returns a JSON string; unknown tools
    /// and empty results come back as structured messages the model can
    /// recover from, never as hard errors.
    pub fn handle(&self, name: &str, arguments: &Value) -> String {
        match name {
            "search_resource_contacts" => self.search_resources(arguments),
            "get_message_templates" => self.templates(arguments),
            "get_contact_history" => self.history(arguments),
            "list_documents" => self.documents(),
            other => json!({ "error": format!("unknown tool: {other}") }).to_string(),
        }
    }

    fn search_resources(&self, arguments: &Value) -> String {
        let term = arguments
            .get("term")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();
        let matches: Vec<&_> = self
            .data
            .resources
            .iter()
            .filter(|r| {
                term.is_empty()
                    || r.name.to_lowercase().contains(&term)
                    || r.company.to_lowercase().contains(&term)
                    || r.role.to_lowercase().contains(&term)
                    || r.resource_type.to_lowercase().contains(&term)
            })
            .collect();
        if matches.is_empty() {
            return json!({ "note": format!("no resource contacts matched '{term}'") })
                .to_string();
        }
        json!({ "resource_contacts": matches }).to_string()
    }

    fn templates(&self, arguments: &Value) -> String {
        let task_type = arguments.get("task_type").and_then(Value::as_str);
        let for_type: Vec<&_> = match task_type {
            Some(t) => self
                .data
                .templates
                .iter()
                .filter(|tpl| tpl.task_type.as_deref() == Some(t))
                .collect(),
            None => Vec::new(),
        };
        // No match for that task type: fall back to general templates
        let chosen: Vec<&_> = if for_type.is_empty() {
            self.data
                .templates
                .iter()
                .filter(|tpl| tpl.task_type.is_none())
                .collect()
        } else {
            for_type
        };
        if chosen.is_empty() {
            return json!({ "note": "no templates available" }).to_string();
        }
        json!({ "templates": chosen }).to_string()
    }

    fn history(&self, arguments: &Value) -> String {
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(HISTORY_CAP)
            .min(HISTORY_CAP);
        let entries = &self.data.timeline[..limit.min(self.data.timeline.len())];
        if entries.is_empty() {
            return json!({ "note": "no recent activity for this contact" }).to_string();
        }
        json!({ "history": entries }).to_string()
    }

    fn documents(&self) -> String {
        if self.data.documents.is_empty() {
            return json!({ "note": "no documents on file" }).to_string();
        }
        json!({ "documents": self.data.documents }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ridgeline_core::crm::{DocumentRef, MessageTemplate, ResourceContact, TimelineEntry};

    fn data() -> ToolData {
        ToolData {
            templates: vec![
                MessageTemplate {
                    id: "tpl1".into(),
                    name: "Inspection reminder".into(),
                    task_type: Some("inspection".into()),
                    body: "Your inspection is coming up.".into(),
                },
                MessageTemplate {
                    id: "tpl2".into(),
                    name: "General check-in".into(),
                    task_type: None,
                    body: "Just checking in.".into(),
                },
            ],
            resources: vec![ResourceContact {
                id: "r1".into(),
                name: "Dana Reeve".into(),
                company: "Acme Insurance".into(),
                role: "Claims adjuster".into(),
                resource_type: "carrier".into(),
                phone: None,
                email: Some("dana@acme.example".into()),
            }],
            timeline: (0..20)
                .map(|i| TimelineEntry {
                    id: format!("tl{i}"),
                    contact_id: "c1".into(),
                    kind: "note".into(),
                    summary: format!("entry {i}"),
                    created_at: Utc::now(),
                })
                .collect(),
            documents: vec![DocumentRef {
                id: "d1".into(),
                contact_id: "c1".into(),
                file_name: "roof-photos.pdf".into(),
                uploaded_at: Utc::now(),
            }],
        }
    }

    #[test]
    fn four_tools_defined() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 4);
        assert!(defs.iter().all(|d| d.parameters.get("type").is_some()));
    }

    #[test]
    fn search_matches_company_case_insensitive() {
        let data = data();
        let out = ToolHandler::new(&data)
            .handle("search_resource_contacts", &json!({ "term": "ACME" }));
        assert!(out.contains("Dana Reeve"));
    }

    #[test]
    fn search_miss_returns_note() {
        let data = data();
        let out = ToolHandler::new(&data)
            .handle("search_resource_contacts", &json!({ "term": "plumbing" }));
        assert!(out.contains("note"));
        assert!(!out.contains("Dana Reeve"));
    }

    #[test]
    fn templates_filter_by_task_type() {
        let data = data();
        let out = ToolHandler::new(&data)
            .handle("get_message_templates", &json!({ "task_type": "inspection" }));
        assert!(out.contains("Inspection reminder"));
        assert!(!out.contains("General check-in"));
    }

    #[test]
    fn templates_fall_back_to_general() {
        let data = data();
        let out = ToolHandler::new(&data)
            .handle("get_message_templates", &json!({ "task_type": "unknown_type" }));
        assert!(out.contains("General check-in"));
    }

    #[test]
    fn history_is_capped() {
        let data = data();
        let out =
            ToolHandler::new(&data).handle("get_contact_history", &json!({ "limit": 100 }));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["history"].as_array().unwrap().len(), HISTORY_CAP);
    }

    #[test]
    fn unknown_tool_reports_error_in_band() {
        let data = data();
        let out = ToolHandler::new(&data).handle("summon_crane", &json!({}));
        assert!(out.contains("unknown tool"));
    }
}
