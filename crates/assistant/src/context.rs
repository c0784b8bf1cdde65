//! Context assembly — the lean contact summary plus the on-demand data
//! pool that tools query.
//!
//! The per-call prompt stays small: the summary is a few lines of what
//! every directive needs (name, channels, stage, claim, open tasks). The
//! larger reference data — templates, resource directory, timeline,
//! documents — is pre-fetched once into `ToolData` and only reaches the
//! reasoning backend if a tool asks for it.
//!
//! Assembly never fails on missing contact fields; optional fields are
//! simply omitted from the summary.

use std::sync::Arc;
use ridgeline_core::crm::{
    AppointmentType, CrmStore, DocumentRef, MessageTemplate, ResourceContact, Stage, TimelineEntry,
};
use ridgeline_core::error::StoreError;
use ridgeline_core::{Contact, OrgContext};
use tracing::debug;

use crate::tools::HISTORY_CAP;

/// Pre-fetched reference data available to tools. All tool resolution
/// happens against this bundle in memory — no network or storage calls
/// mid-conversation.
#[derive(Debug, Clone, Default)]
pub struct ToolData {
    pub templates: Vec<MessageTemplate>,
    pub resources: Vec<ResourceContact>,
    pub timeline: Vec<TimelineEntry>,
    pub documents: Vec<DocumentRef>,
}

/// Everything one compose attempt needs about a contact.
#[derive(Debug, Clone)]
pub struct ContactContext {
    /// The always-included summary, capped to a few lines
    pub summary: String,
    /// On-demand data pool for tool resolution
    pub tool_data: ToolData,
    /// Live pipeline stages, so the model can only pick real names
    pub stages: Vec<Stage>,
    /// Configured appointment types
    pub appointment_types: Vec<AppointmentType>,
    /// The contact's claim number, used for the carrier subject fixup
    pub claim_number: Option<String>,
    /// Task type of the contact's active task, if any
    pub current_task_type: Option<String>,
}

/// Builds `ContactContext` values from CRM storage.
pub struct ContextAssembler {
    crm: Arc<dyn CrmStore>,
}

impl ContextAssembler {
    pub fn new(crm: Arc<dyn CrmStore>) -> Self {
        Self { crm }
    }

    /// Assemble the compose context for one contact.
    pub async fn assemble(
        &self,
        org: &OrgContext,
        contact: &Contact,
    ) -> Result<ContactContext, StoreError> {
        let stages = self.crm.list_stages(&org.org_id).await?;
        let appointment_types = self.crm.list_appointment_types(&org.org_id).await?;
        let tool_data = ToolData {
            templates: self.crm.list_templates(&org.org_id).await?,
            resources: self.crm.list_resource_contacts(&org.org_id).await?,
            timeline: self
                .crm
                .recent_timeline(&org.org_id, &contact.id, HISTORY_CAP)
                .await?,
            documents: self.crm.list_documents(&org.org_id, &contact.id).await?,
        };

        let summary = lean_summary(contact, &stages);
        debug!(
            contact_id = %contact.id,
            templates = tool_data.templates.len(),
            resources = tool_data.resources.len(),
            "Assembled compose context"
        );

        Ok(ContactContext {
            summary,
            tool_data,
            stages,
            appointment_types,
            claim_number: contact.claim_number.clone(),
            current_task_type: contact.active_task().map(|t| t.task_type.clone()),
        })
    }
}

/// Render the lean, always-included contact summary. Missing optional
/// fields are omitted rather than rendered as placeholders.
pub fn lean_summary(contact: &Contact, stages: &[Stage]) -> String {
    let mut lines = vec![format!("Name: {}", contact.full_name())];

    let mut channels = Vec::new();
    if let Some(phone) = &contact.phone {
        channels.push(format!("phone {phone}"));
    }
    if let Some(email) = &contact.email {
        channels.push(format!("email {email}"));
    }
    if !channels.is_empty() {
        lines.push(format!("Reachable by: {}", channels.join(", ")));
    }

    if let Some(address) = &contact.address {
        lines.push(format!("Address: {address}"));
    }

    if let Some(stage_id) = &contact.stage_id {
        if let Some(stage) = stages.iter().find(|s| &s.id == stage_id) {
            lines.push(format!("Pipeline stage: {}", stage.name));
        }
    }

    match (&contact.carrier, &contact.claim_number) {
        (Some(carrier), Some(claim)) => {
            lines.push(format!("Insurance: {carrier}, claim {claim}"));
        }
        (Some(carrier), None) => lines.push(format!("Insurance: {carrier}")),
        (None, Some(claim)) => lines.push(format!("Claim number: {claim}")),
        (None, None) => {}
    }

    let open: Vec<String> = contact
        .tasks
        .iter()
        .filter(|t| !t.completed)
        .map(|t| match t.due_date {
            Some(due) => format!("{} ({}, due {due})", t.name, t.task_type),
            None => format!("{} ({})", t.name, t.task_type),
        })
        .collect();
    if !open.is_empty() {
        lines.push(format!("Open tasks: {}", open.join("; ")));
    }

    lines.join("\n")
}
