//! Action executor: turns an approved pending draft into CRM effects.
//!
//! Execution is human-gated. Only `pending` drafts execute; the reviewer
//! may pass an action override that replaces the stored payload for this
//! run. Every applied action records a note on the contact, then the
//! draft moves `pending → sent`. Name resolution (stages, appointment
//! types) happens at execution time against the live CRM lists, so a
//! rename between compose and approval fails loudly instead of acting on
//! a stale id.

use std::sync::Arc;
use chrono::Utc;
use tracing::{debug, info};
use ridgeline_core::crm::{CrmStore, Scheduling};
use ridgeline_core::draft::{Action, Draft, DraftStatus, DraftStore, DraftType};
use ridgeline_core::error::ExecuteError;
use ridgeline_core::OrgContext;

/// Default due-date horizon for tasks opened by stage progression.
const DEFAULT_TASK_DUE_BUSINESS_DAYS: u32 = 3;

/// Executes approved drafts against the CRM.
pub struct ActionExecutor {
    drafts: Arc<dyn DraftStore>,
    crm: Arc<dyn CrmStore>,
    scheduling: Arc<dyn Scheduling>,
}

impl ActionExecutor {
    pub fn new(
        drafts: Arc<dyn DraftStore>,
        crm: Arc<dyn CrmStore>,
        scheduling: Arc<dyn Scheduling>,
    ) -> Self {
        Self {
            drafts,
            crm,
            scheduling,
        }
    }

    /// Execute one pending draft, optionally with a reviewer-supplied
    /// action override. On success the draft is `sent`.
    pub async fn execute(
        &self,
        org: &OrgContext,
        draft_id: &str,
        action_override: Option<Action>,
    ) -> Result<Draft, ExecuteError> {
        let mut draft = self
            .drafts
            .get(&org.org_id, draft_id)
            .await?
            .ok_or_else(|| ExecuteError::DraftNotFound(draft_id.to_string()))?;

        if draft.status != DraftStatus::Pending {
            return Err(ExecuteError::NotPending {
                draft_id: draft_id.to_string(),
                status: draft.status.to_string(),
            });
        }

        let action = action_override
            .or_else(|| draft.action.clone())
            .ok_or_else(|| ExecuteError::MissingAction(draft_id.to_string()))?;

        self.apply(org, &draft, &action).await?;

        // The override becomes the draft of record before it freezes.
        draft.apply_action(action);
        self.drafts.update(&draft).await?;
        self.drafts
            .transition(&org.org_id, draft_id, DraftStatus::Pending, DraftStatus::Sent)
            .await?;
        draft.status = DraftStatus::Sent;

        info!(draft_id = %draft.id, draft_type = %draft.draft_type, "Draft executed");
        Ok(draft)
    }

    /// Mark a message draft sent without CRM effects — the operator
    /// delivered it through their own channel. CRM-effect drafts must go
    /// through `execute` so their effects actually happen.
    pub async fn mark_sent(&self, org: &OrgContext, draft_id: &str) -> Result<Draft, ExecuteError> {
        let draft = self
            .drafts
            .get(&org.org_id, draft_id)
            .await?
            .ok_or_else(|| ExecuteError::DraftNotFound(draft_id.to_string()))?;

        if !matches!(
            draft.draft_type,
            DraftType::Message | DraftType::ContactResource
        ) {
            return Err(ExecuteError::NotDeliverable {
                draft_id: draft_id.to_string(),
                draft_type: draft.draft_type.to_string(),
            });
        }

        self.drafts
            .transition(&org.org_id, draft_id, DraftStatus::Pending, DraftStatus::Sent)
            .await
            .map_err(|err| match err {
                ridgeline_core::error::StoreError::NotFound(_) => {
                    ExecuteError::DraftNotFound(draft_id.to_string())
                }
                other => other.into(),
            })?;
        let draft = self
            .drafts
            .get(&org.org_id, draft_id)
            .await?
            .ok_or_else(|| ExecuteError::DraftNotFound(draft_id.to_string()))?;
        debug!(draft_id = %draft.id, "Draft marked sent");
        Ok(draft)
    }

    async fn apply(
        &self,
        org: &OrgContext,
        draft: &Draft,
        action: &Action,
    ) -> Result<(), ExecuteError> {
        match action {
            Action::SendMessage {
                channel, recipient, ..
            } => {
                let (subject, body) = action.render();
                let mut note = format!(
                    "Sent {} to {}: {}",
                    channel.as_str(),
                    recipient.as_str(),
                    body
                );
                if let Some(subject) = subject {
                    note = format!(
                        "Sent {} to {} (subject: {}): {}",
                        channel.as_str(),
                        recipient.as_str(),
                        subject,
                        body
                    );
                }
                self.crm
                    .create_note(&org.org_id, &draft.contact_id, &note)
                    .await?;
            }

            Action::ProgressTask {
                stage_name,
                next_task_type,
                custom_task_name,
                due_date,
            } => {
                let stages = self.crm.list_stages(&org.org_id).await?;
                let stage = stages
                    .iter()
                    .find(|s| s.name.eq_ignore_ascii_case(stage_name))
                    .ok_or_else(|| ExecuteError::UnresolvedStage(stage_name.clone()))?;

                self.crm
                    .update_contact_stage(&org.org_id, &draft.contact_id, &stage.id)
                    .await?;

                if let Some(task_id) = &draft.task_id {
                    self.crm.complete_task(&org.org_id, task_id).await?;
                }

                let task_type = next_task_type
                    .clone()
                    .or_else(|| stage.default_task_type.clone());
                if let Some(task_type) = task_type {
                    let name = custom_task_name
                        .clone()
                        .unwrap_or_else(|| display_task_name(&task_type));
                    let due = due_date.unwrap_or_else(|| {
                        self.scheduling.due_in_business_days(
                            Utc::now().date_naive(),
                            DEFAULT_TASK_DUE_BUSINESS_DAYS,
                        )
                    });
                    self.crm
                        .create_task(&org.org_id, &draft.contact_id, &task_type, &name, Some(due))
                        .await?;
                }

                self.crm
                    .create_note(
                        &org.org_id,
                        &draft.contact_id,
                        &format!("Moved to stage '{}'", stage.name),
                    )
                    .await?;
            }

            Action::AddNote { content } => {
                self.crm
                    .create_note(&org.org_id, &draft.contact_id, content)
                    .await?;
            }

            Action::SetDate { date, reason } => {
                let task_id = draft
                    .task_id
                    .as_ref()
                    .ok_or_else(|| ExecuteError::MissingTask(draft.id.clone()))?;
                self.crm
                    .reschedule_task(&org.org_id, task_id, *date)
                    .await?;
                self.crm
                    .create_note(
                        &org.org_id,
                        &draft.contact_id,
                        &format!("Rescheduled task to {date}: {reason}"),
                    )
                    .await?;
            }

            Action::ScheduleAppointment {
                appointment_type,
                datetime,
                description,
            } => {
                let types = self.crm.list_appointment_types(&org.org_id).await?;
                let resolved = types
                    .iter()
                    .find(|t| t.name.eq_ignore_ascii_case(appointment_type))
                    .ok_or_else(|| {
                        ExecuteError::UnresolvedAppointmentType(appointment_type.clone())
                    })?;

                self.crm
                    .create_appointment(
                        &org.org_id,
                        &draft.contact_id,
                        &resolved.id,
                        *datetime,
                        description.as_deref(),
                    )
                    .await?;

                self.crm
                    .create_note(
                        &org.org_id,
                        &draft.contact_id,
                        &format!(
                            "Scheduled '{}' appointment for {}",
                            resolved.name,
                            datetime.format("%Y-%m-%d %H:%M")
                        ),
                    )
                    .await?;
            }

            Action::ContactResource {
                company,
                contact_name,
                channel,
                body,
                subject,
                ..
            } => {
                let who = match contact_name {
                    Some(name) => format!("{name} at {company}"),
                    None => company.clone(),
                };
                let note = match subject {
                    Some(subject) => {
                        format!("Contacted {who} via {channel} (subject: {subject}): {body}")
                    }
                    None => format!("Contacted {who} via {channel}: {body}"),
                };
                self.crm
                    .create_note(&org.org_id, &draft.contact_id, &note)
                    .await?;
            }
        }
        Ok(())
    }
}

/// "follow_up" becomes "Follow up", matching how the CRM titles tasks.
fn display_task_name(task_type: &str) -> String {
    let human = task_type.replace('_', " ");
    let mut chars = human.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => human,
    }
}
