//! Draft — the persisted, reviewable unit of work — and the Action
//! vocabulary the reasoning step may emit.
//!
//! A directive is ephemeral; it is immediately wrapped into a Draft that
//! moves through `queued → composing → pending → sent`. The action payload
//! is a tagged union with one variant per draft type, so "wrong field for
//! this action type" cannot be represented.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::StoreError;

/// A free-text instruction from a user about one contact. Not persisted
/// on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub contact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// The directive text, e.g. "text him and ask about the quote"
    pub text: String,
}

/// Draft lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    /// Created by the dispatcher, waiting for composition
    Queued,
    /// Claimed by the compose loop
    Composing,
    /// Action decided (or fallback written), awaiting human review
    Pending,
    /// Executed or dispatched — terminal and immutable
    Sent,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Queued => "queued",
            DraftStatus::Composing => "composing",
            DraftStatus::Pending => "pending",
            DraftStatus::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(DraftStatus::Queued),
            "composing" => Some(DraftStatus::Composing),
            "pending" => Some(DraftStatus::Pending),
            "sent" => Some(DraftStatus::Sent),
            _ => None,
        }
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of draft types, mirroring the action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftType {
    Message,
    ProgressTask,
    AddNote,
    SetDate,
    ScheduleAppointment,
    ContactResource,
}

impl DraftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftType::Message => "message",
            DraftType::ProgressTask => "progress_task",
            DraftType::AddNote => "add_note",
            DraftType::SetDate => "set_date",
            DraftType::ScheduleAppointment => "schedule_appointment",
            DraftType::ContactResource => "contact_resource",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message" => Some(DraftType::Message),
            "progress_task" => Some(DraftType::ProgressTask),
            "add_note" => Some(DraftType::AddNote),
            "set_date" => Some(DraftType::SetDate),
            "schedule_appointment" => Some(DraftType::ScheduleAppointment),
            "contact_resource" => Some(DraftType::ContactResource),
            _ => None,
        }
    }
}

impl std::fmt::Display for DraftType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound channel for a message action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageChannel {
    Sms,
    Email,
    Both,
}

impl MessageChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageChannel::Sms => "sms",
            MessageChannel::Email => "email",
            MessageChannel::Both => "both",
        }
    }
}

/// Who a message-type action is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    Customer,
    Carrier,
    Resource,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientType::Customer => "customer",
            RecipientType::Carrier => "carrier",
            RecipientType::Resource => "resource",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(RecipientType::Customer),
            "carrier" => Some(RecipientType::Carrier),
            "resource" => Some(RecipientType::Resource),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecipientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed decision produced by the compose loop, ready for review and
/// execution. One variant per draft type; the executor matches
/// exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SendMessage {
        channel: MessageChannel,
        recipient: RecipientType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        /// Separate bodies when channel is `both`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sms_body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email_body: Option<String>,
    },
    ProgressTask {
        /// Stage name, resolved to an id against the live stage list
        stage_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_task_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        custom_task_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<NaiveDate>,
    },
    AddNote {
        content: String,
    },
    SetDate {
        /// Already resolved against "today" by the reasoning step
        date: NaiveDate,
        reason: String,
    },
    ScheduleAppointment {
        /// Must match a configured appointment type name
        appointment_type: String,
        datetime: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    ContactResource {
        /// Resolved from a prior tool lookup, never invented
        company: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact_name: Option<String>,
        /// Resource channel, free-form (e.g. "email", "phone")
        channel: String,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        /// Present when the resource is the insurance carrier
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient: Option<RecipientType>,
    },
}

impl Action {
    pub fn draft_type(&self) -> DraftType {
        match self {
            Action::SendMessage { .. } => DraftType::Message,
            Action::ProgressTask { .. } => DraftType::ProgressTask,
            Action::AddNote { .. } => DraftType::AddNote,
            Action::SetDate { .. } => DraftType::SetDate,
            Action::ScheduleAppointment { .. } => DraftType::ScheduleAppointment,
            Action::ContactResource { .. } => DraftType::ContactResource,
        }
    }

    /// The draft-row channel label. Meaning depends on the draft type:
    /// literal for messages, "system"/"internal" for CRM-side effects.
    pub fn channel_label(&self) -> String {
        match self {
            Action::SendMessage { channel, .. } => channel.as_str().to_string(),
            Action::ContactResource { channel, .. } => channel.clone(),
            Action::AddNote { .. } => "internal".to_string(),
            _ => "system".to_string(),
        }
    }

    pub fn recipient(&self) -> RecipientType {
        match self {
            Action::SendMessage { recipient, .. } => *recipient,
            Action::ContactResource { recipient, .. } => {
                recipient.unwrap_or(RecipientType::Resource)
            }
            _ => RecipientType::Customer,
        }
    }

    /// Human-readable rendering: `(subject, body)`. For message-type
    /// actions this is the literal text to send; for CRM-side effects it
    /// is display-only — the executor acts on the payload, not this text.
    pub fn render(&self) -> (Option<String>, String) {
        match self {
            Action::SendMessage {
                body,
                subject,
                sms_body,
                email_body,
                ..
            } => {
                let text = body
                    .clone()
                    .or_else(|| sms_body.clone())
                    .or_else(|| email_body.clone())
                    .unwrap_or_default();
                (subject.clone(), text)
            }
            Action::ProgressTask {
                stage_name,
                next_task_type,
                custom_task_name,
                due_date,
            } => {
                let mut text = format!("Move to stage '{stage_name}'");
                if let Some(name) = custom_task_name {
                    text.push_str(&format!(" and open task '{name}'"));
                } else if let Some(kind) = next_task_type {
                    text.push_str(&format!(" and open a {kind} task"));
                }
                if let Some(date) = due_date {
                    text.push_str(&format!(" (due {date})"));
                }
                (None, text)
            }
            Action::AddNote { content } => (None, content.clone()),
            Action::SetDate { date, reason } => {
                (None, format!("Reschedule task to {date}: {reason}"))
            }
            Action::ScheduleAppointment {
                appointment_type,
                datetime,
                description,
            } => {
                let mut text = format!(
                    "Schedule '{appointment_type}' appointment for {}",
                    datetime.format("%Y-%m-%d %H:%M")
                );
                if let Some(desc) = description {
                    text.push_str(&format!(": {desc}"));
                }
                (None, text)
            }
            Action::ContactResource { body, subject, .. } => (subject.clone(), body.clone()),
        }
    }
}

/// The central persisted entity: one row per pending action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub org_id: String,
    pub contact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Original free text, retained for audit and regeneration
    pub directive: String,
    pub draft_type: DraftType,
    pub channel: String,
    pub recipient: RecipientType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    /// The structured payload the executor acts on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    /// Wrap a directive into a queued draft. Type/channel/body are
    /// placeholders until composition decides the action.
    pub fn queued(org_id: impl Into<String>, directive: &Directive) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.into(),
            contact_id: directive.contact_id.clone(),
            task_id: directive.task_id.clone(),
            directive: directive.text.clone(),
            draft_type: DraftType::Message,
            channel: "system".into(),
            recipient: RecipientType::Customer,
            subject: None,
            body: String::new(),
            action: None,
            status: DraftStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }

    /// Write a decided action onto this draft and move it to `pending`.
    pub fn apply_action(&mut self, action: Action) {
        self.draft_type = action.draft_type();
        self.channel = action.channel_label();
        self.recipient = action.recipient();
        let (subject, body) = action.render();
        self.subject = subject;
        self.body = body;
        self.action = Some(action);
        self.status = DraftStatus::Pending;
        self.updated_at = Utc::now();
    }

    /// Create a pending sibling draft: new identity, shared
    /// contact/task/directive, carrying one additional action from the
    /// same compose attempt.
    pub fn sibling(&self, action: Action) -> Draft {
        let now = Utc::now();
        let mut draft = Draft {
            id: Uuid::new_v4().to_string(),
            org_id: self.org_id.clone(),
            contact_id: self.contact_id.clone(),
            task_id: self.task_id.clone(),
            directive: self.directive.clone(),
            draft_type: DraftType::Message,
            channel: "system".into(),
            recipient: RecipientType::Customer,
            subject: None,
            body: String::new(),
            action: None,
            status: DraftStatus::Queued,
            created_at: now,
            updated_at: now,
        };
        draft.apply_action(action);
        draft
    }
}

/// Editable fields a reviewer may patch before approval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DraftStatus>,
}

/// Draft persistence contract. Implementations live in the storage crate.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Persist a new draft.
    async fn create(&self, draft: Draft) -> Result<Draft, StoreError>;

    /// Read one draft, scoped by organization.
    async fn get(&self, org_id: &str, id: &str) -> Result<Option<Draft>, StoreError>;

    /// List drafts, optionally filtered by status, newest first.
    async fn list(
        &self,
        org_id: &str,
        status: Option<DraftStatus>,
    ) -> Result<Vec<Draft>, StoreError>;

    /// Bulk-transition every queued draft to `composing` and return the
    /// claimed set in creation order. Prevents double pickup when two
    /// dispatcher invocations race on the same queue.
    async fn claim_queued(&self, org_id: &str) -> Result<Vec<Draft>, StoreError>;

    /// Overwrite a draft's mutable fields, scoped by id. Rejected with
    /// `StoreError::Conflict` if the stored draft is already sent.
    async fn update(&self, draft: &Draft) -> Result<(), StoreError>;

    /// Conditionally move a draft from one status to another. Returns
    /// `StoreError::Conflict` if the stored status does not match `from`.
    async fn transition(
        &self,
        org_id: &str,
        id: &str,
        from: DraftStatus,
        to: DraftStatus,
    ) -> Result<(), StoreError>;

    /// Apply a reviewer's edit to a pending draft.
    async fn patch(&self, org_id: &str, id: &str, patch: DraftPatch) -> Result<Draft, StoreError>;

    /// Discard a pending draft entirely. Only `pending` drafts may be
    /// discarded; anything else returns `StoreError::Conflict`.
    async fn delete(&self, org_id: &str, id: &str) -> Result<(), StoreError>;
}
