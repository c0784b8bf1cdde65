//! CRM collaborator records and storage contracts.
//!
//! Contact/task/note/stage/appointment storage is an external collaborator
//! with a narrow contract: simple CRUD calls, no cross-call transactional
//! guarantee beyond "note always recorded after a successful primary
//! effect". The `CrmStore` trait is that contract; implementations live in
//! the storage crate.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use crate::error::StoreError;

/// A CRM contact with its pipeline position and eager-loaded tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub org_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    /// Insurance carrier name, if this job involves a claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    /// Claim number — carrier emails must use this as the subject line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_number: Option<String>,
    /// Open tasks, eager-loaded with the contact
    #[serde(default)]
    pub tasks: Vec<CrmTask>,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// The first open task, if any — the one a directive usually refers to.
    pub fn active_task(&self) -> Option<&CrmTask> {
        self.tasks.iter().find(|t| !t.completed)
    }
}

/// A scheduled piece of work attached to a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmTask {
    pub id: String,
    pub contact_id: String,
    /// Task type (e.g., "inspection", "follow_up", "adjuster_meeting")
    pub task_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
}

/// A pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    /// Task type opened by default when a contact enters this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_type: Option<String>,
}

/// A note on a contact's record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub contact_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A configured appointment type (e.g., "Roof Inspection").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentType {
    pub id: String,
    pub name: String,
}

/// A scheduled appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub contact_id: String,
    pub appointment_type_id: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A third-party resource contact (adjuster, supplier, subcontractor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContact {
    pub id: String,
    pub name: String,
    pub company: String,
    #[serde(default)]
    pub role: String,
    /// Resource category (e.g., "carrier", "supplier", "crew")
    #[serde(default)]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A reusable message template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: String,
    pub name: String,
    /// Task type this template applies to; `None` means "general"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    pub body: String,
}

/// One entry in a contact's activity timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: String,
    pub contact_id: String,
    /// Entry kind (e.g., "note", "stage_change", "message")
    pub kind: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// A file attached to a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub contact_id: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

/// The CRM storage contract consumed by the engine.
#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Read a contact with stage/tasks eagerly loaded.
    async fn get_contact(
        &self,
        org_id: &str,
        contact_id: &str,
    ) -> Result<Option<Contact>, StoreError>;

    /// Move a contact to a different pipeline stage.
    async fn update_contact_stage(
        &self,
        org_id: &str,
        contact_id: &str,
        stage_id: &str,
    ) -> Result<(), StoreError>;

    /// Write a note on a contact's record.
    async fn create_note(
        &self,
        org_id: &str,
        contact_id: &str,
        content: &str,
    ) -> Result<Note, StoreError>;

    /// Mark a task completed.
    async fn complete_task(&self, org_id: &str, task_id: &str) -> Result<(), StoreError>;

    /// Open a new task on a contact.
    async fn create_task(
        &self,
        org_id: &str,
        contact_id: &str,
        task_type: &str,
        name: &str,
        due_date: Option<NaiveDate>,
    ) -> Result<CrmTask, StoreError>;

    /// Move a task's due date.
    async fn reschedule_task(
        &self,
        org_id: &str,
        task_id: &str,
        due_date: NaiveDate,
    ) -> Result<(), StoreError>;

    /// Create an appointment. Implementations may reject invalid
    /// type/time combinations with `StoreError::Validation`.
    async fn create_appointment(
        &self,
        org_id: &str,
        contact_id: &str,
        appointment_type_id: &str,
        scheduled_at: DateTime<Utc>,
        description: Option<&str>,
    ) -> Result<Appointment, StoreError>;

    /// All pipeline stages configured for the organization.
    async fn list_stages(&self, org_id: &str) -> Result<Vec<Stage>, StoreError>;

    /// All configured appointment types.
    async fn list_appointment_types(
        &self,
        org_id: &str,
    ) -> Result<Vec<AppointmentType>, StoreError>;

    /// The organization's resource-contact directory.
    async fn list_resource_contacts(
        &self,
        org_id: &str,
    ) -> Result<Vec<ResourceContact>, StoreError>;

    /// The organization's message templates.
    async fn list_templates(&self, org_id: &str) -> Result<Vec<MessageTemplate>, StoreError>;

    /// The most recent timeline entries for a contact, newest first.
    async fn recent_timeline(
        &self,
        org_id: &str,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<TimelineEntry>, StoreError>;

    /// Files attached to a contact.
    async fn list_documents(
        &self,
        org_id: &str,
        contact_id: &str,
    ) -> Result<Vec<DocumentRef>, StoreError>;
}

/// Scheduling collaborator — maps "N business days out" to a concrete
/// date. The engine treats the real calculator as external; this trait is
/// its narrow contract.
pub trait Scheduling: Send + Sync {
    fn due_in_business_days(&self, from: NaiveDate, days: u32) -> NaiveDate;
}

/// Default scheduler: skips Saturdays and Sundays.
pub struct WeekdayScheduler;

impl Scheduling for WeekdayScheduler {
    fn due_in_business_days(&self, from: NaiveDate, days: u32) -> NaiveDate {
        let mut date = from;
        let mut remaining = days;
        while remaining > 0 {
            date = date.succ_opt().unwrap_or(date);
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                remaining -= 1;
            }
        }
        date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_trims_missing_parts() {
        let contact = Contact {
            id: "c1".into(),
            org_id: "org-1".into(),
            first_name: "Maria".into(),
            last_name: "".into(),
            phone: None,
            email: None,
            address: None,
            stage_id: None,
            carrier: None,
            claim_number: None,
            tasks: vec![],
        };
        assert_eq!(contact.full_name(), "Maria");
    }

    #[test]
    fn active_task_skips_completed() {
        let mut contact = Contact {
            id: "c1".into(),
            org_id: "org-1".into(),
            first_name: "Maria".into(),
            last_name: "Lopez".into(),
            phone: None,
            email: None,
            address: None,
            stage_id: None,
            carrier: None,
            claim_number: None,
            tasks: vec![],
        };
        contact.tasks.push(CrmTask {
            id: "t1".into(),
            contact_id: "c1".into(),
            task_type: "inspection".into(),
            name: "Inspect roof".into(),
            due_date: None,
            completed: true,
        });
        contact.tasks.push(CrmTask {
            id: "t2".into(),
            contact_id: "c1".into(),
            task_type: "follow_up".into(),
            name: "Follow up".into(),
            due_date: None,
            completed: false,
        });
        assert_eq!(contact.active_task().unwrap().id, "t2");
    }

    #[test]
    fn weekday_scheduler_skips_weekends() {
        // 2025-01-03 is a Friday; 3 business days later is Wednesday 01-08
        let friday = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        let due = WeekdayScheduler.due_in_business_days(friday, 3);
        assert_eq!(due, NaiveDate::from_ymd_opt(2025, 1, 8).unwrap());
    }

    #[test]
    fn weekday_scheduler_zero_days_is_identity() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_eq!(WeekdayScheduler.due_in_business_days(day, 0), day);
    }
}
