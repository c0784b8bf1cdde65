//! In-memory stores for tests and local development.
//!
//! `InMemoryDraftStore` mirrors the SQLite store's transition semantics
//! exactly, including conflict behavior, so the dispatch and gateway
//! crates test against it without a database file. `InMemoryCrmStore` is
//! the stand-in CRM: seeded through builder methods, with read accessors
//! so tests can assert on recorded side effects.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ridgeline_core::crm::{
    Appointment, AppointmentType, Contact, CrmStore, CrmTask, DocumentRef, MessageTemplate, Note,
    ResourceContact, Stage, TimelineEntry,
};
use ridgeline_core::draft::{Draft, DraftPatch, DraftStatus, DraftStore};
use ridgeline_core::error::StoreError;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Draft store backed by a vector behind a lock.
#[derive(Default)]
pub struct InMemoryDraftStore {
    drafts: RwLock<Vec<Draft>>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn create(&self, draft: Draft) -> Result<Draft, StoreError> {
        let mut drafts = self
            .drafts
            .write()
            .map_err(|_| StoreError::Storage("draft lock poisoned".into()))?;
        drafts.push(draft.clone());
        Ok(draft)
    }

    async fn get(&self, org_id: &str, id: &str) -> Result<Option<Draft>, StoreError> {
        let drafts = self
            .drafts
            .read()
            .map_err(|_| StoreError::Storage("draft lock poisoned".into()))?;
        Ok(drafts
            .iter()
            .find(|d| d.org_id == org_id && d.id == id)
            .cloned())
    }

    async fn list(
        &self,
        org_id: &str,
        status: Option<DraftStatus>,
    ) -> Result<Vec<Draft>, StoreError> {
        let drafts = self
            .drafts
            .read()
            .map_err(|_| StoreError::Storage("draft lock poisoned".into()))?;
        let mut matched: Vec<Draft> = drafts
            .iter()
            .filter(|d| d.org_id == org_id && status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn claim_queued(&self, org_id: &str) -> Result<Vec<Draft>, StoreError> {
        let mut drafts = self
            .drafts
            .write()
            .map_err(|_| StoreError::Storage("draft lock poisoned".into()))?;
        let mut claimed = Vec::new();
        for draft in drafts.iter_mut() {
            if draft.org_id == org_id && draft.status == DraftStatus::Queued {
                draft.status = DraftStatus::Composing;
                draft.updated_at = Utc::now();
                claimed.push(draft.clone());
            }
        }
        claimed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        debug!(count = claimed.len(), "Claimed queued drafts");
        Ok(claimed)
    }

    async fn update(&self, draft: &Draft) -> Result<(), StoreError> {
        let mut drafts = self
            .drafts
            .write()
            .map_err(|_| StoreError::Storage("draft lock poisoned".into()))?;
        let stored = drafts
            .iter_mut()
            .find(|d| d.org_id == draft.org_id && d.id == draft.id)
            .ok_or_else(|| StoreError::NotFound(format!("draft {}", draft.id)))?;
        if stored.status == DraftStatus::Sent {
            return Err(StoreError::Conflict(format!(
                "draft {} is already sent",
                draft.id
            )));
        }
        *stored = draft.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn transition(
        &self,
        org_id: &str,
        id: &str,
        from: DraftStatus,
        to: DraftStatus,
    ) -> Result<(), StoreError> {
        let mut drafts = self
            .drafts
            .write()
            .map_err(|_| StoreError::Storage("draft lock poisoned".into()))?;
        let stored = drafts
            .iter_mut()
            .find(|d| d.org_id == org_id && d.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("draft {id}")))?;
        if stored.status != from {
            return Err(StoreError::Conflict(format!(
                "draft {id} is {}, expected {from}",
                stored.status
            )));
        }
        stored.status = to;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn patch(&self, org_id: &str, id: &str, patch: DraftPatch) -> Result<Draft, StoreError> {
        let mut drafts = self
            .drafts
            .write()
            .map_err(|_| StoreError::Storage("draft lock poisoned".into()))?;
        let stored = drafts
            .iter_mut()
            .find(|d| d.org_id == org_id && d.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("draft {id}")))?;
        if stored.status == DraftStatus::Sent {
            return Err(StoreError::Conflict(format!("draft {id} is already sent")));
        }
        if let Some(body) = patch.body {
            stored.body = body;
        }
        if let Some(subject) = patch.subject {
            stored.subject = Some(subject);
        }
        if let Some(channel) = patch.channel {
            stored.channel = channel;
        }
        if let Some(status) = patch.status {
            stored.status = status;
        }
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, org_id: &str, id: &str) -> Result<(), StoreError> {
        let mut drafts = self
            .drafts
            .write()
            .map_err(|_| StoreError::Storage("draft lock poisoned".into()))?;
        let pos = drafts
            .iter()
            .position(|d| d.org_id == org_id && d.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("draft {id}")))?;
        if drafts[pos].status != DraftStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "draft {id} is {}, only pending drafts can be discarded",
                drafts[pos].status
            )));
        }
        drafts.remove(pos);
        Ok(())
    }
}

/// Seedable in-memory CRM. All mutation effects are recorded and readable
/// through accessors.
#[derive(Default)]
pub struct InMemoryCrmStore {
    contacts: RwLock<Vec<Contact>>,
    stages: RwLock<Vec<Stage>>,
    appointment_types: RwLock<Vec<AppointmentType>>,
    resources: RwLock<Vec<ResourceContact>>,
    templates: RwLock<Vec<MessageTemplate>>,
    timeline: RwLock<Vec<TimelineEntry>>,
    documents: RwLock<Vec<DocumentRef>>,
    notes: RwLock<Vec<Note>>,
    appointments: RwLock<Vec<Appointment>>,
}

impl InMemoryCrmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contact(self, contact: Contact) -> Self {
        if let Ok(mut contacts) = self.contacts.write() {
            contacts.push(contact);
        }
        self
    }

    pub fn with_stage(self, stage: Stage) -> Self {
        if let Ok(mut stages) = self.stages.write() {
            stages.push(stage);
        }
        self
    }

    pub fn with_appointment_type(self, appointment_type: AppointmentType) -> Self {
        if let Ok(mut types) = self.appointment_types.write() {
            types.push(appointment_type);
        }
        self
    }

    pub fn with_resource(self, resource: ResourceContact) -> Self {
        if let Ok(mut resources) = self.resources.write() {
            resources.push(resource);
        }
        self
    }

    pub fn with_template(self, template: MessageTemplate) -> Self {
        if let Ok(mut templates) = self.templates.write() {
            templates.push(template);
        }
        self
    }

    pub fn with_timeline_entry(self, entry: TimelineEntry) -> Self {
        if let Ok(mut timeline) = self.timeline.write() {
            timeline.push(entry);
        }
        self
    }

    pub fn with_document(self, document: DocumentRef) -> Self {
        if let Ok(mut documents) = self.documents.write() {
            documents.push(document);
        }
        self
    }

    /// Notes recorded so far, for test assertions.
    pub fn notes(&self) -> Vec<Note> {
        self.notes.read().map(|n| n.clone()).unwrap_or_default()
    }

    /// Appointments recorded so far, for test assertions.
    pub fn appointments(&self) -> Vec<Appointment> {
        self.appointments
            .read()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    /// Current contact snapshot, for test assertions.
    pub fn contact(&self, contact_id: &str) -> Option<Contact> {
        self.contacts
            .read()
            .ok()
            .and_then(|contacts| contacts.iter().find(|c| c.id == contact_id).cloned())
    }

    fn lock_err() -> StoreError {
        StoreError::Storage("crm lock poisoned".into())
    }
}

#[async_trait]
impl CrmStore for InMemoryCrmStore {
    async fn get_contact(
        &self,
        org_id: &str,
        contact_id: &str,
    ) -> Result<Option<Contact>, StoreError> {
        let contacts = self.contacts.read().map_err(|_| Self::lock_err())?;
        Ok(contacts
            .iter()
            .find(|c| c.org_id == org_id && c.id == contact_id)
            .cloned())
    }

    async fn update_contact_stage(
        &self,
        org_id: &str,
        contact_id: &str,
        stage_id: &str,
    ) -> Result<(), StoreError> {
        let mut contacts = self.contacts.write().map_err(|_| Self::lock_err())?;
        let contact = contacts
            .iter_mut()
            .find(|c| c.org_id == org_id && c.id == contact_id)
            .ok_or_else(|| StoreError::NotFound(format!("contact {contact_id}")))?;
        contact.stage_id = Some(stage_id.to_string());
        Ok(())
    }

    async fn create_note(
        &self,
        _org_id: &str,
        contact_id: &str,
        content: &str,
    ) -> Result<Note, StoreError> {
        let note = Note {
            id: Uuid::new_v4().to_string(),
            contact_id: contact_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let mut notes = self.notes.write().map_err(|_| Self::lock_err())?;
        notes.push(note.clone());
        Ok(note)
    }

    async fn complete_task(&self, org_id: &str, task_id: &str) -> Result<(), StoreError> {
        let mut contacts = self.contacts.write().map_err(|_| Self::lock_err())?;
        for contact in contacts.iter_mut().filter(|c| c.org_id == org_id) {
            if let Some(task) = contact.tasks.iter_mut().find(|t| t.id == task_id) {
                task.completed = true;
                return Ok(());
            }
        }
        Err(StoreError::NotFound(format!("task {task_id}")))
    }

    async fn create_task(
        &self,
        org_id: &str,
        contact_id: &str,
        task_type: &str,
        name: &str,
        due_date: Option<NaiveDate>,
    ) -> Result<CrmTask, StoreError> {
        let mut contacts = self.contacts.write().map_err(|_| Self::lock_err())?;
        let contact = contacts
            .iter_mut()
            .find(|c| c.org_id == org_id && c.id == contact_id)
            .ok_or_else(|| StoreError::NotFound(format!("contact {contact_id}")))?;
        let task = CrmTask {
            id: Uuid::new_v4().to_string(),
            contact_id: contact_id.to_string(),
            task_type: task_type.to_string(),
            name: name.to_string(),
            due_date,
            completed: false,
        };
        contact.tasks.push(task.clone());
        Ok(task)
    }

    async fn reschedule_task(
        &self,
        org_id: &str,
        task_id: &str,
        due_date: NaiveDate,
    ) -> Result<(), StoreError> {
        let mut contacts = self.contacts.write().map_err(|_| Self::lock_err())?;
        for contact in contacts.iter_mut().filter(|c| c.org_id == org_id) {
            if let Some(task) = contact.tasks.iter_mut().find(|t| t.id == task_id) {
                task.due_date = Some(due_date);
                return Ok(());
            }
        }
        Err(StoreError::NotFound(format!("task {task_id}")))
    }

    async fn create_appointment(
        &self,
        _org_id: &str,
        contact_id: &str,
        appointment_type_id: &str,
        scheduled_at: DateTime<Utc>,
        description: Option<&str>,
    ) -> Result<Appointment, StoreError> {
        let appointment = Appointment {
            id: Uuid::new_v4().to_string(),
            contact_id: contact_id.to_string(),
            appointment_type_id: appointment_type_id.to_string(),
            scheduled_at,
            description: description.map(String::from),
        };
        let mut appointments = self.appointments.write().map_err(|_| Self::lock_err())?;
        appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn list_stages(&self, _org_id: &str) -> Result<Vec<Stage>, StoreError> {
        Ok(self
            .stages
            .read()
            .map_err(|_| Self::lock_err())?
            .clone())
    }

    async fn list_appointment_types(
        &self,
        _org_id: &str,
    ) -> Result<Vec<AppointmentType>, StoreError> {
        Ok(self
            .appointment_types
            .read()
            .map_err(|_| Self::lock_err())?
            .clone())
    }

    async fn list_resource_contacts(
        &self,
        _org_id: &str,
    ) -> Result<Vec<ResourceContact>, StoreError> {
        Ok(self
            .resources
            .read()
            .map_err(|_| Self::lock_err())?
            .clone())
    }

    async fn list_templates(&self, _org_id: &str) -> Result<Vec<MessageTemplate>, StoreError> {
        Ok(self
            .templates
            .read()
            .map_err(|_| Self::lock_err())?
            .clone())
    }

    async fn recent_timeline(
        &self,
        _org_id: &str,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<TimelineEntry>, StoreError> {
        let timeline = self.timeline.read().map_err(|_| Self::lock_err())?;
        let mut entries: Vec<TimelineEntry> = timeline
            .iter()
            .filter(|e| e.contact_id == contact_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn list_documents(
        &self,
        _org_id: &str,
        contact_id: &str,
    ) -> Result<Vec<DocumentRef>, StoreError> {
        let documents = self.documents.read().map_err(|_| Self::lock_err())?;
        Ok(documents
            .iter()
            .filter(|d| d.contact_id == contact_id)
            .cloned()
            .collect())
    }
}
