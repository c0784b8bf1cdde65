//! End-to-end tests for the directive pipeline: intake, queue processing,
//! review, and execution against in-memory stores with a scripted
//! reasoning backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use ridgeline_assistant::ComposeLoop;
use ridgeline_core::backend::{BackendRequest, BackendResponse, ReasoningBackend};
use ridgeline_core::crm::{
    AppointmentType, Contact, CrmTask, ResourceContact, Scheduling, Stage, WeekdayScheduler,
};
use ridgeline_core::draft::{
    Action, Directive, DraftStatus, DraftType, RecipientType,
};
use ridgeline_core::error::{BackendError, ExecuteError};
use ridgeline_core::message::ChatMessage;
use ridgeline_core::{DraftStore, OrgContext};
use ridgeline_dispatch::{ActionExecutor, BatchDispatcher, DispatchError};
use ridgeline_storage::{InMemoryCrmStore, InMemoryDraftStore};

// ── Mock Backend ─────────────────────────────────────────────────────────

/// Returns the same canned answer for every compose conversation.
struct UniformBackend {
    answer: String,
}

impl UniformBackend {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for UniformBackend {
    fn name(&self) -> &str {
        "uniform_mock"
    }

    async fn complete(&self, _request: BackendRequest) -> Result<BackendResponse, BackendError> {
        Ok(BackendResponse {
            message: ChatMessage::assistant(&self.answer),
            usage: None,
            model: "mock".into(),
        })
    }
}

/// Fails every call, for fallback-path tests.
struct FailingBackend;

#[async_trait::async_trait]
impl ReasoningBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: BackendRequest) -> Result<BackendResponse, BackendError> {
        Err(BackendError::ApiError {
            status_code: 500,
            message: "backend exploded".into(),
        })
    }
}

/// Records how many calls arrived, answering uniformly.
struct CountingBackend {
    answer: String,
    calls: Mutex<usize>,
}

impl CountingBackend {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.into(),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting_mock"
    }

    async fn complete(&self, _request: BackendRequest) -> Result<BackendResponse, BackendError> {
        *self.calls.lock().unwrap() += 1;
        Ok(BackendResponse {
            message: ChatMessage::assistant(&self.answer),
            usage: None,
            model: "mock".into(),
        })
    }
}

/// Tracks how many compose calls run at once, answering uniformly after a
/// short pause so overlapping calls actually overlap.
struct InFlightBackend {
    answer: String,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightBackend {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.into(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for InFlightBackend {
    fn name(&self) -> &str {
        "in_flight_mock"
    }

    async fn complete(&self, _request: BackendRequest) -> Result<BackendResponse, BackendError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(BackendResponse {
            message: ChatMessage::assistant(&self.answer),
            usage: None,
            model: "mock".into(),
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn org() -> OrgContext {
    OrgContext::new("org-1", "owner-1", "Ray Delgado", "Summit Roofing")
}

fn miguel() -> Contact {
    Contact {
        id: "c-miguel".into(),
        org_id: "org-1".into(),
        first_name: "Miguel".into(),
        last_name: "Santos".into(),
        phone: Some("555-0142".into()),
        email: Some("miguel@example.com".into()),
        address: Some("18 Cedar Ln".into()),
        stage_id: Some("s-inspection".into()),
        carrier: Some("Acme Insurance".into()),
        claim_number: Some("CLM-2214".into()),
        tasks: vec![CrmTask {
            id: "t-inspect".into(),
            contact_id: "c-miguel".into(),
            task_type: "inspection".into(),
            name: "Inspect roof".into(),
            due_date: None,
            completed: false,
        }],
    }
}

fn crm() -> InMemoryCrmStore {
    InMemoryCrmStore::new()
        .with_contact(miguel())
        .with_stage(Stage {
            id: "s-inspection".into(),
            name: "Inspection".into(),
            default_task_type: Some("inspection".into()),
        })
        .with_stage(Stage {
            id: "s-estimate".into(),
            name: "Estimate".into(),
            default_task_type: Some("estimate".into()),
        })
        .with_appointment_type(AppointmentType {
            id: "at-roof".into(),
            name: "Roof Inspection".into(),
        })
        .with_resource(ResourceContact {
            id: "r-adjuster".into(),
            name: "Dana Reeve".into(),
            company: "Acme Insurance".into(),
            role: "Claims adjuster".into(),
            resource_type: "carrier".into(),
            phone: None,
            email: Some("dana@acme.example".into()),
        })
}

fn directive(text: &str) -> Directive {
    Directive {
        contact_id: "c-miguel".into(),
        task_id: Some("t-inspect".into()),
        text: text.into(),
    }
}

struct Pipeline {
    drafts: Arc<InMemoryDraftStore>,
    crm: Arc<InMemoryCrmStore>,
    dispatcher: BatchDispatcher,
    executor: ActionExecutor,
}

fn pipeline(backend: Arc<dyn ReasoningBackend>) -> Pipeline {
    let drafts = Arc::new(InMemoryDraftStore::new());
    let crm = Arc::new(crm());
    let compose = Arc::new(ComposeLoop::new(backend, "mock-model", 0.3));
    let dispatcher = BatchDispatcher::new(drafts.clone(), crm.clone(), compose);
    let executor = ActionExecutor::new(drafts.clone(), crm.clone(), Arc::new(WeekdayScheduler));
    Pipeline {
        drafts,
        crm,
        dispatcher,
        executor,
    }
}

// ── Intake boundaries ────────────────────────────────────────────────────

#[tokio::test]
async fn empty_batch_is_rejected() {
    let p = pipeline(Arc::new(UniformBackend::new("{}")));
    let err = p.dispatcher.enqueue(&org(), vec![]).await.unwrap_err();
    assert!(matches!(err, DispatchError::EmptyBatch));
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let p = pipeline(Arc::new(UniformBackend::new("{}")));
    let batch: Vec<Directive> = (0..51).map(|i| directive(&format!("task {i}"))).collect();
    let err = p.dispatcher.enqueue(&org(), batch).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::BatchTooLarge { got: 51, max: 50 }
    ));
}

#[tokio::test]
async fn blank_directives_are_skipped_not_queued() {
    let p = pipeline(Arc::new(UniformBackend::new("{}")));
    let report = p
        .dispatcher
        .enqueue(&org(), vec![directive("text him"), directive("   ")])
        .await
        .unwrap();
    assert_eq!(report.drafts.len(), 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn directives_without_a_contact_are_skipped() {
    let p = pipeline(Arc::new(UniformBackend::new("{}")));
    let report = p
        .dispatcher
        .enqueue(
            &org(),
            vec![
                directive("text him"),
                Directive {
                    contact_id: "".into(),
                    task_id: None,
                    text: "text him".into(),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(report.drafts.len(), 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn enqueue_returns_queued_drafts_without_composing() {
    let backend = Arc::new(CountingBackend::new("{}"));
    let p = pipeline(backend.clone());
    let report = p
        .dispatcher
        .enqueue(&org(), vec![directive("text him about shingle color")])
        .await
        .unwrap();
    assert_eq!(report.drafts[0].status, DraftStatus::Queued);
    assert_eq!(backend.calls(), 0, "intake must not call the backend");
}

// ── Scenario: single message directive ───────────────────────────────────

#[tokio::test]
async fn sms_directive_composes_and_marks_sent() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "send_message", "channel": "sms", "recipient": "customer",
            "body": "Hi Miguel, which shingle color did you land on?"}"#,
    )));
    let o = org();
    p.dispatcher
        .enqueue(&o, vec![directive("text miguel and ask about shingle color")])
        .await
        .unwrap();

    let report = p.dispatcher.process_queue(&o).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.composed, 1);
    assert_eq!(report.failed, 0);

    let pending = p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);
    let draft = &pending[0];
    assert_eq!(draft.draft_type, DraftType::Message);
    assert_eq!(draft.channel, "sms");
    assert!(draft.body.contains("shingle color"));

    let sent = p.executor.mark_sent(&o, &draft.id).await.unwrap();
    assert_eq!(sent.status, DraftStatus::Sent);

    // Terminal: a second mark-sent conflicts
    assert!(p.executor.mark_sent(&o, &draft.id).await.is_err());
}

// ── Scenario: multi-action fan-out ───────────────────────────────────────

#[tokio::test]
async fn multi_action_answer_fans_out_to_siblings() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"actions": [
            {"type": "progress_task", "stage_name": "Estimate"},
            {"type": "send_message", "channel": "sms", "recipient": "customer",
             "body": "Good news, the inspection passed. Estimate is next."}
        ]}"#,
    )));
    let o = org();
    p.dispatcher
        .enqueue(&o, vec![directive("passed inspection, move him along and let him know")])
        .await
        .unwrap();
    p.dispatcher.process_queue(&o).await.unwrap();

    let pending = p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().any(|d| d.draft_type == DraftType::ProgressTask));
    assert!(pending.iter().any(|d| d.draft_type == DraftType::Message));
    // Siblings share the originating directive and contact
    assert!(pending.iter().all(|d| d.contact_id == "c-miguel"));
    assert!(pending.iter().all(|d| d.directive.contains("passed inspection")));
}

// ── Scenario: carrier email ──────────────────────────────────────────────

#[tokio::test]
async fn carrier_email_subject_is_the_claim_number() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "send_message", "channel": "email", "recipient": "carrier",
            "subject": "Quick update on the Santos claim",
            "body": "The supplement paperwork went out today."}"#,
    )));
    let o = org();
    p.dispatcher
        .enqueue(&o, vec![directive("email the carrier that the supplement went out")])
        .await
        .unwrap();
    p.dispatcher.process_queue(&o).await.unwrap();

    let pending = p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap();
    assert_eq!(pending[0].subject.as_deref(), Some("CLM-2214"));
    assert_eq!(pending[0].recipient, RecipientType::Carrier);
}

// ── Fallback paths ───────────────────────────────────────────────────────

#[tokio::test]
async fn backend_failure_degrades_to_pending_fallback_note() {
    let p = pipeline(Arc::new(FailingBackend));
    let o = org();
    p.dispatcher
        .enqueue(&o, vec![directive("text him about the quote")])
        .await
        .unwrap();

    let report = p.dispatcher.process_queue(&o).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.composed, 0);
    assert_eq!(report.failed, 1);

    let pending = p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1, "failed directive must still surface for review");
    assert_eq!(pending[0].draft_type, DraftType::AddNote);
    assert!(pending[0].body.contains("handle manually"));
    assert!(pending[0].body.contains("text him about the quote"));
}

#[tokio::test]
async fn missing_contact_degrades_to_fallback_note() {
    let p = pipeline(Arc::new(UniformBackend::new("{}")));
    let o = org();
    p.dispatcher
        .enqueue(
            &o,
            vec![Directive {
                contact_id: "c-ghost".into(),
                task_id: None,
                text: "text the ghost".into(),
            }],
        )
        .await
        .unwrap();

    let report = p.dispatcher.process_queue(&o).await.unwrap();
    assert_eq!(report.failed, 1);

    let pending = p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap();
    assert!(pending[0].body.contains("Contact not found"));
}

#[tokio::test]
async fn one_bad_directive_does_not_poison_the_batch() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "add_note", "content": "noted as requested"}"#,
    )));
    let o = org();
    let mut batch = vec![directive("note that he prefers metal"), directive("note the color")];
    batch.push(Directive {
        contact_id: "c-ghost".into(),
        task_id: None,
        text: "text the ghost".into(),
    });
    p.dispatcher.enqueue(&o, batch).await.unwrap();

    let report = p.dispatcher.process_queue(&o).await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.composed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(
        p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap().len(),
        3
    );
}

// ── Batch processing ─────────────────────────────────────────────────────

#[tokio::test]
async fn twelve_directives_all_reach_pending() {
    let backend = Arc::new(CountingBackend::new(
        r#"{"type": "add_note", "content": "handled"}"#,
    ));
    let p = pipeline(backend.clone());
    let o = org();
    let batch: Vec<Directive> = (0..12).map(|i| directive(&format!("note item {i}"))).collect();
    p.dispatcher.enqueue(&o, batch).await.unwrap();

    let report = p.dispatcher.process_queue(&o).await.unwrap();
    assert_eq!(report.processed, 12);
    assert_eq!(report.composed, 12);
    assert_eq!(backend.calls(), 12);

    let pending = p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 12);
    assert!(p.drafts.list("org-1", Some(DraftStatus::Queued)).await.unwrap().is_empty());

    // A second pass claims nothing
    let report = p.dispatcher.process_queue(&o).await.unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn queue_processing_never_exceeds_the_chunk_width() {
    let backend = Arc::new(InFlightBackend::new(
        r#"{"type": "add_note", "content": "handled"}"#,
    ));
    let p = pipeline(backend.clone());
    let o = org();
    let batch: Vec<Directive> = (0..12).map(|i| directive(&format!("note item {i}"))).collect();
    p.dispatcher.enqueue(&o, batch).await.unwrap();

    let report = p.dispatcher.process_queue(&o).await.unwrap();
    assert_eq!(report.composed, 12);
    assert!(
        backend.peak() <= 5,
        "saw {} concurrent compose calls",
        backend.peak()
    );
    assert!(backend.peak() >= 1);
}

// ── Execution ────────────────────────────────────────────────────────────

async fn single_pending(p: &Pipeline, answer_directive: &str) -> String {
    let o = org();
    p.dispatcher
        .enqueue(&o, vec![directive(answer_directive)])
        .await
        .unwrap();
    p.dispatcher.process_queue(&o).await.unwrap();
    let pending = p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);
    pending[0].id.clone()
}

#[tokio::test]
async fn progress_task_execution_applies_crm_effects() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "progress_task", "stage_name": "estimate"}"#,
    )));
    let o = org();
    let id = single_pending(&p, "move him to estimate").await;

    let executed = p.executor.execute(&o, &id, None).await.unwrap();
    assert_eq!(executed.status, DraftStatus::Sent);

    let contact = p.crm.contact("c-miguel").unwrap();
    // Stage name resolved case-insensitively against the live list
    assert_eq!(contact.stage_id.as_deref(), Some("s-estimate"));
    // Originating task completed, stage-default task opened with a due date
    assert!(contact.tasks.iter().find(|t| t.id == "t-inspect").unwrap().completed);
    let new_task = contact.active_task().unwrap();
    assert_eq!(new_task.task_type, "estimate");
    assert!(new_task.due_date.is_some());
    // Transition note recorded
    assert!(p.crm.notes().iter().any(|n| n.content.contains("Estimate")));
}

#[tokio::test]
async fn execute_is_single_shot() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "add_note", "content": "called, no answer"}"#,
    )));
    let o = org();
    let id = single_pending(&p, "note that I called").await;

    p.executor.execute(&o, &id, None).await.unwrap();
    let err = p.executor.execute(&o, &id, None).await.unwrap_err();
    assert!(matches!(err, ExecuteError::NotPending { .. }));
    // The note was recorded exactly once
    assert_eq!(
        p.crm.notes().iter().filter(|n| n.content == "called, no answer").count(),
        1
    );
}

#[tokio::test]
async fn reviewer_override_replaces_stored_action() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "add_note", "content": "original wording"}"#,
    )));
    let o = org();
    let id = single_pending(&p, "note something").await;

    let executed = p
        .executor
        .execute(
            &o,
            &id,
            Some(Action::AddNote {
                content: "reviewer's edited wording".into(),
            }),
        )
        .await
        .unwrap();

    assert!(executed.body.contains("reviewer's edited wording"));
    assert!(p.crm.notes().iter().any(|n| n.content == "reviewer's edited wording"));
    assert!(!p.crm.notes().iter().any(|n| n.content == "original wording"));
}

#[tokio::test]
async fn unresolved_stage_fails_and_draft_stays_pending() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "progress_task", "stage_name": "Imaginary Stage"}"#,
    )));
    let o = org();
    let id = single_pending(&p, "move him along").await;

    let err = p.executor.execute(&o, &id, None).await.unwrap_err();
    assert!(matches!(err, ExecuteError::UnresolvedStage(_)));

    let draft = p.drafts.get("org-1", &id).await.unwrap().unwrap();
    assert_eq!(draft.status, DraftStatus::Pending, "failed execution must not consume the draft");
}

#[tokio::test]
async fn set_date_without_task_is_rejected() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "set_date", "date": "2025-06-10", "reason": "homeowner traveling"}"#,
    )));
    let o = org();
    p.dispatcher
        .enqueue(
            &o,
            vec![Directive {
                contact_id: "c-miguel".into(),
                task_id: None,
                text: "push it out to June 10".into(),
            }],
        )
        .await
        .unwrap();
    p.dispatcher.process_queue(&o).await.unwrap();
    let pending = p.drafts.list("org-1", Some(DraftStatus::Pending)).await.unwrap();

    let err = p.executor.execute(&o, &pending[0].id, None).await.unwrap_err();
    assert!(matches!(err, ExecuteError::MissingTask(_)));
}

#[tokio::test]
async fn set_date_reschedules_the_originating_task() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "set_date", "date": "2025-06-10", "reason": "homeowner traveling"}"#,
    )));
    let o = org();
    let id = single_pending(&p, "push the inspection to June 10").await;

    p.executor.execute(&o, &id, None).await.unwrap();
    let contact = p.crm.contact("c-miguel").unwrap();
    let task = contact.tasks.iter().find(|t| t.id == "t-inspect").unwrap();
    assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2025, 6, 10));
    assert!(p.crm.notes().iter().any(|n| n.content.contains("homeowner traveling")));
}

#[tokio::test]
async fn schedule_appointment_resolves_type_by_name() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "schedule_appointment", "appointment_type": "roof inspection",
            "datetime": "2025-06-12T14:00:00Z", "description": "second look at the ridge"}"#,
    )));
    let o = org();
    let id = single_pending(&p, "get him on the calendar thursday at 2").await;

    p.executor.execute(&o, &id, None).await.unwrap();
    let appointments = p.crm.appointments();
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].appointment_type_id, "at-roof");
    assert_eq!(
        appointments[0].scheduled_at,
        Utc.with_ymd_and_hms(2025, 6, 12, 14, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn mark_sent_rejects_crm_effect_drafts() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "progress_task", "stage_name": "Estimate"}"#,
    )));
    let o = org();
    let id = single_pending(&p, "move him to estimate").await;

    // Marking sent would silently drop the stage change; only execute may
    // finish a CRM-effect draft.
    let err = p.executor.mark_sent(&o, &id).await.unwrap_err();
    assert!(matches!(err, ExecuteError::NotDeliverable { .. }));
    let draft = p.drafts.get("org-1", &id).await.unwrap().unwrap();
    assert_eq!(draft.status, DraftStatus::Pending);

    let executed = p.executor.execute(&o, &id, None).await.unwrap();
    assert_eq!(executed.status, DraftStatus::Sent);
}

#[tokio::test]
async fn send_message_execution_records_a_note() {
    let p = pipeline(Arc::new(UniformBackend::new(
        r#"{"type": "send_message", "channel": "sms", "recipient": "customer",
            "body": "Crew arrives at 8am tomorrow."}"#,
    )));
    let o = org();
    let id = single_pending(&p, "tell him the crew comes at 8").await;

    p.executor.execute(&o, &id, None).await.unwrap();
    assert!(p.crm.notes().iter().any(|n| n.content.contains("Crew arrives at 8am")));
}

#[tokio::test]
async fn sms_bodies_stay_within_the_length_budget() {
    let body = "Hi Miguel, quick check-in on the shingle color. Let me know when you decide.";
    assert!(body.len() <= 320);
    let p = pipeline(Arc::new(UniformBackend::new(&format!(
        r#"{{"type": "send_message", "channel": "sms", "recipient": "customer", "body": "{body}"}}"#
    ))));
    let o = org();
    let id = single_pending(&p, "check in about the color").await;
    let draft = p.drafts.get("org-1", &id).await.unwrap().unwrap();
    assert!(draft.body.len() <= 320);
}

// ── Scheduling ───────────────────────────────────────────────────────────

#[tokio::test]
async fn default_task_due_date_skips_weekends() {
    // Friday + 3 business days lands on Wednesday
    let friday = NaiveDate::from_ymd_opt(2025, 6, 6).unwrap();
    let due = WeekdayScheduler.due_in_business_days(friday, 3);
    assert_eq!(due, NaiveDate::from_ymd_opt(2025, 6, 11).unwrap());
}
