//! Batch dispatcher: directive intake and queue processing.
//!
//! Intake wraps each directive into a queued draft immediately, so the
//! caller gets draft ids back without waiting on any backend call.
//! Processing claims the whole queue atomically, then composes drafts
//! concurrently in fixed-width chunks. Every claimed draft ends the pass
//! in `pending` — real actions when compose succeeds, a fallback note
//! when it does not. One bad directive never poisons its chunk.

use std::sync::Arc;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use ridgeline_assistant::{fallback_action, ComposeLoop, ContextAssembler};
use ridgeline_core::crm::CrmStore;
use ridgeline_core::draft::{Directive, Draft, DraftStore};
use ridgeline_core::error::{ComposeError, StoreError};
use ridgeline_core::OrgContext;

const DEFAULT_MAX_BATCH: usize = 50;
const DEFAULT_CHUNK_WIDTH: usize = 5;

/// Batch boundary violations and storage failures at intake time.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Batch is empty")]
    EmptyBatch,

    #[error("Batch of {got} directives exceeds the maximum of {max}")]
    BatchTooLarge { got: usize, max: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one intake call.
#[derive(Debug)]
pub struct EnqueueReport {
    /// Drafts created, in directive order
    pub drafts: Vec<Draft>,
    /// Directives dropped for having no text
    pub skipped: usize,
}

/// Outcome of one queue-processing pass.
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Drafts claimed from the queue
    pub processed: usize,
    /// Drafts that ended with real composed actions
    pub composed: usize,
    /// Drafts that ended with a fallback note
    pub failed: usize,
}

/// Coordinates intake, claiming, and concurrent composition.
pub struct BatchDispatcher {
    drafts: Arc<dyn DraftStore>,
    crm: Arc<dyn CrmStore>,
    compose: Arc<ComposeLoop>,
    assembler: ContextAssembler,
    max_batch: usize,
    chunk_width: usize,
}

impl BatchDispatcher {
    pub fn new(
        drafts: Arc<dyn DraftStore>,
        crm: Arc<dyn CrmStore>,
        compose: Arc<ComposeLoop>,
    ) -> Self {
        let assembler = ContextAssembler::new(crm.clone());
        Self {
            drafts,
            crm,
            compose,
            assembler,
            max_batch: DEFAULT_MAX_BATCH,
            chunk_width: DEFAULT_CHUNK_WIDTH,
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    pub fn with_chunk_width(mut self, chunk_width: usize) -> Self {
        self.chunk_width = chunk_width.max(1);
        self
    }

    /// Accept a batch of directives and queue one draft per directive.
    /// No backend call happens here; composition is a separate pass.
    pub async fn enqueue(
        &self,
        org: &OrgContext,
        directives: Vec<Directive>,
    ) -> Result<EnqueueReport, DispatchError> {
        if directives.is_empty() {
            return Err(DispatchError::EmptyBatch);
        }
        if directives.len() > self.max_batch {
            return Err(DispatchError::BatchTooLarge {
                got: directives.len(),
                max: self.max_batch,
            });
        }

        let mut drafts = Vec::with_capacity(directives.len());
        let mut skipped = 0;
        for directive in &directives {
            if directive.contact_id.trim().is_empty() || directive.text.trim().is_empty() {
                warn!(
                    contact_id = %directive.contact_id,
                    "Skipping directive without a contact or text"
                );
                skipped += 1;
                continue;
            }
            let draft = self
                .drafts
                .create(Draft::queued(&org.org_id, directive))
                .await?;
            drafts.push(draft);
        }

        info!(queued = drafts.len(), skipped, "Directives queued");
        Ok(EnqueueReport { drafts, skipped })
    }

    /// Claim every queued draft and compose them, `chunk_width` at a time.
    pub async fn process_queue(&self, org: &OrgContext) -> Result<ProcessReport, DispatchError> {
        let claimed = self.drafts.claim_queued(&org.org_id).await?;
        if claimed.is_empty() {
            return Ok(ProcessReport::default());
        }

        let mut report = ProcessReport {
            processed: claimed.len(),
            ..Default::default()
        };

        for chunk in claimed.chunks(self.chunk_width) {
            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|draft| self.compose_one(org, draft.clone())),
            )
            .await;
            for outcome in outcomes {
                match outcome {
                    Ok(()) => report.composed += 1,
                    Err(()) => report.failed += 1,
                }
            }
        }

        info!(
            processed = report.processed,
            composed = report.composed,
            failed = report.failed,
            "Queue pass complete"
        );
        Ok(report)
    }

    /// Compose one claimed draft. Infallible in the sense that the draft
    /// always reaches `pending`: compose failures become fallback notes.
    /// The Err side only signals "this one degraded" for the report.
    async fn compose_one(&self, org: &OrgContext, mut draft: Draft) -> Result<(), ()> {
        match self.try_compose(org, &mut draft).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(draft_id = %draft.id, %err, "Compose failed, writing fallback note");
                let fallback = fallback_action(&draft.directive, &err.to_string());
                draft.apply_action(fallback);
                if let Err(store_err) = self.drafts.update(&draft).await {
                    error!(draft_id = %draft.id, %store_err, "Failed to persist fallback draft");
                }
                Err(())
            }
        }
    }

    async fn try_compose(
        &self,
        org: &OrgContext,
        draft: &mut Draft,
    ) -> Result<(), ComposeError> {
        let contact = self
            .crm
            .get_contact(&org.org_id, &draft.contact_id)
            .await?
            .ok_or_else(|| ComposeError::ContactMissing(draft.contact_id.clone()))?;

        let context = self.assembler.assemble(org, &contact).await?;
        let mut actions = self
            .compose
            .compose(org, &context, &draft.directive)
            .await?
            .into_iter();

        // First action lands on the claimed draft; the rest fan out as
        // pending siblings in emission order.
        if let Some(first) = actions.next() {
            draft.apply_action(first);
            self.drafts.update(draft).await?;
            debug!(draft_id = %draft.id, draft_type = %draft.draft_type, "Draft composed");
        }
        for action in actions {
            let sibling = draft.sibling(action);
            debug!(draft_id = %sibling.id, draft_type = %sibling.draft_type, "Sibling draft");
            self.drafts.create(sibling).await?;
        }
        Ok(())
    }
}
