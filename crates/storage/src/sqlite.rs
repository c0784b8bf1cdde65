//! SQLite draft store.
//!
//! One `drafts` table, one row per draft. Status transitions are enforced
//! with conditional UPDATEs: the WHERE clause carries the expected current
//! status and zero affected rows means another writer got there first.
//! The structured action payload is stored as a JSON text column.

use async_trait::async_trait;
use chrono::Utc;
use ridgeline_core::draft::{Action, Draft, DraftPatch, DraftStatus, DraftStore, DraftType};
use ridgeline_core::error::StoreError;
use ridgeline_core::RecipientType;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A production SQLite draft store.
pub struct SqliteDraftStore {
    pool: SqlitePool,
}

impl SqliteDraftStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite draft store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS drafts (
                id          TEXT PRIMARY KEY,
                org_id      TEXT NOT NULL,
                contact_id  TEXT NOT NULL,
                task_id     TEXT,
                directive   TEXT NOT NULL,
                draft_type  TEXT NOT NULL,
                channel     TEXT NOT NULL,
                recipient   TEXT NOT NULL,
                subject     TEXT,
                body        TEXT NOT NULL DEFAULT '',
                action      TEXT,
                status      TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("drafts table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_drafts_org_status ON drafts(org_id, status)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("org/status index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_draft(row: &sqlx::sqlite::SqliteRow) -> Result<Draft, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::Storage(format!("id column: {e}")))?;
        let org_id: String = row
            .try_get("org_id")
            .map_err(|e| StoreError::Storage(format!("org_id column: {e}")))?;
        let contact_id: String = row
            .try_get("contact_id")
            .map_err(|e| StoreError::Storage(format!("contact_id column: {e}")))?;
        let task_id: Option<String> = row
            .try_get("task_id")
            .map_err(|e| StoreError::Storage(format!("task_id column: {e}")))?;
        let directive: String = row
            .try_get("directive")
            .map_err(|e| StoreError::Storage(format!("directive column: {e}")))?;
        let draft_type_str: String = row
            .try_get("draft_type")
            .map_err(|e| StoreError::Storage(format!("draft_type column: {e}")))?;
        let channel: String = row
            .try_get("channel")
            .map_err(|e| StoreError::Storage(format!("channel column: {e}")))?;
        let recipient_str: String = row
            .try_get("recipient")
            .map_err(|e| StoreError::Storage(format!("recipient column: {e}")))?;
        let subject: Option<String> = row
            .try_get("subject")
            .map_err(|e| StoreError::Storage(format!("subject column: {e}")))?;
        let body: String = row
            .try_get("body")
            .map_err(|e| StoreError::Storage(format!("body column: {e}")))?;
        let action_json: Option<String> = row
            .try_get("action")
            .map_err(|e| StoreError::Storage(format!("action column: {e}")))?;
        let status_str: String = row
            .try_get("status")
            .map_err(|e| StoreError::Storage(format!("status column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::Storage(format!("created_at column: {e}")))?;
        let updated_at_str: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::Storage(format!("updated_at column: {e}")))?;

        let draft_type = DraftType::parse(&draft_type_str).ok_or_else(|| {
            StoreError::Storage(format!("unknown draft_type '{draft_type_str}'"))
        })?;
        let recipient = RecipientType::parse(&recipient_str)
            .ok_or_else(|| StoreError::Storage(format!("unknown recipient '{recipient_str}'")))?;
        let status = DraftStatus::parse(&status_str)
            .ok_or_else(|| StoreError::Storage(format!("unknown status '{status_str}'")))?;

        let action: Option<Action> = match action_json {
            Some(json) => Some(
                serde_json::from_str(&json)
                    .map_err(|e| StoreError::Storage(format!("action payload: {e}")))?,
            ),
            None => None,
        };

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Draft {
            id,
            org_id,
            contact_id,
            task_id,
            directive,
            draft_type,
            channel,
            recipient,
            subject,
            body,
            action,
            status,
            created_at,
            updated_at,
        })
    }

    fn action_to_json(action: &Option<Action>) -> Result<Option<String>, StoreError> {
        action
            .as_ref()
            .map(|a| {
                serde_json::to_string(a)
                    .map_err(|e| StoreError::Storage(format!("action serialization: {e}")))
            })
            .transpose()
    }
}

#[async_trait]
impl DraftStore for SqliteDraftStore {
    async fn create(&self, draft: Draft) -> Result<Draft, StoreError> {
        let action_json = Self::action_to_json(&draft.action)?;
        sqlx::query(
            r#"
            INSERT INTO drafts (id, org_id, contact_id, task_id, directive, draft_type,
                                channel, recipient, subject, body, action, status,
                                created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&draft.id)
        .bind(&draft.org_id)
        .bind(&draft.contact_id)
        .bind(&draft.task_id)
        .bind(&draft.directive)
        .bind(draft.draft_type.as_str())
        .bind(&draft.channel)
        .bind(draft.recipient.as_str())
        .bind(&draft.subject)
        .bind(&draft.body)
        .bind(&action_json)
        .bind(draft.status.as_str())
        .bind(draft.created_at.to_rfc3339())
        .bind(draft.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;

        debug!(draft_id = %draft.id, status = %draft.status, "Created draft");
        Ok(draft)
    }

    async fn get(&self, org_id: &str, id: &str) -> Result<Option<Draft>, StoreError> {
        let row = sqlx::query("SELECT * FROM drafts WHERE org_id = ?1 AND id = ?2")
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("GET by id: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_draft(r)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        org_id: &str,
        status: Option<DraftStatus>,
    ) -> Result<Vec<Draft>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM drafts WHERE org_id = ?1 AND status = ?2 \
                     ORDER BY created_at DESC",
                )
                .bind(org_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM drafts WHERE org_id = ?1 ORDER BY created_at DESC")
                    .bind(org_id)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| StoreError::Storage(format!("LIST failed: {e}")))?;

        rows.iter().map(Self::row_to_draft).collect()
    }

    async fn claim_queued(&self, org_id: &str) -> Result<Vec<Draft>, StoreError> {
        // Select-then-update inside one transaction so two dispatcher
        // invocations cannot claim the same drafts.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("claim transaction: {e}")))?;

        let rows = sqlx::query(
            "SELECT * FROM drafts WHERE org_id = ?1 AND status = 'queued' \
             ORDER BY created_at ASC",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("claim select: {e}")))?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut draft = Self::row_to_draft(row)?;
            draft.status = DraftStatus::Composing;
            draft.updated_at = Utc::now();
            claimed.push(draft);
        }

        if !claimed.is_empty() {
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE drafts SET status = 'composing', updated_at = ?1 \
                 WHERE org_id = ?2 AND status = 'queued'",
            )
            .bind(&now)
            .bind(org_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("claim update: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("claim commit: {e}")))?;

        debug!(count = claimed.len(), "Claimed queued drafts");
        Ok(claimed)
    }

    async fn update(&self, draft: &Draft) -> Result<(), StoreError> {
        let action_json = Self::action_to_json(&draft.action)?;
        let result = sqlx::query(
            r#"
            UPDATE drafts SET
                draft_type = ?1, channel = ?2, recipient = ?3, subject = ?4,
                body = ?5, action = ?6, status = ?7, updated_at = ?8
            WHERE org_id = ?9 AND id = ?10 AND status != 'sent'
            "#,
        )
        .bind(draft.draft_type.as_str())
        .bind(&draft.channel)
        .bind(draft.recipient.as_str())
        .bind(&draft.subject)
        .bind(&draft.body)
        .bind(&action_json)
        .bind(draft.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&draft.org_id)
        .bind(&draft.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE failed: {e}")))?;

        if result.rows_affected() == 0 {
            // Distinguish "gone" from "already sent"
            return match self.get(&draft.org_id, &draft.id).await? {
                Some(_) => Err(StoreError::Conflict(format!(
                    "draft {} is already sent",
                    draft.id
                ))),
                None => Err(StoreError::NotFound(format!("draft {}", draft.id))),
            };
        }
        Ok(())
    }

    async fn transition(
        &self,
        org_id: &str,
        id: &str,
        from: DraftStatus,
        to: DraftStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE drafts SET status = ?1, updated_at = ?2 \
             WHERE org_id = ?3 AND id = ?4 AND status = ?5",
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(org_id)
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("transition: {e}")))?;

        if result.rows_affected() == 0 {
            return match self.get(org_id, id).await? {
                Some(draft) => Err(StoreError::Conflict(format!(
                    "draft {id} is {}, expected {from}",
                    draft.status
                ))),
                None => Err(StoreError::NotFound(format!("draft {id}"))),
            };
        }
        debug!(draft_id = %id, %from, %to, "Draft transitioned");
        Ok(())
    }

    async fn patch(&self, org_id: &str, id: &str, patch: DraftPatch) -> Result<Draft, StoreError> {
        let mut draft = self
            .get(org_id, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("draft {id}")))?;

        if draft.status == DraftStatus::Sent {
            return Err(StoreError::Conflict(format!("draft {id} is already sent")));
        }

        if let Some(body) = patch.body {
            draft.body = body;
        }
        if let Some(subject) = patch.subject {
            draft.subject = Some(subject);
        }
        if let Some(channel) = patch.channel {
            draft.channel = channel;
        }
        if let Some(status) = patch.status {
            draft.status = status;
        }
        draft.updated_at = Utc::now();

        self.update(&draft).await?;
        Ok(draft)
    }

    async fn delete(&self, org_id: &str, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM drafts WHERE org_id = ?1 AND id = ?2 AND status = 'pending'",
        )
        .bind(org_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("DELETE failed: {e}")))?;

        if result.rows_affected() == 0 {
            return match self.get(org_id, id).await? {
                Some(draft) => Err(StoreError::Conflict(format!(
                    "draft {id} is {}, only pending drafts can be discarded",
                    draft.status
                ))),
                None => Err(StoreError::NotFound(format!("draft {id}"))),
            };
        }
        debug!(draft_id = %id, "Draft discarded");
        Ok(())
    }
}
