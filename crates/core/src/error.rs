//! Error types for the Ridgeline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Ridgeline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Reasoning backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Compose errors ---
    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Execution errors ---
    #[error("Execute error: {0}")]
    Execute(#[from] ExecuteError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from a single compose attempt. The dispatcher converts every
/// variant into a fallback note draft so a directive never fails into
/// nothingness.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Backend call failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Contact not found: {0}")]
    ContactMissing(String),

    #[error("Context assembly failed: {0}")]
    Context(#[from] StoreError),

    #[error("Round budget exhausted after {rounds} rounds without a final answer")]
    RoundBudgetExhausted { rounds: u32 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Draft {draft_id} is not pending (status: {status})")]
    NotPending { draft_id: String, status: String },

    #[error("Draft not found: {0}")]
    DraftNotFound(String),

    #[error("Draft {0} has no action payload to execute")]
    MissingAction(String),

    #[error("Draft {draft_id} is a {draft_type} draft, only message drafts can be marked sent")]
    NotDeliverable {
        draft_id: String,
        draft_type: String,
    },

    #[error("Draft {0} has no associated task")]
    MissingTask(String),

    #[error("No stage named '{0}' exists in this organization")]
    UnresolvedStage(String),

    #[error("No appointment type named '{0}' exists in this organization")]
    UnresolvedAppointmentType(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_correctly() {
        let err = Error::Backend(BackendError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn execute_error_displays_correctly() {
        let err = Error::Execute(ExecuteError::UnresolvedStage("Retail Prospect".into()));
        assert!(err.to_string().contains("Retail Prospect"));
    }

    #[test]
    fn compose_error_wraps_backend() {
        let err = ComposeError::from(BackendError::NotConfigured("no API key".into()));
        assert!(err.to_string().contains("no API key"));
    }
}
