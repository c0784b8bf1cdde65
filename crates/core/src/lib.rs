//! # Ridgeline Core
//!
//! Domain types, traits, and error definitions for the Ridgeline
//! directive engine. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod backend;
pub mod crm;
pub mod draft;
pub mod error;
pub mod message;
pub mod org;

// Re-export key types at crate root for ergonomics
pub use backend::{BackendRequest, BackendResponse, ReasoningBackend, ToolChoice, ToolDefinition};
pub use crm::{Contact, CrmStore, CrmTask, Scheduling, Stage, WeekdayScheduler};
pub use draft::{
    Action, Directive, Draft, DraftPatch, DraftStatus, DraftStore, DraftType, MessageChannel,
    RecipientType,
};
pub use error::{BackendError, ComposeError, Error, ExecuteError, Result, StoreError};
pub use message::{ChatMessage, MessageToolCall, Role};
pub use org::OrgContext;
