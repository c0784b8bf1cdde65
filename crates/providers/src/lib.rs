//! Reasoning backend implementations for Ridgeline.
//!
//! All backends implement the `ridgeline_core::ReasoningBackend` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatBackend;
