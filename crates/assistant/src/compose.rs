//! The bounded compose loop: directive in, typed actions out.
//!
//! At most `TOOL_ROUNDS` rounds may carry tool calls; the round after that
//! is forced textual by sending no tools and `tool_choice: none`. The loop
//! therefore always terminates in `TOOL_ROUNDS + 1` backend calls or
//! fewer. A final answer that parses to zero actions degrades to a
//! fallback note rather than an error, so every compose attempt yields
//! something reviewable.

use std::sync::Arc;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use ridgeline_core::backend::{BackendRequest, ReasoningBackend, ToolChoice};
use ridgeline_core::draft::Action;
use ridgeline_core::error::ComposeError;
use ridgeline_core::message::ChatMessage;
use ridgeline_core::OrgContext;

use crate::context::ContactContext;
use crate::parser::parse_actions;
use crate::prompt;
use crate::tools::{tool_definitions, ToolHandler};

/// Maximum rounds in which the backend may call tools. One more round
/// follows with tools disabled, so the loop runs at most this plus one.
pub const TOOL_ROUNDS: u32 = 3;

/// Runs bounded compose conversations against a reasoning backend.
pub struct ComposeLoop {
    backend: Arc<dyn ReasoningBackend>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ComposeLoop {
    pub fn new(backend: Arc<dyn ReasoningBackend>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Run one compose conversation for one directive.
    ///
    /// Returns at least one action on success. Backend failures and an
    /// exhausted round budget surface as errors; the caller converts them
    /// into a fallback draft so the directive is never silently lost.
    pub async fn compose(
        &self,
        org: &OrgContext,
        context: &ContactContext,
        directive: &str,
    ) -> Result<Vec<Action>, ComposeError> {
        let system = prompt::system_prompt(
            org,
            &context.stages,
            &context.appointment_types,
            Utc::now().date_naive(),
        );
        let user = prompt::user_message(
            directive,
            &context.summary,
            context.current_task_type.as_deref(),
        );
        let mut messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let definitions = tool_definitions();
        let handler = ToolHandler::new(&context.tool_data);

        for round in 0..=TOOL_ROUNDS {
            let final_round = round == TOOL_ROUNDS;
            let request = BackendRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: if final_round {
                    Vec::new()
                } else {
                    definitions.clone()
                },
                tool_choice: if final_round {
                    ToolChoice::None
                } else {
                    ToolChoice::Auto
                },
            };
            let response = self.backend.complete(request).await?;

            if response.message.tool_calls.is_empty() {
                let actions =
                    parse_actions(&response.message.content, context.claim_number.as_deref());
                if actions.is_empty() {
                    warn!(round, "Final answer parsed to zero actions, degrading to note");
                    return Ok(vec![fallback_action(
                        directive,
                        "the response could not be read as actions",
                    )]);
                }
                debug!(round, count = actions.len(), "Compose produced actions");
                return Ok(actions);
            }

            let tool_calls = response.message.tool_calls.clone();
            debug!(round, tools = tool_calls.len(), "Resolving tool calls");
            messages.push(response.message);
            for call in &tool_calls {
                let arguments: Value =
                    serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
                let output = handler.handle(&call.name, &arguments);
                messages.push(ChatMessage::tool_result(&call.id, output));
            }
        }

        // Unreachable with a conforming backend: the final round carries
        // no tool definitions, yet tool calls came back anyway.
        Err(ComposeError::RoundBudgetExhausted {
            rounds: TOOL_ROUNDS + 1,
        })
    }
}

/// The safety-net action: a note asking a human to handle the directive.
/// Used whenever composition cannot produce real actions, so the queue
/// never swallows work.
pub fn fallback_action(directive: &str, reason: &str) -> Action {
    Action::AddNote {
        content: format!(
            "Could not complete this automatically, please handle manually.\n\
             Directive: {directive}\n\
             Reason: {reason}"
        ),
    }
}
