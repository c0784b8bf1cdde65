//! Lenient extraction of typed actions from the final model answer.
//!
//! Accepts a bare action object, a bare array, or `{"actions": [...]}`,
//! with or without markdown code fences. Unparseable elements are dropped
//! individually; the caller decides what an empty result means.

use serde_json::Value;
use tracing::debug;
use ridgeline_core::draft::{Action, RecipientType};

/// Parse the model's final answer into zero or more actions.
///
/// Carrier-addressed message actions get their subject forced to the raw
/// claim number when one is known, regardless of what the model wrote.
pub fn parse_actions(raw: &str, claim_number: Option<&str>) -> Vec<Action> {
    let text = strip_code_fences(raw);
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(err) => {
            debug!(%err, "Final answer is not JSON");
            return Vec::new();
        }
    };

    let items: Vec<Value> = if let Some(arr) = value.get("actions").and_then(Value::as_array) {
        arr.clone()
    } else if let Value::Array(arr) = value {
        arr
    } else {
        vec![value]
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Action>(item) {
            Ok(action) => Some(action),
            Err(err) => {
                debug!(%err, "Dropping malformed action element");
                None
            }
        })
        .map(|action| force_carrier_subject(action, claim_number))
        .collect()
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") through the first newline
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Carrier emails must carry the raw claim number as the subject line.
fn force_carrier_subject(action: Action, claim_number: Option<&str>) -> Action {
    let Some(claim) = claim_number else {
        return action;
    };
    match action {
        Action::SendMessage {
            channel,
            recipient: RecipientType::Carrier,
            body,
            sms_body,
            email_body,
            ..
        } => Action::SendMessage {
            channel,
            recipient: RecipientType::Carrier,
            body,
            subject: Some(claim.to_string()),
            sms_body,
            email_body,
        },
        Action::ContactResource {
            company,
            contact_name,
            channel,
            body,
            recipient: Some(RecipientType::Carrier),
            ..
        } => Action::ContactResource {
            company,
            contact_name,
            channel,
            body,
            subject: Some(claim.to_string()),
            recipient: Some(RecipientType::Carrier),
        },
        other => other,
    }
}
