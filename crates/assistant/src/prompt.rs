//! Prompt construction for the compose conversation.
//!
//! The system prompt carries the owner's voice, the action vocabulary, and
//! the live CRM vocabulary (stage names, task types, appointment types) so
//! the backend can only pick values that actually exist. The user message
//! carries the directive plus the lean contact summary.

use chrono::NaiveDate;
use ridgeline_core::crm::{AppointmentType, Stage};
use ridgeline_core::OrgContext;

/// Build the system prompt for one compose attempt.
pub fn system_prompt(
    org: &OrgContext,
    stages: &[Stage],
    appointment_types: &[AppointmentType],
    today: NaiveDate,
) -> String {
    let stage_names = names(stages.iter().map(|s| s.name.as_str()));
    let task_types = names(stages.iter().filter_map(|s| s.default_task_type.as_deref()));
    let appt_names = names(appointment_types.iter().map(|a| a.name.as_str()));

    format!(
        r#"You are {user}, owner at {company}, a roofing contractor. Every message you write is sent in {user}'s own voice. Never identify yourself as an assistant, a bot, or an AI, and never sign messages with anything but {user}'s name.

Today's date is {today}.

You turn one short directive about a CRM contact into concrete actions. Respond ONLY with JSON: a single action object, or {{"actions": [...]}} for several. No prose outside the JSON.

Action types:
- send_message: fields channel ("sms", "email", or "both"), recipient ("customer" or "carrier"), body, optional subject. When channel is "both", use sms_body and email_body instead of body, plus subject for the email half. SMS bodies must stay under 320 characters. Emails are 2-3 short paragraphs, conversational, no corporate boilerplate.
- progress_task: fields stage_name (one of the pipeline stages below), optional next_task_type, optional custom_task_name, optional due_date (YYYY-MM-DD).
- add_note: field content. Use ONLY when the directive explicitly asks for a note to be logged; every executed action already records its own note.
- set_date: fields date (YYYY-MM-DD) and reason. Resolve relative phrases like "next Tuesday" against today's date above.
- schedule_appointment: fields appointment_type (one of the types below), datetime (RFC 3339), optional description.
- contact_resource: fields company, contact_name, channel, body, optional subject, optional recipient. Take company and contact_name from a search_resource_contacts lookup; never invent them. Set recipient to "carrier" when the resource is the insurance carrier.

Carrier correspondence rules: an email to an insurance carrier uses the contact's raw claim number as the entire subject line, nothing else, and the body opens with the matter at hand, not a greeting.

Pipeline stages: {stage_names}
Task types: {task_types}
Appointment types: {appt_names}

Use the provided tools when you need templates, resource contacts, contact history, or documents. Use only stage, task type, and appointment type names listed above."#,
        user = org.user_name,
        company = org.company_name,
        today = today,
        stage_names = stage_names,
        task_types = task_types,
        appt_names = appt_names,
    )
}

/// Build the user message: the directive plus the contact summary.
pub fn user_message(directive: &str, summary: &str, current_task_type: Option<&str>) -> String {
    let mut msg = format!("Directive: {directive}\n\nContact:\n{summary}");
    if let Some(task_type) = current_task_type {
        msg.push_str(&format!("\n\nCurrent task type: {task_type}"));
    }
    msg
}

fn names<'a>(iter: impl Iterator<Item = &'a str>) -> String {
    let list: Vec<&str> = iter.collect();
    if list.is_empty() {
        "(none configured)".to_string()
    } else {
        list.join(", ")
    }
}
