//! `ridgeline serve` — Start the HTTP API server.

use std::sync::Arc;

use serde::Deserialize;
use ridgeline_config::AppConfig;
use ridgeline_core::backend::ReasoningBackend;
use ridgeline_core::crm::{
    AppointmentType, Contact, CrmStore, MessageTemplate, ResourceContact, Stage,
};
use ridgeline_providers::OpenAiCompatBackend;
use ridgeline_storage::{InMemoryCrmStore, SqliteDraftStore};

/// CRM seed file format (~/.ridgeline/crm.json). Stands in for a live
/// CRM connection in local deployments.
#[derive(Deserialize, Default)]
struct CrmSeed {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    stages: Vec<Stage>,
    #[serde(default)]
    appointment_types: Vec<AppointmentType>,
    #[serde(default)]
    resources: Vec<ResourceContact>,
    #[serde(default)]
    templates: Vec<MessageTemplate>,
}

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let backend: Arc<dyn ReasoningBackend> = Arc::new(OpenAiCompatBackend::new(
        "openai",
        &config.backend.api_url,
        config.api_key.clone().unwrap_or_default(),
    )?);

    let drafts = Arc::new(SqliteDraftStore::new(&config.storage.database).await?);
    let crm = Arc::new(load_crm()?);

    println!("Ridgeline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.backend.model);
    println!(
        "   Auth:      {}",
        if config.gateway.bearer_token.is_some() {
            "bearer token"
        } else {
            "open (local dev)"
        }
    );

    ridgeline_gateway::start(config, drafts, crm as Arc<dyn CrmStore>, backend).await?;

    Ok(())
}

/// Build the CRM store from ~/.ridgeline/crm.json when present, empty
/// otherwise.
fn load_crm() -> Result<InMemoryCrmStore, Box<dyn std::error::Error>> {
    let seed_path = AppConfig::config_dir().join("crm.json");
    let seed: CrmSeed = if seed_path.exists() {
        let content = std::fs::read_to_string(&seed_path)?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {e}", seed_path.display()))?
    } else {
        tracing::warn!(
            "No CRM seed at {}, starting with an empty CRM",
            seed_path.display()
        );
        CrmSeed::default()
    };

    let mut crm = InMemoryCrmStore::new();
    for contact in seed.contacts {
        crm = crm.with_contact(contact);
    }
    for stage in seed.stages {
        crm = crm.with_stage(stage);
    }
    for appointment_type in seed.appointment_types {
        crm = crm.with_appointment_type(appointment_type);
    }
    for resource in seed.resources {
        crm = crm.with_resource(resource);
    }
    for template in seed.templates {
        crm = crm.with_template(template);
    }
    Ok(crm)
}
