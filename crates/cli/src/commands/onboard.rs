//! `ridgeline onboard` — First-time setup.

use ridgeline_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let seed_path = config_dir.join("crm.json");

    println!("Ridgeline — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("Edit it manually or delete and re-run onboard.");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
    }

    if !seed_path.exists() {
        std::fs::write(&seed_path, SAMPLE_CRM_SEED)?;
        println!("Created sample CRM seed at: {}", seed_path.display());
    }

    println!("\nNext steps:");
    println!("  1. Set your API key:   export RIDGELINE_API_KEY=sk-...");
    println!("  2. Fill in [org] in:   {}", config_path.display());
    println!("  3. Edit the CRM seed:  {}", seed_path.display());
    println!("  4. Start the server:   ridgeline serve");

    Ok(())
}

const SAMPLE_CRM_SEED: &str = r#"{
  "contacts": [
    {
      "id": "c-sample",
      "org_id": "default",
      "first_name": "Miguel",
      "last_name": "Santos",
      "phone": "555-0142",
      "email": "miguel@example.com",
      "address": "18 Cedar Ln",
      "stage_id": "s-inspection",
      "carrier": "Acme Insurance",
      "claim_number": "CLM-2214",
      "tasks": [
        {
          "id": "t-sample",
          "contact_id": "c-sample",
          "task_type": "inspection",
          "name": "Inspect roof",
          "completed": false
        }
      ]
    }
  ],
  "stages": [
    { "id": "s-lead", "name": "Lead", "default_task_type": "follow_up" },
    { "id": "s-inspection", "name": "Inspection", "default_task_type": "inspection" },
    { "id": "s-estimate", "name": "Estimate", "default_task_type": "estimate" }
  ],
  "appointment_types": [
    { "id": "at-roof", "name": "Roof Inspection" }
  ],
  "resources": [
    {
      "id": "r-adjuster",
      "name": "Dana Reeve",
      "company": "Acme Insurance",
      "role": "Claims adjuster",
      "resource_type": "carrier",
      "email": "dana@acme.example"
    }
  ],
  "templates": [
    {
      "id": "tpl-checkin",
      "name": "General check-in",
      "body": "Hi {first_name}, just checking in on your roof project."
    }
  ]
}
"#;
