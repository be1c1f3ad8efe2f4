use anyhow::Result;

use crate::cli::SessionBackend;
use crate::config::{RuntimeConfig, display_session_db_url, env_nonempty};
use crate::model::google_api_key;
use crate::session::open_sqlite_session_service;

fn env_present(name: &str) -> bool {
    env_nonempty(name).is_some()
}

pub async fn run_doctor(cfg: &RuntimeConfig) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    let checks = [
        ("GOOGLE_GENAI_USE_VERTEXAI", env_present("GOOGLE_GENAI_USE_VERTEXAI")),
        ("GOOGLE_API_KEY", google_api_key().is_some()),
        ("GOOGLE_CLOUD_PROJECT", env_present("GOOGLE_CLOUD_PROJECT")),
        ("GOOGLE_CLOUD_LOCATION", env_present("GOOGLE_CLOUD_LOCATION")),
        ("BIGQUERY_DATASET_ID", env_present("BIGQUERY_DATASET_ID")),
        ("BIGQUERY_TABLE_ID", env_present("BIGQUERY_TABLE_ID")),
        ("GOOGLE_CLOUD_STORAGE_BUCKET", env_present("GOOGLE_CLOUD_STORAGE_BUCKET")),
        ("GOOGLE_GEOMAP_API_KEY", env_present("GOOGLE_GEOMAP_API_KEY")),
    ];

    println!("Environment check:");
    for (key, ok) in checks {
        let status = if ok { "set" } else { "missing" };
        println!("- {key}: {status}");
    }

    if cfg.use_vertex {
        match cfg.project.as_deref() {
            Some(project) => println!(
                "Model backend: vertex-ai (project={}, location={}, ADC credentials)",
                project, cfg.location
            ),
            None => {
                println!("Model backend: vertex-ai selected but GOOGLE_CLOUD_PROJECT is missing");
                println!("Tip: export GOOGLE_CLOUD_PROJECT or unset GOOGLE_GENAI_USE_VERTEXAI");
            }
        }
    } else if google_api_key().is_some() {
        println!("Model backend: gemini-api (GOOGLE_API_KEY)");
    } else {
        println!("Model backend: none configured");
        println!("Tip: export GOOGLE_API_KEY, or set GOOGLE_GENAI_USE_VERTEXAI=1 with ADC");
    }

    println!(
        "Model: {} (temperature={}, top_p={})",
        cfg.model,
        cfg.temperature
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<default>".to_string()),
        cfg.top_p
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<default>".to_string())
    );

    match cfg.warehouse_table() {
        Some(table) => println!("Warehouse table: {table}"),
        None => {
            println!("Warehouse table: <unconfigured>");
            println!(
                "Tip: set GOOGLE_CLOUD_PROJECT, BIGQUERY_DATASET_ID, and BIGQUERY_TABLE_ID to \
                 enable demand forecasts and SQL insights"
            );
        }
    }

    if cfg.maps_api_key.is_some() {
        println!("Geocoding: Google Maps (Open-Meteo fallback)");
    } else {
        println!("Geocoding: Open-Meteo only (GOOGLE_GEOMAP_API_KEY not set)");
    }

    println!(
        "Session backend: {:?} (session_id: {}, app: {}, user: {})",
        cfg.session_backend, cfg.session_id, cfg.app_name, cfg.user_id
    );
    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );
    println!(
        "Forecast defaults: history_days={} (minimum 14 observed days required)",
        cfg.forecast_history_days
    );

    if matches!(cfg.session_backend, SessionBackend::Sqlite) {
        let _service = open_sqlite_session_service(&cfg.session_db_url).await?;
        println!(
            "SQLite session DB check: ok ({})",
            display_session_db_url(cfg)
        );
    }

    Ok(())
}

pub async fn run_migrate(cfg: &RuntimeConfig) -> Result<()> {
    match cfg.session_backend {
        SessionBackend::Memory => {
            println!("Session backend is memory; no migration required.");
        }
        SessionBackend::Sqlite => {
            let _service = open_sqlite_session_service(&cfg.session_db_url).await?;
            println!(
                "SQLite migrations applied successfully: {}",
                display_session_db_url(cfg)
            );
        }
    }
    Ok(())
}
