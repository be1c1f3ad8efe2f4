use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::{Cli, SessionBackend};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_LOCATION: &str = "us-central1";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub use_vertex: bool,
    pub project: Option<String>,
    pub location: String,
    pub dataset_id: Option<String>,
    pub table_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub maps_api_key: Option<String>,
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub session_backend: SessionBackend,
    pub session_db_url: String,
    pub show_sensitive_config: bool,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
    pub forecast_history_days: u32,
    pub max_prompt_chars: usize,
    pub server_runner_cache_max: usize,
}

impl RuntimeConfig {
    /// Fully-qualified warehouse table, present only when project, dataset,
    /// and table are all configured.
    pub fn warehouse_table(&self) -> Option<String> {
        match (
            self.project.as_deref(),
            self.dataset_id.as_deref(),
            self.table_id.as_deref(),
        ) {
            (Some(project), Some(dataset), Some(table)) => {
                Some(format!("{project}.{dataset}.{table}"))
            }
            _ => None,
        }
    }
}

/// Snapshot of the Google Cloud environment variables the original deployment
/// contract names. Captured once so resolution stays testable.
#[derive(Debug, Default, Clone)]
pub struct CloudEnv {
    pub use_vertex: Option<bool>,
    pub project: Option<String>,
    pub location: Option<String>,
    pub dataset_id: Option<String>,
    pub table_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub maps_api_key: Option<String>,
}

impl CloudEnv {
    pub fn capture() -> Self {
        CloudEnv {
            use_vertex: env_nonempty("GOOGLE_GENAI_USE_VERTEXAI").map(|value| flag_value(&value)),
            project: env_nonempty("GOOGLE_CLOUD_PROJECT"),
            location: env_nonempty("GOOGLE_CLOUD_LOCATION"),
            dataset_id: env_nonempty("BIGQUERY_DATASET_ID"),
            table_id: env_nonempty("BIGQUERY_TABLE_ID"),
            storage_bucket: env_nonempty("GOOGLE_CLOUD_STORAGE_BUCKET"),
            maps_api_key: env_nonempty("GOOGLE_GEOMAP_API_KEY"),
        }
    }
}

pub fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// "1", "true", and "yes" (any case) enable; everything else disables.
pub fn flag_value(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub use_vertex: Option<bool>,
    pub project: Option<String>,
    pub location: Option<String>,
    pub dataset_id: Option<String>,
    pub table_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub app_name: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub session_backend: Option<SessionBackend>,
    pub session_db_url: Option<String>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
    pub forecast_history_days: Option<u32>,
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check session values and field names.",
            path.display()
        )
    })
}

pub fn resolve_runtime_config(
    cli: &Cli,
    profiles: &ProfilesFile,
    env: &CloudEnv,
) -> Result<RuntimeConfig> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "profile name cannot be empty. Set --profile <name>."
        ));
    }

    let profile = if selected == "default" && !profiles.profiles.contains_key("default") {
        ProfileConfig::default()
    } else {
        profiles.profiles.get(selected).cloned().ok_or_else(|| {
            let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
            names.sort();
            if names.is_empty() {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. No profiles are defined yet.",
                    selected,
                    cli.config_path
                )
            } else {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. Available profiles: {}",
                    selected,
                    cli.config_path,
                    names.join(", ")
                )
            }
        })?
    };

    let model = cli
        .model
        .clone()
        .or(profile.model)
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    if !model.starts_with("gemini") {
        return Err(anyhow::anyhow!(
            "model '{}' is not a Gemini model. This build targets Gemini backends only.",
            model
        ));
    }

    Ok(RuntimeConfig {
        profile: selected.to_string(),
        config_path: cli.config_path.clone(),
        model,
        temperature: cli.temperature.or(profile.temperature),
        top_p: cli.top_p.or(profile.top_p),
        use_vertex: env.use_vertex.or(profile.use_vertex).unwrap_or(false),
        project: env.project.clone().or(profile.project),
        location: env
            .location
            .clone()
            .or(profile.location)
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        dataset_id: env.dataset_id.clone().or(profile.dataset_id),
        table_id: env.table_id.clone().or(profile.table_id),
        storage_bucket: env.storage_bucket.clone().or(profile.storage_bucket),
        maps_api_key: env.maps_api_key.clone(),
        app_name: cli
            .app_name
            .clone()
            .or(profile.app_name)
            .unwrap_or_else(|| "supplyline".to_string()),
        user_id: cli
            .user_id
            .clone()
            .or(profile.user_id)
            .unwrap_or_else(|| "local-user".to_string()),
        session_id: cli
            .session_id
            .clone()
            .or(profile.session_id)
            .unwrap_or_else(|| "default-session".to_string()),
        session_backend: cli
            .session_backend
            .or(profile.session_backend)
            .unwrap_or(SessionBackend::Memory),
        session_db_url: cli
            .session_db_url
            .clone()
            .or(profile.session_db_url)
            .unwrap_or_else(|| "sqlite://.supplyline/sessions.db".to_string()),
        show_sensitive_config: cli.show_sensitive_config,
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(true),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| ".supplyline/telemetry/events.jsonl".to_string()),
        forecast_history_days: profile.forecast_history_days.unwrap_or(365).max(14),
        max_prompt_chars: 32_000,
        server_runner_cache_max: 64,
    })
}

pub fn display_session_db_url(cfg: &RuntimeConfig) -> String {
    if cfg.show_sensitive_config {
        cfg.session_db_url.clone()
    } else {
        format!(
            "{} (set --show-sensitive-config to reveal)",
            crate::error::redact_sqlite_url_value(&cfg.session_db_url)
        )
    }
}
