use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::agents::chart_generator::CHART_GENERATOR_AGENT_NAME;
use crate::agents::demand_sense::DEMAND_SENSE_AGENT_NAME;
use crate::agents::market_pulse::{MARKET_PULSE_AGENT_NAME, SEARCH_GROUNDING_AGENT_NAME};
use crate::agents::ops_insight::OPS_INSIGHT_AGENT_NAME;
use crate::agents::orchestrator::ORCHESTRATOR_AGENT_NAME;
use crate::agents::weather_report::WEATHER_REPORT_AGENT_NAME;
use crate::config::RuntimeConfig;
use crate::telemetry::{TelemetrySink, unix_ms_now};
use crate::tools::charts::RENDER_CHART_TOOL_NAME;
use crate::tools::date_time::DATE_TIME_TOOL_NAME;
use crate::tools::forecast::DEMAND_FORECAST_TOOL_NAME;
use crate::tools::warehouse::EXECUTE_SQL_TOOL_NAME;
use crate::tools::weather::{
    FETCH_WEATHER_TOOL_NAME, FILTER_WEATHER_TOOL_NAME, GENERATE_CHARTS_TOOL_NAME,
    GET_COORDINATES_TOOL_NAME, SUMMARIZE_WEATHER_TOOL_NAME,
};

pub fn quote_command_part(part: &str) -> String {
    if part.is_empty() {
        return "''".to_string();
    }
    let safe = part
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '@'));
    if safe {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', "'\\''"))
    }
}

pub fn format_command_line(parts: &[String]) -> String {
    parts
        .iter()
        .map(|part| quote_command_part(part))
        .collect::<Vec<String>>()
        .join(" ")
}

pub(crate) async fn run_command(parts: &[String]) -> Result<std::process::Output> {
    let (program, args) = parts
        .split_first()
        .context("cannot run an empty command")?;
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to launch '{program}'. Is it installed and on PATH?"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow::anyhow!(
            "'{}' exited with {}: {}",
            format_command_line(parts),
            output.status,
            stderr.trim()
        ));
    }

    Ok(output)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudRunDeployPlan {
    pub service_name: String,
    pub source_path: String,
    pub region: String,
    pub project: String,
    pub env_vars: Vec<(String, String)>,
    pub allow_unauthenticated: bool,
}

/// Runtime environment handed to the Cloud Run service. The service reads
/// the same variables this binary reads locally.
pub fn cloud_run_env_vars(cfg: &RuntimeConfig, project: &str) -> Vec<(String, String)> {
    let mut env_vars = vec![
        (
            "GOOGLE_GENAI_USE_VERTEXAI".to_string(),
            if cfg.use_vertex { "1" } else { "0" }.to_string(),
        ),
        ("GOOGLE_CLOUD_PROJECT".to_string(), project.to_string()),
        ("GOOGLE_CLOUD_LOCATION".to_string(), cfg.location.clone()),
        ("APP_NAME".to_string(), cfg.app_name.clone()),
        ("GEMINI_MODEL_NAME".to_string(), cfg.model.clone()),
    ];

    if let Some(dataset_id) = &cfg.dataset_id {
        env_vars.push(("BIGQUERY_DATASET_ID".to_string(), dataset_id.clone()));
    }
    if let Some(table_id) = &cfg.table_id {
        env_vars.push(("BIGQUERY_TABLE_ID".to_string(), table_id.clone()));
    }
    if let Some(bucket) = &cfg.storage_bucket {
        env_vars.push(("GOOGLE_CLOUD_STORAGE_BUCKET".to_string(), bucket.clone()));
    }
    if let Some(maps_api_key) = &cfg.maps_api_key {
        env_vars.push(("GOOGLE_GEOMAP_API_KEY".to_string(), maps_api_key.clone()));
    }

    env_vars
}

pub fn resolve_cloud_run_plan(
    cfg: &RuntimeConfig,
    service_name: Option<String>,
    agent_path: Option<String>,
    region: Option<String>,
    allow_unauthenticated: bool,
) -> Result<CloudRunDeployPlan> {
    let service_name = service_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| cfg.app_name.clone());

    let project = cfg
        .project
        .clone()
        .context("GOOGLE_CLOUD_PROJECT is required for Cloud Run deploys")?;

    // GOOGLE_CLOUD_LOCATION_CLOUD_RUN overrides the model/backend region so
    // the service can live in a different Cloud Run region.
    let region = region
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| cfg.location.clone());

    let source_path = agent_path
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| ".".to_string());

    Ok(CloudRunDeployPlan {
        service_name,
        source_path,
        region,
        env_vars: cloud_run_env_vars(cfg, &project),
        project,
        allow_unauthenticated,
    })
}

pub fn cloud_run_deploy_command(plan: &CloudRunDeployPlan) -> Vec<String> {
    let env_pairs = plan
        .env_vars
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<String>>()
        .join(",");

    let mut command = vec![
        "gcloud".to_string(),
        "run".to_string(),
        "deploy".to_string(),
        plan.service_name.clone(),
        "--source".to_string(),
        plan.source_path.clone(),
        "--project".to_string(),
        plan.project.clone(),
        "--region".to_string(),
        plan.region.clone(),
        "--set-env-vars".to_string(),
        env_pairs,
    ];
    command.push(if plan.allow_unauthenticated {
        "--allow-unauthenticated".to_string()
    } else {
        "--no-allow-unauthenticated".to_string()
    });
    command
}

pub async fn run_deploy_cloud_run(
    cfg: &RuntimeConfig,
    service_name: Option<String>,
    agent_path: Option<String>,
    region: Option<String>,
    allow_unauthenticated: bool,
    dry_run: bool,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let plan = resolve_cloud_run_plan(cfg, service_name, agent_path, region, allow_unauthenticated)?;
    let command = cloud_run_deploy_command(&plan);

    if dry_run {
        println!("Dry-run: Cloud Run deploy command:");
        println!("{}", format_command_line(&command));
        return Ok(());
    }

    println!(
        "Deploying service '{}' to Cloud Run region '{}' (project '{}')...",
        plan.service_name, plan.region, plan.project
    );
    let output = run_command(&command).await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        println!("{}", stdout.trim());
    }

    telemetry.emit(
        "deploy.cloud_run",
        json!({
            "service_name": plan.service_name,
            "region": plan.region,
            "project": plan.project,
            "allow_unauthenticated": plan.allow_unauthenticated
        }),
    );
    println!(
        "Cloud Run deploy completed for service '{}'.",
        plan.service_name
    );
    Ok(())
}

/// Declarative description of the agent graph, staged to GCS for Agent
/// Engine registration.
pub fn agent_engine_manifest(cfg: &RuntimeConfig, display_name: &str) -> Value {
    json!({
        "api_version": "v1",
        "display_name": display_name,
        "description": "Conversational analyst agents for power and energy supply chain management.",
        "created_unix_ms": unix_ms_now(),
        "model": cfg.model,
        "orchestrator": ORCHESTRATOR_AGENT_NAME,
        "specialists": [
            DEMAND_SENSE_AGENT_NAME,
            OPS_INSIGHT_AGENT_NAME,
            MARKET_PULSE_AGENT_NAME,
            CHART_GENERATOR_AGENT_NAME,
            WEATHER_REPORT_AGENT_NAME,
        ],
        "tools": [
            DATE_TIME_TOOL_NAME,
            DEMAND_FORECAST_TOOL_NAME,
            EXECUTE_SQL_TOOL_NAME,
            SEARCH_GROUNDING_AGENT_NAME,
            RENDER_CHART_TOOL_NAME,
            GET_COORDINATES_TOOL_NAME,
            FETCH_WEATHER_TOOL_NAME,
            FILTER_WEATHER_TOOL_NAME,
            GENERATE_CHARTS_TOOL_NAME,
            SUMMARIZE_WEATHER_TOOL_NAME,
        ],
        "environment": {
            "required": [
                "GOOGLE_GENAI_USE_VERTEXAI",
                "GOOGLE_CLOUD_PROJECT",
                "GOOGLE_CLOUD_LOCATION",
            ],
            "optional": [
                "BIGQUERY_DATASET_ID",
                "BIGQUERY_TABLE_ID",
                "GOOGLE_CLOUD_STORAGE_BUCKET",
                "GOOGLE_GEOMAP_API_KEY",
                "GEMINI_MODEL_NAME",
                "GEMINI_MODEL_TEMPERATURE",
                "GEMINI_MODEL_TOP_P",
            ]
        }
    })
}

pub fn manifest_slug(display_name: &str) -> String {
    let mut slug = String::new();
    for ch in display_name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "agent".to_string()
    } else {
        slug
    }
}

pub fn agent_engine_object_name(display_name: &str, created_unix_ms: u128) -> String {
    format!(
        "agent-engine/{}-{}.json",
        manifest_slug(display_name),
        created_unix_ms
    )
}

pub fn agent_engine_staging_uri(bucket: &str, object_name: &str) -> String {
    format!("gs://{}/{}", bucket.trim_matches('/'), object_name)
}

pub async fn run_deploy_agent_engine(
    cfg: &RuntimeConfig,
    bucket: Option<String>,
    display_name: Option<String>,
    staging_dir: &str,
    dry_run: bool,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let bucket = bucket
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| cfg.storage_bucket.clone())
        .context("GOOGLE_CLOUD_STORAGE_BUCKET is required for Agent Engine deploys")?;
    cfg.project
        .as_deref()
        .context("GOOGLE_CLOUD_PROJECT is required for Agent Engine deploys")?;

    let display_name = display_name
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| cfg.app_name.clone());

    let manifest = agent_engine_manifest(cfg, &display_name);
    let created_unix_ms = manifest
        .get("created_unix_ms")
        .and_then(Value::as_u64)
        .map(u128::from)
        .unwrap_or_else(unix_ms_now);
    let object_name = agent_engine_object_name(&display_name, created_unix_ms);
    let staged_uri = agent_engine_staging_uri(&bucket, &object_name);

    let manifest_path =
        PathBuf::from(staging_dir).join(format!("{}.manifest.json", manifest_slug(&display_name)));
    let manifest_text =
        serde_json::to_string_pretty(&manifest).context("failed to serialize agent manifest")?;

    let command = vec![
        "gcloud".to_string(),
        "storage".to_string(),
        "cp".to_string(),
        manifest_path.display().to_string(),
        staged_uri.clone(),
    ];

    if dry_run {
        println!(
            "Dry-run: would write agent manifest to '{}' and stage it:",
            manifest_path.display()
        );
        println!("{}", format_command_line(&command));
        return Ok(());
    }

    if let Some(parent) = manifest_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create staging directory '{}'", parent.display())
        })?;
    }
    std::fs::write(&manifest_path, manifest_text).with_context(|| {
        format!(
            "failed to write agent manifest to '{}'",
            manifest_path.display()
        )
    })?;
    println!("Wrote agent manifest to '{}'.", manifest_path.display());

    run_command(&command).await?;

    telemetry.emit(
        "deploy.agent_engine",
        json!({
            "display_name": display_name,
            "bucket": bucket,
            "staged_uri": staged_uri.clone()
        }),
    );
    println!("Staged agent manifest at {staged_uri}");
    println!("Register the staged manifest with Vertex AI Agent Engine to finish the deploy.");
    Ok(())
}
