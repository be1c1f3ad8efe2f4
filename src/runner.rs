use std::sync::Arc;

use adk_rust::prelude::InMemoryArtifactService;
use adk_rust::prelude::*;
use adk_session::SessionService;
use anyhow::{Context, Result};
use serde_json::json;

use crate::agents::chart_generator::build_chart_generator_agent;
use crate::agents::demand_sense::build_demand_sense_agent;
use crate::agents::market_pulse::build_market_pulse_agent;
use crate::agents::ops_insight::build_ops_insight_agent;
use crate::agents::orchestrator::{SpecialistAgents, build_orchestrator_agent};
use crate::agents::weather_report::build_weather_report_agent;
use crate::config::RuntimeConfig;
use crate::model::{ModelBackend, resolve_model};
use crate::session::{build_session_service, ensure_session_exists};
use crate::telemetry::TelemetrySink;
use crate::tools::warehouse::{
    BigQueryWarehouse, TableReference, UnconfiguredWarehouse, Warehouse, load_table_schema_text,
};
use crate::tools::weather::WeatherService;

/// Builds the warehouse backend from the resolved cloud settings, degrading
/// to a stand-in whose calls explain what is missing.
pub fn resolve_warehouse(cfg: &RuntimeConfig) -> Arc<dyn Warehouse> {
    let reference = match (&cfg.project, &cfg.dataset_id, &cfg.table_id) {
        (Some(project), Some(dataset), Some(table)) => {
            TableReference::new(project.clone(), dataset.clone(), table.clone())
        }
        _ => return Arc::new(UnconfiguredWarehouse::default()),
    };
    match BigQueryWarehouse::new(reference) {
        Ok(warehouse) => Arc::new(warehouse),
        Err(err) => {
            tracing::warn!(
                error = %format!("{err:#}"),
                "failed to initialize BigQuery warehouse, queries will fail in-band"
            );
            Arc::new(UnconfiguredWarehouse::default())
        }
    }
}

/// Assembles the orchestrator with its five specialists. The same model
/// backs every agent; per-agent temperament comes from the shared tuning
/// callback.
pub async fn build_agent_graph(cfg: &RuntimeConfig, model: Arc<dyn Llm>) -> Result<Arc<dyn Agent>> {
    let warehouse = resolve_warehouse(cfg);
    let schema_text = load_table_schema_text(warehouse.as_ref()).await;

    let weather = Arc::new(WeatherService::new(
        cfg.maps_api_key.clone(),
        model.clone(),
        cfg.temperature,
        cfg.top_p,
    )?);

    let specialists = SpecialistAgents {
        demand_sense: build_demand_sense_agent(
            model.clone(),
            warehouse.clone(),
            cfg.forecast_history_days,
            cfg.temperature,
            cfg.top_p,
        )?,
        ops_insight: build_ops_insight_agent(
            model.clone(),
            warehouse.clone(),
            &schema_text,
            cfg.temperature,
            cfg.top_p,
        )?,
        market_pulse: build_market_pulse_agent(model.clone(), cfg.temperature, cfg.top_p)?,
        chart_generator: build_chart_generator_agent(model.clone(), cfg.temperature, cfg.top_p)?,
        weather_report: build_weather_report_agent(
            model.clone(),
            weather,
            cfg.temperature,
            cfg.top_p,
        )?,
    };

    build_orchestrator_agent(model, specialists, cfg.temperature, cfg.top_p)
}

pub async fn build_runner(agent: Arc<dyn Agent>, cfg: &RuntimeConfig) -> Result<Runner> {
    let session_service = build_session_service(cfg).await?;
    build_runner_with_session_service(agent, cfg, session_service).await
}

pub async fn build_runner_with_session_service(
    agent: Arc<dyn Agent>,
    cfg: &RuntimeConfig,
    session_service: Arc<dyn SessionService>,
) -> Result<Runner> {
    ensure_session_exists(&session_service, cfg).await?;
    let artifact_service = Arc::new(InMemoryArtifactService::new());

    Runner::new(RunnerConfig {
        app_name: cfg.app_name.clone(),
        agent,
        session_service,
        artifact_service: Some(artifact_service),
        memory_service: None,
        plugin_manager: None,
        run_config: None,
        compaction_config: None,
    })
    .context("failed to build ADK runner")
}

/// Resolves the model, builds the full agent graph, and wraps it in a
/// runner bound to the given session service.
pub async fn build_analyst_runner(
    cfg: &RuntimeConfig,
    session_service: Arc<dyn SessionService>,
    telemetry: &TelemetrySink,
    path: &str,
) -> Result<(Runner, ModelBackend, String)> {
    let (model, backend, model_name) = resolve_model(cfg)?;
    telemetry.emit(
        "model.resolved",
        json!({
            "backend": backend.label(),
            "model": model_name.clone(),
            "path": path
        }),
    );
    let agent = build_agent_graph(cfg, model).await?;
    let runner = build_runner_with_session_service(agent, cfg, session_service).await?;
    Ok((runner, backend, model_name))
}
