use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use adk_rust::prelude::*;
use adk_session::*;
use anyhow::{Context, Result};

use crate::agents::chart_generator::CHART_GENERATOR_OUTPUT_KEY;
use crate::agents::demand_sense::DEMAND_SENSE_OUTPUT_KEY;
use crate::agents::market_pulse::MARKET_PULSE_OUTPUT_KEY;
use crate::agents::ops_insight::OPS_INSIGHT_OUTPUT_KEY;
use crate::agents::weather_report::WEATHER_REPORT_OUTPUT_KEY;
use crate::cli::SessionBackend;
use crate::config::RuntimeConfig;
use crate::streaming::event_text;

/// State keys the specialists publish their reports under, in the order the
/// orchestrator lists the agents.
const SPECIALIST_REPORT_KEYS: [&str; 5] = [
    DEMAND_SENSE_OUTPUT_KEY,
    OPS_INSIGHT_OUTPUT_KEY,
    MARKET_PULSE_OUTPUT_KEY,
    WEATHER_REPORT_OUTPUT_KEY,
    CHART_GENERATOR_OUTPUT_KEY,
];

pub async fn build_session_service(cfg: &RuntimeConfig) -> Result<Arc<dyn SessionService>> {
    match cfg.session_backend {
        SessionBackend::Memory => Ok(Arc::new(InMemorySessionService::new())),
        SessionBackend::Sqlite => {
            let service = open_sqlite_session_service(&cfg.session_db_url).await?;
            Ok(Arc::new(service))
        }
    }
}

pub async fn open_sqlite_session_service(db_url: &str) -> Result<DatabaseSessionService> {
    ensure_parent_dir_for_sqlite_url(db_url)?;
    let service = DatabaseSessionService::new(db_url)
        .await
        .context("failed to open sqlite session database")?;
    service
        .migrate()
        .await
        .context("failed to run sqlite session migrations")?;
    Ok(service)
}

/// The conversation session must exist before the runner streams into it.
/// A missing session is created empty; an existing one keeps its specialist
/// reports and event history.
pub async fn ensure_session_exists(
    session_service: &Arc<dyn SessionService>,
    cfg: &RuntimeConfig,
) -> Result<()> {
    let existing = session_service
        .get(GetRequest {
            app_name: cfg.app_name.clone(),
            user_id: cfg.user_id.clone(),
            session_id: cfg.session_id.clone(),
            num_recent_events: None,
            after: None,
        })
        .await;
    if existing.is_ok() {
        return Ok(());
    }

    session_service
        .create(CreateRequest {
            app_name: cfg.app_name.clone(),
            user_id: cfg.user_id.clone(),
            session_id: Some(cfg.session_id.clone()),
            state: HashMap::new(),
        })
        .await
        .with_context(|| {
            format!(
                "failed to create session '{}' for app '{}'",
                cfg.session_id, cfg.app_name
            )
        })?;
    Ok(())
}

/// sqlx opens `sqlite://` URLs only when the file's directory already exists,
/// so the path is prepared before the pool connects.
pub fn ensure_parent_dir_for_sqlite_url(db_url: &str) -> Result<()> {
    let Some(db_path) = sqlite_path_from_url(db_url) else {
        return Ok(());
    };

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create directory for sqlite database: {}",
                parent.display()
            )
        })?;
    }

    if !db_path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&db_path)
            .with_context(|| {
                format!(
                    "failed to initialize sqlite database file: {}",
                    db_path.display()
                )
            })?;
    }

    Ok(())
}

pub fn sqlite_path_from_url(db_url: &str) -> Option<PathBuf> {
    let raw = db_url.strip_prefix("sqlite://")?;
    let path = raw.split_once('?').map(|(path, _)| path).unwrap_or(raw);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(Path::new(path).to_path_buf())
}

async fn list_sessions_recent_first(
    session_service: &Arc<dyn SessionService>,
    cfg: &RuntimeConfig,
) -> Result<Vec<Box<dyn Session>>> {
    let mut sessions = session_service
        .list(ListRequest {
            app_name: cfg.app_name.clone(),
            user_id: cfg.user_id.clone(),
        })
        .await
        .with_context(|| {
            format!(
                "failed to list sessions for app '{}' and user '{}'",
                cfg.app_name, cfg.user_id
            )
        })?;
    sessions.sort_by_key(|session| std::cmp::Reverse(session.last_update_time()));
    Ok(sessions)
}

pub async fn run_sessions_list(cfg: &RuntimeConfig) -> Result<()> {
    let session_service = build_session_service(cfg).await?;
    let sessions = list_sessions_recent_first(&session_service, cfg).await?;

    if sessions.is_empty() {
        println!(
            "No sessions found for app '{}' and user '{}'.",
            cfg.app_name, cfg.user_id
        );
        return Ok(());
    }

    println!(
        "Sessions for app '{}' and user '{}' (most recent first):",
        cfg.app_name, cfg.user_id
    );
    for session in sessions {
        println!(
            "- {} (updated: {})",
            session.id(),
            session.last_update_time().to_rfc3339()
        );
    }
    Ok(())
}

pub async fn run_sessions_show(
    cfg: &RuntimeConfig,
    session_id_override: Option<String>,
    recent: usize,
) -> Result<()> {
    let session_id = session_id_override.unwrap_or_else(|| cfg.session_id.clone());
    let session_service = build_session_service(cfg).await?;
    let session = session_service
        .get(GetRequest {
            app_name: cfg.app_name.clone(),
            user_id: cfg.user_id.clone(),
            session_id: session_id.clone(),
            num_recent_events: (recent > 0).then_some(recent),
            after: None,
        })
        .await
        .with_context(|| {
            format!(
                "failed to load session '{}' for app '{}' and user '{}'",
                session_id, cfg.app_name, cfg.user_id
            )
        })?;

    println!(
        "Session '{}' (app='{}', user='{}', events={}):",
        session.id(),
        session.app_name(),
        session.user_id(),
        session.events().len()
    );

    let events = session.events().all();
    if events.is_empty() {
        println!("No events in this session.");
    } else {
        for event in &events {
            print_session_event(event);
        }
    }

    let reports = SPECIALIST_REPORT_KEYS
        .iter()
        .filter(|key| session.state().get(key).is_some())
        .copied()
        .collect::<Vec<&str>>();
    if !reports.is_empty() {
        println!("Specialist reports in state: {}", reports.join(", "));
    }

    Ok(())
}

pub async fn run_sessions_delete(
    cfg: &RuntimeConfig,
    session_id_override: Option<String>,
    force: bool,
) -> Result<()> {
    let session_id = session_id_override.unwrap_or_else(|| cfg.session_id.clone());
    confirm_destructive(
        force,
        format!("deleting session '{session_id}' discards its conversation history"),
    )?;

    let session_service = build_session_service(cfg).await?;
    delete_one_session(&session_service, cfg, &session_id).await?;

    println!(
        "Deleted session '{}' for app '{}' and user '{}'.",
        session_id, cfg.app_name, cfg.user_id
    );
    Ok(())
}

pub async fn run_sessions_prune(
    cfg: &RuntimeConfig,
    keep: usize,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let keep = keep.max(1);
    let session_service = build_session_service(cfg).await?;
    let prune_ids = list_sessions_recent_first(&session_service, cfg)
        .await?
        .into_iter()
        .skip(keep)
        .map(|session| session.id().to_string())
        .collect::<Vec<String>>();

    if prune_ids.is_empty() {
        println!("Nothing to prune. Session count is within keep={keep}.");
        return Ok(());
    }

    if dry_run {
        println!(
            "Dry-run: {} session(s) would be deleted (keeping the {} most recent):",
            prune_ids.len(),
            keep
        );
        for id in prune_ids {
            println!("- {id}");
        }
        return Ok(());
    }

    confirm_destructive(
        force,
        format!(
            "pruning would delete {} session(s); preview with --dry-run",
            prune_ids.len()
        ),
    )?;

    for session_id in &prune_ids {
        delete_one_session(&session_service, cfg, session_id).await?;
    }

    println!(
        "Pruned {} session(s). Kept the {} most recent.",
        prune_ids.len(),
        keep
    );
    Ok(())
}

fn confirm_destructive(force: bool, detail: String) -> Result<()> {
    if force {
        return Ok(());
    }
    Err(anyhow::anyhow!("{detail}. Re-run with --force to proceed"))
}

async fn delete_one_session(
    session_service: &Arc<dyn SessionService>,
    cfg: &RuntimeConfig,
    session_id: &str,
) -> Result<()> {
    session_service
        .delete(DeleteRequest {
            app_name: cfg.app_name.clone(),
            user_id: cfg.user_id.clone(),
            session_id: session_id.to_string(),
        })
        .await
        .with_context(|| {
            format!(
                "failed to delete session '{}' for app '{}' and user '{}'",
                session_id, cfg.app_name, cfg.user_id
            )
        })
}

fn print_session_event(event: &Event) {
    let mut header = format!("[{}] {}", event.timestamp.to_rfc3339(), event.author);
    if event.is_final_response() {
        header.push_str(" [final]");
    }
    println!("{header}");

    let tools = event_tool_calls(event);
    if !tools.is_empty() {
        println!("tool calls: {}", tools.join(", "));
    }

    let text = event_text(event);
    if !text.is_empty() {
        println!("{text}");
    } else if tools.is_empty() {
        println!("<non-text event>");
    }

    // The weather pipeline and chart generator mirror coordinates and chart
    // filenames into state and save rendered SVGs as artifacts.
    if !event.actions.state_delta.is_empty() {
        let mut keys = event
            .actions
            .state_delta
            .keys()
            .cloned()
            .collect::<Vec<String>>();
        keys.sort();
        println!("state_delta keys: {}", keys.join(", "));
    }

    if !event.actions.artifact_delta.is_empty() {
        let mut names = event
            .actions
            .artifact_delta
            .keys()
            .cloned()
            .collect::<Vec<String>>();
        names.sort();
        println!("artifacts saved: {}", names.join(", "));
    }

    println!();
}

fn event_tool_calls(event: &Event) -> Vec<String> {
    let Some(content) = event.content() else {
        return Vec::new();
    };
    content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::FunctionCall { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}
