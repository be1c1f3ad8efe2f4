use std::collections::{BTreeSet, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::config::RuntimeConfig;

pub fn unix_ms_now() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Append-only JSONL sink for analyst run telemetry. Every record carries
/// the run id, the invoking command, and the session id, so one file can
/// interleave `ask`, `chat`, and `serve` traffic and still be attributable.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    enabled: bool,
    path: PathBuf,
    run_id: String,
    command: String,
    session_id: String,
    file_lock: Arc<std::sync::Mutex<()>>,
}

impl TelemetrySink {
    pub fn new(cfg: &RuntimeConfig, command: String) -> Self {
        Self {
            enabled: cfg.telemetry_enabled,
            path: PathBuf::from(&cfg.telemetry_path),
            run_id: format!("run-{}-{}", unix_ms_now(), std::process::id()),
            command,
            session_id: cfg.session_id.clone(),
            file_lock: Arc::new(std::sync::Mutex::new(())),
        }
    }

    /// Emission never fails the command; write errors degrade to a warning.
    pub fn emit(&self, event: &str, payload: Value) {
        if !self.enabled {
            return;
        }

        let record = self.enveloped(event, payload);
        if let Err(err) = self.append_line(&record) {
            tracing::warn!(
                event = event,
                path = %self.path.display(),
                error = %err,
                "telemetry write failed"
            );
        }
    }

    /// Payload fields win over envelope fields on key collision.
    fn enveloped(&self, event: &str, payload: Value) -> Value {
        let mut record = json!({
            "ts_unix_ms": unix_ms_now(),
            "event": event,
            "run_id": self.run_id,
            "command": self.command,
            "session_id": self.session_id,
        });
        if let (Some(target), Some(extra)) = (record.as_object_mut(), payload.as_object()) {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }
        record
    }

    fn append_line(&self, record: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create telemetry directory '{}'",
                    parent.display()
                )
            })?;
        }

        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open telemetry path '{}'", self.path.display()))?;
        writeln!(file, "{record}")
            .with_context(|| format!("failed to append telemetry record for '{}'", self.command))
    }
}

#[derive(Debug, Default)]
pub struct TelemetrySummary {
    pub total_lines: usize,
    pub parsed_events: usize,
    pub parse_errors: usize,
    pub unique_runs: BTreeSet<String>,
    pub command_counts: HashMap<String, usize>,
    pub command_completed: usize,
    pub command_failed: usize,
    pub tool_requested: usize,
    pub tool_succeeded: usize,
    pub tool_failed: usize,
    pub model_resolved: usize,
    pub server_asks: usize,
    pub last_event_ts_unix_ms: Option<u128>,
}

impl TelemetrySummary {
    fn absorb(&mut self, record: &Value) {
        self.parsed_events += 1;

        if let Some(run_id) = record.get("run_id").and_then(Value::as_str)
            && !run_id.is_empty()
        {
            self.unique_runs.insert(run_id.to_string());
        }

        if let Some(command) = record.get("command").and_then(Value::as_str)
            && !command.is_empty()
        {
            *self.command_counts.entry(command.to_string()).or_insert(0) += 1;
        }

        if let Some(ts) = record.get("ts_unix_ms").and_then(Value::as_u64) {
            let ts = ts as u128;
            self.last_event_ts_unix_ms = Some(match self.last_event_ts_unix_ms {
                Some(existing) => existing.max(ts),
                None => ts,
            });
        }

        let counter = match record
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
        {
            "command.completed" => &mut self.command_completed,
            "command.failed" => &mut self.command_failed,
            "tool.requested" => &mut self.tool_requested,
            "tool.succeeded" => &mut self.tool_succeeded,
            "tool.failed" => &mut self.tool_failed,
            "model.resolved" => &mut self.model_resolved,
            "server.ask" => &mut self.server_asks,
            _ => return,
        };
        *counter += 1;
    }
}

/// Summarizes the newest `limit` lines of a telemetry file. Blank lines are
/// skipped; lines that are not JSON count as parse errors.
pub fn summarize_telemetry_lines(lines: Vec<String>, limit: usize) -> TelemetrySummary {
    let mut summary = TelemetrySummary {
        total_lines: lines.len(),
        ..TelemetrySummary::default()
    };

    for line in lines.into_iter().rev().take(limit.max(1)) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(record) => summary.absorb(&record),
            Err(_) => summary.parse_errors += 1,
        }
    }

    summary
}

pub fn run_telemetry_report(
    cfg: &RuntimeConfig,
    path_override: Option<String>,
    limit: usize,
) -> Result<()> {
    let path = PathBuf::from(path_override.unwrap_or_else(|| cfg.telemetry_path.clone()));
    if !path.exists() {
        println!("No telemetry file found at '{}'.", path.display());
        return Ok(());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read telemetry file '{}'", path.display()))?;
    let lines = content.lines().map(str::to_string).collect::<Vec<String>>();
    let summary = summarize_telemetry_lines(lines, limit);

    println!("Telemetry report for {}", path.display());
    println!(
        "Lines: {} | analyzed: {} | parse errors: {}",
        summary.total_lines, summary.parsed_events, summary.parse_errors
    );
    println!("Analyst runs observed: {}", summary.unique_runs.len());
    println!(
        "Commands: completed={} failed={}",
        summary.command_completed, summary.command_failed
    );
    println!(
        "Tool calls: requested={} succeeded={} failed={}",
        summary.tool_requested, summary.tool_succeeded, summary.tool_failed
    );
    println!(
        "Models resolved: {} | /ask requests served: {}",
        summary.model_resolved, summary.server_asks
    );

    let mut commands = summary.command_counts.iter().collect::<Vec<_>>();
    commands.sort_by_key(|(name, count)| (std::cmp::Reverse(**count), (*name).clone()));
    if !commands.is_empty() {
        println!("Busiest commands:");
        for (name, count) in commands.into_iter().take(5) {
            println!("- {name}: {count}");
        }
    }

    if let Some(last_ts) = summary.last_event_ts_unix_ms {
        println!("Last event ts_unix_ms: {last_ts}");
    }

    Ok(())
}
