use std::collections::HashMap;
use std::io::{self, Write};

use adk_rust::futures::StreamExt;
use adk_rust::prelude::*;
use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::RuntimeConfig;
use crate::telemetry::TelemetrySink;

pub const NO_TEXTUAL_RESPONSE: &str = "No textual response produced by the agent.";

/// Accumulates streamed text per author. The orchestrator and its five
/// specialists all emit on one stream; the answer is the latest non-empty
/// final response, with the last author's buffer as fallback when no final
/// snapshot ever arrives.
#[derive(Default, Debug)]
pub struct AuthorTextTracker {
    final_snapshot: Option<(String, String)>,
    last_author_with_text: Option<String>,
    buffers: HashMap<String, String>,
}

impl AuthorTextTracker {
    pub fn ingest_parts(
        &mut self,
        author: &str,
        text: &str,
        partial: bool,
        is_final: bool,
    ) -> String {
        if text.is_empty() {
            return String::new();
        }

        self.last_author_with_text = Some(author.to_string());
        let buffer = self.buffers.entry(author.to_string()).or_default();
        let delta = ingest_author_text(buffer, text, partial, is_final);

        if is_final && !text.trim().is_empty() {
            self.final_snapshot = Some((author.to_string(), text.to_string()));
        }

        delta
    }

    pub fn resolve_text(&self) -> Option<String> {
        if let Some((_, text)) = &self.final_snapshot {
            return Some(text.clone());
        }

        let buffer = self.buffers.get(self.last_author_with_text.as_ref()?)?;
        let trimmed = buffer.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Folds one text chunk into an author's buffer and returns the part that
/// has not been seen yet. Gemini interleaves partial deltas with cumulative
/// snapshots of the same text, so replays must come back empty.
pub fn ingest_author_text(buffer: &mut String, text: &str, partial: bool, is_final: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    if partial || buffer.is_empty() {
        buffer.push_str(text);
        return text.to_string();
    }

    if text == buffer.as_str() {
        return String::new();
    }

    if let Some(suffix) = text.strip_prefix(buffer.as_str()) {
        let delta = suffix.to_string();
        *buffer = text.to_string();
        return delta;
    }

    // A divergent final snapshot replaces the buffer but is not re-emitted;
    // partial streaming already printed its text.
    if is_final {
        *buffer = text.to_string();
        return String::new();
    }

    let overlap = suffix_prefix_overlap(buffer, text);
    if overlap >= text.len() {
        return String::new();
    }
    let delta = text[overlap..].to_string();
    buffer.push_str(&delta);
    delta
}

/// Length in bytes of the longest suffix of `existing` that is a prefix of
/// `incoming`, measured on char boundaries of `incoming`.
pub fn suffix_prefix_overlap(existing: &str, incoming: &str) -> usize {
    let max_len = existing.len().min(incoming.len());
    let mut best = 0usize;
    let boundaries = incoming
        .char_indices()
        .map(|(idx, _)| idx)
        .skip(1)
        .chain([incoming.len()]);
    for boundary in boundaries {
        if boundary <= max_len && existing.ends_with(&incoming[..boundary]) {
            best = boundary;
        }
    }
    best
}

/// What still needs printing once the stream closes: the unseen tail when
/// the final text grew past the emitted prefix, or the whole final text on
/// a fresh line when it diverged.
pub fn final_stream_suffix(emitted: &str, final_text: &str) -> Option<String> {
    if final_text.trim().is_empty() {
        return None;
    }
    if emitted.is_empty() {
        return Some(final_text.to_string());
    }
    if final_text == emitted || final_text.trim() == emitted.trim() {
        return None;
    }
    match final_text.strip_prefix(emitted) {
        Some("") => None,
        Some(suffix) => Some(suffix.to_string()),
        None => Some(format!("\n{final_text}")),
    }
}

pub fn event_text(event: &Event) -> String {
    let Some(content) = event.content() else {
        return String::new();
    };
    content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Detects in-band tool failures: either {"error": ...} or
/// {"status": "error"/"failed", "error_message"/"message": ...} payloads.
pub fn extract_tool_failure_message(response: &Value) -> Option<String> {
    if let Some(message) = response.get("error").and_then(Value::as_str) {
        return Some(message.to_string());
    }

    let status = response.get("status").and_then(Value::as_str)?;
    if !status.eq_ignore_ascii_case("error") && !status.eq_ignore_ascii_case("failed") {
        return None;
    }
    response
        .get("error_message")
        .or_else(|| response.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn emit_tool_lifecycle_events(event: &Event, telemetry: &TelemetrySink) {
    let Some(content) = event.content() else {
        return;
    };

    for part in &content.parts {
        match part {
            Part::FunctionCall { name, .. } => {
                tracing::info!(tool = %name, author = %event.author, "tool call requested");
                telemetry.emit(
                    "tool.requested",
                    serde_json::json!({"tool": name, "author": event.author}),
                );
            }
            Part::FunctionResponse {
                function_response, ..
            } => match extract_tool_failure_message(&function_response.response) {
                Some(error_message) => {
                    tracing::warn!(
                        tool = %function_response.name,
                        author = %event.author,
                        error = %error_message,
                        "tool execution failed"
                    );
                    telemetry.emit(
                        "tool.failed",
                        serde_json::json!({
                            "tool": function_response.name,
                            "author": event.author,
                            "error": error_message
                        }),
                    );
                }
                None => {
                    tracing::info!(
                        tool = %function_response.name,
                        author = %event.author,
                        "tool execution completed"
                    );
                    telemetry.emit(
                        "tool.succeeded",
                        serde_json::json!({
                            "tool": function_response.name,
                            "author": event.author
                        }),
                    );
                }
            },
            _ => {}
        }
    }
}

/// Result of draining one runner stream to completion.
struct StreamDigest {
    tracker: AuthorTextTracker,
    emitted_by_author: HashMap<String, String>,
    printed_any_output: bool,
}

impl StreamDigest {
    fn resolved_or_placeholder(&self) -> String {
        self.tracker
            .resolve_text()
            .unwrap_or_else(|| NO_TEXTUAL_RESPONSE.to_string())
    }
}

async fn open_stream(runner: &Runner, cfg: &RuntimeConfig, prompt: &str) -> Result<EventStream> {
    let length = prompt.chars().count();
    if length > cfg.max_prompt_chars {
        anyhow::bail!(
            "prompt is {length} characters, which exceeds the maximum of {} characters",
            cfg.max_prompt_chars
        );
    }

    runner
        .run(
            cfg.user_id.clone(),
            cfg.session_id.clone(),
            Content::new("user").with_text(prompt),
        )
        .await
        .context("failed to start runner stream")
}

/// Single event loop behind both prompt entry points. With `echo_deltas`
/// set, unseen text is printed to stdout as it arrives.
async fn drain_stream(
    mut stream: EventStream,
    telemetry: &TelemetrySink,
    echo_deltas: bool,
) -> Result<StreamDigest> {
    let mut digest = StreamDigest {
        tracker: AuthorTextTracker::default(),
        emitted_by_author: HashMap::new(),
        printed_any_output: false,
    };
    let mut stdout = io::stdout();

    while let Some(event_result) = stream.next().await {
        let event = match event_result {
            Ok(event) => event,
            Err(err) => {
                if echo_deltas {
                    eprintln!("  Runner error: {err:#}");
                } else {
                    tracing::warn!("runner event error: {err:#}");
                }
                continue;
            }
        };

        if event.author == "user" {
            continue;
        }

        emit_tool_lifecycle_events(&event, telemetry);

        let text = event_text(&event);
        tracing::debug!(
            author = %event.author,
            is_final = event.is_final_response(),
            partial = event.llm_response.partial,
            text_len = text.len(),
            "runner event"
        );

        let delta = digest.tracker.ingest_parts(
            &event.author,
            &text,
            event.llm_response.partial,
            event.is_final_response(),
        );
        if echo_deltas && !delta.is_empty() {
            print!("{delta}");
            stdout.flush().context("failed to flush stdout")?;
            digest
                .emitted_by_author
                .entry(event.author.clone())
                .or_default()
                .push_str(&delta);
            digest.printed_any_output = true;
        }
    }

    Ok(digest)
}

/// Runs one prompt to completion and returns the resolved final text.
pub async fn run_prompt(
    runner: &Runner,
    cfg: &RuntimeConfig,
    prompt: &str,
    telemetry: &TelemetrySink,
) -> Result<String> {
    let stream = open_stream(runner, cfg, prompt).await?;
    let digest = drain_stream(stream, telemetry, false).await?;
    Ok(digest.resolved_or_placeholder())
}

/// Runs one prompt, echoing text deltas to stdout as they stream, and
/// returns the resolved final text.
pub async fn run_prompt_streaming(
    runner: &Runner,
    cfg: &RuntimeConfig,
    prompt: &str,
    telemetry: &TelemetrySink,
) -> Result<String> {
    let stream = open_stream(runner, cfg, prompt).await?;
    let digest = drain_stream(stream, telemetry, true).await?;

    if !digest.printed_any_output {
        let fallback = digest.resolved_or_placeholder();
        println!("{fallback}");
        return Ok(fallback);
    }

    if let Some((final_author, final_text)) = &digest.tracker.final_snapshot {
        let emitted = digest
            .emitted_by_author
            .get(final_author)
            .map(String::as_str)
            .unwrap_or_default();
        if let Some(suffix) = final_stream_suffix(emitted, final_text) {
            print!("{suffix}");
            io::stdout().flush().context("failed to flush stdout")?;
        }
    }

    println!();
    Ok(digest.resolved_or_placeholder())
}
