use std::io::{self, Write};
use std::sync::Arc;

use adk_rust::prelude::*;
use adk_session::SessionService;
use anyhow::{Context, Result};
use serde_json::json;

use crate::config::RuntimeConfig;
use crate::error::format_cli_error;
use crate::model::ModelBackend;
use crate::runner::build_analyst_runner;
use crate::session::{build_session_service, ensure_session_exists};
use crate::streaming::run_prompt_streaming;
use crate::telemetry::TelemetrySink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    Status,
    Help,
    Model(Option<String>),
    Session(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedChatCommand {
    NotACommand,
    Command(ChatCommand),
    UnknownCommand(String),
}

pub fn parse_chat_command(input: &str) -> ParsedChatCommand {
    let trimmed = input.trim();

    // Bare "exit" works without the slash.
    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("/exit") {
        return ParsedChatCommand::Command(ChatCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return ParsedChatCommand::NotACommand;
    }

    let slashless = trimmed.trim_start_matches('/');
    if slashless.is_empty() {
        return ParsedChatCommand::UnknownCommand("/".to_string());
    }

    let (command, arg) = match slashless.split_once(char::is_whitespace) {
        Some((command, rest)) => (command.to_ascii_lowercase(), rest.trim()),
        None => (slashless.to_ascii_lowercase(), ""),
    };
    let optional_arg = || (!arg.is_empty()).then(|| arg.to_string());

    match command.as_str() {
        "exit" => ParsedChatCommand::Command(ChatCommand::Exit),
        "status" => ParsedChatCommand::Command(ChatCommand::Status),
        "help" => ParsedChatCommand::Command(ChatCommand::Help),
        "model" => ParsedChatCommand::Command(ChatCommand::Model(optional_arg())),
        "session" => ParsedChatCommand::Command(ChatCommand::Session(optional_arg())),
        other => ParsedChatCommand::UnknownCommand(format!("/{other}")),
    }
}

pub fn print_chat_help() {
    println!("Chat commands:");
    println!("- /help: show command quick reference");
    println!("- /status: show active profile/backend/model/session");
    println!("- /model [id]: pick a Gemini model interactively or switch directly by id");
    println!("- /session [id]: show the active session or switch to another one");
    println!("- /exit: end interactive chat");
    println!();
    println!("Ask about power demand forecasts, supply chain news, warehouse data,");
    println!("weather impact on generation, or request a chart of prior results.");
}

#[derive(Debug, Clone, Copy)]
pub struct ModelPickerOption {
    id: &'static str,
    context_window: &'static str,
    description: &'static str,
}

pub fn model_picker_options() -> Vec<ModelPickerOption> {
    vec![
        ModelPickerOption {
            id: "gemini-2.5-flash",
            context_window: "1M",
            description: "fast balanced default",
        },
        ModelPickerOption {
            id: "gemini-2.5-pro",
            context_window: "1M",
            description: "higher reasoning depth",
        },
        ModelPickerOption {
            id: "gemini-2.0-flash",
            context_window: "1M",
            description: "previous generation fallback",
        },
    ]
}

/// Maps picker input to a model id: a number picks from the list, a known id
/// matches case-insensitively, anything else passes through verbatim so new
/// Gemini releases stay usable without a code change.
pub fn resolve_model_picker_selection(
    options: &[ModelPickerOption],
    selection: &str,
) -> Result<Option<String>> {
    if options.is_empty() {
        return Ok(None);
    }

    let trimmed = selection.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("cancel") {
        return Ok(None);
    }

    if let Ok(index) = trimmed.parse::<usize>() {
        if index == 0 || index > options.len() {
            return Err(anyhow::anyhow!(
                "invalid selection '{}'; expected 1-{}",
                trimmed,
                options.len()
            ));
        }
        return Ok(Some(options[index - 1].id.to_string()));
    }

    let resolved = options
        .iter()
        .find(|option| option.id.eq_ignore_ascii_case(trimmed))
        .map(|option| option.id.to_string())
        .unwrap_or_else(|| trimmed.to_string());
    Ok(Some(resolved))
}

pub fn prompt_model_picker(current_model: &str) -> Result<Option<String>> {
    let options = model_picker_options();

    println!("Model picker (active_model={current_model}):");
    for (idx, option) in options.iter().enumerate() {
        println!(
            "{}. {} (ctx={}, {})",
            idx + 1,
            option.id,
            option.context_window,
            option.description
        );
    }
    print!("Select model number or id (Enter to cancel): ");
    io::stdout().flush().context("failed to flush stdout")?;

    let mut selection = String::new();
    io::stdin()
        .read_line(&mut selection)
        .context("failed to read model picker input")?;
    resolve_model_picker_selection(&options, &selection)
}

pub enum ChatCommandAction {
    Continue,
    Exit,
}

/// Rebuilds the runner for an updated config and swaps it into the live
/// chat loop. On failure the previous runner stays active and the error is
/// printed; session continuity is preserved either way.
async fn try_switch_runtime(
    switched_cfg: RuntimeConfig,
    cfg: &mut RuntimeConfig,
    runner: &mut Runner,
    backend: &mut ModelBackend,
    model_name: &mut String,
    session_service: &Arc<dyn SessionService>,
    telemetry: &TelemetrySink,
) -> bool {
    match build_analyst_runner(&switched_cfg, session_service.clone(), telemetry, "chat").await {
        Ok((new_runner, new_backend, new_model_name)) => {
            *runner = new_runner;
            *backend = new_backend;
            *model_name = new_model_name;
            *cfg = switched_cfg;
            true
        }
        Err(err) => {
            eprintln!("{}", format_cli_error(&err, cfg.show_sensitive_config));
            false
        }
    }
}

pub async fn dispatch_chat_command(
    command: ChatCommand,
    cfg: &mut RuntimeConfig,
    runner: &mut Runner,
    backend: &mut ModelBackend,
    model_name: &mut String,
    session_service: &Arc<dyn SessionService>,
    telemetry: &TelemetrySink,
) -> Result<ChatCommandAction> {
    match command {
        ChatCommand::Exit => return Ok(ChatCommandAction::Exit),
        ChatCommand::Status => {
            println!(
                "profile={} backend={} model={} session_id={} warehouse={}",
                cfg.profile,
                backend.label(),
                model_name,
                cfg.session_id,
                cfg.warehouse_table()
                    .unwrap_or_else(|| "<unconfigured>".to_string())
            );
        }
        ChatCommand::Help => print_chat_help(),
        ChatCommand::Model(next_model) => {
            let chosen_model = match next_model {
                Some(value) => Some(value),
                None => prompt_model_picker(model_name)?,
            };
            let Some(chosen_model) = chosen_model else {
                println!("Model unchanged ('{model_name}').");
                return Ok(ChatCommandAction::Continue);
            };
            if !chosen_model.starts_with("gemini") {
                println!(
                    "Model '{chosen_model}' is not a Gemini model. This build targets Gemini backends only."
                );
                return Ok(ChatCommandAction::Continue);
            }

            let mut switched_cfg = cfg.clone();
            switched_cfg.model = chosen_model;
            let switched = try_switch_runtime(
                switched_cfg,
                cfg,
                runner,
                backend,
                model_name,
                session_service,
                telemetry,
            )
            .await;

            if switched {
                // resolve_model may normalize the requested id.
                cfg.model = model_name.clone();
                telemetry.emit(
                    "chat.model_switched",
                    json!({
                        "backend": backend.label(),
                        "model": model_name.clone()
                    }),
                );
                tracing::info!(backend = %backend.label(), model = %model_name, "switched model");
                println!(
                    "Switched model to '{model_name}' on the {} backend. Session continuity preserved.",
                    backend.label()
                );
            } else {
                println!("Model remains '{model_name}'.");
            }
        }
        ChatCommand::Session(next_session) => {
            let Some(next_session) = next_session else {
                println!(
                    "Active session: '{}' (app='{}', user='{}').",
                    cfg.session_id, cfg.app_name, cfg.user_id
                );
                println!("Use /session <id> to switch.");
                return Ok(ChatCommandAction::Continue);
            };

            let mut switched_cfg = cfg.clone();
            switched_cfg.session_id = next_session;
            let switched = try_switch_runtime(
                switched_cfg,
                cfg,
                runner,
                backend,
                model_name,
                session_service,
                telemetry,
            )
            .await;

            if switched {
                telemetry.emit(
                    "chat.session_switched",
                    json!({ "session_id": cfg.session_id.clone() }),
                );
                println!("Switched to session '{}'.", cfg.session_id);
            } else {
                println!("Session remains '{}'.", cfg.session_id);
            }
        }
    }
    Ok(ChatCommandAction::Continue)
}

pub async fn run_chat(mut cfg: RuntimeConfig, telemetry: &TelemetrySink) -> Result<()> {
    let session_service = build_session_service(&cfg).await?;
    ensure_session_exists(&session_service, &cfg).await?;
    let (mut runner, mut backend, mut model_name) =
        build_analyst_runner(&cfg, session_service.clone(), telemetry, "chat").await?;

    telemetry.emit(
        "chat.started",
        json!({
            "backend": backend.label(),
            "model": model_name.clone(),
            "profile": cfg.profile.clone()
        }),
    );
    tracing::info!(backend = %backend.label(), model = %model_name, "using model");
    println!("Power & Energy Supply Chain Analyst. Type /help for commands or /exit to quit.");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("supplyline> ");
        io::stdout().flush().context("failed to flush stdout")?;
        line.clear();
        if stdin
            .read_line(&mut line)
            .context("failed to read input from stdin")?
            == 0
        {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match parse_chat_command(input) {
            ParsedChatCommand::UnknownCommand(command) => {
                println!("Unknown command '{command}'. Use /help.");
            }
            ParsedChatCommand::Command(command) => {
                let action = dispatch_chat_command(
                    command,
                    &mut cfg,
                    &mut runner,
                    &mut backend,
                    &mut model_name,
                    &session_service,
                    telemetry,
                )
                .await?;
                if matches!(action, ChatCommandAction::Exit) {
                    break;
                }
            }
            // Anything that is not a command goes to the orchestrator. Model
            // and tool failures must not end the chat loop.
            ParsedChatCommand::NotACommand => {
                if let Err(err) = run_prompt_streaming(&runner, &cfg, input, telemetry).await {
                    eprintln!("{}", format_cli_error(&err, cfg.show_sensitive_config));
                }
            }
        }
    }

    Ok(())
}
