use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::level_filters::LevelFilter;

use supplyline::chat::run_chat;
use supplyline::cli::{
    Cli, Commands, DeployCommands, EvalCommands, SchemaCommands, ServerCommands, SessionCommands,
    TelemetryCommands, command_label,
};
use supplyline::config::{CloudEnv, RuntimeConfig, load_profiles, resolve_runtime_config};
use supplyline::deploy::{run_deploy_agent_engine, run_deploy_cloud_run};
use supplyline::doctor::{run_doctor, run_migrate};
use supplyline::error::{categorize_error, format_cli_error, redact_sensitive_text};
use supplyline::eval::{round_metric, run_eval};
use supplyline::runner::build_analyst_runner;
use supplyline::schema::{run_schema_load, run_schema_show};
use supplyline::server::run_server;
use supplyline::session::{
    build_session_service, run_sessions_delete, run_sessions_list, run_sessions_prune,
    run_sessions_show,
};
use supplyline::streaming::run_prompt;
use supplyline::telemetry::{TelemetrySink, run_telemetry_report};

#[tokio::main]
async fn main() -> Result<()> {
    // .env must load before clap reads env-backed argument defaults.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let show_sensitive_config = cli.show_sensitive_config;

    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err, show_sensitive_config));
        tracing::error!(
            category = %categorize_error(&err).code(),
            error = %redact_sensitive_text(&format!("{err:#}")),
            "command failed"
        );
        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(mut cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    let command = cli.command.take().unwrap_or(Commands::Chat);
    let profiles = load_profiles(&cli.config_path)?;
    let env = CloudEnv::capture();
    let cfg = resolve_runtime_config(&cli, &profiles, &env)?;
    let telemetry = TelemetrySink::new(&cfg, command_label(&command));

    let started = std::time::Instant::now();
    let result = dispatch_command(command, &cfg, &telemetry).await;
    let latency_ms = round_metric(started.elapsed().as_secs_f64() * 1000.0);

    match &result {
        Ok(()) => telemetry.emit("command.completed", json!({ "latency_ms": latency_ms })),
        Err(err) => telemetry.emit(
            "command.failed",
            json!({
                "latency_ms": latency_ms,
                "category": categorize_error(err).code(),
                "error": redact_sensitive_text(&format!("{err:#}")),
            }),
        ),
    }

    result
}

async fn dispatch_command(
    command: Commands,
    cfg: &RuntimeConfig,
    telemetry: &TelemetrySink,
) -> Result<()> {
    match command {
        Commands::Ask { prompt } => {
            let session_service = build_session_service(cfg).await?;
            let (runner, _backend, _model_name) =
                build_analyst_runner(cfg, session_service, telemetry, "ask").await?;
            let prompt = prompt.join(" ");
            let answer = run_prompt(&runner, cfg, &prompt, telemetry).await?;
            println!("{answer}");
        }
        Commands::Chat => run_chat(cfg.clone(), telemetry).await?,
        Commands::Doctor => run_doctor(cfg).await?,
        Commands::Migrate => run_migrate(cfg).await?,
        Commands::Sessions { command } => match command {
            SessionCommands::List => run_sessions_list(cfg).await?,
            SessionCommands::Show { session_id, recent } => {
                run_sessions_show(cfg, session_id, recent).await?
            }
            SessionCommands::Delete { session_id, force } => {
                run_sessions_delete(cfg, session_id, force).await?
            }
            SessionCommands::Prune {
                keep,
                dry_run,
                force,
            } => run_sessions_prune(cfg, keep, dry_run, force).await?,
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { path, limit } => run_telemetry_report(cfg, path, limit)?,
        },
        Commands::Eval { command } => match command {
            EvalCommands::Run {
                dataset,
                output,
                benchmark_iterations,
                fail_under,
            } => run_eval(dataset, output, benchmark_iterations, fail_under, telemetry)?,
        },
        Commands::Server { command } => match command {
            ServerCommands::Serve { host, port } => {
                run_server(cfg.clone(), host, port, telemetry).await?
            }
        },
        Commands::Deploy { command } => match command {
            DeployCommands::CloudRun {
                service_name,
                agent_path,
                region,
                allow_unauthenticated,
                dry_run,
            } => {
                run_deploy_cloud_run(
                    cfg,
                    service_name,
                    agent_path,
                    region,
                    allow_unauthenticated,
                    dry_run,
                    telemetry,
                )
                .await?
            }
            DeployCommands::AgentEngine {
                bucket,
                display_name,
                staging_dir,
                dry_run,
            } => {
                run_deploy_agent_engine(cfg, bucket, display_name, &staging_dir, dry_run, telemetry)
                    .await?
            }
        },
        Commands::Schema { command } => match command {
            SchemaCommands::Show => run_schema_show(cfg)?,
            SchemaCommands::Load {
                csv,
                replace,
                dry_run,
            } => run_schema_load(cfg, &csv, replace, dry_run, telemetry).await?,
        },
    }

    Ok(())
}

fn init_tracing(log_filter: &str) -> Result<()> {
    let level = log_filter
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::ERROR);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(log_filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
