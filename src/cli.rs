use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommands {
    #[command(about = "List all sessions for the current app/user")]
    List,
    #[command(about = "Show events for a specific session")]
    Show {
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        recent: usize,
    },
    #[command(about = "Delete a session (requires --force)")]
    Delete {
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    #[command(
        about = "Prune old sessions, keeping N most recent (requires --force unless --dry-run)"
    )]
    Prune {
        #[arg(long, default_value_t = 20)]
        keep: usize,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize telemetry events from a JSONL stream")]
    Report {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum EvalCommands {
    #[command(about = "Back-test the demand forecaster against an eval dataset")]
    Run {
        #[arg(long)]
        dataset: Option<String>,
        #[arg(long)]
        output: Option<String>,
        #[arg(long, default_value_t = 100)]
        benchmark_iterations: usize,
        #[arg(long, default_value_t = 0.80)]
        fail_under: f64,
    },
}

#[derive(Debug, Subcommand)]
pub enum ServerCommands {
    #[command(about = "Run HTTP server mode for health and ask endpoints (Cloud Run entrypoint)")]
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Debug, Subcommand)]
pub enum DeployCommands {
    #[command(about = "Deploy the agent service to Cloud Run via gcloud run deploy")]
    CloudRun {
        #[arg(long, env = "SERVICE_NAME")]
        service_name: Option<String>,
        #[arg(long, env = "AGENT_PATH")]
        agent_path: Option<String>,
        #[arg(long, env = "GOOGLE_CLOUD_LOCATION_CLOUD_RUN")]
        region: Option<String>,
        #[arg(long, default_value_t = false)]
        allow_unauthenticated: bool,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    #[command(about = "Package the agent manifest and stage it to GCS for Agent Engine")]
    AgentEngine {
        #[arg(long, env = "GOOGLE_CLOUD_STORAGE_BUCKET")]
        bucket: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long, default_value = "dist")]
        staging_dir: String,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum SchemaCommands {
    #[command(about = "Print the warehouse table DDL and load reference")]
    Show,
    #[command(about = "Load the daily power supply CSV into the warehouse via bq load")]
    Load {
        #[arg(long)]
        csv: String,
        #[arg(long, default_value_t = false)]
        replace: bool,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  supplyline ask \"Forecast power demand for the next 3 days in Delhi\"\n\
  supplyline --model gemini-2.5-pro chat\n\
  supplyline ask \"Which state had the highest renewable generation last month?\"\n\
  supplyline --session-backend sqlite --session-db-url sqlite://.supplyline/sessions.db sessions list\n\
  supplyline --session-backend sqlite sessions prune --keep 20 --dry-run\n\
  supplyline doctor\n\
  supplyline schema show\n\
  supplyline schema load --csv data/daily_power_supply.csv --replace\n\
  supplyline server serve --host 0.0.0.0 --port 8080\n\
  supplyline deploy cloud-run --dry-run\n\
  supplyline deploy agent-engine --dry-run\n\
  supplyline telemetry report --limit 2000\n\
  supplyline eval run --benchmark-iterations 200 --fail-under 0.90\n\
\n\
Switching behavior:\n\
  - Use --model to switch the Gemini model per invocation.\n\
  - GOOGLE_GENAI_USE_VERTEXAI=1 selects the Vertex AI backend (ADC); otherwise\n\
    GOOGLE_API_KEY selects the public Gemini API backend.\n\
  - In chat, use /help for command discovery and /model, /session, /status.";

#[derive(Debug, Parser)]
#[command(name = "supplyline")]
#[command(about = "Power & energy supply chain analyst agents built on ADK-Rust")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "GEMINI_MODEL_NAME")]
    pub model: Option<String>,

    #[arg(long, env = "GEMINI_MODEL_TEMPERATURE")]
    pub temperature: Option<f32>,

    #[arg(long, env = "GEMINI_MODEL_TOP_P")]
    pub top_p: Option<f32>,

    #[arg(long, env = "SUPPLYLINE_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "SUPPLYLINE_CONFIG", default_value = ".supplyline/config.toml")]
    pub config_path: String,

    #[arg(long, env = "APP_NAME")]
    pub app_name: Option<String>,

    #[arg(long, env = "SUPPLYLINE_USER_ID")]
    pub user_id: Option<String>,

    #[arg(long, env = "SUPPLYLINE_SESSION_ID")]
    pub session_id: Option<String>,

    #[arg(long, env = "SUPPLYLINE_SESSION_BACKEND", value_enum)]
    pub session_backend: Option<SessionBackend>,

    #[arg(long, env = "SUPPLYLINE_SESSION_DB_URL")]
    pub session_db_url: Option<String>,

    #[arg(long, env = "SUPPLYLINE_SHOW_SENSITIVE_CONFIG", default_value_t = false)]
    pub show_sensitive_config: bool,

    #[arg(long, env = "SUPPLYLINE_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "SUPPLYLINE_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "RUST_LOG", default_value = "error")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Run a one-shot prompt and print the final response")]
    Ask {
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    #[command(about = "Run interactive chat mode")]
    Chat,
    #[command(about = "Validate model backend, warehouse, and session configuration")]
    Doctor,
    #[command(about = "Run session backend migrations (sqlite only)")]
    Migrate,
    #[command(about = "Manage session lifecycle (list/show/delete/prune)")]
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    #[command(about = "Telemetry utilities and reporting")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
    #[command(about = "Forecast evaluation harness and benchmark suite")]
    Eval {
        #[command(subcommand)]
        command: EvalCommands,
    },
    #[command(about = "Server mode for Cloud Run")]
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },
    #[command(about = "Deployment tooling for Cloud Run and Agent Engine")]
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },
    #[command(about = "Warehouse table schema and CSV load tooling")]
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Ask { .. } => "ask".to_string(),
        Commands::Chat => "chat".to_string(),
        Commands::Doctor => "doctor".to_string(),
        Commands::Migrate => "migrate".to_string(),
        Commands::Sessions { command } => match command {
            SessionCommands::List => "sessions.list".to_string(),
            SessionCommands::Show { .. } => "sessions.show".to_string(),
            SessionCommands::Delete { .. } => "sessions.delete".to_string(),
            SessionCommands::Prune { .. } => "sessions.prune".to_string(),
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { .. } => "telemetry.report".to_string(),
        },
        Commands::Eval { command } => match command {
            EvalCommands::Run { .. } => "eval.run".to_string(),
        },
        Commands::Server { command } => match command {
            ServerCommands::Serve { .. } => "server.serve".to_string(),
        },
        Commands::Deploy { command } => match command {
            DeployCommands::CloudRun { .. } => "deploy.cloud-run".to_string(),
            DeployCommands::AgentEngine { .. } => "deploy.agent-engine".to_string(),
        },
        Commands::Schema { command } => match command {
            SchemaCommands::Show => "schema.show".to_string(),
            SchemaCommands::Load { .. } => "schema.load".to_string(),
        },
    }
}
