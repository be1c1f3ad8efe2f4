use anyhow::{Context, Result};
use serde_json::json;

use crate::config::RuntimeConfig;
use crate::deploy::{format_command_line, run_command};
use crate::telemetry::TelemetrySink;
use crate::tools::warehouse::TableReference;

/// Daily state-wise power supply table, one row per (date, state, supplier).
/// Column order matches the source CSV.
pub const WAREHOUSE_COLUMNS: &[(&str, &str)] = &[
    ("date", "DATE"),
    ("state", "STRING"),
    ("region", "STRING"),
    ("latitude", "FLOAT64"),
    ("longitude", "FLOAT64"),
    ("power_supplier", "STRING"),
    ("consumption_mega_units", "FLOAT64"),
    ("peak_demand_mw", "FLOAT64"),
    ("peak_met_mw", "FLOAT64"),
    ("energy_requirement_mega_units", "FLOAT64"),
    ("energy_shortage_mega_units", "FLOAT64"),
    ("generation_mega_units", "FLOAT64"),
    ("thermal_generation_mega_units", "FLOAT64"),
    ("hydro_generation_mega_units", "FLOAT64"),
    ("nuclear_generation_mega_units", "FLOAT64"),
    ("renewable_generation_mega_units", "FLOAT64"),
    ("grid_frequency_hz", "FLOAT64"),
];

pub const PARTITION_COLUMN: &str = "date";
pub const CLUSTERING_COLUMNS: &[&str] = &["state", "region", "power_supplier"];

pub fn warehouse_ddl(table: &TableReference) -> String {
    let mut ddl = format!("CREATE TABLE IF NOT EXISTS `{}` (\n", table.qualified_name());
    for (idx, (name, column_type)) in WAREHOUSE_COLUMNS.iter().enumerate() {
        let separator = if idx + 1 < WAREHOUSE_COLUMNS.len() {
            ","
        } else {
            ""
        };
        ddl.push_str(&format!("  {name} {column_type}{separator}\n"));
    }
    ddl.push_str(&format!(")\nPARTITION BY {PARTITION_COLUMN}\n"));
    ddl.push_str(&format!("CLUSTER BY {}\n", CLUSTERING_COLUMNS.join(", ")));
    ddl.push_str(
        "OPTIONS (description = 'Daily state-wise power supply, demand, and generation data.');\n",
    );
    ddl
}

/// Inline schema for `bq load`, in `name:TYPE` form.
pub fn bq_schema_string() -> String {
    WAREHOUSE_COLUMNS
        .iter()
        .map(|(name, column_type)| format!("{name}:{column_type}"))
        .collect::<Vec<String>>()
        .join(",")
}

/// bq CLI table spec (`project:dataset.table`).
pub fn bq_table_spec(table: &TableReference) -> String {
    format!("{}:{}.{}", table.project, table.dataset, table.table)
}

pub fn bq_load_command(table: &TableReference, csv_path: &str, replace: bool) -> Vec<String> {
    let mut command = vec![
        "bq".to_string(),
        "load".to_string(),
        "--source_format=CSV".to_string(),
        "--skip_leading_rows=1".to_string(),
        format!("--time_partitioning_field={PARTITION_COLUMN}"),
        "--time_partitioning_type=DAY".to_string(),
        format!("--clustering_fields={}", CLUSTERING_COLUMNS.join(",")),
    ];
    if replace {
        command.push("--replace".to_string());
    }
    command.push(bq_table_spec(table));
    command.push(csv_path.to_string());
    command.push(bq_schema_string());
    command
}

fn resolve_warehouse_table(cfg: &RuntimeConfig) -> Option<TableReference> {
    match (&cfg.project, &cfg.dataset_id, &cfg.table_id) {
        (Some(project), Some(dataset), Some(table)) => Some(TableReference::new(
            project.clone(),
            dataset.clone(),
            table.clone(),
        )),
        _ => None,
    }
}

pub fn run_schema_show(cfg: &RuntimeConfig) -> Result<()> {
    let (table, configured) = match resolve_warehouse_table(cfg) {
        Some(table) => (table, true),
        None => (
            TableReference::new(
                "PROJECT_ID".to_string(),
                "DATASET_ID".to_string(),
                "TABLE_ID".to_string(),
            ),
            false,
        ),
    };

    if !configured {
        println!(
            "Warehouse is not configured; showing the DDL with placeholder coordinates. \
             Set GOOGLE_CLOUD_PROJECT, BIGQUERY_DATASET_ID, and BIGQUERY_TABLE_ID."
        );
        println!();
    }

    println!("{}", warehouse_ddl(&table));
    println!("Load a daily CSV export with:");
    println!(
        "{}",
        format_command_line(&bq_load_command(&table, "data/daily_power_supply.csv", false))
    );
    Ok(())
}

pub async fn run_schema_load(
    cfg: &RuntimeConfig,
    csv_path: &str,
    replace: bool,
    dry_run: bool,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let table = resolve_warehouse_table(cfg).context(
        "BigQuery warehouse is not configured. Set GOOGLE_CLOUD_PROJECT, BIGQUERY_DATASET_ID, \
         and BIGQUERY_TABLE_ID.",
    )?;

    // bq load accepts gs:// URIs directly; only local paths are checked.
    if !csv_path.starts_with("gs://") && !std::path::Path::new(csv_path).exists() {
        return Err(anyhow::anyhow!("CSV file not found at '{csv_path}'"));
    }

    let command = bq_load_command(&table, csv_path, replace);

    if dry_run {
        println!("Dry-run: bq load command:");
        println!("{}", format_command_line(&command));
        return Ok(());
    }

    println!(
        "Loading '{}' into `{}`{}...",
        csv_path,
        table.qualified_name(),
        if replace { " (replacing existing rows)" } else { "" }
    );
    run_command(&command).await?;

    telemetry.emit(
        "schema.load",
        json!({
            "table": table.qualified_name(),
            "csv": csv_path,
            "replace": replace
        }),
    );
    println!("Load completed for `{}`.", table.qualified_name());
    Ok(())
}
