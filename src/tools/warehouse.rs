use anyhow::{Context, Result};
use async_trait::async_trait;
use google_cloud_auth::credentials::{self, CacheableResource, Credentials};
use reqwest::Client;
use serde_json::{Value, json};

pub const EXECUTE_SQL_TOOL_NAME: &str = "execute_sql_query";
pub const SCHEMA_UNAVAILABLE_PLACEHOLDER: &str = "[Table schema not available]";

const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const QUERY_TIMEOUT_MS: u64 = 30_000;
const QUERY_MAX_RESULTS: u64 = 1_000;

const FORBIDDEN_SQL_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "merge", "drop", "truncate", "alter", "create", "grant",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableReference {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Int64,
    Date,
}

impl ParameterType {
    pub fn label(self) -> &'static str {
        match self {
            ParameterType::String => "STRING",
            ParameterType::Int64 => "INT64",
            ParameterType::Date => "DATE",
        }
    }
}

/// A named BigQuery query parameter (`@name` in SQL text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameter {
    pub name: String,
    pub parameter_type: ParameterType,
    pub value: String,
}

impl QueryParameter {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_type: ParameterType::String,
            value: value.into(),
        }
    }

    pub fn int64(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            parameter_type: ParameterType::Int64,
            value: value.to_string(),
        }
    }

    pub fn date(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_type: ParameterType::Date,
            value: value.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "parameterType": { "type": self.parameter_type.label() },
            "parameterValue": { "value": self.value }
        })
    }
}

/// Seam over the warehouse backend so agent graphs and the forecaster are
/// testable without a live BigQuery project.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Runs a read-only query and returns rows as JSON objects keyed by
    /// column name.
    async fn query(&self, sql: &str, params: &[QueryParameter]) -> Result<Vec<Value>>;

    /// Returns (column name, column type) pairs for the warehouse table.
    async fn table_schema(&self) -> Result<Vec<(String, String)>>;

    fn table(&self) -> &TableReference;
}

/// BigQuery REST implementation (`jobs.query` + `tables.get`) authenticated
/// with Application Default Credentials.
pub struct BigQueryWarehouse {
    client: Client,
    credentials: Credentials,
    table: TableReference,
}

impl BigQueryWarehouse {
    pub fn new(table: TableReference) -> Result<Self> {
        let scopes = [CLOUD_PLATFORM_SCOPE];
        let credentials = credentials::Builder::default()
            .with_scopes(scopes)
            .build()
            .context("failed to build Application Default Credentials for BigQuery")?;
        Ok(Self {
            client: Client::new(),
            credentials,
            table,
        })
    }

    async fn auth_headers(&self) -> Result<reqwest::header::HeaderMap> {
        match self
            .credentials
            .headers(Default::default())
            .await
            .context("failed to obtain BigQuery auth headers from ADC")?
        {
            CacheableResource::New { data, .. } => Ok(data),
            CacheableResource::NotModified => Err(anyhow::anyhow!(
                "BigQuery credential headers were unavailable"
            )),
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn query(&self, sql: &str, params: &[QueryParameter]) -> Result<Vec<Value>> {
        let url = format!("{BIGQUERY_ENDPOINT}/projects/{}/queries", self.table.project);
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
            "maxResults": QUERY_MAX_RESULTS
        });
        if !params.is_empty() {
            body["parameterMode"] = json!("NAMED");
            body["queryParameters"] = Value::Array(
                params
                    .iter()
                    .map(QueryParameter::to_json)
                    .collect::<Vec<Value>>(),
            );
        }

        let auth_headers = self.auth_headers().await?;
        let response = self
            .client
            .post(&url)
            .headers(auth_headers)
            .json(&body)
            .send()
            .await
            .context("BigQuery query request failed")?;

        let status = response.status();
        let payload = response
            .json::<Value>()
            .await
            .context("failed to decode BigQuery query response")?;
        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown BigQuery error");
            return Err(anyhow::anyhow!(
                "BigQuery query failed with status {status}: {message}"
            ));
        }
        if payload.get("jobComplete") == Some(&Value::Bool(false)) {
            return Err(anyhow::anyhow!(
                "BigQuery query did not complete within {QUERY_TIMEOUT_MS}ms"
            ));
        }

        decode_query_rows(&payload)
    }

    async fn table_schema(&self) -> Result<Vec<(String, String)>> {
        let url = format!(
            "{BIGQUERY_ENDPOINT}/projects/{}/datasets/{}/tables/{}",
            self.table.project, self.table.dataset, self.table.table
        );

        let auth_headers = self.auth_headers().await?;
        let response = self
            .client
            .get(&url)
            .headers(auth_headers)
            .send()
            .await
            .context("BigQuery tables.get request failed")?;

        let status = response.status();
        let payload = response
            .json::<Value>()
            .await
            .context("failed to decode BigQuery tables.get response")?;
        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown BigQuery error");
            return Err(anyhow::anyhow!(
                "BigQuery tables.get failed with status {status}: {message}"
            ));
        }

        Ok(decode_schema_fields(&payload))
    }

    fn table(&self) -> &TableReference {
        &self.table
    }
}

pub const WAREHOUSE_UNCONFIGURED_MESSAGE: &str = "BigQuery warehouse is not configured. \
Set GOOGLE_CLOUD_PROJECT, BIGQUERY_DATASET_ID, and BIGQUERY_TABLE_ID.";

/// Stand-in used when the warehouse environment is incomplete. Every call
/// fails with a configuration hint, which reaches the model in-band.
#[derive(Debug)]
pub struct UnconfiguredWarehouse {
    table: TableReference,
}

impl Default for UnconfiguredWarehouse {
    fn default() -> Self {
        Self {
            table: TableReference::new("unconfigured", "unconfigured", "unconfigured"),
        }
    }
}

#[async_trait]
impl Warehouse for UnconfiguredWarehouse {
    async fn query(&self, _sql: &str, _params: &[QueryParameter]) -> Result<Vec<Value>> {
        Err(anyhow::anyhow!(WAREHOUSE_UNCONFIGURED_MESSAGE))
    }

    async fn table_schema(&self) -> Result<Vec<(String, String)>> {
        Err(anyhow::anyhow!(WAREHOUSE_UNCONFIGURED_MESSAGE))
    }

    fn table(&self) -> &TableReference {
        &self.table
    }
}

/// Maps the `jobs.query` wire shape ({"schema": {...}, "rows": [{"f": [...]}]})
/// into one JSON object per row, coercing numeric/bool cells by column type.
pub fn decode_query_rows(payload: &Value) -> Result<Vec<Value>> {
    let fields = payload
        .pointer("/schema/fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .map(|field| {
                    (
                        field
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        field
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    )
                })
                .collect::<Vec<(String, String)>>()
        })
        .unwrap_or_default();

    let Some(rows) = payload.get("rows").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let cells = row
            .get("f")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("malformed BigQuery row: missing 'f' cell array"))?;
        let mut record = serde_json::Map::new();
        for (index, (name, field_type)) in fields.iter().enumerate() {
            let cell = cells.get(index).and_then(|cell| cell.get("v"));
            record.insert(name.clone(), coerce_cell(field_type, cell));
        }
        records.push(Value::Object(record));
    }

    Ok(records)
}

fn coerce_cell(field_type: &str, cell: Option<&Value>) -> Value {
    let Some(raw) = cell else {
        return Value::Null;
    };
    match raw {
        Value::Null => Value::Null,
        Value::String(text) => match field_type {
            "INTEGER" | "INT64" => text
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(text.clone())),
            "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => text
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(text.clone())),
            "BOOLEAN" | "BOOL" => match text.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(text.clone()),
            },
            _ => Value::String(text.clone()),
        },
        other => other.clone(),
    }
}

pub fn decode_schema_fields(payload: &Value) -> Vec<(String, String)> {
    payload
        .pointer("/schema/fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|field| {
                    let name = field.get("name").and_then(Value::as_str)?;
                    let field_type = field.get("type").and_then(Value::as_str)?;
                    Some((name.to_string(), field_type.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Rejects statements containing mutating keywords. `_` counts as a word
/// character, so column names like `last_update` pass.
pub fn validate_read_only_sql(sql: &str) -> std::result::Result<(), String> {
    let lowered = sql.to_ascii_lowercase();
    let mut word = String::new();
    let mut words = Vec::new();
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            word.push(ch);
        } else if !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        words.push(word);
    }

    for keyword in FORBIDDEN_SQL_KEYWORDS {
        if words.iter().any(|candidate| candidate == keyword) {
            return Err(format!(
                "Query rejected: statement contains the mutating keyword '{}'. \
                 Only read-only SELECT queries are allowed.",
                keyword.to_ascii_uppercase()
            ));
        }
    }

    Ok(())
}

pub fn format_schema_text(table: &TableReference, fields: &[(String, String)]) -> String {
    let columns = fields
        .iter()
        .map(|(name, field_type)| format!("{name}:{field_type}"))
        .collect::<Vec<String>>()
        .join(", ");
    format!("Schema for `{}`:\n\n{}", table.qualified_name(), columns)
}

/// Executes model-written SQL and returns the records as pretty-printed JSON
/// text, mirroring what the ops insight persona is instructed to analyze.
/// Errors stay in-band so the model can correct its query.
pub async fn execute_sql_payload(warehouse: &dyn Warehouse, sql: &str) -> Value {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return json!({ "error": "Error executing query: empty SQL statement" });
    }
    if let Err(message) = validate_read_only_sql(trimmed) {
        return json!({ "error": message });
    }

    match warehouse.query(trimmed, &[]).await {
        Ok(records) => match serde_json::to_string_pretty(&records) {
            Ok(text) => Value::String(text),
            Err(err) => json!({ "error": format!("Error executing query: {err}") }),
        },
        Err(err) => json!({ "error": format!("Error executing query: {err:#}") }),
    }
}

pub async fn execute_sql_tool_response(warehouse: &dyn Warehouse, args: &Value) -> Value {
    let sql = args
        .get("sql_query")
        .and_then(Value::as_str)
        .unwrap_or_default();
    execute_sql_payload(warehouse, sql).await
}

/// Fetches the live table schema, degrading to a placeholder so agent
/// construction still succeeds when the warehouse is unreachable.
pub async fn load_table_schema_text(warehouse: &dyn Warehouse) -> String {
    match warehouse.table_schema().await {
        Ok(fields) if !fields.is_empty() => format_schema_text(warehouse.table(), &fields),
        Ok(_) => SCHEMA_UNAVAILABLE_PLACEHOLDER.to_string(),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "failed to load warehouse table schema");
            SCHEMA_UNAVAILABLE_PLACEHOLDER.to_string()
        }
    }
}
