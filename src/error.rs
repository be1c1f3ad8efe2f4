use anyhow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Model,
    Warehouse,
    Weather,
    Session,
    Deploy,
    Input,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Model => "MODEL",
            ErrorCategory::Warehouse => "WAREHOUSE",
            ErrorCategory::Weather => "WEATHER",
            ErrorCategory::Session => "SESSION",
            ErrorCategory::Deploy => "DEPLOY",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Model => {
                "Set GOOGLE_API_KEY for the Gemini API backend, or GOOGLE_GENAI_USE_VERTEXAI=1 with GOOGLE_CLOUD_PROJECT and ADC for Vertex AI."
            }
            ErrorCategory::Warehouse => {
                "Check GOOGLE_CLOUD_PROJECT, BIGQUERY_DATASET_ID, and BIGQUERY_TABLE_ID, and confirm warehouse access for the active credentials."
            }
            ErrorCategory::Weather => {
                "Check network access to the Open-Meteo APIs, and GOOGLE_GEOMAP_API_KEY if Maps geocoding is configured."
            }
            ErrorCategory::Session => {
                "Check --session-backend/--session-db-url and run migrate for sqlite sessions."
            }
            ErrorCategory::Deploy => {
                "Verify gcloud authentication and SERVICE_NAME/GOOGLE_CLOUD_STORAGE_BUCKET, or re-run with --dry-run to inspect the command line."
            }
            ErrorCategory::Input => "Run supplyline --help and correct command arguments.",
            ErrorCategory::Internal => {
                "Retry with RUST_LOG=debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    let msg = format!("{err:#}").to_ascii_lowercase();

    if msg.contains("google_api_key")
        || msg.contains("vertex")
        || msg.contains("gemini")
        || msg.contains("model")
        || msg.contains("credentials")
    {
        return ErrorCategory::Model;
    }

    if msg.contains("--force")
        || msg.contains("invalid value")
        || msg.contains("unknown argument")
        || msg.contains("failed to read input")
        || msg.contains("profile")
        || msg.contains("prompt")
    {
        return ErrorCategory::Input;
    }

    if msg.contains("session") || msg.contains("sqlite") || msg.contains("migrate") {
        return ErrorCategory::Session;
    }

    if msg.contains("bigquery")
        || msg.contains("warehouse")
        || msg.contains("dataset")
        || msg.contains("table")
    {
        return ErrorCategory::Warehouse;
    }

    if msg.contains("weather")
        || msg.contains("open-meteo")
        || msg.contains("geocod")
        || msg.contains("maps")
    {
        return ErrorCategory::Weather;
    }

    if msg.contains("gcloud")
        || msg.contains("deploy")
        || msg.contains("bucket")
        || msg.contains("staging")
    {
        return ErrorCategory::Deploy;
    }

    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let category = categorize_error(err);
    let rendered_error = render_error_message(err, show_sensitive_config);
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        rendered_error,
        category.hint()
    )
}

pub fn render_error_message(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    if show_sensitive_config {
        err.to_string()
    } else {
        redact_sensitive_text(&err.to_string())
    }
}

pub fn redact_sensitive_text(text: &str) -> String {
    redact_query_secrets(&redact_sqlite_urls(text))
}

pub fn redact_sqlite_urls(text: &str) -> String {
    const SQLITE_PREFIX: &str = "sqlite:";
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some(offset) = text[cursor..].find(SQLITE_PREFIX) {
        let start = cursor + offset;
        out.push_str(&text[cursor..start]);

        let remainder = &text[start..];
        let end = remainder
            .find(|ch: char| {
                ch.is_whitespace()
                    || matches!(
                        ch,
                        '"' | '\'' | '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';'
                    )
            })
            .unwrap_or(remainder.len());
        let token = &remainder[..end];
        out.push_str(&redact_sqlite_url_value(token));
        cursor = start + end;
    }

    out.push_str(&text[cursor..]);
    out
}

pub fn redact_sqlite_url_value(value: &str) -> String {
    if value.starts_with("sqlite://") {
        "sqlite://[REDACTED]".to_string()
    } else if value.starts_with("sqlite:") {
        "sqlite:[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

/// Redacts `key=`/`token=` query values, so geocoding URLs with API keys can
/// appear in error chains without leaking the secret. Suffixed parameter
/// names (api_key=, access_token=) share the same tail and are covered.
pub fn redact_query_secrets(text: &str) -> String {
    redact_query_param(&redact_query_param(text, "key="), "token=")
}

fn redact_query_param(text: &str, param: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some(offset) = text[cursor..].find(param) {
        let value_start = cursor + offset + param.len();
        out.push_str(&text[cursor..value_start]);

        let remainder = &text[value_start..];
        let end = remainder
            .find(|ch: char| {
                ch.is_whitespace() || matches!(ch, '&' | '"' | '\'' | ')' | ']' | '}' | ',' | ';')
            })
            .unwrap_or(remainder.len());
        if end > 0 {
            out.push_str("[REDACTED]");
        }
        cursor = value_start + end;
    }

    out.push_str(&text[cursor..]);
    out
}
