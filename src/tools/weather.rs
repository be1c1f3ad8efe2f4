use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use adk_rust::futures::StreamExt;
use adk_rust::prelude::*;
use adk_rust::GenerateContentConfig;
use anyhow::{Context, Result as AnyResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde_json::{Value, json};

use crate::tools::charts::{CHART_MIME_TYPE, ChartKind, ChartSeries, ChartSpec, render_chart_svg};

pub const GET_COORDINATES_TOOL_NAME: &str = "get_lat_long_from_address";
pub const FETCH_WEATHER_TOOL_NAME: &str = "get_weather_forecast_dataframe";
pub const FILTER_WEATHER_TOOL_NAME: &str = "filter_weather_dataframe_by_time";
pub const GENERATE_CHARTS_TOOL_NAME: &str = "generate_weather_info_charts";
pub const SUMMARIZE_WEATHER_TOOL_NAME: &str = "summarize_weather_from_plots";

const MAPS_GEOCODING_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const OPEN_METEO_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
const OPEN_METEO_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const OPEN_METEO_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

const HOURLY_VARIABLES: &str =
    "temperature_2m,precipitation,pressure_msl,wind_speed_10m,wind_direction_10m,relative_humidity_2m";

/// Charts past this window get too dense to read at hourly resolution.
const CHART_WINDOW_DAYS: i64 = 7;

/// Column key plus chart title for each plotted variable.
pub const WEATHER_PLOT_VARIABLES: &[(&str, &str)] = &[
    ("2m_temperature", "2m Temperature"),
    ("total_precipitation_6hr", "6-Hour Total Precipitation"),
    ("mean_sea_level_pressure", "Mean Sea Level Pressure"),
    ("10m_u_component_of_wind", "10m u component of wind"),
    ("10m_v_component_of_wind", "10m v component of wind"),
    ("100_specific_humidity", "100 Specific Humidity"),
];

const WEATHER_ANALYST_PERSONA: &str = "You are an expert Weather Analyst.";

const WEATHER_SUMMARY_PROMPT: &str = "Analyze the following weather chart data and provide a \
concise weather report summary in 200 words or less.
In your summary, please do the following:
  1. Highlight the trends of the most recent year compared to the previous year for temperature, \
precipitation, pressure, wind components, and humidity.
  2. Comment on any unusual activities or extreme weather patterns observed in the data that \
could potentially lead to calamities (e.g., floods, storms).
  3. Discuss how these weather patterns might affect the supply chain, considering \
transportation and logistics.";

/// One hourly observation with wind already decomposed into u/v components
/// and humidity rescaled to a fraction.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRow {
    /// Midnight of the observation's day.
    pub init_time: NaiveDateTime,
    pub time: NaiveDateTime,
    pub temperature: f64,
    pub precipitation: f64,
    pub pressure: f64,
    pub wind_u: f64,
    pub wind_v: f64,
    pub humidity_fraction: f64,
}

impl WeatherRow {
    pub fn variable(&self, column: &str) -> f64 {
        match column {
            "2m_temperature" => self.temperature,
            "total_precipitation_6hr" => self.precipitation,
            "mean_sea_level_pressure" => self.pressure,
            "10m_u_component_of_wind" => self.wind_u,
            "10m_v_component_of_wind" => self.wind_v,
            "100_specific_humidity" => self.humidity_fraction,
            _ => 0.0,
        }
    }
}

/// Accepts RFC 3339 timestamps, bare `YYYY-MM-DDTHH:MM[:SS]`, and plain
/// dates (taken as midnight). All values are treated as UTC.
pub fn parse_iso_timestamp(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if let Ok(instant) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(instant.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(instant) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(instant);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// The archive API only serves fully elapsed days, so any range touching
/// today or the future has to go through the forecast endpoint instead.
pub fn weather_api_url(end_date: NaiveDate, today: NaiveDate) -> &'static str {
    if end_date >= today {
        OPEN_METEO_FORECAST_URL
    } else {
        OPEN_METEO_ARCHIVE_URL
    }
}

/// Flattens Open-Meteo's parallel hourly arrays into rows. Missing series
/// degrade to zeros rather than dropping the row, matching the zero-fill
/// applied to absent columns upstream.
pub fn decode_hourly_rows(payload: &Value) -> Vec<WeatherRow> {
    let Some(hourly) = payload.get("hourly") else {
        return Vec::new();
    };
    let Some(times) = hourly.get("time").and_then(Value::as_array) else {
        return Vec::new();
    };

    let series = |key: &str| -> Vec<f64> {
        hourly
            .get(key)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .map(|value| value.as_f64().unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default()
    };
    let temperature = series("temperature_2m");
    let precipitation = series("precipitation");
    let pressure = series("pressure_msl");
    let wind_speed = series("wind_speed_10m");
    let wind_direction = series("wind_direction_10m");
    let humidity = series("relative_humidity_2m");
    let at = |values: &[f64], index: usize| values.get(index).copied().unwrap_or(0.0);

    let mut rows = Vec::with_capacity(times.len());
    for (index, time_value) in times.iter().enumerate() {
        let Some(time_text) = time_value.as_str() else {
            continue;
        };
        let Some(time) = parse_iso_timestamp(time_text) else {
            continue;
        };
        let Some(init_time) = time.date().and_hms_opt(0, 0, 0) else {
            continue;
        };

        // Meteorological direction is where the wind comes FROM, so both
        // components are negated.
        let speed = at(&wind_speed, index);
        let direction_rad = at(&wind_direction, index).to_radians();

        rows.push(WeatherRow {
            init_time,
            time,
            temperature: at(&temperature, index),
            precipitation: at(&precipitation, index),
            pressure: at(&pressure, index),
            wind_u: -speed * direction_rad.sin(),
            wind_v: -speed * direction_rad.cos(),
            humidity_fraction: at(&humidity, index) / 100.0,
        });
    }
    rows.sort_by_key(|row| row.time);
    rows
}

/// With an end bound, keeps rows whose day falls inside [init, end]. Without
/// one, keeps every day matching the init timestamp's month and day, which
/// selects the same calendar day across all loaded years.
pub fn filter_rows(rows: &[WeatherRow], init: NaiveDateTime, end: Option<NaiveDateTime>) -> Vec<WeatherRow> {
    match end {
        Some(end) => rows
            .iter()
            .filter(|row| row.init_time >= init && row.init_time <= end)
            .cloned()
            .collect(),
        None => rows
            .iter()
            .filter(|row| {
                row.init_time.month() == init.month() && row.init_time.day() == init.day()
            })
            .cloned()
            .collect(),
    }
}

pub fn cap_to_chart_window(rows: &[WeatherRow]) -> Vec<WeatherRow> {
    let Some(min_time) = rows.iter().map(|row| row.time).min() else {
        return Vec::new();
    };
    let cutoff = min_time + chrono::Duration::days(CHART_WINDOW_DAYS);
    rows.iter()
        .filter(|row| row.time < cutoff)
        .cloned()
        .collect()
}

/// One line chart per plotted variable, with a series per calendar year so
/// year-over-year loads overlay instead of concatenating.
pub fn build_weather_chart_specs(rows: &[WeatherRow]) -> Vec<(String, ChartSpec)> {
    if rows.is_empty() {
        return Vec::new();
    }

    let mut by_year: BTreeMap<i32, Vec<&WeatherRow>> = BTreeMap::new();
    for row in rows {
        by_year.entry(row.time.year()).or_default().push(row);
    }
    let x_values: Vec<String> = by_year
        .values()
        .max_by_key(|group| group.len())
        .map(|group| {
            group
                .iter()
                .map(|row| row.time.format("%b-%d %H:%M").to_string())
                .collect()
        })
        .unwrap_or_default();

    WEATHER_PLOT_VARIABLES
        .iter()
        .map(|&(column, title)| {
            let series = by_year
                .iter()
                .map(|(year, group)| ChartSeries {
                    label: year.to_string(),
                    values: group.iter().map(|row| row.variable(column)).collect(),
                })
                .collect();
            let spec = ChartSpec {
                title: title.to_string(),
                x_label: "Time".to_string(),
                y_label: title.to_string(),
                kind: ChartKind::Line,
                x_values: x_values.clone(),
                series,
            };
            (format!("{column}_plot.svg"), spec)
        })
        .collect()
}

/// Per-variable, per-year statistics of the charted window, sent to the
/// model in place of rendered images.
pub fn weather_digest(rows: &[WeatherRow]) -> String {
    let mut lines = Vec::new();
    if let (Some(start), Some(end)) = (
        rows.iter().map(|row| row.time).min(),
        rows.iter().map(|row| row.time).max(),
    ) {
        lines.push(format!(
            "Chart data window (hourly, UTC): {} to {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        ));
    }

    let mut by_year: BTreeMap<i32, Vec<&WeatherRow>> = BTreeMap::new();
    for row in rows {
        by_year.entry(row.time.year()).or_default().push(row);
    }
    for &(column, title) in WEATHER_PLOT_VARIABLES {
        for (year, group) in &by_year {
            let values: Vec<f64> = group.iter().map(|row| row.variable(column)).collect();
            let count = values.len();
            if count == 0 {
                continue;
            }
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = values.iter().sum::<f64>() / count as f64;
            lines.push(format!(
                "- {title} [{year}]: min {min:.2}, max {max:.2}, mean {mean:.2} over {count} hourly points"
            ));
        }
    }
    lines.join("\n")
}

#[derive(Debug, Default, Clone)]
struct WeatherWorkspace {
    latitude: Option<f64>,
    longitude: Option<f64>,
    rows: Option<Vec<WeatherRow>>,
    chart_filenames: Option<Vec<String>>,
}

/// Stateful five-step weather pipeline: geocode, fetch, filter, chart,
/// summarize. Intermediate data is held per session keyed by session id,
/// since each step runs as an independent tool call.
pub struct WeatherService {
    client: Client,
    maps_api_key: Option<String>,
    model: Arc<dyn Llm>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    workspaces: Mutex<HashMap<String, WeatherWorkspace>>,
}

impl WeatherService {
    pub fn new(
        maps_api_key: Option<String>,
        model: Arc<dyn Llm>,
        temperature: Option<f32>,
        top_p: Option<f32>,
    ) -> AnyResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("supplyline/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build weather HTTP client")?;
        Ok(Self {
            client,
            maps_api_key,
            model,
            temperature,
            top_p,
            workspaces: Mutex::new(HashMap::new()),
        })
    }

    fn with_workspace<T>(&self, session_id: &str, f: impl FnOnce(&mut WeatherWorkspace) -> T) -> T {
        let mut workspaces = self
            .workspaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(workspaces.entry(session_id.to_string()).or_default())
    }

    /// Geocodes an address, preferring Google Maps when a key is configured
    /// and falling back to Open-Meteo's geocoder.
    pub async fn get_coordinates(&self, ctx: Arc<dyn ToolContext>, args: &Value) -> Value {
        let address = args
            .get("address")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if address.is_empty() {
            return json!({
                "status": "error",
                "error_message": "Missing required argument: address"
            });
        }

        if let Some(key) = &self.maps_api_key {
            match self.geocode_google_maps(address, key).await {
                Ok(Some((lat, lng))) => {
                    return self.finish_geocode(&ctx, address, lat, lng, "Google Maps");
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "Google Maps geocoding failed, falling back to Open-Meteo");
                }
            }
        }

        match self.geocode_open_meteo(address).await {
            Ok(Some((lat, lng))) => self.finish_geocode(&ctx, address, lat, lng, "Open-Meteo"),
            Ok(None) => json!({
                "status": "error",
                "error_message": format!("Location not found for {address}")
            }),
            Err(err) => json!({
                "status": "error",
                "error_message": format!("HTTP Request failed: {err:#}")
            }),
        }
    }

    async fn geocode_google_maps(&self, address: &str, key: &str) -> AnyResult<Option<(f64, f64)>> {
        let data = self
            .client
            .get(MAPS_GEOCODING_URL)
            .query(&[("address", address), ("key", key)])
            .send()
            .await
            .context("Google Maps geocoding request failed")?
            .json::<Value>()
            .await
            .context("failed to decode Google Maps geocoding response")?;

        if data.get("status").and_then(Value::as_str) != Some("OK") {
            let detail = data
                .get("error_message")
                .or_else(|| data.get("status"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            tracing::warn!(status = detail, "Google Maps geocoding returned no result");
            return Ok(None);
        }
        let location = data.pointer("/results/0/geometry/location");
        let lat = location.and_then(|loc| loc.get("lat")).and_then(Value::as_f64);
        let lng = location.and_then(|loc| loc.get("lng")).and_then(Value::as_f64);
        Ok(lat.zip(lng))
    }

    async fn geocode_open_meteo(&self, address: &str) -> AnyResult<Option<(f64, f64)>> {
        let data = self
            .client
            .get(OPEN_METEO_GEOCODING_URL)
            .query(&[
                ("name", address),
                ("count", "1"),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await
            .context("Open-Meteo geocoding request failed")?
            .json::<Value>()
            .await
            .context("failed to decode Open-Meteo geocoding response")?;

        let result = data.pointer("/results/0");
        let lat = result
            .and_then(|entry| entry.get("latitude"))
            .and_then(Value::as_f64);
        let lng = result
            .and_then(|entry| entry.get("longitude"))
            .and_then(Value::as_f64);
        Ok(lat.zip(lng))
    }

    fn finish_geocode(
        &self,
        ctx: &Arc<dyn ToolContext>,
        address: &str,
        lat: f64,
        lng: f64,
        source: &str,
    ) -> Value {
        self.with_workspace(ctx.session_id(), |workspace| {
            workspace.latitude = Some(lat);
            workspace.longitude = Some(lng);
        });
        let mut actions = ctx.actions();
        actions.state_delta.insert("latitude".to_string(), json!(lat));
        actions.state_delta.insert("longitude".to_string(), json!(lng));
        ctx.set_actions(actions);

        let report = format!(
            "Successfully found coordinates for {address} using {source}: Latitude={lat}, Longitude={lng}"
        );
        tracing::info!(%address, lat, lng, source, "resolved coordinates");
        json!({ "status": "success", "latitude": lat, "longitude": lng, "report": report })
    }

    /// Loads hourly weather for the stored coordinates. Past ranges come
    /// from the archive API; ranges touching today or later use the
    /// forecast API, which also serves the recent past.
    pub async fn fetch_weather(&self, ctx: Arc<dyn ToolContext>, args: &Value) -> Value {
        let coordinates = self.with_workspace(ctx.session_id(), |workspace| {
            workspace.latitude.zip(workspace.longitude)
        });
        let Some((latitude, longitude)) = coordinates else {
            return json!({
                "status": "error",
                "error_message": "Latitude or longitude not found in context. Please get coordinates from an address first."
            });
        };

        let init_text = args
            .get("init_time")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(init) = parse_iso_timestamp(init_text) else {
            return json!({
                "status": "error",
                "error_message": format!("Invalid init_time '{init_text}'. Expected an ISO 8601 timestamp.")
            });
        };
        let start_date = init.date();
        let end_date = match args.get("end_time").and_then(Value::as_str) {
            Some(end_text) => match parse_iso_timestamp(end_text) {
                Some(end) => end.date(),
                None => {
                    return json!({
                        "status": "error",
                        "error_message": format!("Invalid end_time '{end_text}'. Expected an ISO 8601 timestamp.")
                    });
                }
            },
            None => start_date,
        };

        let url = weather_api_url(end_date, Utc::now().date_naive());
        let payload = match self
            .client
            .get(url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("start_date", start_date.format("%Y-%m-%d").to_string()),
                ("end_date", end_date.format("%Y-%m-%d").to_string()),
                ("hourly", HOURLY_VARIABLES.to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .send()
            .await
        {
            Ok(response) => match response.json::<Value>().await {
                Ok(payload) => payload,
                Err(err) => {
                    return json!({
                        "status": "error",
                        "error_message": format!("Weather API failed: {err}")
                    });
                }
            },
            Err(err) => {
                return json!({
                    "status": "error",
                    "error_message": format!("Weather API failed: {err}")
                });
            }
        };

        let rows = decode_hourly_rows(&payload);
        if rows.is_empty() {
            return json!({
                "status": "error",
                "error_message": "Weather API returned no data."
            });
        }

        let count = rows.len();
        self.with_workspace(ctx.session_id(), |workspace| {
            workspace.rows = Some(rows);
            workspace.chart_filenames = None;
        });
        let report = format!(
            "Successfully loaded DataFrame from Open-Meteo API for location (lat: {latitude}, lon: {longitude}). It has {count} rows."
        );
        tracing::info!(lat = latitude, lon = longitude, rows = count, "loaded weather data");
        json!({ "status": "success", "report": report })
    }

    /// Narrows the loaded rows to a time range, or to one calendar day
    /// across years when no end bound is given.
    pub async fn filter_weather(&self, ctx: Arc<dyn ToolContext>, args: &Value) -> Value {
        let rows = self.with_workspace(ctx.session_id(), |workspace| workspace.rows.clone());
        let Some(rows) = rows else {
            return json!({
                "status": "error",
                "error_message": "No DataFrame in context. Please load a DataFrame first."
            });
        };
        if rows.is_empty() {
            return json!({
                "status": "error",
                "error_message": "DataFrame is empty or not found in context."
            });
        }

        let init_text = args
            .get("init_time")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(init) = parse_iso_timestamp(init_text) else {
            return json!({
                "status": "error",
                "error_message": format!("Failed to filter data: invalid init_time '{init_text}'")
            });
        };
        let end = match args.get("end_time").and_then(Value::as_str) {
            Some(end_text) => match parse_iso_timestamp(end_text) {
                Some(end) => Some(end),
                None => {
                    return json!({
                        "status": "error",
                        "error_message": format!("Failed to filter data: invalid end_time '{end_text}'")
                    });
                }
            },
            None => None,
        };

        let original_len = rows.len();
        let filtered = filter_rows(&rows, init, end);
        let filtered_len = filtered.len();
        self.with_workspace(ctx.session_id(), |workspace| {
            workspace.rows = Some(filtered);
        });
        let report = format!(
            "Filtered DataFrame. It now has {filtered_len} rows, down from an original {original_len} rows."
        );
        tracing::info!(kept = filtered_len, from = original_len, "filtered weather data");
        json!({ "status": "success", "report": report })
    }

    /// Renders one chart per plotted variable and saves each as an SVG
    /// artifact named `{variable}_plot.svg`.
    pub async fn generate_charts(&self, ctx: Arc<dyn ToolContext>) -> Value {
        let rows = self.with_workspace(ctx.session_id(), |workspace| workspace.rows.clone());
        let Some(rows) = rows else {
            return json!({
                "status": "error",
                "error_message": "No DataFrame in context. Please load and filter a DataFrame first."
            });
        };
        if rows.is_empty() {
            return json!({
                "status": "success",
                "report": "DataFrame is empty, no charts generated."
            });
        }

        let Some(artifacts) = ctx.artifacts() else {
            return json!({
                "status": "error",
                "error_message": "Artifact service is not available for chart output."
            });
        };

        let windowed = cap_to_chart_window(&rows);
        if windowed.len() < rows.len() {
            tracing::info!(
                kept = windowed.len(),
                from = rows.len(),
                "capped chart data to the seven-day window"
            );
        }

        let mut filenames = Vec::new();
        for (filename, spec) in build_weather_chart_specs(&windowed) {
            let svg = render_chart_svg(&spec);
            let part = Part::InlineData {
                mime_type: CHART_MIME_TYPE.to_string(),
                data: svg.into_bytes(),
            };
            if let Err(err) = artifacts.save(&filename, &part).await {
                return json!({
                    "status": "error",
                    "error_message": format!("Failed to generate charts: {err}")
                });
            }
            filenames.push(filename);
        }

        self.with_workspace(ctx.session_id(), |workspace| {
            workspace.chart_filenames = Some(filenames.clone());
        });
        let mut actions = ctx.actions();
        actions
            .state_delta
            .insert("chart_filenames".to_string(), json!(filenames));
        ctx.set_actions(actions);

        let report = format!(
            "Successfully generated and saved {} charts as artifacts: {}",
            filenames.len(),
            filenames.join(", ")
        );
        tracing::info!(charts = filenames.len(), "generated weather charts");
        json!({ "status": "success", "report": report })
    }

    /// Verifies that the saved charts are loadable, then asks the model for
    /// a written summary of the charted window.
    pub async fn summarize(&self, ctx: Arc<dyn ToolContext>) -> Value {
        let (filenames, rows) = self.with_workspace(ctx.session_id(), |workspace| {
            (workspace.chart_filenames.clone(), workspace.rows.clone())
        });
        let Some(filenames) = filenames else {
            return json!({
                "status": "error",
                "error_message": "No chart filenames in context. Please generate charts first."
            });
        };
        if filenames.is_empty() {
            return json!({
                "status": "success",
                "summary": "No charts were provided to generate a summary."
            });
        }

        let Some(artifacts) = ctx.artifacts() else {
            return json!({
                "status": "error",
                "error_message": "Failed to generate summary: artifact service is not available"
            });
        };
        for filename in &filenames {
            if let Err(err) = artifacts.load(filename).await {
                return json!({
                    "status": "error",
                    "error_message": format!("Failed to generate summary: {err}")
                });
            }
        }

        let digest = weather_digest(&cap_to_chart_window(&rows.unwrap_or_default()));
        let prompt = format!("{WEATHER_ANALYST_PERSONA}\n\n{WEATHER_SUMMARY_PROMPT}\n\n{digest}");
        match self.generate_summary_text(&prompt).await {
            Ok(summary) => {
                tracing::info!(chars = summary.len(), "generated weather summary");
                json!({ "status": "success", "summary": summary })
            }
            Err(err) => json!({
                "status": "error",
                "error_message": format!("Failed to generate summary: {err:#}")
            }),
        }
    }

    async fn generate_summary_text(&self, prompt: &str) -> AnyResult<String> {
        let mut request = LlmRequest::new(
            self.model.name(),
            vec![Content::new("user").with_text(prompt)],
        );
        request.config = Some(GenerateContentConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            ..GenerateContentConfig::default()
        });

        let mut stream = self
            .model
            .generate_content(request, false)
            .await
            .context("weather summary request failed")?;
        let mut summary = String::new();
        while let Some(chunk) = stream.next().await {
            let response = chunk.context("weather summary stream failed")?;
            if let Some(content) = &response.content {
                for part in &content.parts {
                    if let Part::Text { text } = part {
                        summary.push_str(text);
                    }
                }
            }
        }
        let summary = summary.trim().to_string();
        if summary.is_empty() {
            anyhow::bail!("model returned no summary text");
        }
        Ok(summary)
    }
}

#[cfg(test)]
impl WeatherService {
    pub(crate) fn seed_coordinates(&self, session_id: &str, latitude: f64, longitude: f64) {
        self.with_workspace(session_id, |workspace| {
            workspace.latitude = Some(latitude);
            workspace.longitude = Some(longitude);
        });
    }

    pub(crate) fn seed_rows(&self, session_id: &str, rows: Vec<WeatherRow>) {
        self.with_workspace(session_id, |workspace| workspace.rows = Some(rows));
    }

    pub(crate) fn seed_chart_filenames(&self, session_id: &str, filenames: Vec<String>) {
        self.with_workspace(session_id, |workspace| {
            workspace.chart_filenames = Some(filenames);
        });
    }
}
