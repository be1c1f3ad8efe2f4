use chrono::{Duration, NaiveDate, Utc};
use serde_json::{Value, json};

use crate::tools::warehouse::{QueryParameter, Warehouse};

pub const DEMAND_FORECAST_TOOL_NAME: &str = "get_demand_forecast";
pub const FORECAST_METHOD_LABEL: &str = "Triple Exponential Smoothing (Holt-Winters)";

pub const SEASONAL_PERIOD: usize = 7;
pub const MIN_HISTORY_POINTS: usize = 14;
pub const DEFAULT_FORECAST_DAYS: u32 = 7;
pub const MAX_FORECAST_DAYS: u32 = 90;

/// Smoothing coefficients are searched over k/20 for k in 1..=19, so every
/// fit is reproducible without a numeric optimizer.
const SMOOTHING_GRID_STEPS: u32 = 19;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForecastScope {
    pub state: Option<String>,
    pub region: Option<String>,
    pub power_supplier: Option<String>,
}

impl ForecastScope {
    pub fn is_national(&self) -> bool {
        self.state.is_none() && self.region.is_none() && self.power_supplier.is_none()
    }

    /// JSON object of the filters in effect, or the string "National" when
    /// no filter was given.
    pub fn scope_value(&self) -> Value {
        if self.is_national() {
            return Value::String("National".to_string());
        }
        let mut scope = serde_json::Map::new();
        if let Some(state) = &self.state {
            scope.insert("state".to_string(), Value::String(state.clone()));
        }
        if let Some(region) = &self.region {
            scope.insert("region".to_string(), Value::String(region.clone()));
        }
        if let Some(power_supplier) = &self.power_supplier {
            scope.insert(
                "power_supplier".to_string(),
                Value::String(power_supplier.clone()),
            );
        }
        Value::Object(scope)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub period: u32,
    pub scope: ForecastScope,
    pub history_days: u32,
}

impl ForecastRequest {
    pub fn from_args(args: &Value, default_history_days: u32) -> Self {
        let period = args
            .get("period")
            .and_then(Value::as_u64)
            .map(|period| period as u32)
            .unwrap_or(DEFAULT_FORECAST_DAYS)
            .clamp(1, MAX_FORECAST_DAYS);
        let history_days = args
            .get("history_days")
            .and_then(Value::as_u64)
            .map(|days| days as u32)
            .unwrap_or(default_history_days)
            .max(MIN_HISTORY_POINTS as u32);
        let scope = ForecastScope {
            state: optional_string_arg(args, "state"),
            region: optional_string_arg(args, "region"),
            power_supplier: optional_string_arg(args, "power_supplier"),
        };
        Self {
            period,
            scope,
            history_days,
        }
    }
}

fn optional_string_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Builds the daily-consumption aggregation query for the request scope.
/// Rows arrive newest-first so LIMIT keeps the most recent history window.
pub fn build_history_query(
    table_name: &str,
    request: &ForecastRequest,
    current_date: NaiveDate,
) -> (String, Vec<QueryParameter>) {
    let mut where_clauses = Vec::new();
    let mut params = vec![QueryParameter::int64(
        "history_days",
        i64::from(request.history_days),
    )];

    if let Some(state) = &request.scope.state {
        where_clauses.push("state = @state");
        params.push(QueryParameter::string("state", state.clone()));
    }
    if let Some(region) = &request.scope.region {
        where_clauses.push("region = @region");
        params.push(QueryParameter::string("region", region.clone()));
    }
    if let Some(power_supplier) = &request.scope.power_supplier {
        where_clauses.push("power_supplier = @power_supplier");
        params.push(QueryParameter::string(
            "power_supplier",
            power_supplier.clone(),
        ));
    }
    where_clauses.push("date <= @current_date");
    params.push(QueryParameter::date(
        "current_date",
        current_date.format("%Y-%m-%d").to_string(),
    ));

    let sql = format!(
        "SELECT date, SUM(consumption_mega_units) AS consumption_mega_units \
         FROM `{table_name}` WHERE {} GROUP BY date ORDER BY date DESC LIMIT @history_days",
        where_clauses.join(" AND ")
    );
    (sql, params)
}

/// Additive Holt-Winters state after fitting a daily series with weekly
/// seasonality.
#[derive(Debug, Clone, PartialEq)]
pub struct HoltWinters {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    observed: usize,
    pub sse: f64,
}

impl HoltWinters {
    /// Fits one (alpha, beta, gamma) combination. Requires two full seasons
    /// so the initial level, trend, and seasonal indices are all data-driven.
    pub fn fit(values: &[f64], alpha: f64, beta: f64, gamma: f64) -> Option<Self> {
        if values.len() < 2 * SEASONAL_PERIOD {
            return None;
        }

        let first_season = &values[..SEASONAL_PERIOD];
        let level0 = first_season.iter().sum::<f64>() / SEASONAL_PERIOD as f64;
        let trend0 = (0..SEASONAL_PERIOD)
            .map(|i| (values[SEASONAL_PERIOD + i] - values[i]) / SEASONAL_PERIOD as f64)
            .sum::<f64>()
            / SEASONAL_PERIOD as f64;
        let mut seasonal: Vec<f64> = first_season.iter().map(|value| value - level0).collect();

        let mut level = level0;
        let mut trend = trend0;
        let mut sse = 0.0;
        for (t, &observed) in values.iter().enumerate() {
            let idx = t % SEASONAL_PERIOD;
            let predicted = level + trend + seasonal[idx];
            if t >= SEASONAL_PERIOD {
                let err = observed - predicted;
                sse += err * err;
            }

            let prev_level = level;
            let prev_trend = trend;
            level = alpha * (observed - seasonal[idx]) + (1.0 - alpha) * (prev_level + prev_trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * prev_trend;
            seasonal[idx] =
                gamma * (observed - prev_level - prev_trend) + (1.0 - gamma) * seasonal[idx];
        }

        if !level.is_finite() || !trend.is_finite() || !sse.is_finite() {
            return None;
        }
        Some(Self {
            alpha,
            beta,
            gamma,
            level,
            trend,
            seasonal,
            observed: values.len(),
            sse,
        })
    }

    /// Out-of-sample forecasts for 1..=horizon steps past the observed
    /// series.
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        (1..=horizon)
            .map(|h| {
                let idx = (self.observed + h - 1) % SEASONAL_PERIOD;
                self.level + h as f64 * self.trend + self.seasonal[idx]
            })
            .collect()
    }
}

/// Grid search over the smoothing coefficients, keeping the first fit with
/// strictly lowest one-step squared error.
pub fn fit_best_holt_winters(values: &[f64]) -> Option<HoltWinters> {
    let grid: Vec<f64> = (1..=SMOOTHING_GRID_STEPS)
        .map(|step| f64::from(step) / f64::from(SMOOTHING_GRID_STEPS + 1))
        .collect();

    let mut best: Option<HoltWinters> = None;
    for &alpha in &grid {
        for &beta in &grid {
            for &gamma in &grid {
                if let Some(fit) = HoltWinters::fit(values, alpha, beta, gamma) {
                    let improved = best
                        .as_ref()
                        .map(|current| fit.sse < current.sse)
                        .unwrap_or(true);
                    if improved {
                        best = Some(fit);
                    }
                }
            }
        }
    }
    best
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Runs the warehouse query and Holt-Winters fit, returning the forecast
/// report. All failures stay in-band as {"error": ...} so the demand sense
/// agent can relay them.
pub async fn demand_forecast_payload(warehouse: &dyn Warehouse, request: &ForecastRequest) -> Value {
    let table_name = warehouse.table().qualified_name();
    let current_date = Utc::now().date_naive();
    let (sql, params) = build_history_query(&table_name, request, current_date);

    let rows = match warehouse.query(&sql, &params).await {
        Ok(rows) => rows,
        Err(err) => {
            return json!({ "error": format!("Failed to query BigQuery. Error: {err:#}") });
        }
    };

    let mut series: Vec<(NaiveDate, f64)> = Vec::with_capacity(rows.len());
    for row in &rows {
        let Some(date_text) = row.get("date").and_then(Value::as_str) else {
            return json!({ "error": "An unexpected error occurred: row is missing a date column" });
        };
        let Ok(date) = NaiveDate::parse_from_str(date_text, "%Y-%m-%d") else {
            return json!({
                "error": format!("An unexpected error occurred: unparseable date '{date_text}'")
            });
        };
        let Some(consumption) = row
            .get("consumption_mega_units")
            .and_then(Value::as_f64)
            .filter(|value| value.is_finite())
        else {
            return json!({
                "error": format!("An unexpected error occurred: missing consumption for {date_text}")
            });
        };
        series.push((date, consumption));
    }

    if series.len() < MIN_HISTORY_POINTS {
        return json!({
            "error": format!(
                "Insufficient data for forecast. Need at least 14 days, but found {}.",
                series.len()
            )
        });
    }

    series.sort_by_key(|(date, _)| *date);
    let values: Vec<f64> = series.iter().map(|(_, value)| *value).collect();
    let last_date = series[series.len() - 1].0;

    let Some(model) = fit_best_holt_winters(&values) else {
        return json!({ "error": "An unexpected error occurred: model fitting failed" });
    };

    let horizon = request.period as usize;
    let forecast_list: Vec<Value> = model
        .forecast(horizon)
        .into_iter()
        .enumerate()
        .map(|(offset, value)| {
            let date = last_date + Duration::days(offset as i64 + 1);
            json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "forecasted_consumption_mega_units": round2(value)
            })
        })
        .collect();

    json!({
        "forecast_parameters": {
            "scope": request.scope.scope_value(),
            "forecast_days": request.period,
            "method": FORECAST_METHOD_LABEL,
            "historical_days_used": values.len(),
            "based_on_last_date": last_date.format("%Y-%m-%d").to_string()
        },
        "demand_forecast": forecast_list
    })
}

pub async fn demand_forecast_tool_response(
    warehouse: &dyn Warehouse,
    default_history_days: u32,
    args: &Value,
) -> Value {
    let request = ForecastRequest::from_args(args, default_history_days);
    demand_forecast_payload(warehouse, &request).await
}
