pub mod charts;
pub mod date_time;
pub mod forecast;
pub mod warehouse;
pub mod weather;

use std::sync::Arc;

use adk_rust::prelude::*;

use warehouse::Warehouse;
use weather::WeatherService;

pub fn date_time_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        date_time::DATE_TIME_TOOL_NAME,
        "Returns the current date and time. \
         Args: time_zone (optional IANA-style offset such as 'UTC', 'Z', or '+05:30').",
        |_ctx, args| async move { Ok(date_time::date_time_tool_response(&args)) },
    ))
}

pub fn render_chart_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        charts::RENDER_CHART_TOOL_NAME,
        "Renders a line or bar chart and saves it as an SVG artifact. \
         Args: title (required), kind=line|bar, x_values: [string], \
         series: [{label, values: [number]}], x_label, y_label.",
        |ctx, args| async move { Ok(charts::render_chart_tool_response(ctx, &args).await) },
    ))
}

pub fn execute_sql_tool(warehouse: Arc<dyn Warehouse>) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        warehouse::EXECUTE_SQL_TOOL_NAME,
        "Runs a read-only BigQuery SQL query against the consumption warehouse \
         and returns the rows as JSON. Args: sql_query (required).",
        move |_ctx, args| {
            let warehouse = warehouse.clone();
            async move { Ok(warehouse::execute_sql_tool_response(warehouse.as_ref(), &args).await) }
        },
    ))
}

pub fn demand_forecast_tool(
    warehouse: Arc<dyn Warehouse>,
    default_history_days: u32,
) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        forecast::DEMAND_FORECAST_TOOL_NAME,
        "Forecasts daily power demand with Holt-Winters triple exponential smoothing, \
         nationally or filtered to a scope. \
         Args: period (days ahead, default 7), state, region, power_supplier, history_days.",
        move |_ctx, args| {
            let warehouse = warehouse.clone();
            async move {
                Ok(forecast::demand_forecast_tool_response(
                    warehouse.as_ref(),
                    default_history_days,
                    &args,
                )
                .await)
            }
        },
    ))
}

/// The five weather pipeline tools in call order: geocode, fetch, filter,
/// chart, summarize. All share one service so state flows between steps.
pub fn weather_toolkit(service: Arc<WeatherService>) -> Vec<Arc<dyn Tool>> {
    let get_coordinates = {
        let service = service.clone();
        FunctionTool::new(
            weather::GET_COORDINATES_TOOL_NAME,
            "Resolves a street address or place name to latitude and longitude, \
             preferring Google Maps and falling back to Open-Meteo geocoding. \
             Stores the coordinates for later weather calls. Args: address (required).",
            move |ctx, args| {
                let service = service.clone();
                async move { Ok(service.get_coordinates(ctx, &args).await) }
            },
        )
    };

    let fetch_weather = {
        let service = service.clone();
        FunctionTool::new(
            weather::FETCH_WEATHER_TOOL_NAME,
            "Loads hourly Open-Meteo weather data for the stored coordinates. \
             Args: init_time (required, ISO 8601), end_time (optional, ISO 8601).",
            move |ctx, args| {
                let service = service.clone();
                async move { Ok(service.fetch_weather(ctx, &args).await) }
            },
        )
    };

    let filter_weather = {
        let service = service.clone();
        FunctionTool::new(
            weather::FILTER_WEATHER_TOOL_NAME,
            "Filters the loaded weather rows to a time range, or to a single \
             calendar day across years when end_time is omitted. \
             Args: init_time (required, ISO 8601), end_time (optional, ISO 8601).",
            move |ctx, args| {
                let service = service.clone();
                async move { Ok(service.filter_weather(ctx, &args).await) }
            },
        )
    };

    let generate_charts = {
        let service = service.clone();
        FunctionTool::new(
            weather::GENERATE_CHARTS_TOOL_NAME,
            "Renders the six standard weather charts from the loaded rows and \
             saves them as SVG artifacts. Takes no arguments.",
            move |ctx, _args| {
                let service = service.clone();
                async move { Ok(service.generate_charts(ctx).await) }
            },
        )
    };

    let summarize = {
        let service = service.clone();
        FunctionTool::new(
            weather::SUMMARIZE_WEATHER_TOOL_NAME,
            "Writes a 200-word analyst summary of the generated weather charts. \
             Takes no arguments.",
            move |ctx, _args| {
                let service = service.clone();
                async move { Ok(service.summarize(ctx).await) }
            },
        )
    };

    vec![
        Arc::new(get_coordinates),
        Arc::new(fetch_weather),
        Arc::new(filter_weather),
        Arc::new(generate_charts),
        Arc::new(summarize),
    ]
}
