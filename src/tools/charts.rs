use std::sync::Arc;

use adk_rust::prelude::*;
use serde_json::{Value, json};

pub const RENDER_CHART_TOOL_NAME: &str = "render_chart";
pub const CHART_MIME_TYPE: &str = "image/svg+xml";

const CHART_WIDTH: f64 = 960.0;
const CHART_HEIGHT: f64 = 540.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;
const MAX_X_TICK_LABELS: usize = 8;
const SERIES_PALETTE: &[&str] = &[
    "#1a73e8", "#d93025", "#188038", "#f9ab00", "#9334e6", "#12a4af",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Bar,
}

impl ChartKind {
    pub fn label(self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartSeries {
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub kind: ChartKind,
    pub x_values: Vec<String>,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartToolError {
    pub code: &'static str,
    pub message: String,
}

impl ChartToolError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub fn chart_error_payload(err: ChartToolError) -> Value {
    json!({
        "status": "error",
        "code": err.code,
        "error_message": err.message
    })
}

pub fn parse_chart_spec(args: &Value) -> Result<ChartSpec, ChartToolError> {
    let title = args
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if title.is_empty() {
        return Err(ChartToolError::new(
            "invalid_args",
            "'title' is required for render_chart",
        ));
    }

    let kind = match args
        .get("kind")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("line")
        .to_ascii_lowercase()
        .as_str()
    {
        "line" => ChartKind::Line,
        "bar" => ChartKind::Bar,
        other => {
            return Err(ChartToolError::new(
                "invalid_args",
                format!("unknown chart kind '{other}'. Use line or bar."),
            ));
        }
    };

    let x_values = args
        .get("x_values")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .map(|value| match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<String>>()
        })
        .unwrap_or_default();
    if x_values.is_empty() {
        return Err(ChartToolError::new(
            "invalid_args",
            "'x_values' must be a non-empty array of axis labels",
        ));
    }

    let raw_series = args
        .get("series")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ChartToolError::new(
                "invalid_args",
                "'series' must be an array of {label, values} objects",
            )
        })?;
    if raw_series.is_empty() {
        return Err(ChartToolError::new(
            "invalid_args",
            "'series' must contain at least one entry",
        ));
    }

    let mut series = Vec::with_capacity(raw_series.len());
    for (index, entry) in raw_series.iter().enumerate() {
        let label = entry
            .get("label")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("series {}", index + 1));
        let values = entry
            .get("values")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .map(|value| value.as_f64())
                    .collect::<Option<Vec<f64>>>()
            })
            .unwrap_or_default()
            .ok_or_else(|| {
                ChartToolError::new(
                    "invalid_args",
                    format!("series '{label}' contains a non-numeric value"),
                )
            })?;
        if values.len() != x_values.len() {
            return Err(ChartToolError::new(
                "invalid_args",
                format!(
                    "series '{}' has {} values but {} x_values were given",
                    label,
                    values.len(),
                    x_values.len()
                ),
            ));
        }
        if values.iter().any(|value| !value.is_finite()) {
            return Err(ChartToolError::new(
                "invalid_args",
                format!("series '{label}' contains a non-finite value"),
            ));
        }
        series.push(ChartSeries { label, values });
    }

    Ok(ChartSpec {
        title,
        x_label: args
            .get("x_label")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string(),
        y_label: args
            .get("y_label")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string(),
        kind,
        x_values,
        series,
    })
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn format_tick(value: f64) -> String {
    if value.abs() >= 1000.0 {
        format!("{value:.0}")
    } else {
        let rendered = format!("{value:.2}");
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn value_range(spec: &ChartSpec) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for series in &spec.series {
        for value in &series.values {
            min = min.min(*value);
            max = max.max(*value);
        }
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if spec.kind == ChartKind::Bar {
        min = min.min(0.0);
        max = max.max(0.0);
    }
    if (max - min).abs() < f64::EPSILON {
        let pad = if max.abs() > f64::EPSILON {
            max.abs() * 0.1
        } else {
            1.0
        };
        (min - pad, max + pad)
    } else {
        (min, max)
    }
}

/// Renders the chart as a standalone SVG document. The spec must already be
/// validated: non-empty x_values and equal-length finite series.
pub fn render_chart_svg(spec: &ChartSpec) -> String {
    let plot_left = MARGIN_LEFT;
    let plot_right = CHART_WIDTH - MARGIN_RIGHT;
    let plot_top = MARGIN_TOP;
    let plot_bottom = CHART_HEIGHT - MARGIN_BOTTOM;
    let plot_width = plot_right - plot_left;
    let plot_height = plot_bottom - plot_top;

    let (min_value, max_value) = value_range(spec);
    let scale_y = |value: f64| -> f64 {
        plot_bottom - (value - min_value) / (max_value - min_value) * plot_height
    };

    let mut svg = String::with_capacity(4096);
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{CHART_WIDTH}\" height=\"{CHART_HEIGHT}\" \
         viewBox=\"0 0 {CHART_WIDTH} {CHART_HEIGHT}\">\n"
    ));
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>\n");
    svg.push_str(&format!(
        "<text x=\"{:.1}\" y=\"28\" font-family=\"sans-serif\" font-size=\"18\" \
         text-anchor=\"middle\" fill=\"#202124\">{}</text>\n",
        CHART_WIDTH / 2.0,
        escape_xml(&spec.title)
    ));

    // Axes.
    svg.push_str(&format!(
        "<line x1=\"{plot_left:.1}\" y1=\"{plot_top:.1}\" x2=\"{plot_left:.1}\" \
         y2=\"{plot_bottom:.1}\" stroke=\"#5f6368\" stroke-width=\"1\"/>\n"
    ));
    svg.push_str(&format!(
        "<line x1=\"{plot_left:.1}\" y1=\"{plot_bottom:.1}\" x2=\"{plot_right:.1}\" \
         y2=\"{plot_bottom:.1}\" stroke=\"#5f6368\" stroke-width=\"1\"/>\n"
    ));

    // Horizontal grid and y tick labels, five stops from min to max.
    for tick in 0..5 {
        let value = min_value + (max_value - min_value) * f64::from(tick) / 4.0;
        let y = scale_y(value);
        if tick > 0 {
            svg.push_str(&format!(
                "<line x1=\"{plot_left:.1}\" y1=\"{y:.1}\" x2=\"{plot_right:.1}\" y2=\"{y:.1}\" \
                 stroke=\"#e8eaed\" stroke-width=\"1\"/>\n"
            ));
        }
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"11\" \
             text-anchor=\"end\" fill=\"#5f6368\">{}</text>\n",
            plot_left - 8.0,
            y + 4.0,
            escape_xml(&format_tick(value))
        ));
    }

    // X tick labels, strided so long series stay readable.
    let point_count = spec.x_values.len();
    let stride = point_count.div_ceil(MAX_X_TICK_LABELS).max(1);
    for (index, label) in spec.x_values.iter().enumerate() {
        if index % stride != 0 {
            continue;
        }
        let x = if point_count == 1 {
            plot_left + plot_width / 2.0
        } else {
            match spec.kind {
                ChartKind::Line => {
                    plot_left + plot_width * index as f64 / (point_count - 1) as f64
                }
                ChartKind::Bar => {
                    plot_left + plot_width * (index as f64 + 0.5) / point_count as f64
                }
            }
        };
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"11\" \
             text-anchor=\"middle\" fill=\"#5f6368\">{}</text>\n",
            x,
            plot_bottom + 18.0,
            escape_xml(label)
        ));
    }

    // Axis titles.
    if !spec.x_label.is_empty() {
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"13\" \
             text-anchor=\"middle\" fill=\"#202124\">{}</text>\n",
            plot_left + plot_width / 2.0,
            CHART_HEIGHT - 16.0,
            escape_xml(&spec.x_label)
        ));
    }
    if !spec.y_label.is_empty() {
        svg.push_str(&format!(
            "<text x=\"18\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"13\" \
             text-anchor=\"middle\" fill=\"#202124\" transform=\"rotate(-90 18 {:.1})\">{}</text>\n",
            plot_top + plot_height / 2.0,
            plot_top + plot_height / 2.0,
            escape_xml(&spec.y_label)
        ));
    }

    // Plotted geometry.
    match spec.kind {
        ChartKind::Line => {
            for (series_index, series) in spec.series.iter().enumerate() {
                let color = SERIES_PALETTE[series_index % SERIES_PALETTE.len()];
                let points = series
                    .values
                    .iter()
                    .enumerate()
                    .map(|(index, value)| {
                        let x = if point_count == 1 {
                            plot_left + plot_width / 2.0
                        } else {
                            plot_left + plot_width * index as f64 / (point_count - 1) as f64
                        };
                        format!("{:.1},{:.1}", x, scale_y(*value))
                    })
                    .collect::<Vec<String>>()
                    .join(" ");
                svg.push_str(&format!(
                    "<polyline points=\"{points}\" fill=\"none\" stroke=\"{color}\" \
                     stroke-width=\"2\"/>\n"
                ));
            }
        }
        ChartKind::Bar => {
            let baseline = scale_y(0.0f64.clamp(min_value, max_value));
            let group_width = plot_width / point_count as f64;
            let bar_width = group_width * 0.8 / spec.series.len() as f64;
            for (series_index, series) in spec.series.iter().enumerate() {
                let color = SERIES_PALETTE[series_index % SERIES_PALETTE.len()];
                for (index, value) in series.values.iter().enumerate() {
                    let x = plot_left
                        + group_width * index as f64
                        + group_width * 0.1
                        + bar_width * series_index as f64;
                    let top = scale_y(*value).min(baseline);
                    let height = (scale_y(*value) - baseline).abs();
                    svg.push_str(&format!(
                        "<rect x=\"{x:.1}\" y=\"{top:.1}\" width=\"{bar_width:.1}\" \
                         height=\"{height:.1}\" fill=\"{color}\"/>\n"
                    ));
                }
            }
        }
    }

    // Legend for multi-series charts.
    if spec.series.len() > 1 {
        for (series_index, series) in spec.series.iter().enumerate() {
            let color = SERIES_PALETTE[series_index % SERIES_PALETTE.len()];
            let y = plot_top + 16.0 * series_index as f64;
            svg.push_str(&format!(
                "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"10\" height=\"10\" fill=\"{color}\"/>\n",
                plot_right - 150.0,
                y
            ));
            svg.push_str(&format!(
                "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"11\" \
                 fill=\"#202124\">{}</text>\n",
                plot_right - 136.0,
                y + 9.0,
                escape_xml(&series.label)
            ));
        }
    }

    svg.push_str("</svg>\n");
    svg
}

pub fn chart_file_name(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_separator = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            slug.push('_');
            last_was_separator = true;
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "chart.svg".to_string()
    } else {
        format!("{slug}_plot.svg")
    }
}

/// Parses the request, renders the SVG, and saves it through the artifact
/// service. Failures come back in-band so the model can correct the call.
pub async fn render_chart_tool_response(ctx: Arc<dyn ToolContext>, args: &Value) -> Value {
    let spec = match parse_chart_spec(args) {
        Ok(spec) => spec,
        Err(err) => return chart_error_payload(err),
    };

    let Some(artifacts) = ctx.artifacts() else {
        return chart_error_payload(ChartToolError::new(
            "artifacts_unavailable",
            "Artifact service is not available for chart output.",
        ));
    };

    let svg = render_chart_svg(&spec);
    let filename = chart_file_name(&spec.title);
    let part = Part::InlineData {
        mime_type: CHART_MIME_TYPE.to_string(),
        data: svg.into_bytes(),
    };
    match artifacts.save(&filename, &part).await {
        Ok(version) => json!({
            "status": "success",
            "filename": filename,
            "version": version,
            "kind": spec.kind.label(),
            "series_count": spec.series.len(),
            "point_count": spec.x_values.len()
        }),
        Err(err) => chart_error_payload(ChartToolError::new(
            "artifact_save_failed",
            format!("Failed to save chart artifact '{filename}': {err}"),
        )),
    }
}
