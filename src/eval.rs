use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::telemetry::{TelemetrySink, unix_ms_now};
use crate::tools::forecast::{MIN_HISTORY_POINTS, fit_best_holt_winters};

pub const DEFAULT_EVAL_DATASET_PATH: &str = "evals/datasets/demand-backtest.v1.json";
pub const DEFAULT_EVAL_OUTPUT_PATH: &str = ".supplyline/evals/latest.json";

#[derive(Debug, Deserialize)]
pub struct EvalDataset {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub cases: Vec<EvalCase>,
}

/// One back-test case: fit on all but the last `holdout_days` points of
/// `series`, then score the forecast against the held-out tail.
#[derive(Debug, Deserialize)]
pub struct EvalCase {
    pub id: String,
    pub series: Vec<f64>,
    #[serde(default = "default_holdout_days")]
    pub holdout_days: usize,
    pub max_mape: f64,
}

fn default_holdout_days() -> usize {
    7
}

#[derive(Debug, Serialize)]
pub struct EvalCaseReport {
    pub id: String,
    pub passed: bool,
    pub mape: f64,
    pub max_mape: f64,
    pub train_points: usize,
    pub holdout_points: usize,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct EvalRunReport {
    pub generated_at_unix_ms: u128,
    pub dataset_name: String,
    pub dataset_version: String,
    pub dataset_description: String,
    pub benchmark_iterations: usize,
    pub total_cases: usize,
    pub passed_cases: usize,
    pub failed_cases: usize,
    pub pass_rate: f64,
    pub fail_under: f64,
    pub passed_threshold: bool,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub throughput_fits_per_sec: f64,
    pub case_reports: Vec<EvalCaseReport>,
}

pub fn load_eval_dataset(path: &str) -> Result<EvalDataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read eval dataset at '{}'", path))?;
    let dataset = serde_json::from_str::<EvalDataset>(&content)
        .with_context(|| format!("invalid eval dataset json at '{}'", path))?;
    if dataset.cases.is_empty() {
        return Err(anyhow::anyhow!(
            "eval dataset '{}' has no cases; add at least one case",
            path
        ));
    }
    Ok(dataset)
}

/// Mean absolute percentage error over the holdout, skipping zero actuals.
pub fn mean_absolute_percentage_error(actual: &[f64], forecast: &[f64]) -> Option<f64> {
    let mut total = 0.0f64;
    let mut scored = 0usize;
    for (a, f) in actual.iter().zip(forecast.iter()) {
        if *a == 0.0 {
            continue;
        }
        total += ((a - f) / a).abs();
        scored += 1;
    }
    if scored == 0 {
        return None;
    }
    Some(total / scored as f64 * 100.0)
}

pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let pct = pct.clamp(0.0, 100.0);
    let rank = ((pct / 100.0) * ((values.len() - 1) as f64)).round() as usize;
    values[rank.min(values.len() - 1)]
}

pub fn round_metric(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn run_eval_harness(
    dataset: &EvalDataset,
    benchmark_iterations: usize,
    fail_under: f64,
) -> Result<EvalRunReport> {
    let iterations = benchmark_iterations.max(1);
    let suite_start = Instant::now();
    let mut passed_cases = 0usize;
    let mut latency_ms = Vec::<f64>::new();
    let mut case_reports = Vec::<EvalCaseReport>::new();

    for case in &dataset.cases {
        if case.id.trim().is_empty() {
            return Err(anyhow::anyhow!("eval dataset contains case with empty id"));
        }
        if case.holdout_days == 0 {
            return Err(anyhow::anyhow!(
                "eval case '{}' has holdout_days=0; at least one day must be held out",
                case.id
            ));
        }
        if case.max_mape <= 0.0 {
            return Err(anyhow::anyhow!(
                "eval case '{}' has a non-positive max_mape threshold",
                case.id
            ));
        }
        let total_points = case.series.len();
        let train_points = total_points.saturating_sub(case.holdout_days);
        if train_points < MIN_HISTORY_POINTS {
            return Err(anyhow::anyhow!(
                "eval case '{}' leaves {} training points after the holdout; at least {} are required",
                case.id,
                train_points,
                MIN_HISTORY_POINTS
            ));
        }

        let train = &case.series[..train_points];
        let holdout = &case.series[train_points..];

        let case_start = Instant::now();
        let mut forecast = Vec::<f64>::new();
        for _ in 0..iterations {
            let model = fit_best_holt_winters(train).with_context(|| {
                format!("eval case '{}': model fitting failed on training series", case.id)
            })?;
            forecast = model.forecast(case.holdout_days);
        }
        let case_elapsed = case_start.elapsed();
        let case_avg_latency_ms = (case_elapsed.as_secs_f64() * 1000.0) / (iterations as f64);
        latency_ms.push(case_avg_latency_ms);

        let mape = mean_absolute_percentage_error(holdout, &forecast).with_context(|| {
            format!(
                "eval case '{}': holdout is all zeros, cannot score MAPE",
                case.id
            )
        })?;

        let passed = mape <= case.max_mape;
        if passed {
            passed_cases += 1;
        }

        case_reports.push(EvalCaseReport {
            id: case.id.clone(),
            passed,
            mape: round_metric(mape),
            max_mape: case.max_mape,
            train_points,
            holdout_points: holdout.len(),
            avg_latency_ms: round_metric(case_avg_latency_ms),
        });
    }

    let total_cases = dataset.cases.len();
    let failed_cases = total_cases.saturating_sub(passed_cases);
    let pass_rate = if total_cases == 0 {
        0.0
    } else {
        passed_cases as f64 / total_cases as f64
    };

    let mut sorted_latencies = latency_ms.clone();
    sorted_latencies.sort_by(|a, b| a.total_cmp(b));
    let avg_latency_ms = if latency_ms.is_empty() {
        0.0
    } else {
        latency_ms.iter().sum::<f64>() / latency_ms.len() as f64
    };
    let p95_latency_ms = percentile(&sorted_latencies, 95.0);

    let suite_elapsed_secs = suite_start.elapsed().as_secs_f64();
    let throughput_fits_per_sec = if suite_elapsed_secs <= 0.0 {
        0.0
    } else {
        (total_cases as f64 * iterations as f64) / suite_elapsed_secs
    };

    let passed_threshold = pass_rate >= fail_under.clamp(0.0, 1.0);
    Ok(EvalRunReport {
        generated_at_unix_ms: unix_ms_now(),
        dataset_name: dataset.name.clone(),
        dataset_version: dataset.version.clone(),
        dataset_description: dataset.description.clone(),
        benchmark_iterations: iterations,
        total_cases,
        passed_cases,
        failed_cases,
        pass_rate: round_metric(pass_rate),
        fail_under: round_metric(fail_under.clamp(0.0, 1.0)),
        passed_threshold,
        avg_latency_ms: round_metric(avg_latency_ms),
        p95_latency_ms: round_metric(p95_latency_ms),
        throughput_fits_per_sec: round_metric(throughput_fits_per_sec),
        case_reports,
    })
}

pub fn write_eval_report(path: &str, report: &EvalRunReport) -> Result<()> {
    let path_buf = PathBuf::from(path);
    if let Some(parent) = path_buf.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create eval report directory '{}'",
                parent.display()
            )
        })?;
    }

    let payload =
        serde_json::to_string_pretty(report).context("failed to serialize eval report to json")?;
    std::fs::write(&path_buf, payload)
        .with_context(|| format!("failed to write eval report to '{}'", path_buf.display()))
}

pub fn run_eval(
    dataset_path: Option<String>,
    output_path: Option<String>,
    benchmark_iterations: usize,
    fail_under: f64,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let dataset_path = dataset_path.unwrap_or_else(|| DEFAULT_EVAL_DATASET_PATH.to_string());
    let output_path = output_path.unwrap_or_else(|| DEFAULT_EVAL_OUTPUT_PATH.to_string());
    let dataset = load_eval_dataset(&dataset_path)?;
    let report = run_eval_harness(&dataset, benchmark_iterations, fail_under)?;

    write_eval_report(&output_path, &report)?;
    telemetry.emit(
        "eval.completed",
        json!({
            "dataset": report.dataset_name,
            "dataset_version": report.dataset_version,
            "total_cases": report.total_cases,
            "pass_rate": report.pass_rate,
            "passed_threshold": report.passed_threshold,
            "output_path": output_path
        }),
    );

    println!(
        "Eval completed: dataset={} version={} cases={} pass_rate={:.3} threshold={:.3}",
        report.dataset_name,
        report.dataset_version,
        report.total_cases,
        report.pass_rate,
        report.fail_under
    );
    for case in &report.case_reports {
        let verdict = if case.passed { "pass" } else { "FAIL" };
        println!(
            "- {}: {} (mape={:.3}%, max={:.3}%, train={}, holdout={})",
            case.id, verdict, case.mape, case.max_mape, case.train_points, case.holdout_points
        );
    }
    println!(
        "Benchmark: avg_latency_ms={:.3} p95_latency_ms={:.3} fits_per_sec={:.3}",
        report.avg_latency_ms, report.p95_latency_ms, report.throughput_fits_per_sec
    );
    println!("Report written to {}", output_path);

    if !report.passed_threshold {
        return Err(anyhow::anyhow!(
            "eval pass rate {:.3} is below threshold {:.3}",
            report.pass_rate,
            report.fail_under
        ));
    }

    Ok(())
}
