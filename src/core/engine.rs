use rayon::prelude::*;
use tracing::debug;

use super::error::{ProjectionError, Result};
use super::random::{EXACT_INDEX_LIMIT, ShockSource};
use super::types::{
    SimulationConfig, SimulationPath, SimulationResult, SimulationSnapshot, SimulationSummary,
    TerminalRisk,
};

const SNAPSHOT_PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];
const TAIL_PERCENTILE: f64 = 5.0;

/// Runs the full projection: validate, generate every path, sample snapshots,
/// then derive the summary and terminal risk. Nothing is computed if validation fails.
pub fn simulate(config: &SimulationConfig) -> Result<SimulationResult> {
    validate_config(config)?;
    debug!(
        paths = config.path_count,
        steps = config.step_count,
        stride = config.sample_stride,
        seed = config.seed,
        generator = ?config.generator,
        time_step = ?config.time_step,
        "running projection"
    );

    let paths = build_paths(config)?;
    let snapshots = sample_snapshots(&paths, config.sample_stride);
    let summary = summarize(&snapshots)?;
    let risk = terminal_risk(&paths, config.initial_value)?;

    Ok(SimulationResult {
        summary,
        snapshots,
        risk,
    })
}

pub fn validate_config(config: &SimulationConfig) -> Result<()> {
    if !config.initial_value.is_finite() || config.initial_value <= 0.0 {
        return Err(ProjectionError::invalid(
            "initialValue",
            format!("must be a finite value > 0, got {}", config.initial_value),
        ));
    }

    if config.path_count == 0 {
        return Err(ProjectionError::invalid("pathCount", "must be >= 1"));
    }

    if !config.annual_return.is_finite() {
        return Err(ProjectionError::invalid("annualReturn", "must be finite"));
    }

    if !config.annual_volatility.is_finite() || config.annual_volatility < 0.0 {
        return Err(ProjectionError::invalid(
            "annualVolatility",
            format!("must be a finite value >= 0, got {}", config.annual_volatility),
        ));
    }

    if config.sample_stride == 0 {
        return Err(ProjectionError::invalid("sampleStride", "must be >= 1"));
    }

    let max_index = max_draw_index(config);
    if max_index > EXACT_INDEX_LIMIT {
        return Err(ProjectionError::invalid(
            "stepCount",
            format!("pathCount * stepCount must be <= {EXACT_INDEX_LIMIT}, got {max_index}"),
        ));
    }

    Ok(())
}

/// Generates `path_count` GBM trajectories of `step_count + 1` values each.
pub fn generate_paths(config: &SimulationConfig) -> Result<Vec<SimulationPath>> {
    validate_config(config)?;
    build_paths(config)
}

fn build_paths(config: &SimulationConfig) -> Result<Vec<SimulationPath>> {
    let dt = config.dt();
    let sigma = config.annual_volatility;
    let drift = (config.annual_return - 0.5 * sigma * sigma) * dt;
    let diffusion = sigma * dt.sqrt();
    let source = ShockSource::new(config.generator, config.seed, max_draw_index(config));

    let generated: Vec<Result<SimulationPath>> = (0..config.path_count)
        .into_par_iter()
        .map(|path| generate_path(config, &source, drift, diffusion, path))
        .collect();

    // Sequential collect so the reported failure is the lowest failing path.
    generated.into_iter().collect()
}

fn generate_path(
    config: &SimulationConfig,
    source: &ShockSource,
    drift: f64,
    diffusion: f64,
    path: u32,
) -> Result<SimulationPath> {
    let steps = config.step_count;
    let mut values = Vec::with_capacity(steps as usize + 1);
    let mut value = config.initial_value;
    values.push(value);

    for step in 1..=steps {
        let index = draw_index(path, step, steps);
        let shock = source.shock(index);
        value *= (drift + diffusion * shock).exp();
        if !value.is_finite() || value <= 0.0 {
            return Err(ProjectionError::NumericOverflow { path, step });
        }
        values.push(value);
    }

    Ok(SimulationPath { values })
}

fn max_draw_index(config: &SimulationConfig) -> u64 {
    config.path_count as u64 * config.step_count as u64
}

/// Distinct for every `(path, step)` pair with `1 <= step <= step_count`.
fn draw_index(path: u32, step: u32, step_count: u32) -> u64 {
    path as u64 * step_count as u64 + step as u64
}

/// Step indices to snapshot: every `stride`-th step, with the last one clamped to the horizon.
pub fn sample_steps(step_count: u32, stride: u32) -> Vec<u32> {
    let stride = stride.max(1);
    let mut count = step_count / stride + 1;
    if step_count > 0 {
        count = count.max(2);
    }

    (0..count)
        .map(|i| {
            if i + 1 == count {
                step_count
            } else {
                i * stride
            }
        })
        .collect()
}

/// Aggregates the cross-section of all paths at each sampled step.
pub fn sample_snapshots(paths: &[SimulationPath], stride: u32) -> Vec<SimulationSnapshot> {
    let Some(step_count) = paths.iter().map(|p| p.values.len()).min() else {
        return Vec::new();
    };
    if step_count == 0 {
        return Vec::new();
    }
    let step_count = (step_count - 1) as u32;

    sample_steps(step_count, stride)
        .into_par_iter()
        .map(|step| {
            let mut cross_section: Vec<f64> =
                paths.iter().map(|p| p.values[step as usize]).collect();
            snapshot_from_cross_section(step, &mut cross_section)
        })
        .collect()
}

fn snapshot_from_cross_section(step: u32, values: &mut [f64]) -> SimulationSnapshot {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.sort_by(|a, b| a.total_cmp(b));

    let [p5, p25, p50, p75, p95] = SNAPSHOT_PERCENTILES.map(|p| nearest_rank(values, p));
    SimulationSnapshot {
        step,
        p5,
        p25,
        p50,
        p75,
        p95,
        mean,
    }
}

/// Nearest-rank percentile on ascending `sorted`: `sorted[floor(p / 100 * n)]`.
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let index = ((p / 100.0) * n as f64).floor() as usize;
    sorted[index.min(n - 1)]
}

pub fn summarize(snapshots: &[SimulationSnapshot]) -> Result<SimulationSummary> {
    let last = snapshots.last().ok_or_else(|| {
        ProjectionError::invalid("snapshots", "sampler produced no snapshots to summarize")
    })?;

    Ok(SimulationSummary {
        expected: last.mean,
        median: last.p50,
        worst_case: last.p5,
        best_case: last.p95,
    })
}

pub fn terminal_risk(paths: &[SimulationPath], initial_value: f64) -> Result<TerminalRisk> {
    if paths.is_empty() {
        return Err(ProjectionError::invalid(
            "pathCount",
            "no paths to derive terminal risk from",
        ));
    }

    let mut terminal = paths
        .iter()
        .map(|p| {
            p.terminal()
                .ok_or_else(|| ProjectionError::invalid("stepCount", "path has no values"))
        })
        .collect::<Result<Vec<f64>>>()?;
    let n = terminal.len();
    let mean = terminal.iter().sum::<f64>() / n as f64;
    terminal.sort_by(|a, b| a.total_cmp(b));

    let losses = terminal.iter().filter(|&&v| v < initial_value).count();
    let tail_index = (((TAIL_PERCENTILE / 100.0) * n as f64).floor() as usize).min(n - 1);
    let var_level = terminal[tail_index];
    let tail = &terminal[..=tail_index];
    let tail_mean = tail.iter().sum::<f64>() / tail.len() as f64;

    Ok(TerminalRisk {
        expected_return: mean / initial_value - 1.0,
        probability_of_loss: losses as f64 / n as f64,
        value_at_risk_95: ((initial_value - var_level) / initial_value).max(0.0),
        conditional_value_at_risk_95: ((initial_value - tail_mean) / initial_value).max(0.0),
    })
}
