use serde::Serialize;

/// Trading days per year assumed when converting annual rates to per-step rates.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShockGenerator {
    /// Sine-hash uniforms widened to [-1.5, 1.5). Matches the dashboard output bit for bit.
    #[default]
    Reference,
    /// Splitmix64 counter uniforms through Box-Muller.
    CounterGaussian,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeStep {
    /// `dt = 1/252` regardless of the horizon length.
    #[default]
    TradingDay,
    /// `dt = 1/step_count`, so the full horizon spans one year.
    SpreadOverHorizon,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub initial_value: f64,
    pub path_count: u32,
    pub step_count: u32,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub seed: u64,
    pub sample_stride: u32,
    pub generator: ShockGenerator,
    pub time_step: TimeStep,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_value: 39_551.76,
            path_count: 500,
            step_count: 252,
            annual_return: 0.08,
            annual_volatility: 0.20,
            seed: 42,
            sample_stride: 5,
            generator: ShockGenerator::Reference,
            time_step: TimeStep::TradingDay,
        }
    }
}

impl SimulationConfig {
    /// Length of one step in years.
    pub fn dt(&self) -> f64 {
        match self.time_step {
            TimeStep::TradingDay => 1.0 / TRADING_DAYS_PER_YEAR,
            TimeStep::SpreadOverHorizon if self.step_count == 0 => 0.0,
            TimeStep::SpreadOverHorizon => 1.0 / self.step_count as f64,
        }
    }
}

/// One simulated trajectory: `step_count + 1` values starting at the initial value.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPath {
    pub values: Vec<f64>,
}

impl SimulationPath {
    pub fn terminal(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSnapshot {
    pub step: u32,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub expected: f64,
    pub median: f64,
    pub worst_case: f64,
    pub best_case: f64,
}

/// Loss figures over the terminal cross-section, as fractions of the initial value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRisk {
    pub expected_return: f64,
    pub probability_of_loss: f64,
    pub value_at_risk_95: f64,
    pub conditional_value_at_risk_95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub summary: SimulationSummary,
    pub snapshots: Vec<SimulationSnapshot>,
    pub risk: TerminalRisk,
}
