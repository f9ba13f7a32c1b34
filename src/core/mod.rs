mod engine;
mod error;
mod random;
mod types;

pub use engine::{
    generate_paths, sample_snapshots, sample_steps, simulate, summarize, terminal_risk,
    validate_config,
};
pub use error::{ProjectionError, Result};
pub use types::{
    ShockGenerator, SimulationConfig, SimulationPath, SimulationResult, SimulationSnapshot,
    SimulationSummary, TRADING_DAYS_PER_YEAR, TerminalRisk, TimeStep,
};
