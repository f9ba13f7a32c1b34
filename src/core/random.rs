//! Stateless random draws. Every function here is a pure function of its
//! arguments, so draws can be evaluated in any order or from any thread.

use std::f64::consts::PI;

use super::types::ShockGenerator;

/// Half-width of the widened-uniform shock.
const REFERENCE_SHOCK_SCALE: f64 = 1.5;

/// Largest integer below which every `u64` converts to `f64` exactly.
pub const EXACT_INDEX_LIMIT: u64 = 1 << 53;

/// `frac(sin(index) * 10000)`.
pub fn sine_hash(index: u64) -> f64 {
    let x = (index as f64).sin() * 10_000.0;
    x - x.floor()
}

pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Uniform in (0, 1) keyed by `(seed, index)`.
pub fn counter_uniform(seed: u64, index: u64) -> f64 {
    const DENOM: f64 = (1_u64 << 53) as f64;
    let v = splitmix64(seed ^ splitmix64(index)) >> 11;
    ((v as f64) + 0.5) / DENOM
}

/// Standard normal from two counter draws at `2 * index` and `2 * index + 1`.
pub fn counter_normal(seed: u64, index: u64) -> f64 {
    let base = index.wrapping_mul(2);
    let u1 = counter_uniform(seed, base).max(1e-12);
    let u2 = counter_uniform(seed, base.wrapping_add(1));
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Offset added to draw indices by the sine-hash source. Seeds that keep
/// `offset + max_index` below 2^53 are used as-is; larger seeds are mixed
/// down into the exact range so distinct indices stay distinct as `f64`.
pub fn reference_offset(seed: u64, max_index: u64) -> u64 {
    let room = EXACT_INDEX_LIMIT.saturating_sub(max_index);
    if seed <= room {
        seed
    } else {
        splitmix64(seed) % (room + 1)
    }
}

/// Maps a draw index to a per-step shock for one simulation.
#[derive(Debug, Clone, Copy)]
pub struct ShockSource {
    generator: ShockGenerator,
    seed: u64,
}

impl ShockSource {
    /// `max_index` is the largest index `shock` will be called with.
    pub fn new(generator: ShockGenerator, seed: u64, max_index: u64) -> Self {
        let seed = match generator {
            ShockGenerator::Reference => reference_offset(seed, max_index),
            ShockGenerator::CounterGaussian => seed,
        };
        Self { generator, seed }
    }

    pub fn shock(&self, index: u64) -> f64 {
        match self.generator {
            ShockGenerator::Reference => {
                let u = sine_hash(self.seed + index);
                (u - 0.5) * 2.0 * REFERENCE_SHOCK_SCALE
            }
            ShockGenerator::CounterGaussian => counter_normal(self.seed, index),
        }
    }
}
