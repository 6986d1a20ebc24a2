//! Pattern Math Service: generation, merging, evolution and interference of
//! fixed-dimension pattern vectors.
//!
//! Everything except [`generate`] is a pure function of its arguments. Every
//! function that produces a vector returns it L2-normalized, and a zero-norm
//! intermediate surfaces as [`MathError::ZeroNorm`].

use std::f64::consts::PI;

use rand::Rng;

use crate::constants::DIMENSION;
use crate::error::{MathError, Result};
use crate::pattern::{Pattern, PatternType};
use crate::phase::Phase;
use crate::vector::{check_same_len, normalize};

/// Amplitude of the sinusoidal perturbation applied to quantum patterns.
const QUANTUM_RIPPLE: f64 = 0.5;
/// Period divisor of the quantum ripple (512 / 10).
const QUANTUM_RIPPLE_PERIOD: f64 = 51.2;
/// Half-width of the uniform noise applied to dream patterns.
const DREAM_NOISE: f64 = 0.3;

/// Draw a fresh pattern of the given type.
///
/// Components start uniform in [-1, 1]; the type's emphasis band is doubled,
/// then a type-specific perturbation is added (sinusoidal ripple offset by
/// `phase` for quantum, uniform noise for dream, none for consciousness).
pub fn generate(
    pattern_type: PatternType,
    symbol: &str,
    phase: f64,
    rng: &mut impl Rng,
) -> Result<Pattern> {
    let mut base: Vec<f64> = (0..DIMENSION)
        .map(|_| rng.random_range(-1.0..=1.0))
        .collect();

    for i in pattern_type.emphasis_band() {
        base[i] *= 2.0;
    }

    match pattern_type {
        PatternType::Quantum => {
            for (i, v) in base.iter_mut().enumerate() {
                *v += QUANTUM_RIPPLE * (i as f64 / QUANTUM_RIPPLE_PERIOD + phase).sin();
            }
        }
        PatternType::Dream => {
            for v in base.iter_mut() {
                *v += rng.random_range(-DREAM_NOISE..=DREAM_NOISE);
            }
        }
        PatternType::Consciousness => {}
    }

    let vector = normalize(&base)?;
    Ok(Pattern::new(vector, pattern_type, symbol))
}

/// Rotation-weighted combination of two sources:
/// `out[i] = a[i]·cos ψᵢ + b[i]·sin(ψᵢ + phase)`, ψᵢ the golden offset.
///
/// Flipping `phase` by π flips the sign of `b`'s contribution, so identical
/// sources still merge differently at 0 and π.
pub fn merge(a: &[f64], b: &[f64], phase: f64) -> Result<Vec<f64>> {
    check_same_len(a, b)?;
    let merged: Vec<f64> = a
        .iter()
        .zip(b)
        .enumerate()
        .map(|(i, (x, y))| {
            let psi = Phase::golden_offset(i).radians();
            x * psi.cos() + y * (psi + phase).sin()
        })
        .collect();
    normalize(&merged)
}

/// Left-to-right pairwise fold of [`merge`]. A single source is only
/// normalized.
pub fn merge_all(vectors: &[Vec<f64>], phase: f64) -> Result<Vec<f64>> {
    let (first, rest) = vectors.split_first().ok_or(MathError::Empty)?;
    let mut acc = normalize(first)?;
    for next in rest {
        acc = merge(&acc, next, phase)?;
    }
    Ok(acc)
}

/// Phase-rotated evolution. For each index the rotation factor is
/// `cos((i·π·φ mod 2π) + phase) · time_scale`; the output mixes the component
/// with its circular neighbour through the cosine and sine of that factor.
pub fn evolve(vector: &[f64], time_scale: f64, phase: f64) -> Result<Vec<f64>> {
    let n = vector.len();
    if n == 0 {
        return Err(MathError::Empty);
    }
    let evolved: Vec<f64> = (0..n)
        .map(|i| {
            let psi = Phase::golden_offset(i).radians();
            let factor = (psi + phase).cos() * time_scale;
            vector[i] * factor.cos() + vector[(i + 1) % n] * factor.sin()
        })
        .collect();
    normalize(&evolved)
}

/// Multi-source interference: `out[i] = Σᵥ vectors[v][i]·cos(ψᵢ + phase·v)`.
/// `phase = 0` adds all sources in step; `phase = π` alternates their sign.
pub fn interfere(vectors: &[Vec<f64>], phase: f64) -> Result<Vec<f64>> {
    let first = vectors.first().ok_or(MathError::Empty)?;
    let dim = first.len();
    for v in vectors {
        check_same_len(first, v)?;
    }

    let mut result = vec![0.0; dim];
    for (i, slot) in result.iter_mut().enumerate() {
        let psi = Phase::golden_offset(i).radians();
        for (v, source) in vectors.iter().enumerate() {
            *slot += source[i] * (psi + phase * v as f64).cos();
        }
    }
    normalize(&result)
}

/// Equal-amplitude superposition: Σ states · 1/√n, renormalized.
pub fn superpose(states: &[Vec<f64>]) -> Result<Vec<f64>> {
    let first = states.first().ok_or(MathError::Empty)?;
    let coefficient = 1.0 / (states.len() as f64).sqrt();
    let mut result = vec![0.0; first.len()];
    for state in states {
        check_same_len(first, state)?;
        for (slot, v) in result.iter_mut().zip(state) {
            *slot += v * coefficient;
        }
    }
    normalize(&result)
}

/// Linear interpolation `source + (target − source)·t`. Not normalized.
pub fn interpolate(source: &[f64], target: &[f64], t: f64) -> Result<Vec<f64>> {
    check_same_len(source, target)?;
    Ok(source
        .iter()
        .zip(target)
        .map(|(s, e)| s + (e - s) * t)
        .collect())
}

/// Phase angle used by the constructive/destructive interference modes.
pub fn interference_phase(destructive: bool) -> f64 {
    if destructive { PI } else { 0.0 }
}
