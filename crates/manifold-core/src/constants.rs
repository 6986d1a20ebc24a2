use std::f64::consts::PI;

/// Golden ratio: (1 + √5) / 2
pub const PHI: f64 = 1.618_033_988_749_895;

/// Number of components in every persisted pattern vector.
pub const DIMENSION: usize = 512;

/// Edge length of the cubic projection (8³ = 512).
pub const CUBE_EDGE: usize = 8;

/// Tolerance used when checking unit norm.
pub const NORM_TOLERANCE: f64 = 1e-6;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-12;

/// Short Fibonacci prefix driving the resonance-field phase table.
pub const FIBONACCI_PREFIX: [u32; 9] = [0, 1, 1, 2, 3, 5, 8, 13, 21];

/// Resonance-field phases: Fibonacci(n) · π / φ.
pub const FIBONACCI_PHASES: [f64; 9] = fibonacci_phases();

const fn fibonacci_phases() -> [f64; 9] {
    let mut out = [0.0; 9];
    let mut i = 0;
    while i < FIBONACCI_PREFIX.len() {
        out[i] = FIBONACCI_PREFIX[i] as f64 * PI / PHI;
        i += 1;
    }
    out
}

/// Symbol stored on the superposition half of a collapse.
pub const SUPERPOSITION_SYMBOL: &str = "⧈";

/// Default symbol of a collapsed pattern and of merge intermediates.
pub const COLLAPSED_SYMBOL: &str = "⦿";

/// Symbol stored on every resonance result.
pub const RESONANCE_SYMBOL: &str = "⫰";

/// Store schema limits.
pub const MAX_TYPE_LEN: usize = 32;
pub const MAX_SYMBOL_LEN: usize = 8;
