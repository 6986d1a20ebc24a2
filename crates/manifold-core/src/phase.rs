use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::constants::PHI;

/// Phase angle on the unit circle, normalized to [0, 2π).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phase(f64);

impl Phase {
    pub const CONSTRUCTIVE: Phase = Phase(0.0);
    pub const DESTRUCTIVE: Phase = Phase(PI);

    pub fn new(theta: f64) -> Self {
        Self(theta.rem_euclid(TAU))
    }

    /// Per-index pseudo-harmonic offset: (i · π · φ) mod 2π.
    /// φ is irrational, so successive offsets never settle into a short cycle.
    pub fn golden_offset(index: usize) -> Self {
        Self::new(index as f64 * PI * PHI)
    }

    pub fn radians(self) -> f64 {
        self.0
    }
}

impl From<f64> for Phase {
    fn from(theta: f64) -> Self {
        Self::new(theta)
    }
}
