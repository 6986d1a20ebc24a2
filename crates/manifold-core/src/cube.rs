//! 8×8×8 projection of a pattern vector for visualization consumers.

use serde::{Deserialize, Serialize};

use crate::constants::{CUBE_EDGE, DIMENSION};
use crate::error::Result;
use crate::vector::check_dimension;

/// Cubic view of a 512-vector, indexed `[x][y][z]` with
/// `flat index = x·64 + y·8 + z`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cube(pub [[[f64; CUBE_EDGE]; CUBE_EDGE]; CUBE_EDGE]);

impl Cube {
    /// `None` when any coordinate is outside `0..CUBE_EDGE`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        self.0.get(x)?.get(y)?.get(z).copied()
    }

    /// Inverse of [`to_cube`].
    pub fn flatten(&self) -> Vec<f64> {
        self.0
            .iter()
            .flat_map(|plane| plane.iter().flat_map(|row| row.iter().copied()))
            .collect()
    }
}

pub fn cube_index(x: usize, y: usize, z: usize) -> usize {
    x * CUBE_EDGE * CUBE_EDGE + y * CUBE_EDGE + z
}

pub fn to_cube(vector: &[f64]) -> Result<Cube> {
    check_dimension(vector, DIMENSION)?;
    let mut cube = [[[0.0; CUBE_EDGE]; CUBE_EDGE]; CUBE_EDGE];
    for (x, plane) in cube.iter_mut().enumerate() {
        for (y, row) in plane.iter_mut().enumerate() {
            for (z, cell) in row.iter_mut().enumerate() {
                *cell = vector[cube_index(x, y, z)];
            }
        }
    }
    Ok(Cube(cube))
}
