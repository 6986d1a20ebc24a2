//! Pattern algebra for the manifold command engine.
//!
//! Patterns are fixed-dimension (512) unit vectors tagged with a type and a
//! symbol. This crate generates, merges, evolves, interferes and reshapes
//! them. The "quantum" vocabulary is naming only; the operations are plain
//! vector arithmetic.
//!
//! Zero I/O: no opinions about storage or scheduling.

pub mod algebra;
pub mod constants;
pub mod cube;
pub mod error;
pub mod pattern;
pub mod phase;
pub mod quality;
pub mod time;
pub mod vector;

pub use algebra::{
    evolve, generate, interfere, interference_phase, interpolate, merge, merge_all, superpose,
};
pub use constants::{
    COLLAPSED_SYMBOL, CUBE_EDGE, DIMENSION, FIBONACCI_PHASES, NORM_TOLERANCE, PHI, RESONANCE_SYMBOL,
    SUPERPOSITION_SYMBOL,
};
pub use cube::{Cube, to_cube};
pub use error::MathError;
pub use pattern::{Pattern, PatternId, PatternType};
pub use phase::Phase;
pub use quality::{QualityGrade, QualityReport, assess};
pub use time::{now_unix_millis, unix_millis_to_iso8601};
pub use vector::{coherence, cosine_similarity, l2_norm, normalize};
