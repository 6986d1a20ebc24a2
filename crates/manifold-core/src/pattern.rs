use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::vector;

/// Identifier assigned by the vector store on insert.
pub type PatternId = i64;

/// Informational tag on a pattern. Selects the emphasis band during generation
/// and nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    #[default]
    Quantum,
    Dream,
    Consciousness,
}

impl PatternType {
    pub const ALL: [PatternType; 3] = [Self::Quantum, Self::Dream, Self::Consciousness];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quantum => "quantum",
            Self::Dream => "dream",
            Self::Consciousness => "consciousness",
        }
    }

    /// Half-open index range whose magnitude is doubled during generation.
    /// The three bands partition `0..DIMENSION`.
    pub fn emphasis_band(&self) -> std::ops::Range<usize> {
        match self {
            Self::Quantum => 0..171,
            Self::Dream => 171..341,
            Self::Consciousness => 341..crate::constants::DIMENSION,
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quantum" => Ok(Self::Quantum),
            "dream" => Ok(Self::Dream),
            "consciousness" => Ok(Self::Consciousness),
            other => Err(format!(
                "unknown pattern type '{other}' (expected quantum, dream or consciousness)"
            )),
        }
    }
}

/// A typed, symbol-tagged vector. `id` and `timestamp` stay empty until the
/// gateway persists it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PatternId>,
    pub vector: Vec<f64>,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub symbol: String,
    /// Sum of squares captured when the vector was built. Not refreshed if
    /// `vector` is mutated afterwards.
    pub coherence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Pattern {
    pub fn new(vector: Vec<f64>, pattern_type: PatternType, symbol: impl Into<String>) -> Self {
        let coherence = vector::coherence(&vector);
        Self {
            id: None,
            vector,
            pattern_type,
            symbol: symbol.into(),
            coherence,
            timestamp: None,
        }
    }

    pub fn norm(&self) -> f64 {
        vector::l2_norm(&self.vector)
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DIMENSION;

    #[test]
    fn test_bands_partition_dimension() {
        let mut covered = vec![0u8; DIMENSION];
        for t in PatternType::ALL {
            for i in t.emphasis_band() {
                covered[i] += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1), "bands must cover each index once");
    }

    #[test]
    fn test_type_roundtrip_str() {
        for t in PatternType::ALL {
            assert_eq!(t.as_str().parse::<PatternType>().unwrap(), t);
        }
        assert!("photon".parse::<PatternType>().is_err());
    }

    #[test]
    fn test_new_records_coherence() {
        let p = Pattern::new(vec![0.6, 0.8], PatternType::Dream, "◬");
        assert!((p.coherence - 1.0).abs() < 1e-12);
        assert!(!p.is_persisted());
    }

    #[test]
    fn test_json_shape_uses_type_key() {
        let p = Pattern::new(vec![1.0], PatternType::Consciousness, "⬡");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "consciousness");
        assert_eq!(json["symbol"], "⬡");
        assert!(json.get("id").is_none());
    }
}
