//! Command descriptors: the `{ type, params }` wire shape callers use to ask
//! for a command.
//!
//! Every params field is optional at the serde level so that a missing field
//! is reported by the factory as a validation error naming it, rather than
//! as a generic deserialization failure.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::CommandKind;
use crate::error::{EngineError, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateParams {
    pub pattern_type: Option<String>,
    pub symbol: Option<String>,
    pub phase: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MergeParams {
    pub source_states: Option<Vec<Vec<f64>>>,
    pub merge_strategy: Option<String>,
    pub symbol: Option<String>,
    pub phase: Option<f64>,
    /// Symbols for the intermediate source patterns, by index.
    pub resonance_symbols: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvolveParams {
    pub evolution_rate: Option<f64>,
    pub target_states: Option<Vec<Vec<f64>>>,
    pub symbol: Option<String>,
    pub source_pattern_id: Option<i64>,
    pub time_scale: Option<f64>,
    pub phase: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResonateParams {
    pub resonance_frequency: Option<f64>,
    pub symbol: Option<String>,
    pub resonance_symbols: Option<Vec<String>>,
    pub phase: Option<f64>,
    pub amplitude: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollapseParams {
    pub collapse_threshold: Option<f64>,
    pub target_state: Option<Vec<f64>>,
    pub symbol: Option<String>,
    pub target_states: Option<Vec<Vec<f64>>>,
    pub probability: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum CommandDescriptor {
    Create(CreateParams),
    Merge(MergeParams),
    Evolve(EvolveParams),
    Resonate(ResonateParams),
    Collapse(CollapseParams),
}

impl CommandDescriptor {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Create(_) => CommandKind::Create,
            Self::Merge(_) => CommandKind::Merge,
            Self::Evolve(_) => CommandKind::Evolve,
            Self::Resonate(_) => CommandKind::Resonate,
            Self::Collapse(_) => CommandKind::Collapse,
        }
    }

    /// Parse a descriptor from loosely shaped JSON. An unknown `type` is
    /// [`EngineError::UnknownCommand`]; absent `params` count as `{}`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::missing("type"))?;
        let params = match value.get("params") {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(params) => params.clone(),
        };
        match kind {
            "create" => Ok(Self::Create(parse_params(params)?)),
            "merge" => Ok(Self::Merge(parse_params(params)?)),
            "evolve" => Ok(Self::Evolve(parse_params(params)?)),
            "resonate" => Ok(Self::Resonate(parse_params(params)?)),
            "collapse" => Ok(Self::Collapse(parse_params(params)?)),
            other => Err(EngineError::UnknownCommand(other.to_string())),
        }
    }

    /// A JSON array of descriptors, as stored in a sequence file.
    pub fn sequence_from_json(value: &Value) -> Result<Vec<Self>> {
        let steps = value
            .as_array()
            .ok_or_else(|| EngineError::invalid("sequence", "expected a JSON array"))?;
        steps.iter().map(Self::from_json).collect()
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| EngineError::invalid("params", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_camel_case_params() {
        let d = CommandDescriptor::from_json(&json!({
            "type": "collapse",
            "params": { "collapseThreshold": 0.5, "targetState": [1.0, 0.0], "symbol": "⦿" }
        }))
        .unwrap();
        let CommandDescriptor::Collapse(p) = d else {
            panic!("expected collapse");
        };
        assert_eq!(p.collapse_threshold, Some(0.5));
        assert_eq!(p.target_state, Some(vec![1.0, 0.0]));
        assert_eq!(p.symbol.as_deref(), Some("⦿"));
        assert!(p.probability.is_none());
    }

    #[test]
    fn test_missing_params_is_empty() {
        let d = CommandDescriptor::from_json(&json!({ "type": "merge" })).unwrap();
        assert_eq!(d, CommandDescriptor::Merge(MergeParams::default()));
        assert_eq!(d.kind(), CommandKind::Merge);
    }

    #[test]
    fn test_unknown_type() {
        let err = CommandDescriptor::from_json(&json!({ "type": "teleport", "params": {} }))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCommand(ref k) if k == "teleport"));

        let err = CommandDescriptor::from_json(&json!({ "params": {} })).unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "type"));
    }

    #[test]
    fn test_wrong_param_type_is_validation_error() {
        let err = CommandDescriptor::from_json(&json!({
            "type": "create",
            "params": { "phase": "quarter" }
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn test_serde_wire_shape() {
        let d = CommandDescriptor::Create(CreateParams {
            pattern_type: Some("quantum".to_string()),
            symbol: Some("⦿".to_string()),
            phase: None,
        });
        let value = serde_json::to_value(&d).unwrap();
        assert_eq!(value["type"], "create");
        assert_eq!(value["params"]["patternType"], "quantum");
        let back: CommandDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_sequence_from_json() {
        let steps = CommandDescriptor::sequence_from_json(&json!([
            { "type": "create", "params": { "patternType": "dream", "symbol": "◬" } },
            { "type": "resonate", "params": { "resonanceFrequency": 2.0, "symbol": "⫰" } }
        ]))
        .unwrap();
        let kinds: Vec<_> = steps.iter().map(CommandDescriptor::kind).collect();
        assert_eq!(kinds, vec![CommandKind::Create, CommandKind::Resonate]);
        assert!(CommandDescriptor::sequence_from_json(&json!({})).is_err());
    }
}
