//! Validates descriptors and builds the matching command.
//!
//! Required fields are checked in a fixed order per kind and the first
//! missing one is named in the error. Nothing touches the store until a
//! descriptor has fully validated.

use std::str::FromStr;
use std::sync::Arc;

use manifold_core::constants::MAX_SYMBOL_LEN;
use manifold_core::{DIMENSION, PatternType, Phase, interference_phase};
use manifold_store::PatternGateway;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde_json::Value;

use crate::command::{
    CollapseCommand, CreateCommand, EvolveCommand, EvolveSource, MergeCommand, PatternCommand,
    ResonateCommand,
};
use crate::descriptor::{
    CollapseParams, CommandDescriptor, CreateParams, EvolveParams, MergeParams, ResonateParams,
};
use crate::error::{EngineError, Result};

const DEFAULT_PHASE: f64 = 0.0;
const DEFAULT_TIME_SCALE: f64 = 1.0;
const DEFAULT_AMPLITUDE: f64 = 1.0;
const DEFAULT_PROBABILITY: f64 = 1.0;

/// How a merge descriptor chooses its phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Use the descriptor's `phase`.
    Superposition,
    /// Phase 0.
    Constructive,
    /// Phase π.
    Destructive,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Superposition => "superposition",
            Self::Constructive => "constructive",
            Self::Destructive => "destructive",
        }
    }

    fn resolve_phase(&self, phase: f64) -> f64 {
        match self {
            Self::Superposition => phase,
            Self::Constructive => interference_phase(false),
            Self::Destructive => interference_phase(true),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "superposition" => Ok(Self::Superposition),
            "constructive" => Ok(Self::Constructive),
            "destructive" => Ok(Self::Destructive),
            other => Err(format!(
                "unknown merge strategy '{other}' (expected superposition, constructive or destructive)"
            )),
        }
    }
}

pub struct CommandFactory {
    gateway: Arc<PatternGateway>,
    rng: SmallRng,
}

impl CommandFactory {
    pub fn new(gateway: Arc<PatternGateway>) -> Self {
        Self {
            gateway,
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Deterministic factory: every command it builds gets a child RNG
    /// derived from `seed`.
    pub fn with_seed(gateway: Arc<PatternGateway>, seed: u64) -> Self {
        Self {
            gateway,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn gateway(&self) -> &Arc<PatternGateway> {
        &self.gateway
    }

    pub(crate) fn child_rng(&mut self) -> SmallRng {
        SmallRng::from_rng(&mut self.rng)
    }

    pub fn create_from_json(&mut self, value: &Value) -> Result<Box<dyn PatternCommand>> {
        let descriptor = CommandDescriptor::from_json(value)?;
        self.create(&descriptor)
    }

    pub fn create(&mut self, descriptor: &CommandDescriptor) -> Result<Box<dyn PatternCommand>> {
        let command: Box<dyn PatternCommand> = match descriptor {
            CommandDescriptor::Create(p) => Box::new(self.build_create(p)?),
            CommandDescriptor::Merge(p) => Box::new(self.build_merge(p)?),
            CommandDescriptor::Evolve(p) => Box::new(self.build_evolve(p)?),
            CommandDescriptor::Resonate(p) => Box::new(self.build_resonate(p)?),
            CommandDescriptor::Collapse(p) => Box::new(self.build_collapse(p)?),
        };
        tracing::debug!("built {} command", command.kind());
        Ok(command)
    }

    fn build_create(&mut self, p: &CreateParams) -> Result<CreateCommand> {
        let pattern_type = require("patternType", &p.pattern_type)?;
        let symbol = require("symbol", &p.symbol)?;

        let pattern_type = PatternType::from_str(pattern_type)
            .map_err(|reason| EngineError::invalid("patternType", reason))?;
        check_symbol("symbol", symbol)?;
        let phase = finite("phase", p.phase.unwrap_or(DEFAULT_PHASE))?;

        Ok(
            CreateCommand::new(self.gateway.clone(), pattern_type, symbol.as_str(), phase)
                .with_rng(self.child_rng()),
        )
    }

    fn build_merge(&mut self, p: &MergeParams) -> Result<MergeCommand> {
        let sources = require("sourceStates", &p.source_states)?;
        let strategy = require("mergeStrategy", &p.merge_strategy)?;
        let symbol = require("symbol", &p.symbol)?;

        check_states("sourceStates", sources)?;
        let strategy = MergeStrategy::from_str(strategy)
            .map_err(|reason| EngineError::invalid("mergeStrategy", reason))?;
        check_symbol("symbol", symbol)?;
        let phase = finite("phase", p.phase.unwrap_or(DEFAULT_PHASE))?;
        let source_symbols = p.resonance_symbols.clone().unwrap_or_default();
        for s in &source_symbols {
            check_symbol("resonanceSymbols", s)?;
        }

        Ok(MergeCommand::new(
            self.gateway.clone(),
            sources.clone(),
            strategy.resolve_phase(phase),
            symbol.as_str(),
        )
        .with_source_symbols(source_symbols))
    }

    fn build_evolve(&mut self, p: &EvolveParams) -> Result<EvolveCommand> {
        let rate = *require("evolutionRate", &p.evolution_rate)?;
        let states = require("targetStates", &p.target_states)?;
        let symbol = require("symbol", &p.symbol)?;

        let rate = finite("evolutionRate", rate)?;
        check_symbol("symbol", symbol)?;
        let time_scale = finite("timeScale", p.time_scale.unwrap_or(DEFAULT_TIME_SCALE))?;
        let phase = finite("phase", p.phase.unwrap_or(DEFAULT_PHASE))?;

        let origin = match p.source_pattern_id {
            Some(id) => EvolveSource::Stored(id),
            None => {
                check_states("targetStates", states)?;
                EvolveSource::Seed {
                    states: states.clone(),
                    symbol: symbol.clone(),
                }
            }
        };
        Ok(EvolveCommand::new(
            self.gateway.clone(),
            origin,
            rate * time_scale,
            phase,
        ))
    }

    fn build_resonate(&mut self, p: &ResonateParams) -> Result<ResonateCommand> {
        let frequency = *require("resonanceFrequency", &p.resonance_frequency)?;
        let symbol = require("symbol", &p.symbol)?;

        let frequency = finite("resonanceFrequency", frequency)?;
        check_symbol("symbol", symbol)?;
        let phase = finite("phase", p.phase.unwrap_or(DEFAULT_PHASE))?;
        let amplitude = finite("amplitude", p.amplitude.unwrap_or(DEFAULT_AMPLITUDE))?;

        let symbols = match &p.resonance_symbols {
            Some(list) if !list.is_empty() => list.clone(),
            _ => vec![symbol.clone()],
        };
        for s in &symbols {
            check_symbol("resonanceSymbols", s)?;
        }

        Ok(ResonateCommand::new(
            self.gateway.clone(),
            symbols,
            Phase::new(phase * frequency).radians(),
        )
        .with_amplitude(amplitude)
        .with_rng(self.child_rng()))
    }

    fn build_collapse(&mut self, p: &CollapseParams) -> Result<CollapseCommand> {
        let threshold = *require("collapseThreshold", &p.collapse_threshold)?;
        let target = require("targetState", &p.target_state)?;
        let symbol = require("symbol", &p.symbol)?;

        let threshold = finite("collapseThreshold", threshold)?;
        check_symbol("symbol", symbol)?;
        let probability = finite("probability", p.probability.unwrap_or(DEFAULT_PROBABILITY))?;

        let mut targets = Vec::with_capacity(1 + p.target_states.as_ref().map_or(0, Vec::len));
        targets.push(target.clone());
        if let Some(extra) = &p.target_states {
            targets.extend(extra.iter().cloned());
        }
        check_states("targetState", &targets)?;

        Ok(CollapseCommand::new(
            self.gateway.clone(),
            targets,
            (probability * threshold).clamp(0.0, 1.0),
        )
        .with_symbol(symbol.as_str())
        .with_rng(self.child_rng()))
    }
}

fn require<'a, T>(field: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| EngineError::missing(field))
}

fn finite(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::invalid(field, "must be a finite number"))
    }
}

fn check_symbol(field: &str, symbol: &str) -> Result<()> {
    let len = symbol.chars().count();
    if len == 0 || len > MAX_SYMBOL_LEN {
        return Err(EngineError::invalid(
            field,
            format!("symbol must be 1..={MAX_SYMBOL_LEN} characters, got {len}"),
        ));
    }
    Ok(())
}

fn check_states(field: &str, states: &[Vec<f64>]) -> Result<()> {
    if states.is_empty() {
        return Err(EngineError::invalid(field, "at least one state is required"));
    }
    for (i, state) in states.iter().enumerate() {
        if state.len() != DIMENSION {
            return Err(EngineError::invalid(
                field,
                format!("state {i} has {} components, expected {DIMENSION}", state.len()),
            ));
        }
        if state.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::invalid(
                field,
                format!("state {i} contains a non-finite component"),
            ));
        }
    }
    Ok(())
}
