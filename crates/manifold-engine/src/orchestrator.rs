//! Sequencing of commands: canned "manifestation" scripts, the resonance
//! field animation, stepwise morphs, and undo history.
//!
//! Commands within a run are strictly ordered: each `execute` completes
//! before the next descriptor is built. The first failure aborts the run and
//! leaves earlier commands' records in place (they stay in history and can
//! be undone).

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use manifold_core::{
    COLLAPSED_SYMBOL, DIMENSION, FIBONACCI_PHASES, PHI, PatternId, PatternType, RESONANCE_SYMBOL,
    SUPERPOSITION_SYMBOL, generate, interpolate,
};
use manifold_store::PatternGateway;
use rand::Rng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::{Clock, TokioClock};
use crate::command::{CommandKind, CommandState, Lifecycle, PatternCommand};
use crate::descriptor::{
    CollapseParams, CommandDescriptor, CreateParams, EvolveParams, MergeParams, ResonateParams,
};
use crate::error::{EngineError, Result};
use crate::factory::CommandFactory;

/// One animation tick.
pub const FRAME: Duration = Duration::from_millis(16);
pub const DEFAULT_FIELD_DURATION: Duration = Duration::from_millis(5000);
pub const DEFAULT_MORPH_STEPS: usize = 60;
pub const DEFAULT_MORPH_DURATION: Duration = Duration::from_millis(2000);

/// Symbols every canned sequence resonates over.
pub const FIELD_SYMBOLS: [&str; 4] = ["⬡", SUPERPOSITION_SYMBOL, RESONANCE_SYMBOL, "◬"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestKind {
    Particle,
    Neural,
    Code,
    /// Caller-supplied sequence only.
    Custom,
}

impl ManifestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Particle => "particle",
            Self::Neural => "neural",
            Self::Code => "code",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "particle" => Ok(Self::Particle),
            "neural" => Ok(Self::Neural),
            "code" => Ok(Self::Code),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown manifestation '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterferenceMode {
    Constructive,
    Destructive,
}

impl InterferenceMode {
    fn strategy(&self) -> &'static str {
        match self {
            Self::Constructive => "constructive",
            Self::Destructive => "destructive",
        }
    }
}

impl FromStr for InterferenceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "constructive" => Ok(Self::Constructive),
            "destructive" => Ok(Self::Destructive),
            other => Err(format!("unknown interference mode '{other}'")),
        }
    }
}

/// Outcome of a multi-command run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub label: String,
    pub commands: usize,
    /// Every id persisted by the run, in insertion order.
    pub pattern_ids: Vec<PatternId>,
    pub cancelled: bool,
}

impl RunReport {
    fn new(label: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            label: label.into(),
            commands: 0,
            pattern_ids: Vec::new(),
            cancelled: false,
        }
    }
}

pub struct Orchestrator {
    factory: CommandFactory,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    history: Vec<Box<dyn PatternCommand>>,
    rng: SmallRng,
}

impl Orchestrator {
    pub fn new(mut factory: CommandFactory) -> Self {
        let rng = factory.child_rng();
        Self {
            factory,
            clock: Arc::new(TokioClock::new()),
            cancel: CancellationToken::new(),
            history: Vec::new(),
            rng,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cancelling this token stops the running sequence, field or morph at
    /// the next step boundary (or mid-sleep).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn gateway(&self) -> &Arc<PatternGateway> {
        self.factory.gateway()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Kinds of the recorded commands, oldest first.
    pub fn history_kinds(&self) -> Vec<CommandKind> {
        self.history.iter().map(|c| c.kind()).collect()
    }

    // --- Single commands ---

    /// Build, execute and record one command. A command that fails after
    /// persisting part of its records is still recorded so undo can reach
    /// them.
    pub async fn execute(&mut self, descriptor: &CommandDescriptor) -> Result<CommandState> {
        let mut command = self.factory.create(descriptor)?;
        if let Err(e) = command.execute().await {
            if command.lifecycle() == Lifecycle::Failed {
                self.history.push(command);
            }
            return Err(e);
        }
        let state = command.state();
        self.history.push(command);
        Ok(state)
    }

    pub async fn interference_pattern(
        &mut self,
        patterns: Vec<Vec<f64>>,
        mode: InterferenceMode,
    ) -> Result<CommandState> {
        let descriptor = CommandDescriptor::Merge(MergeParams {
            source_states: Some(patterns),
            merge_strategy: Some(mode.strategy().to_string()),
            symbol: Some(SUPERPOSITION_SYMBOL.to_string()),
            ..Default::default()
        });
        self.execute(&descriptor).await
    }

    // --- Sequences ---

    async fn run_step(
        &mut self,
        report: &mut RunReport,
        step: usize,
        descriptor: &CommandDescriptor,
    ) -> Result<()> {
        if let Err(source) = self.execute(descriptor).await {
            tracing::error!(
                "{} step {step} ({}) failed: {source}",
                report.label,
                descriptor.kind()
            );
            return Err(EngineError::Sequence {
                step,
                source: Box::new(source),
            });
        }
        report.commands += 1;
        if let Some(command) = self.history.last() {
            report.pattern_ids.extend_from_slice(command.recorded_ids());
        }
        Ok(())
    }

    /// Run descriptors strictly in order, aborting on the first failure.
    pub async fn run_sequence(
        &mut self,
        label: &str,
        descriptors: &[CommandDescriptor],
    ) -> Result<RunReport> {
        let mut report = RunReport::new(label);
        tracing::info!("{label}: running {} step(s)", descriptors.len());
        for (step, descriptor) in descriptors.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!("{label} cancelled before step {step}");
                return Err(EngineError::Cancelled);
            }
            self.run_step(&mut report, step, descriptor).await?;
        }
        Ok(report)
    }

    /// Run a caller-supplied sequence if given, otherwise the canned one for
    /// `kind`. `Custom` without a sequence runs nothing.
    pub async fn manifest(
        &mut self,
        kind: ManifestKind,
        custom: Option<Vec<CommandDescriptor>>,
    ) -> Result<RunReport> {
        let sequence = match custom {
            Some(sequence) => sequence,
            None => self.canned_sequence(kind)?,
        };
        self.run_sequence(kind.as_str(), &sequence).await
    }

    /// The domain base sequence for `kind` followed by the canonical
    /// superposition merge, φ-phased evolve and field resonance.
    pub fn canned_sequence(&mut self, kind: ManifestKind) -> Result<Vec<CommandDescriptor>> {
        let mut sequence = match kind {
            ManifestKind::Particle => vec![
                create(PatternType::Quantum, COLLAPSED_SYMBOL, 0.0),
                CommandDescriptor::Collapse(CollapseParams {
                    collapse_threshold: Some(1.0),
                    target_state: Some(self.generated(PatternType::Quantum)?),
                    symbol: Some(COLLAPSED_SYMBOL.to_string()),
                    target_states: Some(vec![self.generated(PatternType::Quantum)?]),
                    probability: Some(1.0),
                }),
            ],
            ManifestKind::Neural => vec![
                create(PatternType::Consciousness, "⬡", 0.0),
                create(PatternType::Dream, "◬", 0.0),
            ],
            ManifestKind::Code => vec![
                create(PatternType::Consciousness, SUPERPOSITION_SYMBOL, PI / 3.0),
                CommandDescriptor::Evolve(EvolveParams {
                    evolution_rate: Some(1.0),
                    target_states: Some(vec![self.generated(PatternType::Consciousness)?]),
                    symbol: Some(SUPERPOSITION_SYMBOL.to_string()),
                    time_scale: Some(0.001),
                    phase: Some(PI / 4.0),
                    ..Default::default()
                }),
            ],
            ManifestKind::Custom => return Ok(Vec::new()),
        };

        let cos_state = self.phasor_state(f64::cos);
        let sin_state = self.phasor_state(f64::sin);
        sequence.push(CommandDescriptor::Merge(MergeParams {
            source_states: Some(vec![cos_state, sin_state]),
            merge_strategy: Some("superposition".to_string()),
            symbol: Some(SUPERPOSITION_SYMBOL.to_string()),
            phase: Some(PI / 4.0),
            resonance_symbols: Some(vec![
                COLLAPSED_SYMBOL.to_string(),
                SUPERPOSITION_SYMBOL.to_string(),
            ]),
        }));
        sequence.push(CommandDescriptor::Evolve(EvolveParams {
            evolution_rate: Some(1.0),
            target_states: Some(vec![
                self.generated(PatternType::Consciousness)?,
                self.generated(PatternType::Dream)?,
            ]),
            symbol: Some("⬡".to_string()),
            time_scale: Some(0.002),
            phase: Some(PHI),
            ..Default::default()
        }));
        sequence.push(CommandDescriptor::Resonate(ResonateParams {
            resonance_frequency: Some(1.0),
            symbol: Some(RESONANCE_SYMBOL.to_string()),
            resonance_symbols: Some(FIELD_SYMBOLS.iter().map(|s| s.to_string()).collect()),
            phase: Some(FIBONACCI_PHASES[1]),
            amplitude: None,
        }));
        Ok(sequence)
    }

    fn generated(&mut self, pattern_type: PatternType) -> Result<Vec<f64>> {
        Ok(generate(pattern_type, pattern_type.as_str(), 0.0, &mut self.rng)?.vector)
    }

    /// `f(u·π)` per component, `u` uniform in [0, 1).
    fn phasor_state(&mut self, f: fn(f64) -> f64) -> Vec<f64> {
        (0..DIMENSION)
            .map(|_| f(self.rng.random::<f64>() * PI))
            .collect()
    }

    // --- Animations ---

    /// Sleep one interval unless cancelled first. Returns false on cancel.
    async fn pause(&self, interval: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.clock.sleep(interval) => true,
        }
    }

    /// Issue one resonate per animation frame until `duration` has elapsed.
    /// The phase of each tick is drawn from the Fibonacci phase table,
    /// indexed by elapsed milliseconds. Cancellation ends the loop early and
    /// is reported, not raised.
    pub async fn resonance_field(
        &mut self,
        symbols: &[String],
        duration: Duration,
    ) -> Result<RunReport> {
        let mut report = RunReport::new("resonance-field");
        let symbol = symbols
            .first()
            .cloned()
            .unwrap_or_else(|| RESONANCE_SYMBOL.to_string());
        let start = self.clock.elapsed();

        loop {
            let elapsed = self.clock.elapsed().saturating_sub(start);
            if elapsed > duration {
                break;
            }
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let index = (elapsed.as_millis() % FIBONACCI_PHASES.len() as u128) as usize;
            let descriptor = CommandDescriptor::Resonate(ResonateParams {
                resonance_frequency: Some(1.0),
                symbol: Some(symbol.clone()),
                resonance_symbols: Some(symbols.to_vec()),
                phase: Some(FIBONACCI_PHASES[index]),
                amplitude: None,
            });
            let step = report.commands;
            self.run_step(&mut report, step, &descriptor).await?;

            if !self.pause(FRAME).await {
                report.cancelled = true;
                break;
            }
        }

        tracing::info!(
            "resonance field: {} tick(s){}",
            report.commands,
            if report.cancelled { ", cancelled" } else { "" }
        );
        Ok(report)
    }

    /// Walk from `source` to `target` in `steps` linear increments, issuing a
    /// single-target collapse for each and spacing them `duration / steps`
    /// apart.
    pub async fn morph(
        &mut self,
        source: &[f64],
        target: &[f64],
        steps: usize,
        duration: Duration,
    ) -> Result<RunReport> {
        if steps < 2 {
            return Err(EngineError::invalid("steps", "a morph needs at least 2 steps"));
        }
        let divisor = u32::try_from(steps).map_err(|_| {
            EngineError::invalid("steps", format!("a morph takes at most {} steps", u32::MAX))
        })?;
        for (field, v) in [("source", source), ("target", target)] {
            if v.len() != DIMENSION {
                return Err(EngineError::invalid(
                    field,
                    format!("expected {DIMENSION} components, got {}", v.len()),
                ));
            }
        }

        let mut report = RunReport::new("morph");
        let interval = duration / divisor;
        for i in 0..steps {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let progress = i as f64 / (steps - 1) as f64;
            let descriptor = CommandDescriptor::Collapse(CollapseParams {
                collapse_threshold: Some(1.0),
                target_state: Some(interpolate(source, target, progress)?),
                symbol: Some(COLLAPSED_SYMBOL.to_string()),
                ..Default::default()
            });
            self.run_step(&mut report, i, &descriptor).await?;

            if !self.pause(interval).await {
                report.cancelled = true;
                break;
            }
        }
        Ok(report)
    }

    // --- History ---

    /// Undo the most recent command. On failure it stays in history so the
    /// undo can be retried.
    pub async fn undo_last(&mut self) -> Result<Option<CommandKind>> {
        let Some(mut command) = self.history.pop() else {
            return Ok(None);
        };
        match command.undo().await {
            Ok(()) => Ok(Some(command.kind())),
            Err(e) => {
                self.history.push(command);
                Err(e)
            }
        }
    }

    /// Undo every recorded command, newest first. Returns how many were
    /// undone.
    pub async fn undo_all(&mut self) -> Result<usize> {
        let mut undone = 0;
        while self.undo_last().await?.is_some() {
            undone += 1;
        }
        Ok(undone)
    }
}

fn create(pattern_type: PatternType, symbol: &str, phase: f64) -> CommandDescriptor {
    CommandDescriptor::Create(CreateParams {
        pattern_type: Some(pattern_type.as_str().to_string()),
        symbol: Some(symbol.to_string()),
        phase: Some(phase),
    })
}
