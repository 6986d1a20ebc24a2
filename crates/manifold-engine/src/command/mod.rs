//! Reversible pattern commands.
//!
//! Every command records the ids it persisted, in insertion order, and undo
//! deletes them newest-first. Derived records are always inserted after
//! their sources, so newest-first is also dependency order.

mod collapse;
mod create;
mod evolve;
mod merge;
mod resonate;

pub use collapse::{CollapseCommand, CollapseState};
pub use create::{CreateCommand, CreateState};
pub use evolve::{EvolveCommand, EvolveSource, EvolveState};
pub use merge::{MergeCommand, MergeState};
pub use resonate::{ResonateCommand, ResonateState};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use manifold_core::{Cube, Pattern, PatternId, to_cube};
use manifold_store::PatternGateway;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Create,
    Merge,
    Evolve,
    Resonate,
    Collapse,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        Self::Create,
        Self::Merge,
        Self::Evolve,
        Self::Resonate,
        Self::Collapse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Merge => "merge",
            Self::Evolve => "evolve",
            Self::Resonate => "resonate",
            Self::Collapse => "collapse",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a command instance is in its execute/undo cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Constructed, or fully undone.
    Pending,
    Executed,
    /// Execute failed part-way; recorded ids may be non-empty.
    Failed,
}

#[async_trait]
pub trait PatternCommand: Send + Sync {
    fn kind(&self) -> CommandKind;

    /// Run the command. Only valid from [`Lifecycle::Pending`]; a command
    /// that has been undone may be executed again.
    async fn execute(&mut self) -> Result<()>;

    /// Delete every id this instance recorded, newest first. Valid after
    /// execute, including a failed one.
    async fn undo(&mut self) -> Result<()>;

    /// Read-only snapshot for visualization consumers.
    fn state(&self) -> CommandState;

    fn recorded_ids(&self) -> &[PatternId];

    fn lifecycle(&self) -> Lifecycle;
}

/// Snapshot returned by [`PatternCommand::state`].
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CommandState {
    Create(CreateState),
    Merge(MergeState),
    Evolve(EvolveState),
    Resonate(ResonateState),
    Collapse(CollapseState),
}

impl CommandState {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Create(_) => CommandKind::Create,
            Self::Merge(_) => CommandKind::Merge,
            Self::Evolve(_) => CommandKind::Evolve,
            Self::Resonate(_) => CommandKind::Resonate,
            Self::Collapse(_) => CommandKind::Collapse,
        }
    }

    pub fn cube_projection(&self) -> Option<&Cube> {
        match self {
            Self::Create(s) => s.cube_projection.as_ref(),
            Self::Merge(s) => s.cube_projection.as_ref(),
            Self::Evolve(s) => s.cube_projection.as_ref(),
            Self::Resonate(s) => s.cube_projection.as_ref(),
            Self::Collapse(s) => s.cube_projection.as_ref(),
        }
    }

    /// The pattern this command ultimately produced, if any.
    pub fn primary_pattern(&self) -> Option<&Pattern> {
        match self {
            Self::Create(s) => s.pattern.as_ref(),
            Self::Merge(s) => s.merged.as_ref(),
            Self::Evolve(s) => s.evolved.as_ref(),
            Self::Resonate(s) => s.resonance.as_ref(),
            Self::Collapse(s) => s.collapsed.as_ref().or(s.superposition.as_ref()),
        }
    }
}

pub(crate) fn cube_of(pattern: Option<&Pattern>) -> Option<Cube> {
    pattern.and_then(|p| to_cube(&p.vector).ok())
}

// --- Ledger ---

/// Gateway handle plus the ids a command has persisted and its lifecycle.
/// Shared by every command so the execute/undo rules live in one place.
pub(crate) struct Ledger {
    gateway: Arc<PatternGateway>,
    ids: Vec<PatternId>,
    lifecycle: Lifecycle,
}

impl Ledger {
    pub(crate) fn new(gateway: Arc<PatternGateway>) -> Self {
        Self {
            gateway,
            ids: Vec::new(),
            lifecycle: Lifecycle::Pending,
        }
    }

    pub(crate) fn gateway(&self) -> &PatternGateway {
        &self.gateway
    }

    pub(crate) fn ids(&self) -> &[PatternId] {
        &self.ids
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub(crate) fn begin_execute(&self, kind: CommandKind) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Pending => Ok(()),
            Lifecycle::Executed => Err(EngineError::InvalidState(format!(
                "{kind} command already executed"
            ))),
            Lifecycle::Failed => Err(EngineError::InvalidState(format!(
                "{kind} command failed; undo it before executing again"
            ))),
        }
    }

    /// Insert and record.
    pub(crate) async fn persist(&mut self, pattern: &Pattern) -> Result<PatternId> {
        let id = self.gateway.insert_pattern(pattern).await?;
        self.ids.push(id);
        Ok(id)
    }

    pub(crate) fn finish(&mut self, kind: CommandKind, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.lifecycle = Lifecycle::Executed;
                tracing::debug!("{kind} executed, recorded {:?}", self.ids);
                Ok(())
            }
            Err(e) => {
                if !self.ids.is_empty() {
                    self.lifecycle = Lifecycle::Failed;
                }
                tracing::error!(
                    "{kind} failed after persisting {} record(s): {e}",
                    self.ids.len()
                );
                Err(e)
            }
        }
    }

    /// Delete recorded ids newest-first. Deleted ids leave the ledger as they
    /// go, so a retry after a failure only touches what remains.
    pub(crate) async fn rollback(&mut self, kind: CommandKind) -> Result<()> {
        if self.lifecycle == Lifecycle::Pending {
            return Err(EngineError::InvalidState(format!(
                "{kind} command has not been executed"
            )));
        }
        while let Some(&id) = self.ids.last() {
            if let Err(e) = self.gateway.delete_pattern(id).await {
                tracing::error!("undo of {kind} failed deleting pattern {id}: {e}");
                return Err(e.into());
            }
            self.ids.pop();
        }
        self.lifecycle = Lifecycle::Pending;
        tracing::debug!("{kind} undone");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use manifold_core::DIMENSION;
    use manifold_store::PatternGateway;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    pub fn gateway() -> Arc<PatternGateway> {
        Arc::new(PatternGateway::in_memory().unwrap())
    }

    pub fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    pub fn random_state(rng: &mut SmallRng) -> Vec<f64> {
        (0..DIMENSION).map(|_| rng.random_range(-1.0..1.0)).collect()
    }
}
