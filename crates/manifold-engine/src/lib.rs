//! Reversible pattern commands over a [`manifold_store::PatternGateway`].
//!
//! Callers describe work as [`CommandDescriptor`]s; the [`CommandFactory`]
//! validates them and builds a [`PatternCommand`]; the [`Orchestrator`]
//! sequences commands, animates resonance fields and morphs, and keeps an
//! undo history.

pub mod clock;
pub mod command;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod orchestrator;

pub use clock::{Clock, ManualClock, TokioClock};
pub use command::{
    CollapseCommand, CommandKind, CommandState, CreateCommand, EvolveCommand, EvolveSource,
    Lifecycle, MergeCommand, PatternCommand, ResonateCommand,
};
pub use descriptor::CommandDescriptor;
pub use error::{EngineError, Result};
pub use factory::{CommandFactory, MergeStrategy};
pub use orchestrator::{InterferenceMode, ManifestKind, Orchestrator, RunReport};
