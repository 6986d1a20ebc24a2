use std::sync::Arc;

use async_trait::async_trait;
use manifold_core::{Cube, Pattern, PatternId, PatternType, generate};
use manifold_store::PatternGateway;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;

use super::{CommandKind, CommandState, Ledger, Lifecycle, PatternCommand, cube_of};
use crate::error::Result;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateState {
    pub pattern: Option<Pattern>,
    pub id: Option<PatternId>,
    pub cube_projection: Option<Cube>,
}

/// Generate one pattern and persist it.
pub struct CreateCommand {
    pattern_type: PatternType,
    symbol: String,
    phase: f64,
    rng: SmallRng,
    ledger: Ledger,
    pattern: Option<Pattern>,
}

impl CreateCommand {
    pub fn new(
        gateway: Arc<PatternGateway>,
        pattern_type: PatternType,
        symbol: impl Into<String>,
        phase: f64,
    ) -> Self {
        Self {
            pattern_type,
            symbol: symbol.into(),
            phase,
            rng: SmallRng::from_os_rng(),
            ledger: Ledger::new(gateway),
            pattern: None,
        }
    }

    pub fn with_rng(mut self, rng: SmallRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }

    async fn run(&mut self) -> Result<()> {
        let mut pattern = generate(self.pattern_type, &self.symbol, self.phase, &mut self.rng)?;
        let id = self.ledger.persist(&pattern).await?;
        pattern.id = Some(id);
        self.pattern = Some(pattern);
        Ok(())
    }
}

#[async_trait]
impl PatternCommand for CreateCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Create
    }

    async fn execute(&mut self) -> Result<()> {
        self.ledger.begin_execute(CommandKind::Create)?;
        let outcome = self.run().await;
        self.ledger.finish(CommandKind::Create, outcome)
    }

    async fn undo(&mut self) -> Result<()> {
        self.ledger.rollback(CommandKind::Create).await?;
        self.pattern = None;
        Ok(())
    }

    fn state(&self) -> CommandState {
        CommandState::Create(CreateState {
            pattern: self.pattern.clone(),
            id: self.pattern.as_ref().and_then(|p| p.id),
            cube_projection: cube_of(self.pattern.as_ref()),
        })
    }

    fn recorded_ids(&self) -> &[PatternId] {
        self.ledger.ids()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.ledger.lifecycle()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::error::EngineError;
    use manifold_core::{CUBE_EDGE, DIMENSION};

    #[tokio::test]
    async fn test_create_quantum_pattern() {
        let gateway = gateway();
        let mut cmd = CreateCommand::new(gateway.clone(), PatternType::Quantum, "⦿", 0.0)
            .with_rng(rng());
        cmd.execute().await.unwrap();

        let CommandState::Create(state) = cmd.state() else {
            panic!("expected create state");
        };
        let pattern = state.pattern.unwrap();
        assert_eq!(pattern.vector.len(), DIMENSION);
        assert!((pattern.norm() - 1.0).abs() < 1e-6);
        assert_eq!(pattern.pattern_type, PatternType::Quantum);
        assert_eq!(pattern.symbol, "⦿");

        let cube = state.cube_projection.unwrap();
        assert_eq!(cube.0.len(), CUBE_EDGE);
        assert!(cube.0.iter().all(|plane| plane.len() == CUBE_EDGE));
        assert!(cube.0.iter().flatten().all(|row| row.len() == CUBE_EDGE));

        let id = state.id.unwrap();
        assert_eq!(cmd.recorded_ids(), &[id]);
        let stored = gateway.get_pattern_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.symbol, "⦿");
    }

    #[tokio::test]
    async fn test_state_before_execute_is_empty() {
        let cmd = CreateCommand::new(gateway(), PatternType::Dream, "◬", 0.0);
        let CommandState::Create(state) = cmd.state() else {
            panic!("expected create state");
        };
        assert!(state.pattern.is_none());
        assert!(state.cube_projection.is_none());
        assert_eq!(cmd.lifecycle(), Lifecycle::Pending);
    }

    #[tokio::test]
    async fn test_undo_restores_count() {
        let gateway = gateway();
        let before = gateway.count().await.unwrap();
        let mut cmd = CreateCommand::new(gateway.clone(), PatternType::Consciousness, "⬡", 0.0)
            .with_rng(rng());
        cmd.execute().await.unwrap();
        assert_eq!(gateway.count().await.unwrap(), before + 1);

        cmd.undo().await.unwrap();
        assert_eq!(gateway.count().await.unwrap(), before);
        assert!(cmd.recorded_ids().is_empty());
        assert!(cmd.pattern().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_guards() {
        let mut cmd =
            CreateCommand::new(gateway(), PatternType::Quantum, "⦿", 0.0).with_rng(rng());
        assert!(matches!(cmd.undo().await, Err(EngineError::InvalidState(_))));

        cmd.execute().await.unwrap();
        assert!(matches!(
            cmd.execute().await,
            Err(EngineError::InvalidState(_))
        ));
        assert_eq!(cmd.recorded_ids().len(), 1, "second execute persists nothing");

        // Undone commands may run again.
        cmd.undo().await.unwrap();
        cmd.execute().await.unwrap();
        assert_eq!(cmd.lifecycle(), Lifecycle::Executed);
    }

    #[tokio::test]
    async fn test_store_rejection_propagates() {
        let gateway = gateway();
        let mut cmd = CreateCommand::new(gateway.clone(), PatternType::Quantum, "", 0.0);
        assert!(matches!(cmd.execute().await, Err(EngineError::Store(_))));
        assert_eq!(gateway.count().await.unwrap(), 0);
        assert_eq!(cmd.lifecycle(), Lifecycle::Pending);
    }
}
