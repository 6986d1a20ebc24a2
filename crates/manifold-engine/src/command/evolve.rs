use std::sync::Arc;

use async_trait::async_trait;
use manifold_core::vector::check_dimension;
use manifold_core::{Cube, DIMENSION, Pattern, PatternId, PatternType, evolve, superpose};
use manifold_store::PatternGateway;
use serde::Serialize;

use super::{CommandKind, CommandState, Ledger, Lifecycle, PatternCommand, cube_of};
use crate::error::{EngineError, Result};

/// What an evolve command starts from.
#[derive(Clone, Debug, PartialEq)]
pub enum EvolveSource {
    /// A pattern already in the store.
    Stored(PatternId),
    /// Raw states whose superposition is persisted under `symbol` as the
    /// seed, then evolved.
    Seed {
        states: Vec<Vec<f64>>,
        symbol: String,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolveState {
    pub source: Option<Pattern>,
    pub source_id: Option<PatternId>,
    /// Set when the source was seeded by this command.
    pub seed_id: Option<PatternId>,
    pub evolved: Option<Pattern>,
    pub id: Option<PatternId>,
    pub time_scale: f64,
    pub phase: f64,
    pub cube_projection: Option<Cube>,
}

pub struct EvolveCommand {
    origin: EvolveSource,
    time_scale: f64,
    phase: f64,
    ledger: Ledger,
    source: Option<Pattern>,
    seed_id: Option<PatternId>,
    evolved: Option<Pattern>,
}

impl EvolveCommand {
    pub fn new(
        gateway: Arc<PatternGateway>,
        origin: EvolveSource,
        time_scale: f64,
        phase: f64,
    ) -> Self {
        Self {
            origin,
            time_scale,
            phase,
            ledger: Ledger::new(gateway),
            source: None,
            seed_id: None,
            evolved: None,
        }
    }

    pub fn from_stored(
        gateway: Arc<PatternGateway>,
        source_id: PatternId,
        time_scale: f64,
        phase: f64,
    ) -> Self {
        Self::new(gateway, EvolveSource::Stored(source_id), time_scale, phase)
    }

    pub fn evolved(&self) -> Option<&Pattern> {
        self.evolved.as_ref()
    }

    async fn run(&mut self) -> Result<()> {
        let mut source = match &self.origin {
            EvolveSource::Stored(id) => self
                .ledger
                .gateway()
                .get_pattern_by_id(*id)
                .await?
                .ok_or(EngineError::NotFound(*id))?,
            EvolveSource::Seed { states, symbol } => {
                if states.is_empty() {
                    return Err(EngineError::invalid(
                        "targetStates",
                        "at least one target state is required",
                    ));
                }
                for state in states {
                    check_dimension(state, DIMENSION)?;
                }
                Pattern::new(superpose(states)?, PatternType::Quantum, symbol.as_str())
            }
        };

        let evolved_vector = evolve(&source.vector, self.time_scale, self.phase)?;

        if matches!(self.origin, EvolveSource::Seed { .. }) {
            let id = self.ledger.persist(&source).await?;
            source.id = Some(id);
            self.seed_id = Some(id);
        }
        let pattern_type = source.pattern_type;
        let symbol = source.symbol.clone();
        self.source = Some(source);

        let mut evolved = Pattern::new(evolved_vector, pattern_type, symbol);
        let id = self.ledger.persist(&evolved).await?;
        evolved.id = Some(id);
        self.evolved = Some(evolved);
        Ok(())
    }

    fn reset(&mut self) {
        self.source = None;
        self.seed_id = None;
        self.evolved = None;
    }
}

#[async_trait]
impl PatternCommand for EvolveCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Evolve
    }

    async fn execute(&mut self) -> Result<()> {
        self.ledger.begin_execute(CommandKind::Evolve)?;
        self.reset();
        let outcome = self.run().await;
        self.ledger.finish(CommandKind::Evolve, outcome)
    }

    async fn undo(&mut self) -> Result<()> {
        self.ledger.rollback(CommandKind::Evolve).await?;
        self.reset();
        Ok(())
    }

    fn state(&self) -> CommandState {
        CommandState::Evolve(EvolveState {
            source: self.source.clone(),
            source_id: self.source.as_ref().and_then(|p| p.id),
            seed_id: self.seed_id,
            evolved: self.evolved.clone(),
            id: self.evolved.as_ref().and_then(|p| p.id),
            time_scale: self.time_scale,
            phase: self.phase,
            cube_projection: cube_of(self.evolved.as_ref()),
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
    use manifold_core::{PHI, generate};

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let gateway = gateway();
        let mut cmd = EvolveCommand::from_stored(gateway.clone(), 424_242, 1.0, 0.0);
        let err = cmd.execute().await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(424_242)));
        assert_eq!(gateway.count().await.unwrap(), 0, "nothing persisted");
        assert!(cmd.recorded_ids().is_empty());
    }

    #[tokio::test]
    async fn test_evolve_stored_keeps_type_and_symbol() {
        let gateway = gateway();
        let mut rng = rng();
        let source = generate(PatternType::Dream, "◬", 0.0, &mut rng).unwrap();
        let source_id = gateway.insert_pattern(&source).await.unwrap();

        let mut cmd = EvolveCommand::from_stored(gateway.clone(), source_id, 0.5, PHI);
        cmd.execute().await.unwrap();

        let CommandState::Evolve(state) = cmd.state() else {
            panic!("expected evolve state");
        };
        assert_eq!(state.source_id, Some(source_id));
        assert!(state.seed_id.is_none());
        let evolved = state.evolved.unwrap();
        assert_eq!(evolved.pattern_type, PatternType::Dream);
        assert_eq!(evolved.symbol, "◬");
        assert!((evolved.norm() - 1.0).abs() < 1e-6);
        assert_eq!(cmd.recorded_ids(), &[state.id.unwrap()]);

        cmd.undo().await.unwrap();
        assert_eq!(gateway.count().await.unwrap(), 1, "source survives undo");
    }

    #[tokio::test]
    async fn test_evolve_from_seed_states() {
        let gateway = gateway();
        let mut rng = rng();
        let origin = EvolveSource::Seed {
            states: vec![random_state(&mut rng), random_state(&mut rng)],
            symbol: "⬡".to_string(),
        };
        let mut cmd = EvolveCommand::new(gateway.clone(), origin, 0.002, PHI);
        cmd.execute().await.unwrap();

        let CommandState::Evolve(state) = cmd.state() else {
            panic!("expected evolve state");
        };
        let seed_id = state.seed_id.unwrap();
        assert_eq!(cmd.recorded_ids(), &[seed_id, state.id.unwrap()]);
        assert_eq!(state.evolved.unwrap().symbol, "⬡");
        assert_eq!(gateway.count().await.unwrap(), 2);

        cmd.undo().await.unwrap();
        assert_eq!(gateway.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_evolve_matches_pure_function() {
        let gateway = gateway();
        let mut rng = rng();
        let source = generate(PatternType::Quantum, "⦿", 0.0, &mut rng).unwrap();
        let source_id = gateway.insert_pattern(&source).await.unwrap();
        let stored = gateway.get_pattern_by_id(source_id).await.unwrap().unwrap();

        let mut cmd = EvolveCommand::from_stored(gateway, source_id, 1.0, 0.3);
        cmd.execute().await.unwrap();
        let expected = evolve(&stored.vector, 1.0, 0.3).unwrap();
        for (a, b) in cmd.evolved().unwrap().vector.iter().zip(&expected) {
            approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}
