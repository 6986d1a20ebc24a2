use std::sync::Arc;

use async_trait::async_trait;
use manifold_core::vector::check_dimension;
use manifold_core::{
    COLLAPSED_SYMBOL, Cube, DIMENSION, Pattern, PatternId, PatternType, SUPERPOSITION_SYMBOL,
    normalize, superpose,
};
use manifold_store::PatternGateway;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::{CommandKind, CommandState, Ledger, Lifecycle, PatternCommand, cube_of};
use crate::error::{EngineError, Result};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapseState {
    pub superposition: Option<Pattern>,
    pub superposition_id: Option<PatternId>,
    pub collapsed: Option<Pattern>,
    pub collapsed_id: Option<PatternId>,
    /// Index into the target states chosen by the collapse.
    pub selected_index: Option<usize>,
    pub probability: f64,
    /// Projection of the collapsed pattern; null when the trial failed.
    pub cube_projection: Option<Cube>,
}

/// Persist the equal-amplitude superposition of the targets, then with
/// probability `p` pick one target uniformly and persist it normalized.
pub struct CollapseCommand {
    targets: Vec<Vec<f64>>,
    probability: f64,
    symbol: String,
    rng: SmallRng,
    ledger: Ledger,
    superposition: Option<Pattern>,
    collapsed: Option<Pattern>,
    selected_index: Option<usize>,
}

impl CollapseCommand {
    /// `probability` is clamped to `[0, 1]`; NaN counts as 0.
    pub fn new(gateway: Arc<PatternGateway>, targets: Vec<Vec<f64>>, probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self {
            targets,
            probability,
            symbol: COLLAPSED_SYMBOL.to_string(),
            rng: SmallRng::from_os_rng(),
            ledger: Ledger::new(gateway),
            superposition: None,
            collapsed: None,
            selected_index: None,
        }
    }

    /// Symbol for the collapsed pattern (defaults to `⦿`).
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn with_rng(mut self, rng: SmallRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn collapsed(&self) -> Option<&Pattern> {
        self.collapsed.as_ref()
    }

    pub fn superposition(&self) -> Option<&Pattern> {
        self.superposition.as_ref()
    }

    async fn run(&mut self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(EngineError::invalid(
                "targetStates",
                "at least one target state is required",
            ));
        }
        let mut normalized = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            check_dimension(target, DIMENSION)?;
            normalized.push(normalize(target)?);
        }
        let superposed = superpose(&self.targets)?;

        let mut superposition = Pattern::new(superposed, PatternType::Quantum, SUPERPOSITION_SYMBOL);
        let id = self.ledger.persist(&superposition).await?;
        superposition.id = Some(id);
        self.superposition = Some(superposition);

        if !self.rng.random_bool(self.probability) {
            tracing::debug!("collapse trial failed (p = {})", self.probability);
            return Ok(());
        }
        let index = self.rng.random_range(0..normalized.len());
        let chosen = normalized.swap_remove(index);
        let mut collapsed = Pattern::new(chosen, PatternType::Quantum, self.symbol.as_str());
        let id = self.ledger.persist(&collapsed).await?;
        collapsed.id = Some(id);
        self.collapsed = Some(collapsed);
        self.selected_index = Some(index);
        Ok(())
    }

    fn reset(&mut self) {
        self.superposition = None;
        self.collapsed = None;
        self.selected_index = None;
    }
}

#[async_trait]
impl PatternCommand for CollapseCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Collapse
    }

    async fn execute(&mut self) -> Result<()> {
        self.ledger.begin_execute(CommandKind::Collapse)?;
        self.reset();
        let outcome = self.run().await;
        self.ledger.finish(CommandKind::Collapse, outcome)
    }

    async fn undo(&mut self) -> Result<()> {
        self.ledger.rollback(CommandKind::Collapse).await?;
        self.reset();
        Ok(())
    }

    fn state(&self) -> CommandState {
        CommandState::Collapse(CollapseState {
            superposition: self.superposition.clone(),
            superposition_id: self.superposition.as_ref().and_then(|p| p.id),
            collapsed: self.collapsed.clone(),
            collapsed_id: self.collapsed.as_ref().and_then(|p| p.id),
            selected_index: self.selected_index,
            probability: self.probability,
            cube_projection: cube_of(self.collapsed.as_ref()),
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
    use manifold_core::l2_norm;

    fn targets(n: usize) -> Vec<Vec<f64>> {
        let mut rng = rng();
        (0..n).map(|_| random_state(&mut rng)).collect()
    }

    #[tokio::test]
    async fn test_certain_collapse_persists_two() {
        let gateway = gateway();
        let states = targets(3);
        for seed in 0..10u64 {
            let mut cmd = CollapseCommand::new(gateway.clone(), states.clone(), 1.0)
                .with_rng(SmallRng::seed_from_u64(seed));
            cmd.execute().await.unwrap();
            assert_eq!(cmd.recorded_ids().len(), 2, "seed {seed}");

            let CommandState::Collapse(state) = cmd.state() else {
                panic!("expected collapse state");
            };
            let index = state.selected_index.unwrap();
            let collapsed = state.collapsed.unwrap();
            assert_eq!(collapsed.symbol, COLLAPSED_SYMBOL);
            assert_eq!(state.superposition.unwrap().symbol, SUPERPOSITION_SYMBOL);
            assert!(state.cube_projection.is_some());

            let expected = normalize(&states[index]).unwrap();
            for (a, b) in collapsed.vector.iter().zip(&expected) {
                approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[tokio::test]
    async fn test_impossible_collapse_keeps_only_superposition() {
        let gateway = gateway();
        for seed in 0..10u64 {
            let mut cmd = CollapseCommand::new(gateway.clone(), targets(2), 0.0)
                .with_rng(SmallRng::seed_from_u64(seed));
            cmd.execute().await.unwrap();
            assert_eq!(cmd.recorded_ids().len(), 1);
            assert!(cmd.collapsed().is_none());
            let CommandState::Collapse(state) = cmd.state() else {
                panic!("expected collapse state");
            };
            assert!(state.cube_projection.is_none());
        }
        assert_eq!(gateway.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_superposition_is_unit_norm() {
        let mut cmd = CollapseCommand::new(gateway(), targets(4), 0.5).with_rng(rng());
        cmd.execute().await.unwrap();
        let norm = l2_norm(&cmd.superposition().unwrap().vector);
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_undo_deletes_collapsed_then_superposition() {
        let gateway = gateway();
        let mut cmd = CollapseCommand::new(gateway.clone(), targets(2), 1.0)
            .with_symbol("⬡")
            .with_rng(rng());
        cmd.execute().await.unwrap();
        assert_eq!(gateway.count().await.unwrap(), 2);
        assert_eq!(cmd.collapsed().unwrap().symbol, "⬡");

        cmd.undo().await.unwrap();
        assert_eq!(gateway.count().await.unwrap(), 0);
        assert!(cmd.superposition().is_none());
    }

    #[tokio::test]
    async fn test_zero_target_fails_before_any_insert() {
        let gateway = gateway();
        let mut states = targets(1);
        states.push(vec![0.0; DIMENSION]);
        let mut cmd = CollapseCommand::new(gateway.clone(), states, 1.0);
        assert!(matches!(
            cmd.execute().await,
            Err(EngineError::Normalization(_))
        ));
        assert_eq!(gateway.count().await.unwrap(), 0);
    }

    #[test]
    fn test_probability_is_clamped() {
        let gateway = gateway();
        assert_eq!(CollapseCommand::new(gateway.clone(), Vec::new(), 3.0).probability, 1.0);
        assert_eq!(CollapseCommand::new(gateway.clone(), Vec::new(), -1.0).probability, 0.0);
        assert_eq!(CollapseCommand::new(gateway, Vec::new(), f64::NAN).probability, 0.0);
    }
}
