use std::sync::Arc;

use async_trait::async_trait;
use manifold_core::{
    Cube, Pattern, PatternId, PatternType, RESONANCE_SYMBOL, generate, interfere,
};
use manifold_store::PatternGateway;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;

use super::{CommandKind, CommandState, Ledger, Lifecycle, PatternCommand, cube_of};
use crate::error::{EngineError, Result};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResonateState {
    pub sources: Vec<Pattern>,
    pub resonance: Option<Pattern>,
    pub id: Option<PatternId>,
    pub phase: f64,
    pub amplitude: f64,
    pub cube_projection: Option<Cube>,
}

/// Generate one quantum pattern per symbol, interfere them, and persist the
/// sources followed by the result (stored under `⫰`).
pub struct ResonateCommand {
    symbols: Vec<String>,
    phase: f64,
    /// Carried into the snapshot only: the result is renormalized, so a
    /// uniform gain has no effect on the stored vector.
    amplitude: f64,
    rng: SmallRng,
    ledger: Ledger,
    sources: Vec<Pattern>,
    resonance: Option<Pattern>,
}

impl ResonateCommand {
    pub fn new(gateway: Arc<PatternGateway>, symbols: Vec<String>, phase: f64) -> Self {
        Self {
            symbols,
            phase,
            amplitude: 1.0,
            rng: SmallRng::from_os_rng(),
            ledger: Ledger::new(gateway),
            sources: Vec::new(),
            resonance: None,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_rng(mut self, rng: SmallRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn resonance(&self) -> Option<&Pattern> {
        self.resonance.as_ref()
    }

    async fn run(&mut self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(EngineError::invalid(
                "resonanceSymbols",
                "at least one symbol is required",
            ));
        }
        let mut sources = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            sources.push(generate(
                PatternType::Quantum,
                symbol,
                self.phase,
                &mut self.rng,
            )?);
        }
        let vectors: Vec<Vec<f64>> = sources.iter().map(|p| p.vector.clone()).collect();
        let resonance_vector = interfere(&vectors, self.phase)?;

        for mut source in sources {
            let id = self.ledger.persist(&source).await?;
            source.id = Some(id);
            self.sources.push(source);
        }

        let mut resonance = Pattern::new(resonance_vector, PatternType::Quantum, RESONANCE_SYMBOL);
        let id = self.ledger.persist(&resonance).await?;
        resonance.id = Some(id);
        self.resonance = Some(resonance);
        Ok(())
    }
}

#[async_trait]
impl PatternCommand for ResonateCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Resonate
    }

    async fn execute(&mut self) -> Result<()> {
        self.ledger.begin_execute(CommandKind::Resonate)?;
        self.sources.clear();
        self.resonance = None;
        let outcome = self.run().await;
        self.ledger.finish(CommandKind::Resonate, outcome)
    }

    async fn undo(&mut self) -> Result<()> {
        self.ledger.rollback(CommandKind::Resonate).await?;
        self.sources.clear();
        self.resonance = None;
        Ok(())
    }

    fn state(&self) -> CommandState {
        CommandState::Resonate(ResonateState {
            sources: self.sources.clone(),
            resonance: self.resonance.clone(),
            id: self.resonance.as_ref().and_then(|p| p.id),
            phase: self.phase,
            amplitude: self.amplitude,
            cube_projection: cube_of(self.resonance.as_ref()),
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

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_resonate_persists_sources_and_result() {
        let gateway = gateway();
        let mut cmd = ResonateCommand::new(gateway.clone(), symbols(&["⬡", "⧈", "⫰", "◬"]), 0.7)
            .with_amplitude(2.0)
            .with_rng(rng());
        cmd.execute().await.unwrap();

        let CommandState::Resonate(state) = cmd.state() else {
            panic!("expected resonate state");
        };
        assert_eq!(state.sources.len(), 4);
        assert_eq!(state.sources[1].symbol, "⧈");
        let resonance = state.resonance.unwrap();
        assert_eq!(resonance.symbol, RESONANCE_SYMBOL);
        assert!((resonance.norm() - 1.0).abs() < 1e-6);
        assert_eq!(state.amplitude, 2.0);
        assert_eq!(cmd.recorded_ids().len(), 5);
        assert_eq!(cmd.recorded_ids().last().copied(), state.id);
        assert_eq!(gateway.count().await.unwrap(), 5);

        cmd.undo().await.unwrap();
        assert_eq!(gateway.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seeded_rng_is_reproducible() {
        let mut a = ResonateCommand::new(gateway(), symbols(&["⦿", "⧈"]), 1.0).with_rng(rng());
        let mut b = ResonateCommand::new(gateway(), symbols(&["⦿", "⧈"]), 1.0).with_rng(rng());
        a.execute().await.unwrap();
        b.execute().await.unwrap();
        assert_eq!(a.resonance().unwrap().vector, b.resonance().unwrap().vector);
    }

    #[tokio::test]
    async fn test_empty_symbols_rejected() {
        let gateway = gateway();
        let mut cmd = ResonateCommand::new(gateway.clone(), Vec::new(), 0.0);
        let err = cmd.execute().await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "resonanceSymbols"));
        assert_eq!(gateway.count().await.unwrap(), 0);
    }
}
