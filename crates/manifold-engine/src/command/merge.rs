use std::sync::Arc;

use async_trait::async_trait;
use manifold_core::vector::check_dimension;
use manifold_core::{
    COLLAPSED_SYMBOL, Cube, DIMENSION, Pattern, PatternId, PatternType, merge_all, normalize,
};
use manifold_store::PatternGateway;
use serde::Serialize;

use super::{CommandKind, CommandState, Ledger, Lifecycle, PatternCommand, cube_of};
use crate::error::{EngineError, Result};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeState {
    pub merged: Option<Pattern>,
    pub id: Option<PatternId>,
    pub intermediate_ids: Vec<PatternId>,
    pub phase: f64,
    pub cube_projection: Option<Cube>,
}

/// Persist each source as an intermediate pattern, fold them pairwise with
/// [`manifold_core::merge`], and persist the result.
pub struct MergeCommand {
    sources: Vec<Vec<f64>>,
    phase: f64,
    symbol: String,
    source_symbols: Vec<String>,
    ledger: Ledger,
    intermediate_ids: Vec<PatternId>,
    merged: Option<Pattern>,
}

impl MergeCommand {
    pub fn new(
        gateway: Arc<PatternGateway>,
        sources: Vec<Vec<f64>>,
        phase: f64,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            sources,
            phase,
            symbol: symbol.into(),
            source_symbols: Vec::new(),
            ledger: Ledger::new(gateway),
            intermediate_ids: Vec::new(),
            merged: None,
        }
    }

    /// Symbols for the intermediate patterns, by source index. Sources past
    /// the end of the list use `⦿`.
    pub fn with_source_symbols(mut self, symbols: Vec<String>) -> Self {
        self.source_symbols = symbols;
        self
    }

    pub fn merged(&self) -> Option<&Pattern> {
        self.merged.as_ref()
    }

    async fn run(&mut self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(EngineError::invalid(
                "sourceStates",
                "at least one source state is required",
            ));
        }
        // All arithmetic happens before the first insert so a degenerate
        // input persists nothing.
        let mut normalized = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            check_dimension(source, DIMENSION)?;
            normalized.push(normalize(source)?);
        }
        let merged_vector = merge_all(&normalized, self.phase)?;

        for (i, vector) in normalized.into_iter().enumerate() {
            let symbol = self
                .source_symbols
                .get(i)
                .map(String::as_str)
                .unwrap_or(COLLAPSED_SYMBOL);
            let intermediate = Pattern::new(vector, PatternType::Quantum, symbol);
            let id = self.ledger.persist(&intermediate).await?;
            self.intermediate_ids.push(id);
        }

        let mut merged = Pattern::new(merged_vector, PatternType::Quantum, self.symbol.as_str());
        let id = self.ledger.persist(&merged).await?;
        merged.id = Some(id);
        self.merged = Some(merged);
        Ok(())
    }
}

#[async_trait]
impl PatternCommand for MergeCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Merge
    }

    async fn execute(&mut self) -> Result<()> {
        self.ledger.begin_execute(CommandKind::Merge)?;
        self.intermediate_ids.clear();
        self.merged = None;
        let outcome = self.run().await;
        self.ledger.finish(CommandKind::Merge, outcome)
    }

    async fn undo(&mut self) -> Result<()> {
        self.ledger.rollback(CommandKind::Merge).await?;
        self.intermediate_ids.clear();
        self.merged = None;
        Ok(())
    }

    fn state(&self) -> CommandState {
        CommandState::Merge(MergeState {
            merged: self.merged.clone(),
            id: self.merged.as_ref().and_then(|p| p.id),
            intermediate_ids: self.intermediate_ids.clone(),
            phase: self.phase,
            cube_projection: cube_of(self.merged.as_ref()),
        })
    }

    fn recorded_ids(&self) -> &[PatternId] {
        self.ledger.ids()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.ledger.lifecycle()
    }
}
