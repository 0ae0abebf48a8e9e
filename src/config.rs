//! Fork tree configuration

use crate::constants::{CUTOFF_AGE, DEFAULT_SEARCH_BUDGET};
use crate::error::{LedgerError, Result};
use crate::selection::SelectionStrategy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// A block at depth `d` is accepted only if `d + cutoff_age > max_depth`
    pub cutoff_age: u64,
    /// Selector used to connect block transactions
    pub block_selection: SelectionStrategy,
    /// Node budget for the max-fee selector; `None` searches exhaustively
    pub search_budget: Option<usize>,
    /// Drop pools of nodes that can no longer be extended
    pub prune_stale_nodes: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cutoff_age: CUTOFF_AGE,
            block_selection: SelectionStrategy::Greedy,
            search_budget: Some(DEFAULT_SEARCH_BUDGET),
            prune_stale_nodes: false,
        }
    }
}

impl ChainConfig {
    /// Parse a JSON document; absent fields take their default.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ChainConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cutoff_age == 0 {
            return Err(LedgerError::Config("cutoff_age must be positive".to_string()));
        }
        if self.search_budget == Some(0) {
            return Err(LedgerError::Config("search_budget must be positive".to_string()));
        }
        Ok(())
    }
}
