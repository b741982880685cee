//! Ledger selection by environment.

use std::collections::BTreeMap;
use std::sync::Arc;

use stagerun_state::ExecutionLedger;
use stagerun_types::ids::EnvName;

/// Maps each environment to the ledger its runs are recorded in.
#[derive(Default, Clone)]
pub struct LedgerRegistry {
    ledgers: BTreeMap<EnvName, Arc<dyn ExecutionLedger>>,
}

impl std::fmt::Debug for LedgerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerRegistry")
            .field("environments", &self.ledgers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LedgerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a single environment.
    #[must_use]
    pub fn single(env: impl Into<EnvName>, ledger: Arc<dyn ExecutionLedger>) -> Self {
        let mut registry = Self::new();
        registry.insert(env, ledger);
        registry
    }

    /// Add or replace the ledger for `env`.
    pub fn insert(&mut self, env: impl Into<EnvName>, ledger: Arc<dyn ExecutionLedger>) {
        self.ledgers.insert(env.into(), ledger);
    }

    #[must_use]
    pub fn get(&self, env: &EnvName) -> Option<Arc<dyn ExecutionLedger>> {
        self.ledgers.get(env).cloned()
    }

    pub fn environments(&self) -> impl Iterator<Item = &EnvName> {
        self.ledgers.keys()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}
