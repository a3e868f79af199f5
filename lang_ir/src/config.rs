//! Elaboration configuration

use serde::{Deserialize, Serialize};

/// Options for the heap elaboration pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElabConfig {
    /// Insert frame-condition assertions (reads/modifies membership at heap
    /// accesses, domain inclusion in shims). When disabled, each assertion
    /// collapses to its continuation.
    pub check_heap_contracts: bool,
}

impl Default for ElabConfig {
    fn default() -> Self {
        Self {
            check_heap_contracts: true,
        }
    }
}

impl ElabConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn without_contract_checks(mut self) -> Self {
        self.check_heap_contracts = false;
        self
    }
}
