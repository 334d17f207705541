//! Explicit capability table for privileged ledger operations.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use zap_core::{Address, MarketConfig};

use crate::error::{LedgerError, LedgerResult};

/// A capability an address can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May escrow, release and return holders' dots.
    EscrowAgent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EscrowAgent => write!(f, "an escrow agent"),
        }
    }
}

/// Which addresses hold which roles. Fixed once the ledger is built.
#[derive(Debug, Clone, Default)]
pub struct Roles {
    grants: HashMap<Address, HashSet<Role>>,
}

impl Roles {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` to `address`.
    #[must_use]
    pub fn with(mut self, address: Address, role: Role) -> Self {
        self.grants.entry(address).or_default().insert(role);
        self
    }

    /// Table with every escrow agent named in `config`.
    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        config
            .escrow_agents()
            .into_iter()
            .fold(Self::new(), |roles, agent| roles.with(agent, Role::EscrowAgent))
    }

    /// Whether `address` holds `role`.
    #[must_use]
    pub fn has(&self, address: &Address, role: Role) -> bool {
        self.grants
            .get(address)
            .is_some_and(|roles| roles.contains(&role))
    }

    /// Fail unless `address` holds `role`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Unauthorized` if the role is missing.
    pub fn require(&self, address: &Address, role: Role) -> LedgerResult<()> {
        if self.has(address, role) {
            Ok(())
        } else {
            Err(LedgerError::unauthorized(address, role.to_string()))
        }
    }
}
