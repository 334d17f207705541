//! Marketplace configuration.
//!
//! Names the fixed identities components act under and the pricing strategy.
//! Loaded once at startup; nothing here is rebound at runtime.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::Address;
use crate::error::{CoreError, CoreResult};
use crate::pricing::PricingMode;

/// Startup configuration for a marketplace instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Account the ledger holds bonded tokens in.
    pub custody: Address,
    /// Escrow-agent identity of the query dispatcher.
    pub dispatch_agent: Address,
    /// Escrow-agent identity of the subscription manager.
    pub subscription_agent: Address,
    /// Additional escrow agents (e.g. external settlement services).
    pub extra_escrow_agents: Vec<Address>,
    /// Pricing strategy.
    pub pricing: PricingMode,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            custody: Address::new("zap-ledger"),
            dispatch_agent: Address::new("zap-dispatch"),
            subscription_agent: Address::new("zap-subscriptions"),
            extra_escrow_agents: Vec::new(),
            pricing: PricingMode::Standard,
        }
    }
}

impl MarketConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if the JSON is malformed or fails validation.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), pricing = %config.pricing, "loaded market config");
        Ok(config)
    }

    /// Every escrow agent this configuration authorizes.
    #[must_use]
    pub fn escrow_agents(&self) -> Vec<Address> {
        let mut agents = vec![self.dispatch_agent.clone(), self.subscription_agent.clone()];
        agents.extend(self.extra_escrow_agents.iter().cloned());
        agents
    }

    /// Check that the configured identities are distinct.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if the custody account doubles as an escrow
    /// agent or an agent is listed twice.
    pub fn validate(&self) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for agent in self.escrow_agents() {
            if agent == self.custody {
                return Err(CoreError::Config(format!(
                    "custody account {agent} cannot also be an escrow agent"
                )));
            }
            if !seen.insert(agent.clone()) {
                return Err(CoreError::Config(format!("escrow agent {agent} listed twice")));
            }
        }
        Ok(())
    }
}
