//! Endpoint registry collaborator.
//!
//! The registry owns the mapping from (provider, endpoint) to its bonding
//! curve and optional broker. The ledger reads curves through the
//! [`Registry`] trait and asks it to drop a curve once nothing is issued.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use zap_core::{Address, Curve, Endpoint, EndpointKey};

use crate::error::{LedgerError, LedgerResult};

/// Read access to registered curves, plus curve removal.
pub trait Registry: Send + Sync {
    /// The curve for an endpoint, if one is registered.
    fn curve(&self, key: &EndpointKey) -> Option<Arc<Curve>>;

    /// The broker allowed to bond to an endpoint, if restricted.
    fn broker(&self, key: &EndpointKey) -> Option<Address>;

    /// Remove an endpoint's curve. Returns `false` if none was registered.
    fn clear_curve(&self, key: &EndpointKey) -> bool;
}

/// Registration details for one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    /// Pricing curve.
    pub curve: Arc<Curve>,
    /// Broker gating bonds, if any.
    pub broker: Option<Address>,
}

/// An in-process registry.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    endpoints: RwLock<HashMap<EndpointKey, EndpointRecord>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a curve for `provider`'s `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::CurveExists` if the endpoint already has a curve.
    pub fn initiate_endpoint(
        &self,
        provider: &Address,
        endpoint: &Endpoint,
        curve: Curve,
        broker: Option<Address>,
    ) -> LedgerResult<()> {
        let key = EndpointKey::new(provider, endpoint);
        let mut endpoints = self.endpoints.write();
        if endpoints.contains_key(&key) {
            return Err(LedgerError::CurveExists(key));
        }
        info!(
            endpoint = %key,
            pieces = curve.pieces().len(),
            dot_limit = curve.dot_limit(),
            broker = ?broker.as_ref().map(Address::as_str),
            "endpoint registered"
        );
        endpoints.insert(
            key,
            EndpointRecord {
                curve: Arc::new(curve),
                broker,
            },
        );
        Ok(())
    }

    /// Endpoints registered by `provider`, sorted by name.
    #[must_use]
    pub fn endpoints(&self, provider: &Address) -> Vec<Endpoint> {
        let mut names: Vec<Endpoint> = self
            .endpoints
            .read()
            .keys()
            .filter(|key| &key.provider == provider)
            .map(|key| key.endpoint.clone())
            .collect();
        names.sort();
        names
    }

    /// Full registration record for an endpoint.
    #[must_use]
    pub fn record(&self, key: &EndpointKey) -> Option<EndpointRecord> {
        self.endpoints.read().get(key).cloned()
    }
}

impl Registry for InMemoryRegistry {
    fn curve(&self, key: &EndpointKey) -> Option<Arc<Curve>> {
        self.endpoints.read().get(key).map(|r| Arc::clone(&r.curve))
    }

    fn broker(&self, key: &EndpointKey) -> Option<Address> {
        self.endpoints.read().get(key).and_then(|r| r.broker.clone())
    }

    fn clear_curve(&self, key: &EndpointKey) -> bool {
        self.endpoints.write().remove(key).is_some()
    }
}
