//! Participant addresses and endpoint identifiers.
//!
//! An [`Address`] names any actor in the marketplace: providers, holders,
//! brokers, escrow agents and the ledger's own custody account. Addresses are
//! opaque strings; [`Address::generate`] produces a random base58 identifier.

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Number of random bytes behind a generated address.
const GENERATED_ADDRESS_BYTES: usize = 20;

/// An actor in the marketplace.
///
/// Deserialization goes through [`Address::parse`], so configuration and wire
/// input can never produce an empty address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Create an address from a known-good label such as a string literal or
    /// a test fixture name.
    ///
    /// Anything read from configuration, files or callers must go through
    /// [`Address::parse`] instead.
    ///
    /// # Panics
    ///
    /// Panics if the label is empty.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        assert!(!label.is_empty(), "address must not be empty");
        Self(label)
    }

    /// Parse an address from untrusted input.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidAddress` if the input is empty or contains whitespace.
    pub fn parse(s: &str) -> CoreResult<Self> {
        if s.is_empty() {
            return Err(CoreError::InvalidAddress("address is empty".into()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidAddress(format!(
                "address contains whitespace: {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Generate a fresh random address.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; GENERATED_ADDRESS_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bs58::encode(bytes).into_string())
    }

    /// Get the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A named data feed offered by a provider (the "specifier").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create an endpoint specifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the specifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one priced endpoint: a (provider, endpoint) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    /// The provider offering the endpoint.
    pub provider: Address,
    /// The endpoint specifier.
    pub endpoint: Endpoint,
}

impl EndpointKey {
    /// Create a key for a provider's endpoint.
    #[must_use]
    pub fn new(provider: &Address, endpoint: &Endpoint) -> Self {
        Self {
            provider: provider.clone(),
            endpoint: endpoint.clone(),
        }
    }

    /// Extend the key with a holder, yielding a balance key.
    #[must_use]
    pub fn holder(&self, holder: &Address) -> HolderKey {
        HolderKey {
            holder: holder.clone(),
            provider: self.provider.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.endpoint)
    }
}

/// Identifies one holder's balance on one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HolderKey {
    /// The dot holder.
    pub holder: Address,
    /// The provider the dots are bonded to.
    pub provider: Address,
    /// The endpoint the dots are bonded to.
    pub endpoint: Endpoint,
}

impl HolderKey {
    /// The (provider, endpoint) part of this key.
    #[must_use]
    pub fn endpoint_key(&self) -> EndpointKey {
        EndpointKey::new(&self.provider, &self.endpoint)
    }
}
