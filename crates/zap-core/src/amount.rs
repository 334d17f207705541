//! Token amount type.
//!
//! Amounts are counted in indivisible base units of the bonding token. Curve
//! prices are summed across thousands of positions, so the representation is
//! 128 bits wide and every arithmetic helper is checked.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::CoreError;

/// Number of decimal places of the bonding token.
pub const DECIMALS: u32 = 18;

/// One whole token in base units.
pub const BASE_UNITS_PER_TOKEN: u128 = 10u128.pow(DECIMALS);

/// An amount of the bonding token, in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    /// Zero amount constant.
    pub const ZERO: Self = Self(0);

    /// Maximum representable amount.
    pub const MAX: Self = Self(u128::MAX);

    /// Creates an amount from base units.
    #[must_use]
    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// Creates an amount from whole tokens. Returns `None` on overflow.
    #[must_use]
    pub const fn from_tokens(tokens: u128) -> Option<Self> {
        match tokens.checked_mul(BASE_UNITS_PER_TOKEN) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns the amount in base units.
    #[must_use]
    pub const fn base_units(self) -> u128 {
        self.0
    }

    /// Checked addition. Returns `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. Returns `None` on underflow.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Returns true if this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(units: u128) -> Self {
        Self(units)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(u128::from(units))
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('-') {
            return Err(CoreError::InvalidAmount("negative values not allowed".into()));
        }
        let digits: String = s.chars().filter(|c| *c != '_').collect();
        digits
            .parse::<u128>()
            .map(Amount)
            .map_err(|_| CoreError::InvalidAmount(format!("invalid number: {s}")))
    }
}

// Serialized as a decimal string: JSON consumers cannot hold 128-bit numbers.
impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
