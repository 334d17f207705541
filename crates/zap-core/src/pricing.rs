//! Bonding-curve pricing engines.
//!
//! [`PricingEngine`] is the strategy interface the ledger prices bonds and
//! unbonds through. Two engines are provided and must agree bit for bit:
//!
//! - [`StandardPricing`] sums the price of every dot in the run.
//! - [`ClosedFormPricing`] uses power-sum identities for polynomial pieces
//!   (divisor 1), so pricing a run costs O(pieces) instead of O(dots). Pieces
//!   it cannot sum in closed form are priced dot by dot.
//!
//! All engines are pure and safe to share between threads.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::amount::Amount;
use crate::curve::{Curve, Formula};
use crate::error::{CoreError, CoreResult};

/// Strategy for pricing dots along a curve.
pub trait PricingEngine: Send + Sync + fmt::Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Price of the dot at issuance `position` (1-based).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CurveUndefined` if `position` lies outside the
    /// curve, or `CoreError::Overflow` if the price does not fit.
    fn cost_of_dot_at(&self, curve: &Curve, position: u64) -> CoreResult<Amount> {
        let (_, piece) = curve
            .piece_at(position)
            .ok_or_else(|| curve.undefined_at(position))?;
        piece.formula.evaluate(position)
    }

    /// Total price of `count` consecutive dots starting at `start`.
    ///
    /// Equal to `Σ cost_of_dot_at(curve, start + i)` for `i` in `0..count`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CurveUndefined` if any position in the run lies
    /// outside the curve, or `CoreError::Overflow` if the total does not fit.
    fn cost_of_run(&self, curve: &Curve, start: u64, count: u64) -> CoreResult<Amount>;
}

/// Inclusive `[first, last]` positions of a run, validated against the curve.
/// `None` for an empty run.
fn run_bounds(curve: &Curve, start: u64, count: u64) -> CoreResult<Option<(u64, u64)>> {
    if count == 0 {
        return Ok(None);
    }
    if start == 0 {
        return Err(curve.undefined_at(0));
    }
    let last = start
        .checked_add(count - 1)
        .ok_or_else(|| curve.undefined_at(u64::MAX))?;
    let limit = curve.dot_limit();
    if last > limit {
        return Err(curve.undefined_at(start.max(limit.saturating_add(1))));
    }
    Ok(Some((start, last)))
}

fn add(acc: Amount, price: Amount) -> CoreResult<Amount> {
    acc.checked_add(price)
        .ok_or_else(|| CoreError::overflow("cost of run"))
}

/// Sums per-dot prices over `[first, last]`, all inside one formula's domain.
fn sum_each(formula: &Formula, first: u64, last: u64) -> CoreResult<Amount> {
    let mut total = Amount::ZERO;
    for position in first..=last {
        total = add(total, formula.evaluate(position)?)?;
    }
    Ok(total)
}

/// Prices every dot individually.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPricing;

impl PricingEngine for StandardPricing {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn cost_of_run(&self, curve: &Curve, start: u64, count: u64) -> CoreResult<Amount> {
        let Some((first, last)) = run_bounds(curve, start, count)? else {
            return Ok(Amount::ZERO);
        };
        let mut total = Amount::ZERO;
        for position in first..=last {
            total = add(total, self.cost_of_dot_at(curve, position)?)?;
        }
        Ok(total)
    }
}

/// Sums polynomial pieces with Faulhaber's formulas.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosedFormPricing;

impl ClosedFormPricing {
    /// `Σ_{x=1}^{n} x^k` for `k ≤ 3`, or `None` on overflow.
    fn power_sum(k: usize, n: u64) -> Option<u128> {
        let n = u128::from(n);
        match k {
            0 => Some(n),
            1 => Self::triangular(n),
            2 => {
                // n(n+1)(2n+1) is always divisible by 6.
                let product = n.checked_mul(n + 1)?.checked_mul(2 * n + 1)?;
                Some(product / 6)
            }
            3 => {
                let t = Self::triangular(n)?;
                t.checked_mul(t)
            }
            _ => None,
        }
    }

    fn triangular(n: u128) -> Option<u128> {
        if n % 2 == 0 {
            (n / 2).checked_mul(n + 1)
        } else {
            n.checked_mul((n + 1) / 2)
        }
    }

    /// `Σ_{x=first}^{last} Σ_k c_k x^k`, or `None` on overflow.
    fn polynomial_range(coefficients: &[u64], first: u64, last: u64) -> Option<u128> {
        let mut total: u128 = 0;
        for (k, c) in coefficients.iter().enumerate() {
            if *c == 0 {
                continue;
            }
            let upper = Self::power_sum(k, last)?;
            let lower = Self::power_sum(k, first - 1)?;
            let term = u128::from(*c).checked_mul(upper.checked_sub(lower)?)?;
            total = total.checked_add(term)?;
        }
        Some(total)
    }
}

impl PricingEngine for ClosedFormPricing {
    fn name(&self) -> &'static str {
        "closed_form"
    }

    fn cost_of_run(&self, curve: &Curve, start: u64, count: u64) -> CoreResult<Amount> {
        let Some((first, last)) = run_bounds(curve, start, count)? else {
            return Ok(Amount::ZERO);
        };

        let mut total = Amount::ZERO;
        let mut lower = 1u64;
        for piece in curve.pieces() {
            let lo = first.max(lower);
            let hi = last.min(piece.upper_bound);
            lower = piece.upper_bound.saturating_add(1);
            if lo > hi {
                continue;
            }

            let closed = match &piece.formula {
                Formula::Polynomial {
                    coefficients,
                    divisor: 1,
                } => Self::polynomial_range(coefficients, lo, hi).map(Amount::from_base_units),
                _ => None,
            };
            let segment = match closed {
                Some(segment) => segment,
                None => {
                    trace!(lo, hi, "closed form unavailable, summing per dot");
                    sum_each(&piece.formula, lo, hi)?
                }
            };
            total = add(total, segment)?;

            if hi == last {
                break;
            }
        }
        Ok(total)
    }
}

/// Which [`PricingEngine`] to run, chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    /// [`StandardPricing`].
    #[default]
    Standard,
    /// [`ClosedFormPricing`].
    ClosedForm,
}

impl PricingMode {
    /// Instantiate the engine for this mode.
    #[must_use]
    pub fn engine(self) -> Arc<dyn PricingEngine> {
        match self {
            Self::Standard => Arc::new(StandardPricing),
            Self::ClosedForm => Arc::new(ClosedFormPricing),
        }
    }
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::ClosedForm => write!(f, "closed_form"),
        }
    }
}
