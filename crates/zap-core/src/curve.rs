//! Piecewise bonding curves.
//!
//! A [`Curve`] maps an issuance position (the n-th dot ever sold on an
//! endpoint, counting from 1) to the marginal price of that dot. It is a
//! contiguous run of [`Piece`]s: the first covers `1..=bound₀`, the next
//! `bound₀+1..=bound₁`, and so on.
//!
//! Evaluation is exact integer arithmetic. Each [`Formula`] kind has its own
//! rounding rule:
//!
//! - [`Formula::Polynomial`] computes `⌊(c₀ + c₁x + c₂x² + c₃x³) / divisor⌋`
//! - [`Formula::Logarithmic`] computes `constant + coefficient · ⌈log₂ x⌉`
//!
//! Curves are validated at construction (including deserialization), so a
//! `Curve` value is never degenerate.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult};

/// Maximum number of polynomial coefficients (degree ≤ 3).
pub const MAX_POLYNOMIAL_TERMS: usize = 4;

const fn default_divisor() -> u64 {
    1
}

/// Price formula for one piece of a curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formula {
    /// `⌊(c₀ + c₁x + c₂x² + c₃x³) / divisor⌋`, coefficients listed from `c₀`.
    Polynomial {
        /// Coefficients in ascending power order.
        coefficients: Vec<u64>,
        /// Divisor applied after evaluation (truncating).
        #[serde(default = "default_divisor")]
        divisor: u64,
    },
    /// `constant + coefficient · ⌈log₂ x⌉`.
    Logarithmic {
        /// Multiplier of the rounded-up logarithm.
        coefficient: u64,
        /// Flat price added to every position.
        #[serde(default)]
        constant: u64,
    },
}

impl Formula {
    /// A flat price.
    #[must_use]
    pub fn constant(price: u64) -> Self {
        Self::polynomial(vec![price])
    }

    /// `start + mul·x`.
    #[must_use]
    pub fn linear(start: u64, mul: u64) -> Self {
        Self::polynomial(vec![start, mul])
    }

    /// `start + mul·x²`.
    #[must_use]
    pub fn quadratic(start: u64, mul: u64) -> Self {
        Self::polynomial(vec![start, 0, mul])
    }

    /// A polynomial with divisor 1.
    #[must_use]
    pub fn polynomial(coefficients: Vec<u64>) -> Self {
        Self::Polynomial {
            coefficients,
            divisor: 1,
        }
    }

    /// `constant + coefficient · ⌈log₂ x⌉`.
    #[must_use]
    pub const fn logarithmic(coefficient: u64, constant: u64) -> Self {
        Self::Logarithmic {
            coefficient,
            constant,
        }
    }

    fn validate(&self) -> CoreResult<()> {
        match self {
            Self::Polynomial {
                coefficients,
                divisor,
            } => {
                if coefficients.is_empty() {
                    return Err(CoreError::invalid_curve("polynomial has no coefficients"));
                }
                if coefficients.len() > MAX_POLYNOMIAL_TERMS {
                    return Err(CoreError::invalid_curve(format!(
                        "polynomial degree {} exceeds {}",
                        coefficients.len() - 1,
                        MAX_POLYNOMIAL_TERMS - 1
                    )));
                }
                if coefficients.iter().all(|c| *c == 0) {
                    return Err(CoreError::invalid_curve("polynomial is identically zero"));
                }
                if *divisor == 0 {
                    return Err(CoreError::invalid_curve("polynomial divisor is zero"));
                }
            }
            Self::Logarithmic {
                coefficient,
                constant,
            } => {
                if *coefficient == 0 && *constant == 0 {
                    return Err(CoreError::invalid_curve("logarithm is identically zero"));
                }
            }
        }
        Ok(())
    }

    /// Price of the dot at `position` under this formula.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Overflow` if the price does not fit in 128 bits.
    pub fn evaluate(&self, position: u64) -> CoreResult<Amount> {
        let x = u128::from(position);
        match self {
            Self::Polynomial {
                coefficients,
                divisor,
            } => {
                // Horner form: every intermediate is bounded by the final value.
                let mut acc: u128 = 0;
                for c in coefficients.iter().rev() {
                    acc = acc
                        .checked_mul(x)
                        .and_then(|v| v.checked_add(u128::from(*c)))
                        .ok_or_else(|| {
                            CoreError::overflow(format!("polynomial at position {position}"))
                        })?;
                }
                Ok(Amount::from_base_units(acc / u128::from(*divisor)))
            }
            Self::Logarithmic {
                coefficient,
                constant,
            } => {
                let log = u128::from(ceil_log2(position));
                let price = u128::from(*coefficient)
                    .checked_mul(log)
                    .and_then(|v| v.checked_add(u128::from(*constant)))
                    .ok_or_else(|| {
                        CoreError::overflow(format!("logarithm at position {position}"))
                    })?;
                Ok(Amount::from_base_units(price))
            }
        }
    }
}

/// `⌈log₂ x⌉` for `x ≥ 1`; zero for `x ≤ 1`.
#[must_use]
pub const fn ceil_log2(x: u64) -> u32 {
    if x <= 1 {
        0
    } else {
        u64::BITS - (x - 1).leading_zeros()
    }
}

/// One contiguous segment of a curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    /// Price formula for positions in this piece.
    pub formula: Formula,
    /// Inclusive upper bound of this piece's domain.
    pub upper_bound: u64,
}

impl Piece {
    /// Create a piece.
    #[must_use]
    pub const fn new(formula: Formula, upper_bound: u64) -> Self {
        Self {
            formula,
            upper_bound,
        }
    }
}

/// A validated piecewise bonding curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Piece>", into = "Vec<Piece>")]
pub struct Curve {
    pieces: Vec<Piece>,
}

impl Curve {
    /// Build a curve from pieces listed in ascending domain order.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidCurve` if there are no pieces, the first
    /// bound is zero, bounds are not strictly increasing, or any formula is
    /// degenerate.
    pub fn new(pieces: Vec<Piece>) -> CoreResult<Self> {
        if pieces.is_empty() {
            return Err(CoreError::invalid_curve("curve has no pieces"));
        }
        let mut previous = 0u64;
        for (index, piece) in pieces.iter().enumerate() {
            if piece.upper_bound <= previous {
                return Err(CoreError::invalid_curve(format!(
                    "piece {index} bound {} does not extend past {previous}",
                    piece.upper_bound
                )));
            }
            piece.formula.validate()?;
            previous = piece.upper_bound;
        }
        Ok(Self { pieces })
    }

    /// A curve with a single piece covering `1..=upper_bound`.
    ///
    /// # Errors
    ///
    /// Same as [`Curve::new`].
    pub fn single(formula: Formula, upper_bound: u64) -> CoreResult<Self> {
        Self::new(vec![Piece::new(formula, upper_bound)])
    }

    /// Decode the flat piecewise encoding
    /// `[n, c₀, …, cₙ₋₁, bound, n, c₀, …, bound, …]` of polynomial pieces.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidCurve` if the encoding is truncated or the
    /// decoded curve is invalid.
    pub fn from_flat(encoded: &[u64]) -> CoreResult<Self> {
        let mut pieces = Vec::new();
        let mut rest = encoded;
        while let Some((&terms, tail)) = rest.split_first() {
            let terms = usize::try_from(terms)
                .ok()
                .filter(|n| *n <= MAX_POLYNOMIAL_TERMS)
                .ok_or_else(|| {
                    CoreError::invalid_curve(format!(
                        "piece {} declares {terms} terms, at most {MAX_POLYNOMIAL_TERMS} allowed",
                        pieces.len()
                    ))
                })?;
            if tail.len() < terms + 1 {
                return Err(CoreError::invalid_curve(format!(
                    "piece {} truncated: expected {} values, found {}",
                    pieces.len(),
                    terms + 1,
                    tail.len()
                )));
            }
            let (coefficients, tail) = tail.split_at(terms);
            let (&upper_bound, tail) = tail
                .split_first()
                .ok_or_else(|| CoreError::invalid_curve("missing piece bound"))?;
            pieces.push(Piece::new(
                Formula::polynomial(coefficients.to_vec()),
                upper_bound,
            ));
            rest = tail;
        }
        Self::new(pieces)
    }

    /// The pieces of this curve, in ascending order.
    #[must_use]
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// The last position this curve prices: the most dots that can ever be
    /// issued against it.
    #[must_use]
    pub fn dot_limit(&self) -> u64 {
        self.pieces.last().map_or(0, |p| p.upper_bound)
    }

    /// Locate the piece covering `position`, with that piece's inclusive
    /// lower bound. The first piece whose bound reaches `position` wins.
    #[must_use]
    pub fn piece_at(&self, position: u64) -> Option<(u64, &Piece)> {
        if position == 0 {
            return None;
        }
        let mut lower = 1u64;
        for piece in &self.pieces {
            if position <= piece.upper_bound {
                return Some((lower, piece));
            }
            lower = piece.upper_bound.saturating_add(1);
        }
        None
    }

    /// The error reported for a position outside the curve.
    #[must_use]
    pub fn undefined_at(&self, position: u64) -> CoreError {
        CoreError::CurveUndefined {
            position,
            limit: self.dot_limit(),
        }
    }
}

impl TryFrom<Vec<Piece>> for Curve {
    type Error = CoreError;

    fn try_from(pieces: Vec<Piece>) -> Result<Self, Self::Error> {
        Self::new(pieces)
    }
}

impl From<Curve> for Vec<Piece> {
    fn from(curve: Curve) -> Self {
        curve.pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 0 ; "one")]
    #[test_case(2, 1 ; "two")]
    #[test_case(3, 2 ; "three rounds up")]
    #[test_case(4, 2 ; "four exact")]
    #[test_case(5, 3 ; "five rounds up")]
    #[test_case(1024, 10 ; "power of two")]
    #[test_case(1025, 11 ; "just past power of two")]
    fn ceil_log2_values(x: u64, expected: u32) {
        assert_eq!(ceil_log2(x), expected);
    }

    #[test]
    fn polynomial_evaluates_exactly() {
        // 3 + 2x + x³ at x = 4 → 3 + 8 + 64
        let f = Formula::polynomial(vec![3, 2, 0, 1]);
        assert_eq!(f.evaluate(4).ok(), Some(Amount::from(75u64)));
    }

    #[test]
    fn polynomial_divisor_truncates() {
        let f = Formula::Polynomial {
            coefficients: vec![0, 1],
            divisor: 3,
        };
        assert_eq!(f.evaluate(5).ok(), Some(Amount::from(1u64)));
        assert_eq!(f.evaluate(6).ok(), Some(Amount::from(2u64)));
    }

    #[test]
    fn logarithm_rounds_up() {
        let f = Formula::logarithmic(10, 1);
        assert_eq!(f.evaluate(1).ok(), Some(Amount::from(1u64)));
        assert_eq!(f.evaluate(3).ok(), Some(Amount::from(21u64)));
        assert_eq!(f.evaluate(4).ok(), Some(Amount::from(21u64)));
        assert_eq!(f.evaluate(5).ok(), Some(Amount::from(31u64)));
    }

    #[test]
    fn cubic_overflow_is_reported() {
        let f = Formula::polynomial(vec![0, 0, 0, u64::MAX]);
        assert!(matches!(f.evaluate(u64::MAX), Err(CoreError::Overflow(_))));
    }

    #[test]
    fn trailing_zero_terms_do_not_overflow() {
        let f = Formula::polynomial(vec![0, 1, 0, 0]);
        assert_eq!(f.evaluate(u64::MAX).ok(), Some(Amount::from(u64::MAX)));
    }

    #[test_case(vec![] ; "no pieces")]
    #[test_case(vec![Piece::new(Formula::constant(1), 0)] ; "zero bound")]
    #[test_case(vec![Piece::new(Formula::constant(1), 10), Piece::new(Formula::constant(1), 10)] ; "repeated bound")]
    #[test_case(vec![Piece::new(Formula::polynomial(vec![]), 10)] ; "empty polynomial")]
    #[test_case(vec![Piece::new(Formula::polynomial(vec![1, 1, 1, 1, 1]), 10)] ; "degree four")]
    #[test_case(vec![Piece::new(Formula::polynomial(vec![0, 0]), 10)] ; "all zero")]
    #[test_case(vec![Piece::new(Formula::logarithmic(0, 0), 10)] ; "zero logarithm")]
    #[test_case(vec![Piece::new(Formula::Polynomial { coefficients: vec![1], divisor: 0 }, 10)] ; "zero divisor")]
    fn degenerate_curves_rejected(pieces: Vec<Piece>) {
        assert!(matches!(
            Curve::new(pieces),
            Err(CoreError::InvalidCurve { .. })
        ));
    }

    #[test]
    fn piece_lookup_first_match_wins() {
        let curve = Curve::new(vec![
            Piece::new(Formula::constant(1), 10),
            Piece::new(Formula::constant(2), 20),
        ])
        .expect("valid curve");

        assert!(curve.piece_at(0).is_none());
        assert_eq!(curve.piece_at(1).map(|(lo, _)| lo), Some(1));
        assert_eq!(curve.piece_at(10).map(|(lo, _)| lo), Some(1));
        assert_eq!(curve.piece_at(11).map(|(lo, _)| lo), Some(11));
        assert_eq!(curve.piece_at(20).map(|(lo, _)| lo), Some(11));
        assert!(curve.piece_at(21).is_none());
        assert_eq!(curve.dot_limit(), 20);
    }

    #[test]
    fn flat_encoding_decodes() {
        // 2x² on [1, 100], then 5 + x on [101, 200]
        let curve = Curve::from_flat(&[3, 0, 0, 2, 100, 2, 5, 1, 200]).expect("decode");
        assert_eq!(curve.pieces().len(), 2);
        assert_eq!(curve.pieces()[0].formula, Formula::quadratic(0, 2));
        assert_eq!(curve.pieces()[1].formula, Formula::linear(5, 1));
        assert_eq!(curve.dot_limit(), 200);
    }

    #[test]
    fn flat_encoding_rejects_truncation() {
        assert!(Curve::from_flat(&[3, 0, 0]).is_err());
        assert!(Curve::from_flat(&[]).is_err());
        assert!(Curve::from_flat(&[u64::MAX]).is_err());
        assert!(Curve::from_flat(&[5, 1, 1, 1, 1, 1, 10]).is_err());
    }

    #[test]
    fn deserialization_validates() {
        let good = r#"[{"formula":{"kind":"polynomial","coefficients":[0,0,2]},"upper_bound":100}]"#;
        let curve: Curve = serde_json::from_str(good).expect("valid curve");
        assert_eq!(curve.dot_limit(), 100);

        let bad = r#"[{"formula":{"kind":"logarithmic","coefficient":0},"upper_bound":100}]"#;
        assert!(serde_json::from_str::<Curve>(bad).is_err());
    }
}
