// Static buy ladder and tolerance-based level matching

use crate::error::{LadderError, LadderResult};

/// True when two prices are within `tolerance` of each other.
///
/// Symmetric by construction. The tolerance absorbs exchange-side rounding and
/// is only ever used for matching, never for price arithmetic.
pub fn prices_match(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

/// Round a price to `decimals` places for order submission
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// The configured price levels, highest first
#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    levels: Vec<f64>,
    tolerance: f64,
}

impl Ladder {
    /// Build a ladder, rejecting levels that are unordered or close enough for
    /// a single price to match two of them.
    pub fn new(levels: Vec<f64>, tolerance: f64) -> LadderResult<Self> {
        if !(tolerance > 0.0) {
            return Err(LadderError::ConfigValidation(
                "match_tolerance must be positive".to_string(),
            ));
        }

        if levels.is_empty() {
            return Err(LadderError::ConfigValidation(
                "buy_levels must contain at least one price".to_string(),
            ));
        }

        if let Some(bad) = levels.iter().find(|p| !(**p > 0.0) || !p.is_finite()) {
            return Err(LadderError::ConfigValidation(format!(
                "buy level {} must be a positive finite price", bad
            )));
        }

        for pair in levels.windows(2) {
            if pair[1] >= pair[0] {
                return Err(LadderError::ConfigValidation(format!(
                    "buy_levels must be strictly descending ({} then {})", pair[0], pair[1]
                )));
            }
            if pair[0] - pair[1] <= 2.0 * tolerance {
                return Err(LadderError::ConfigValidation(format!(
                    "buy levels {} and {} are within twice the match tolerance", pair[0], pair[1]
                )));
            }
        }

        Ok(Self { levels, tolerance })
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn price_at(&self, level: usize) -> LadderResult<f64> {
        self.levels
            .get(level)
            .copied()
            .ok_or(LadderError::InvalidLevel { level, len: self.levels.len() })
    }

    pub fn matches(&self, price: f64, level_price: f64) -> bool {
        prices_match(price, level_price, self.tolerance)
    }

    /// Index of the level `price` sits at, if any
    pub fn level_for_price(&self, price: f64) -> Option<usize> {
        self.levels.iter().position(|&level| self.matches(price, level))
    }

    /// Levels with no matching price among `existing`, in ladder order
    pub fn missing_levels<I>(&self, existing: I) -> Vec<usize>
    where
        I: IntoIterator<Item = f64>,
    {
        let existing: Vec<f64> = existing.into_iter().collect();
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, &level)| !existing.iter().any(|&p| self.matches(p, level)))
            .map(|(i, _)| i)
            .collect()
    }
}
