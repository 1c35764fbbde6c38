//! ground-truth coefficient vectors
//!
//! three ways to lay out `s` significant variables among `p` covariates.
//! entries equal to exactly 1 are the "strongly significant" ones the
//! retention scorer counts.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use crate::error::{SimError, Result};

/// how the true signal is spread across the covariates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BetaPattern {
    /// ones at evenly spaced positions over 1..=p
    EquallySpaced,
    /// ones in the first s slots
    LeadingBlock,
    /// ones in the first s slots then value^k trailing off
    WeakDecay { value: f64 },
}

impl Default for BetaPattern {
    fn default() -> Self {
        Self::EquallySpaced
    }
}

impl BetaPattern {
    /// build the coefficient vector for this pattern
    pub fn generate(&self, p: usize, s: usize) -> Result<Array1<f64>> {
        match *self {
            Self::EquallySpaced => equally_spaced(p, s),
            Self::LeadingBlock => leading_block(p, s),
            Self::WeakDecay { value } => weak_decay(p, s, value),
        }
    }

    /// is the resulting beta 0/1 valued? identification only means something if so
    pub fn is_binary(&self) -> bool {
        !matches!(self, Self::WeakDecay { .. })
    }
}

fn check_sparsity(p: usize, s: usize) -> Result<()> {
    if s > p {
        return Err(SimError::invalid_parameter(
            "sparsity",
            format!("{} (exceeds p = {})", s, p),
        ));
    }
    Ok(())
}

/// ones at `round(seq(1, p, length.out = s))`, ties rounded to even.
///
/// Positions that round to the same index collapse into a single one, so the
/// count of ones can fall below `s`. Callers that need the exact support size
/// should count the ones rather than trust `s`.
pub fn equally_spaced(p: usize, s: usize) -> Result<Array1<f64>> {
    check_sparsity(p, s)?;

    let mut beta = Array1::zeros(p);
    if s == 0 {
        return Ok(beta);
    }

    let step = if s > 1 {
        (p as f64 - 1.0) / (s as f64 - 1.0)
    } else {
        0.0
    };

    for k in 0..s {
        let position = (1.0 + k as f64 * step).round_ties_even() as usize;
        // 1-based -> 0-based
        beta[position.clamp(1, p) - 1] = 1.0;
    }

    Ok(beta)
}

/// first `s` entries are 1, everything after is 0
pub fn leading_block(p: usize, s: usize) -> Result<Array1<f64>> {
    check_sparsity(p, s)?;
    Ok(Array1::from_shape_fn(p, |i| if i < s { 1.0 } else { 0.0 }))
}

/// first `s` entries are 1, then `value^1, value^2, ..., value^(p-s)`
pub fn weak_decay(p: usize, s: usize, value: f64) -> Result<Array1<f64>> {
    check_sparsity(p, s)?;

    if p <= s {
        return Err(SimError::invalid_parameter(
            "sparsity",
            format!("{} (leaves no room for a decay tail with p = {})", s, p),
        ));
    }

    if !(value > 0.0 && value < 1.0) {
        return Err(SimError::invalid_parameter("decay value", value));
    }

    Ok(Array1::from_shape_fn(p, |i| {
        if i < s {
            1.0
        } else {
            value.powi((i - s + 1) as i32)
        }
    }))
}
