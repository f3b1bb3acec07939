//! Decay engine implementing the [`DecayCalculator`] trait.
//!
//! Provides the production sigmoid-based decay computation with compound
//! decay over multiple blocks using binary exponentiation.
//! All arithmetic is integer-only with u128 intermediates for overflow safety.

use rill_core::constants::{
    BPS_PRECISION, DECAY_C_THRESHOLD_PPB, DECAY_K, DECAY_POOL_RELEASE_BPS, DECAY_PRECISION,
    DECAY_R_MAX_PPB,
};
use rill_core::error::DecayError;
use rill_core::traits::DecayCalculator;

use crate::sigmoid::{sigmoid_positive, SIGMOID_PRECISION};

/// The production decay calculator using sigmoid-based rates.
///
/// Implements [`DecayCalculator`] with:
/// - Sigmoid lookup table for decay rate computation
/// - Compound decay via binary exponentiation
/// - Zero decay below the concentration threshold
#[derive(Debug, Clone, Default)]
pub struct DecayEngine;

impl DecayEngine {
    /// Create a new DecayEngine.
    pub fn new() -> Self {
        Self
    }
}

/// Fixed-point exponentiation: computes `(base/precision)^exp` in fixed-point.
///
/// Uses binary exponentiation for O(log n) multiplications.
/// `base` and return value are in fixed-point with `precision` as denominator.
fn fixed_pow(base: u64, exp: u64, precision: u64) -> Result<u64, DecayError> {
    if exp == 0 {
        return Ok(precision); // (base/precision)^0 = 1.0
    }

    let p = precision as u128;
    let mut result: u128 = p;
    let mut b: u128 = base as u128;
    let mut e = exp;

    while e > 0 {
        if e & 1 == 1 {
            result = result
                .checked_mul(b)
                .ok_or(DecayError::ArithmeticOverflow)?
                / p;
        }
        e >>= 1;
        if e > 0 {
            b = b
                .checked_mul(b)
                .ok_or(DecayError::ArithmeticOverflow)?
                / p;
        }
    }

    Ok(result as u64)
}

impl DecayCalculator for DecayEngine {
    fn decay_rate_ppb(&self, concentration_ppb: u64) -> Result<u64, DecayError> {
        // Below or at threshold: no decay
        if concentration_ppb <= DECAY_C_THRESHOLD_PPB {
            return Ok(0);
        }

        // arg = k * (C - C_threshold)
        // arg_scaled = DECAY_K * (concentration_ppb - threshold_ppb)
        // The implicit denominator is CONCENTRATION_PRECISION.
        let diff = concentration_ppb - DECAY_C_THRESHOLD_PPB;
        let arg_scaled = (DECAY_K as u128)
            .checked_mul(diff as u128)
            .ok_or(DecayError::ArithmeticOverflow)?;

        // Evaluate sigmoid (returns value in [SIGMOID_TABLE[0], SIGMOID_PRECISION])
        let sigmoid_val = sigmoid_positive(arg_scaled);

        // rate = R_MAX * sigmoid_val / SIGMOID_PRECISION
        let rate = (DECAY_R_MAX_PPB as u128)
            .checked_mul(sigmoid_val as u128)
            .ok_or(DecayError::ArithmeticOverflow)?
            / SIGMOID_PRECISION as u128;

        Ok(rate as u64)
    }

    fn compute_decay(
        &self,
        nominal_value: u64,
        concentration_ppb: u64,
        blocks_held: u64,
    ) -> Result<u64, DecayError> {
        if blocks_held == 0 || nominal_value == 0 {
            return Ok(0);
        }

        let rate = self.decay_rate_ppb(concentration_ppb)?;
        if rate == 0 {
            return Ok(0);
        }

        // Ensure rate doesn't exceed precision (would mean >100% decay per block)
        if rate >= DECAY_PRECISION {
            return Ok(nominal_value);
        }

        // retention_per_block = (DECAY_PRECISION - rate) / DECAY_PRECISION
        let retention = DECAY_PRECISION - rate;

        // Compound over blocks_held: retention_total = (retention/PRECISION)^blocks_held
        let retention_total = fixed_pow(retention, blocks_held, DECAY_PRECISION)?;

        // effective = nominal * retention_total / PRECISION
        let effective = (nominal_value as u128)
            .checked_mul(retention_total as u128)
            .ok_or(DecayError::ArithmeticOverflow)?
            / DECAY_PRECISION as u128;

        // decay = nominal - effective
        Ok(nominal_value.saturating_sub(effective as u64))
    }

    fn compute_decay_with_conduct(
        &self,
        nominal_value: u64,
        concentration_ppb: u64,
        blocks_held: u64,
        conduct_multiplier_bps: u64,
    ) -> Result<u64, DecayError> {
        if blocks_held == 0 || nominal_value == 0 {
            return Ok(0);
        }

        let base_rate = self.decay_rate_ppb(concentration_ppb)?;
        if base_rate == 0 {
            return Ok(0);
        }

        // Apply conduct multiplier: adjusted_rate = base_rate * multiplier / BPS_PRECISION
        // Use u128 to prevent overflow (base_rate up to ~1.5B, multiplier up to 100,000).
        let adjusted_rate = (base_rate as u128)
            .checked_mul(conduct_multiplier_bps as u128)
            .ok_or(DecayError::ArithmeticOverflow)?
            / BPS_PRECISION as u128;

        // Cap at DECAY_PRECISION to prevent >100% decay per block (Undertow 10× safety).
        let adjusted_rate = adjusted_rate.min(DECAY_PRECISION as u128) as u64;

        if adjusted_rate >= DECAY_PRECISION {
            return Ok(nominal_value);
        }

        // retention_per_block = (DECAY_PRECISION - adjusted_rate) / DECAY_PRECISION
        let retention = DECAY_PRECISION - adjusted_rate;

        // Compound over blocks_held
        let retention_total = fixed_pow(retention, blocks_held, DECAY_PRECISION)?;

        // effective = nominal * retention_total / PRECISION
        let effective = (nominal_value as u128)
            .checked_mul(retention_total as u128)
            .ok_or(DecayError::ArithmeticOverflow)?
            / DECAY_PRECISION as u128;

        // Invariant: decay = nominal - effective
        Ok(nominal_value.saturating_sub(effective as u64))
    }

    fn decay_pool_release(&self, pool_balance: u64) -> Result<u64, DecayError> {
        pool_balance
            .checked_mul(DECAY_POOL_RELEASE_BPS)
            .map(|v| v / BPS_PRECISION)
            .ok_or(DecayError::ArithmeticOverflow)
    }
}
