// src/math/mod.rs
use primitive_types::U256;

use crate::error::EngineError;
use crate::types::SignedU256;

pub mod pnl;
pub mod rounding;

use rounding::{mul_div, Rounding};

/// USD scale: 1e30.
pub fn usd_one() -> U256 {
    U256::exp10(30)
}

/// Generic fixed-point scale for dimensionless factors: 1e18.
pub fn float_one() -> U256 {
    U256::exp10(18)
}

/// Basis-point divisor.
pub fn bps_divisor() -> U256 {
    U256::from(10_000u64)
}

/// value * factor, factor in 1e18 fixed point.
pub fn apply_factor(value: U256, factor_fp: U256) -> Result<U256, EngineError> {
    mul_div(value, factor_fp, float_one(), Rounding::Down)
}

/// value * bps / 10_000.
pub fn apply_bps(value: U256, bps: u32) -> Result<U256, EngineError> {
    mul_div(value, U256::from(bps), bps_divisor(), Rounding::Down)
}

/// value * 10_000 / bps.
pub fn unapply_bps(value: U256, bps: u32) -> Result<U256, EngineError> {
    if bps == 0 {
        return Err(EngineError::DivisionByZero("unapply_bps"));
    }
    mul_div(value, bps_divisor(), U256::from(bps), Rounding::Down)
}

pub fn apply_signed_add(base: U256, delta: SignedU256) -> Result<U256, EngineError> {
    if delta.mag.is_zero() {
        return Ok(base);
    }

    if delta.is_negative {
        base.checked_sub(delta.mag)
            .ok_or(EngineError::Underflow("apply_signed_add"))
    } else {
        base.checked_add(delta.mag)
            .ok_or(EngineError::Overflow("apply_signed_add"))
    }
}

/// base - delta  ==  base + (-delta)
pub fn apply_signed_sub(base: U256, delta: SignedU256) -> Result<U256, EngineError> {
    apply_signed_add(base, delta.negated())
}

/// base + delta, saturating at zero instead of underflowing.
pub fn apply_signed_add_floor_zero(base: U256, delta: SignedU256) -> U256 {
    if delta.is_negative {
        base.saturating_sub(delta.mag)
    } else {
        base.saturating_add(delta.mag)
    }
}

/// a + b
pub fn signed_add(a: SignedU256, b: SignedU256) -> SignedU256 {
    if a.is_zero() {
        return b;
    }
    if b.is_zero() {
        return a;
    }

    match (a.is_negative, b.is_negative) {
        (false, false) => SignedU256::pos(a.mag + b.mag),
        (true, true) => SignedU256::neg(a.mag + b.mag),
        (false, true) => {
            // a - |b|
            if a.mag >= b.mag {
                SignedU256::pos(a.mag - b.mag)
            } else {
                SignedU256::neg(b.mag - a.mag)
            }
        }
        (true, false) => {
            // -|a| + b = b - |a|
            if b.mag >= a.mag {
                SignedU256::pos(b.mag - a.mag)
            } else {
                SignedU256::neg(a.mag - b.mag)
            }
        }
    }
}

/// a - b
pub fn signed_sub(a: SignedU256, b: SignedU256) -> SignedU256 {
    signed_add(a, b.negated())
}
